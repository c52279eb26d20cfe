//! Hydration reader: selected-day water logs and quick-add cups.

use uuid::Uuid;

use super::records::RecordsHook;
use super::summary::{self, WeeklySummary};
use crate::models::{HydrationLog, NewWaterLog, LARGE_CUP_ML, SMALL_CUP_ML};
use crate::query::MutationResult;

pub type HydrationHook = RecordsHook<HydrationLog>;

impl RecordsHook<HydrationLog> {
  pub async fn add_water(&mut self, amount_ml: u32) -> MutationResult<HydrationLog> {
    match NewWaterLog::new(amount_ml) {
      Ok(log) => self.insert(&log).await,
      Err(e) => MutationResult::err(e.to_string()),
    }
  }

  /// Log water at a specific time, for backfilling another day.
  pub async fn add_water_at(
    &mut self,
    amount_ml: u32,
    at: chrono::DateTime<chrono::Utc>,
  ) -> MutationResult<HydrationLog> {
    match NewWaterLog::new(amount_ml) {
      Ok(log) => self.insert(&log.at(at)).await,
      Err(e) => MutationResult::err(e.to_string()),
    }
  }

  pub async fn add_small_cup(&mut self) -> MutationResult<HydrationLog> {
    self.add_water(SMALL_CUP_ML).await
  }

  pub async fn add_large_cup(&mut self) -> MutationResult<HydrationLog> {
    self.add_water(LARGE_CUP_ML).await
  }

  pub async fn delete_water_log(&mut self, id: Uuid) -> MutationResult<()> {
    self.delete(id).await
  }

  /// Water logged on the selected day, in ml.
  pub fn total_water(&self) -> u64 {
    summary::total_water(self.records())
  }

  /// Water per day across the prefetch window.
  pub fn water_window(&self) -> WeeklySummary {
    WeeklySummary::from_cache(
      self.store.cache(),
      self.store.clock().today(),
      self.store.window(),
      |log| u64::from(log.amount_ml),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::FakeRepo;
  use crate::cache::RecordStore;
  use crate::day::{DayKey, FixedClock};
  use chrono::{FixedOffset, NaiveTime};
  use std::sync::Arc;

  const TODAY: &str = "2024-01-10";

  fn day(s: &str) -> DayKey {
    s.parse().unwrap()
  }

  async fn mounted() -> (Arc<FakeRepo<HydrationLog>>, HydrationHook) {
    let repo = FakeRepo::<HydrationLog>::new();
    let clock = Arc::new(FixedClock::new(day(TODAY), FixedOffset::east_opt(0).unwrap()));
    let store = Arc::new(RecordStore::<HydrationLog>::new(Uuid::new_v4(), repo.clone(), clock, 5));
    let hook = HydrationHook::mount(store, day(TODAY), None).await;
    (repo, hook)
  }

  fn noon(s: &str) -> chrono::DateTime<chrono::Utc> {
    day(s).date().and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc()
  }

  #[tokio::test]
  async fn test_cups_add_fixed_amounts() {
    let (_repo, mut hook) = mounted().await;

    hook.add_water_at(SMALL_CUP_ML, noon(TODAY)).await;
    hook.add_water_at(LARGE_CUP_ML, noon(TODAY)).await;
    hook.add_water_at(330, noon(TODAY)).await;

    assert_eq!(hook.total_water(), 1080);
    assert_eq!(hook.records().len(), 3);
  }

  #[tokio::test]
  async fn test_small_and_large_cup_amounts() {
    let (repo, mut hook) = mounted().await;

    let small = hook.add_small_cup().await;
    let large = hook.add_large_cup().await;

    assert_eq!(small.data.unwrap().amount_ml, 250);
    assert_eq!(large.data.unwrap().amount_ml, 500);
    assert_eq!(repo.rows.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_zero_amount_rejected_before_backend() {
    let (repo, mut hook) = mounted().await;

    let result = hook.add_water(0).await;

    assert!(!result.is_ok());
    assert!(repo.rows.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_delete_water_log() {
    let (_repo, mut hook) = mounted().await;
    let log = hook.add_water_at(500, noon(TODAY)).await.data.unwrap();

    assert!(hook.delete_water_log(log.id).await.is_ok());

    assert_eq!(hook.total_water(), 0);
  }

  #[tokio::test]
  async fn test_water_window_spans_prefetch_days() {
    let (_repo, mut hook) = mounted().await;
    hook.add_water_at(750, noon("2024-01-06")).await;

    let window = hook.water_window();

    assert_eq!(window.days.len(), 5);
    assert_eq!(window.days[0].day, day("2024-01-06"));
    assert_eq!(window.days[0].total, 750);
    assert_eq!(window.total(), 750);
  }
}
