//! Read-through store tying the day cache, the bus and a repository together.

use color_eyre::Result;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bus::InvalidationBus;
use super::day_cache::DayCache;
use super::traits::DailyRecord;
use crate::backend::RecordRepository;
use crate::day::{Clock, DayKey};

/// Shared per-entity state for one signed-in user.
///
/// Every reader of this entity type goes through the same store, so a
/// mutation made by one reader is visible to all of them after they refetch.
/// Invalidation is coarse: any change clears every cached day.
pub struct RecordStore<R: DailyRecord> {
  user_id: Uuid,
  cache: DayCache<R>,
  bus: Arc<InvalidationBus>,
  repo: Arc<dyn RecordRepository<R>>,
  clock: Arc<dyn Clock>,
  /// Days warmed by `prefetch`, counting today
  window: usize,
  /// Today as of the last prefetch; cleared by every invalidation
  warmed_for: Mutex<Option<DayKey>>,
}

impl<R: DailyRecord> RecordStore<R> {
  pub fn new(
    user_id: Uuid,
    repo: Arc<dyn RecordRepository<R>>,
    clock: Arc<dyn Clock>,
    window: usize,
  ) -> Self {
    Self {
      user_id,
      cache: DayCache::new(),
      bus: InvalidationBus::new(),
      repo,
      clock,
      window,
      warmed_for: Mutex::new(None),
    }
  }

  pub fn user_id(&self) -> Uuid {
    self.user_id
  }

  pub fn cache(&self) -> &DayCache<R> {
    &self.cache
  }

  pub fn bus(&self) -> &Arc<InvalidationBus> {
    &self.bus
  }

  pub fn clock(&self) -> &dyn Clock {
    self.clock.as_ref()
  }

  pub fn window(&self) -> usize {
    self.window
  }

  /// Fetch one day from the repository and cache it.
  ///
  /// The cache is only written when the fetch succeeds.
  pub async fn fetch_day(&self, day: DayKey) -> Result<Arc<Vec<R>>> {
    let bounds = self.clock.bounds(day);
    let records = self
      .repo
      .list_between(self.user_id, bounds.start, bounds.end)
      .await?;

    debug!(
      entity = R::entity_type(),
      %day,
      count = records.len(),
      start = %bounds.start,
      end = %bounds.end,
      "fetched day"
    );
    Ok(self.cache.set(day, records))
  }

  /// Cached records for a day, fetching on a miss.
  pub async fn load_day(&self, day: DayKey) -> Result<Arc<Vec<R>>> {
    if let Some(records) = self.cache.get(day) {
      debug!(entity = R::entity_type(), %day, count = records.len(), "cache hit");
      return Ok(records);
    }
    debug!(entity = R::entity_type(), %day, "cache miss");
    self.fetch_day(day).await
  }

  /// Warm the trailing window once per invalidation cycle and calendar day.
  ///
  /// Missing days are fetched concurrently; listeners are notified after the
  /// whole batch settles, and only when something was fetched. Returns the
  /// number of days that were fetched successfully.
  pub async fn prefetch(&self) -> usize {
    let today = self.clock.today();
    {
      let mut warmed = self.warmed_for.lock().unwrap_or_else(PoisonError::into_inner);
      if *warmed == Some(today) {
        return 0;
      }
      *warmed = Some(today);
    }

    let missing: Vec<DayKey> = today
      .trailing(self.window)
      .into_iter()
      .filter(|day| !self.cache.has(*day))
      .collect();

    if missing.is_empty() {
      debug!(entity = R::entity_type(), "prefetch window already cached");
      return 0;
    }

    debug!(entity = R::entity_type(), days = missing.len(), "prefetching");
    let results = join_all(missing.iter().map(|day| self.fetch_day(*day))).await;

    let mut fetched = 0;
    for (day, result) in missing.iter().zip(results) {
      match result {
        Ok(_) => fetched += 1,
        Err(e) => warn!(entity = R::entity_type(), %day, error = %e, "prefetch failed"),
      }
    }

    if fetched > 0 {
      info!(entity = R::entity_type(), fetched, "prefetch complete");
      self.bus.notify();
    }
    fetched
  }

  /// Forget every cached day and tell all readers to refetch.
  pub fn invalidate(&self, reason: &str) {
    self.cache.clear();
    self.clear_warmed();
    let version = self.bus.notify();
    info!(entity = R::entity_type(), reason, version, "cache invalidated");
  }

  /// Drop cached data without notifying anyone (sign-out).
  pub fn reset(&self) {
    self.cache.clear();
    self.clear_warmed();
  }

  fn clear_warmed(&self) {
    *self.warmed_for.lock().unwrap_or_else(PoisonError::into_inner) = None;
  }

  pub async fn insert(&self, draft: &R::Draft) -> Result<R> {
    let record = self.repo.insert(self.user_id, draft).await?;
    info!(entity = R::entity_type(), id = %record.id(), "inserted");
    self.invalidate("insert");
    Ok(record)
  }

  pub async fn update(&self, id: Uuid, patch: &R::Patch) -> Result<R> {
    let record = self.repo.update(id, patch).await?;
    info!(entity = R::entity_type(), %id, "updated");
    self.invalidate("update");
    Ok(record)
  }

  pub async fn delete(&self, id: Uuid) -> Result<()> {
    self.repo.delete(id).await?;
    info!(entity = R::entity_type(), %id, "deleted");
    self.invalidate("delete");
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::testing::FakeRepo;
  use super::*;
  use crate::day::FixedClock;
  use crate::models::{Meal, NewMeal};
  use crate::day::DayBounds;
  use chrono::{FixedOffset, NaiveTime};
  use std::sync::atomic::{AtomicUsize, Ordering};

  const TODAY: &str = "2024-01-10";

  fn day(s: &str) -> DayKey {
    s.parse().unwrap()
  }

  fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(day(TODAY), FixedOffset::east_opt(0).unwrap()))
  }

  fn noon(s: &str) -> chrono::DateTime<chrono::Utc> {
    day(s).date().and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc()
  }

  fn store(repo: &Arc<FakeRepo<Meal>>, user: Uuid) -> RecordStore<Meal> {
    RecordStore::new(user, repo.clone(), clock(), 7)
  }

  async fn seed(repo: &FakeRepo<Meal>, user: Uuid, when: &str, calories: u32) {
    let draft = NewMeal::manual(calories, 10.0, 10.0, 10.0).at(noon(when));
    RecordRepository::<Meal>::insert(repo, user, &draft)
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_fetch_day_populates_cache() {
    let repo = FakeRepo::new();
    let user = Uuid::new_v4();
    seed(&repo, user, "2024-01-10", 500).await;
    let store = store(&repo, user);

    assert!(store.cache().get(day("2024-01-10")).is_none());

    let meals = store.fetch_day(day("2024-01-10")).await.unwrap();

    assert_eq!(meals.len(), 1);
    assert_eq!(meals[0].calories, 500);
    assert_eq!(store.cache().get(day("2024-01-10")).unwrap().len(), 1);
    assert!(!store.cache().has(day("2024-01-09")));
  }

  #[tokio::test]
  async fn test_load_day_hits_cache_after_first_fetch() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());

    store.load_day(day("2024-01-08")).await.unwrap();
    store.load_day(day("2024-01-08")).await.unwrap();

    assert_eq!(repo.lists(), 1);
  }

  #[tokio::test]
  async fn test_failed_fetch_leaves_cache_untouched() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    repo.fail_lists.store(true, Ordering::SeqCst);

    assert!(store.fetch_day(day(TODAY)).await.is_err());
    assert!(!store.cache().has(day(TODAY)));
  }

  #[tokio::test]
  async fn test_prefetch_skips_cached_days() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    store.fetch_day(day("2024-01-10")).await.unwrap();
    store.fetch_day(day("2024-01-07")).await.unwrap();
    let before = repo.lists();

    let fetched = store.prefetch().await;

    assert_eq!(fetched, 5);
    assert_eq!(repo.lists() - before, 5);
    assert_eq!(store.cache().len(), 7);
  }

  #[tokio::test]
  async fn test_prefetch_runs_once_until_invalidated() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());

    assert_eq!(store.prefetch().await, 7);
    assert_eq!(store.prefetch().await, 0);
    assert_eq!(repo.lists(), 7);

    store.invalidate("test");
    assert_eq!(store.cache().len(), 0);
    assert_eq!(store.prefetch().await, 7);
    assert_eq!(repo.lists(), 14);
  }

  /// Clock whose day can be moved forward mid-test.
  struct MovingClock {
    today: Mutex<DayKey>,
  }

  impl Clock for MovingClock {
    fn today(&self) -> DayKey {
      *self.today.lock().unwrap()
    }

    fn bounds(&self, day: DayKey) -> DayBounds {
      day.bounds_in(&FixedOffset::east_opt(0).unwrap())
    }
  }

  #[tokio::test]
  async fn test_prefetch_rewarms_after_day_rollover() {
    let repo = FakeRepo::<Meal>::new();
    let clock = Arc::new(MovingClock {
      today: Mutex::new(day(TODAY)),
    });
    let store = RecordStore::<Meal>::new(Uuid::new_v4(), repo.clone(), clock.clone(), 7);

    assert_eq!(store.prefetch().await, 7);
    assert_eq!(store.prefetch().await, 0);

    *clock.today.lock().unwrap() = day("2024-01-11");

    assert_eq!(store.prefetch().await, 1);
    assert!(store.cache().has(day("2024-01-11")));
    assert_eq!(repo.lists(), 8);
  }

  #[tokio::test]
  async fn test_warm_cache_prefetch_does_not_notify() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    for d in day(TODAY).trailing(7) {
      store.fetch_day(d).await.unwrap();
    }
    let version = store.bus().version();

    assert_eq!(store.prefetch().await, 0);
    assert_eq!(store.bus().version(), version);
  }

  #[tokio::test]
  async fn test_prefetch_notifies_once_after_batch() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    let notifications = Arc::new(AtomicUsize::new(0));

    let notifications_clone = notifications.clone();
    let _sub = store.bus().subscribe(move |_| {
      notifications_clone.fetch_add(1, Ordering::SeqCst);
    });
    store.prefetch().await;

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(store.cache().len(), 7);
  }

  #[tokio::test]
  async fn test_prefetch_failures_leave_days_uncached() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    repo.fail_lists.store(true, Ordering::SeqCst);

    assert_eq!(store.prefetch().await, 0);
    assert_eq!(store.cache().len(), 0);
    assert_eq!(store.bus().version(), 0);
  }

  #[tokio::test]
  async fn test_mutations_clear_and_notify() {
    let repo = FakeRepo::new();
    let user = Uuid::new_v4();
    let store = store(&repo, user);
    store.fetch_day(day(TODAY)).await.unwrap();

    let meal = store
      .insert(&NewMeal::manual(300, 1.0, 1.0, 1.0).at(noon(TODAY)))
      .await
      .unwrap();
    assert_eq!(store.cache().len(), 0);
    assert_eq!(store.bus().version(), 1);

    store.fetch_day(day(TODAY)).await.unwrap();
    store.delete(meal.id).await.unwrap();
    assert!(!store.cache().has(day(TODAY)));
    assert_eq!(store.bus().version(), 2);
  }

  #[tokio::test]
  async fn test_failed_mutation_keeps_cache() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    store.fetch_day(day(TODAY)).await.unwrap();

    assert!(store.delete(Uuid::new_v4()).await.is_err());

    assert!(store.cache().has(day(TODAY)));
    assert_eq!(store.bus().version(), 0);
  }

  #[tokio::test]
  async fn test_reset_clears_silently() {
    let repo = FakeRepo::new();
    let store = store(&repo, Uuid::new_v4());
    store.fetch_day(day(TODAY)).await.unwrap();

    store.reset();

    assert_eq!(store.cache().len(), 0);
    assert_eq!(store.bus().version(), 0);
  }
}
