//! Signed-in session: owns the per-entity stores and mounts readers.
//!
//! A session is created at sign-in and cleared at sign-out. Nothing is
//! global, so two sessions never share cached records.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::analysis::MealAnalyzer;
use crate::backend::{Backend, ImageStore};
use crate::cache::RecordStore;
use crate::config::CacheConfig;
use crate::day::{Clock, DayKey};
use crate::hooks::{HydrationHook, MealsHook, ProfileHook};
use crate::models::{HydrationLog, Meal};

/// Cache statistics for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
  pub meal_days: Vec<DayKey>,
  pub water_days: Vec<DayKey>,
  pub meals_version: u64,
  pub water_version: u64,
  pub meal_readers: usize,
  pub water_readers: usize,
}

pub struct Session {
  user_id: Uuid,
  backend: Backend,
  clock: Arc<dyn Clock>,
  meals: Arc<RecordStore<Meal>>,
  water: Arc<RecordStore<HydrationLog>>,
}

impl Session {
  pub fn start(user_id: Uuid, backend: Backend, cache: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
    info!(user = %user_id, "session started");
    Self {
      user_id,
      meals: Arc::new(RecordStore::new(
        user_id,
        backend.meals.clone(),
        clock.clone(),
        cache.meals_window_days,
      )),
      water: Arc::new(RecordStore::new(
        user_id,
        backend.water.clone(),
        clock.clone(),
        cache.hydration_window_days,
      )),
      backend,
      clock,
    }
  }

  pub fn user_id(&self) -> Uuid {
    self.user_id
  }

  pub fn today(&self) -> DayKey {
    self.clock.today()
  }

  pub fn clock(&self) -> &dyn Clock {
    self.clock.as_ref()
  }

  pub async fn meals_hook(&self, day: DayKey) -> MealsHook {
    MealsHook::mount(self.meals.clone(), day, self.backend.changes.clone()).await
  }

  pub async fn hydration_hook(&self, day: DayKey) -> HydrationHook {
    HydrationHook::mount(self.water.clone(), day, self.backend.changes.clone()).await
  }

  pub async fn profile_hook(&self) -> ProfileHook {
    ProfileHook::mount(
      self.user_id,
      self.backend.profiles.clone(),
      self.backend.changes.clone(),
    )
    .await
  }

  pub fn images(&self) -> &dyn ImageStore {
    self.backend.images.as_ref()
  }

  /// The meal analyzer, when the backend offers one.
  pub fn analyzer(&self) -> Result<&dyn MealAnalyzer> {
    self
      .backend
      .analyzer
      .as_deref()
      .ok_or_else(|| eyre!("Meal analysis needs the remote backend"))
  }

  /// Whether readers receive server-pushed changes
  pub fn has_realtime(&self) -> bool {
    self.backend.changes.is_some()
  }

  /// Drop every cached day for sign-out. Readers are not notified.
  pub fn clear_all(&self) {
    self.meals.reset();
    self.water.reset();
    info!(user = %self.user_id, "session caches cleared");
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      meal_days: self.meals.cache().keys(),
      water_days: self.water.cache().keys(),
      meals_version: self.meals.bus().version(),
      water_version: self.water.bus().version(),
      meal_readers: self.meals.bus().listener_count(),
      water_readers: self.water.bus().listener_count(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::LocalBackend;
  use crate::day::FixedClock;
  use crate::models::NewMeal;
  use chrono::{FixedOffset, NaiveTime};
  use std::path::PathBuf;

  const TODAY: &str = "2024-01-10";

  fn day(s: &str) -> DayKey {
    s.parse().unwrap()
  }

  fn session(user: Uuid) -> Session {
    let backend = Backend::local(LocalBackend::open_in_memory(PathBuf::from("unused-images")).unwrap());
    let clock = Arc::new(FixedClock::new(day(TODAY), FixedOffset::east_opt(0).unwrap()));
    Session::start(user, backend, &CacheConfig::default(), clock)
  }

  #[tokio::test]
  async fn test_hooks_warm_configured_windows() {
    let session = session(Uuid::new_v4());

    let _meals = session.meals_hook(session.today()).await;
    let _water = session.hydration_hook(session.today()).await;

    let stats = session.stats();
    assert_eq!(stats.meal_days.len(), 7);
    assert_eq!(stats.water_days.len(), 5);
    assert_eq!(stats.meal_days.last(), Some(&day(TODAY)));
    assert_eq!(stats.meal_readers, 1);
    assert_eq!(stats.water_readers, 1);
  }

  #[tokio::test]
  async fn test_dropped_reader_unsubscribes() {
    let session = session(Uuid::new_v4());
    let meals = session.meals_hook(session.today()).await;
    assert_eq!(session.stats().meal_readers, 1);

    drop(meals);

    assert_eq!(session.stats().meal_readers, 0);
  }

  #[tokio::test]
  async fn test_clear_all_does_not_notify() {
    let session = session(Uuid::new_v4());
    let meals = session.meals_hook(session.today()).await;
    let version = session.stats().meals_version;

    session.clear_all();

    let stats = session.stats();
    assert!(stats.meal_days.is_empty());
    assert!(stats.water_days.is_empty());
    assert_eq!(stats.meals_version, version);
    assert!(!meals.is_stale());
  }

  #[tokio::test]
  async fn test_sessions_do_not_share_records() {
    let first = session(Uuid::new_v4());
    let second = session(Uuid::new_v4());
    let noon = day(TODAY).date().and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc();

    let mut meals = first.meals_hook(first.today()).await;
    meals.add_meal(NewMeal::manual(500, 1.0, 1.0, 1.0).at(noon)).await;

    assert_eq!(meals.records().len(), 1);
    assert!(second.stats().meal_days.is_empty());
  }

  #[tokio::test]
  async fn test_local_backend_has_no_analyzer() {
    let session = session(Uuid::new_v4());

    assert!(session.analyzer().is_err());
    assert!(session.has_realtime());
  }
}
