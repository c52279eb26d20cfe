//! Profile reader: the user's settings row, created on first access.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use super::realtime::RealtimeBridge;
use crate::backend::{ChangeFeed, ProfileStore};
use crate::models::{ProfileUpdate, Table, UserProfile};
use crate::query::{MutationResult, Query};

pub struct ProfileHook {
  user_id: Uuid,
  profiles: Arc<dyn ProfileStore>,
  query: Query<UserProfile>,
  stale: Arc<AtomicBool>,
  changed: Arc<Notify>,
  _bridge: Option<RealtimeBridge>,
}

impl ProfileHook {
  /// Mount the reader and load (or create) the profile.
  pub async fn mount(
    user_id: Uuid,
    profiles: Arc<dyn ProfileStore>,
    feed: Option<Arc<dyn ChangeFeed>>,
  ) -> Self {
    let stale = Arc::new(AtomicBool::new(false));
    let changed = Arc::new(Notify::new());

    let bridge = match feed {
      Some(feed) => match feed.subscribe(Table::UserSettings, user_id).await {
        Ok(events) => {
          let stale = stale.clone();
          let changed = changed.clone();
          Some(RealtimeBridge::spawn(Table::UserSettings, events, move || {
            stale.store(true, Ordering::SeqCst);
            changed.notify_one();
            async {}
          }))
        }
        Err(e) => {
          warn!(error = %e, "settings realtime unavailable");
          None
        }
      },
      None => None,
    };

    let mut hook = Self {
      user_id,
      profiles,
      query: Query::new(),
      stale,
      changed,
      _bridge: bridge,
    };
    hook.reload().await;
    hook
  }

  pub fn profile(&self) -> Option<&UserProfile> {
    self.query.data()
  }

  pub fn is_loading(&self) -> bool {
    self.query.is_loading()
  }

  pub fn error(&self) -> Option<&str> {
    self.query.error()
  }

  pub fn is_stale(&self) -> bool {
    self.stale.load(Ordering::SeqCst)
  }

  /// Wait for a settings change this reader has not reloaded yet.
  pub async fn changed(&self) {
    loop {
      let notified = self.changed.notified();
      if self.is_stale() {
        return;
      }
      notified.await;
    }
  }

  /// Reload if a change event arrived since the last load.
  pub async fn sync(&mut self) -> bool {
    if !self.stale.swap(false, Ordering::SeqCst) {
      return false;
    }
    self.reload().await;
    true
  }

  pub async fn reload(&mut self) {
    self.query.start();
    let result = self.load_or_create().await;
    if let Err(e) = &result {
      warn!(user = %self.user_id, error = %e, "failed to load settings");
    }
    self.query.settle(result);
  }

  async fn load_or_create(&self) -> Result<UserProfile> {
    if let Some(profile) = self.profiles.fetch(self.user_id).await? {
      return Ok(profile);
    }
    info!(user = %self.user_id, "creating default settings");
    self
      .profiles
      .insert(&UserProfile::with_defaults(self.user_id))
      .await
  }

  /// Apply an edit to the stored settings.
  pub async fn update_profile(&mut self, update: ProfileUpdate) -> MutationResult<UserProfile> {
    if update.is_empty() {
      return MutationResult::err("nothing to update");
    }
    match self.profiles.update(self.user_id, &update).await {
      Ok(profile) => {
        info!(user = %self.user_id, "settings updated");
        self.query.succeed(profile.clone());
        MutationResult::ok(profile)
      }
      Err(e) => {
        warn!(user = %self.user_id, error = %e, "settings update failed");
        MutationResult::err(e.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::LocalBackend;
  use crate::models::GoalMode;
  use std::path::PathBuf;
  use std::time::Duration;

  fn backend() -> Arc<LocalBackend> {
    Arc::new(LocalBackend::open_in_memory(PathBuf::from("unused-images")).unwrap())
  }

  #[tokio::test]
  async fn test_missing_profile_is_created_with_defaults() {
    let backend = backend();
    let user = Uuid::new_v4();

    let hook = ProfileHook::mount(user, backend.clone(), None).await;

    let profile = hook.profile().unwrap();
    assert_eq!(profile.maintenance_calories, 2000);
    assert_eq!(profile.goal_mode, GoalMode::Maintain);
    assert_eq!(profile.water_target_ml, 3000);
    assert!(ProfileStore::fetch(backend.as_ref(), user)
      .await
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_update_profile_changes_target() {
    let user = Uuid::new_v4();
    let mut hook = ProfileHook::mount(user, backend(), None).await;

    let result = hook
      .update_profile(ProfileUpdate {
        goal_mode: Some(GoalMode::Cut),
        ..ProfileUpdate::default()
      })
      .await;

    assert!(result.is_ok());
    assert_eq!(hook.profile().unwrap().calorie_target(), 1700);
  }

  #[tokio::test]
  async fn test_empty_update_rejected() {
    let mut hook = ProfileHook::mount(Uuid::new_v4(), backend(), None).await;

    let result = hook.update_profile(ProfileUpdate::default()).await;

    assert_eq!(result.error.as_deref(), Some("nothing to update"));
  }

  #[tokio::test]
  async fn test_change_from_elsewhere_reloads_on_sync() {
    let backend = backend();
    let user = Uuid::new_v4();
    let feed: Arc<dyn ChangeFeed> = backend.clone();
    let mut hook = ProfileHook::mount(user, backend.clone(), Some(feed)).await;
    // Mounting created the row and published its insert.
    tokio::time::timeout(Duration::from_secs(5), hook.changed())
      .await
      .unwrap();
    hook.sync().await;

    ProfileStore::update(
      backend.as_ref(),
      user,
      &ProfileUpdate {
        water_target_ml: Some(3500),
        ..ProfileUpdate::default()
      },
    )
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), hook.changed())
      .await
      .unwrap();
    assert!(hook.sync().await);
    assert_eq!(hook.profile().unwrap().water_target_ml, 3500);
  }
}
