//! Generic reader over one entity's day records.

use color_eyre::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use super::realtime::RealtimeBridge;
use crate::backend::ChangeFeed;
use crate::cache::{DailyRecord, RecordStore, Subscription};
use crate::day::DayKey;
use crate::query::{MutationResult, Query};

/// A mounted reader showing the records of one selected day.
///
/// The reader listens on its store's bus. When the bus version moves past
/// the one the reader last synced, [`RecordsHook::sync`] re-runs its effect:
/// load the selected day (cache first), then warm the prefetch window.
pub struct RecordsHook<R: DailyRecord> {
  pub(super) store: Arc<RecordStore<R>>,
  query: Query<Arc<Vec<R>>>,
  selected: watch::Sender<DayKey>,
  seen_version: u64,
  latest_version: Arc<AtomicU64>,
  changed: Arc<Notify>,
  _subscription: Subscription,
  _bridge: Option<RealtimeBridge>,
}

impl<R: DailyRecord> RecordsHook<R> {
  /// Mount a reader on `day` and run its first effect.
  ///
  /// With a change feed, a realtime bridge is attached for the reader's
  /// lifetime. A feed that cannot be subscribed is logged and skipped.
  pub async fn mount(
    store: Arc<RecordStore<R>>,
    day: DayKey,
    feed: Option<Arc<dyn ChangeFeed>>,
  ) -> Self {
    let latest_version = Arc::new(AtomicU64::new(store.bus().version()));
    let changed = Arc::new(Notify::new());

    let subscription = {
      let latest = latest_version.clone();
      let changed = changed.clone();
      store.bus().subscribe(move |version| {
        latest.fetch_max(version, Ordering::SeqCst);
        changed.notify_one();
      })
    };

    let (selected, selected_rx) = watch::channel(day);

    let bridge = match feed {
      Some(feed) => match RealtimeBridge::for_records(feed.as_ref(), store.clone(), selected_rx).await {
        Ok(bridge) => Some(bridge),
        Err(e) => {
          warn!(entity = R::entity_type(), error = %e, "realtime unavailable");
          None
        }
      },
      None => None,
    };

    let mut hook = Self {
      seen_version: store.bus().version(),
      store,
      query: Query::new(),
      selected,
      latest_version,
      changed,
      _subscription: subscription,
      _bridge: bridge,
    };
    hook.run_effect().await;
    hook
  }

  // ==========================================================================
  // State
  // ==========================================================================

  /// Records of the selected day; empty until the first successful load.
  pub fn records(&self) -> &[R] {
    self.query.data().map(|r| r.as_slice()).unwrap_or(&[])
  }

  pub fn is_loading(&self) -> bool {
    self.query.is_loading()
  }

  pub fn error(&self) -> Option<&str> {
    self.query.error()
  }

  pub fn selected_day(&self) -> DayKey {
    *self.selected.borrow()
  }

  /// Bus version this reader last synced to.
  pub fn version(&self) -> u64 {
    self.seen_version
  }

  /// True when the bus moved since the last sync.
  pub fn is_stale(&self) -> bool {
    self.latest_version.load(Ordering::SeqCst) > self.seen_version
  }

  /// Wait until the bus reports a change this reader has not synced yet.
  pub async fn changed(&self) {
    loop {
      let notified = self.changed.notified();
      if self.is_stale() {
        return;
      }
      notified.await;
    }
  }

  // ==========================================================================
  // Effects
  // ==========================================================================

  /// Re-run the effect if the bus moved. Returns whether anything ran.
  pub async fn sync(&mut self) -> bool {
    if !self.is_stale() {
      return false;
    }
    self.seen_version = self.latest_version.load(Ordering::SeqCst);
    debug!(
      entity = R::entity_type(),
      version = self.seen_version,
      "reader syncing"
    );
    self.run_effect().await;
    true
  }

  /// Show a different day.
  pub async fn set_date(&mut self, day: DayKey) {
    self.selected.send_replace(day);
    self.run_effect().await;
  }

  /// Fetch the selected day from the backend, bypassing the cache.
  pub async fn refetch(&mut self) {
    let day = self.selected_day();
    self.query.start();
    let result = self.store.fetch_day(day).await;
    self.settle(result);
  }

  async fn run_effect(&mut self) {
    self.refresh().await;
    let fetched = self.store.prefetch().await;
    // Our own prefetch only announces days this reader is not showing.
    if fetched > 0 && self.latest_version.load(Ordering::SeqCst) == self.seen_version + 1 {
      self.seen_version += 1;
    }
  }

  async fn refresh(&mut self) {
    let day = self.selected_day();
    self.query.start();
    let result = self.store.load_day(day).await;
    self.settle(result);
  }

  fn settle(&mut self, result: Result<Arc<Vec<R>>>) {
    if let Err(e) = &result {
      warn!(entity = R::entity_type(), day = %self.selected_day(), error = %e, "load failed");
    }
    self.query.settle(result);
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  pub(super) async fn insert(&mut self, draft: &R::Draft) -> MutationResult<R> {
    let result = self.store.insert(draft).await;
    self.after_mutation("insert", result).await
  }

  pub(super) async fn update(&mut self, id: Uuid, patch: &R::Patch) -> MutationResult<R> {
    let result = self.store.update(id, patch).await;
    self.after_mutation("update", result).await
  }

  pub(super) async fn delete(&mut self, id: Uuid) -> MutationResult<()> {
    let result = self.store.delete(id).await;
    self.after_mutation("delete", result).await
  }

  async fn after_mutation<T>(&mut self, action: &str, result: Result<T>) -> MutationResult<T> {
    match &result {
      Ok(_) => {
        self.sync().await;
      }
      Err(e) => warn!(entity = R::entity_type(), action, error = %e, "mutation failed"),
    }
    result.into()
  }
}
