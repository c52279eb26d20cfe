//! Per-reader subscription to backend change events.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{ChangeEvent, ChangeFeed};
use crate::cache::{DailyRecord, RecordStore};
use crate::day::DayKey;
use crate::models::Table;

/// Background task reacting to change events; aborted on drop.
pub struct RealtimeBridge {
  handle: JoinHandle<()>,
}

impl RealtimeBridge {
  /// Bridge for a records reader.
  ///
  /// Any change for the store's user clears the cache, notifies the bus,
  /// fetches the day currently selected in `selected`, then re-warms the
  /// prefetch window.
  pub async fn for_records<R: DailyRecord>(
    feed: &dyn ChangeFeed,
    store: Arc<RecordStore<R>>,
    selected: watch::Receiver<DayKey>,
  ) -> Result<Self> {
    let events = feed.subscribe(R::table(), store.user_id()).await?;

    Ok(Self::spawn(R::table(), events, move || {
      let store = store.clone();
      let day = *selected.borrow();
      async move {
        store.invalidate("realtime");
        if let Err(e) = store.fetch_day(day).await {
          warn!(entity = R::entity_type(), %day, error = %e, "realtime refetch failed");
        }
        store.prefetch().await;
      }
    }))
  }

  /// Bridge that runs `on_change` for every event (or lag) on `events`.
  pub fn spawn<F, Fut>(table: Table, mut events: broadcast::Receiver<ChangeEvent>, mut on_change: F) -> Self
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let handle = tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => debug!(
            table = table.name(),
            kind = ?event.kind,
            record = ?event.record_id,
            "change received"
          ),
          Err(RecvError::Lagged(skipped)) => {
            warn!(table = table.name(), skipped, "change feed lagged")
          }
          Err(RecvError::Closed) => {
            debug!(table = table.name(), "change feed closed");
            break;
          }
        }
        on_change().await;
      }
    });

    Self { handle }
  }
}

impl Drop for RealtimeBridge {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::ChangeKind;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use tokio::sync::mpsc;
  use uuid::Uuid;

  fn event() -> ChangeEvent {
    ChangeEvent {
      kind: ChangeKind::Update,
      table: Table::UserSettings,
      user_id: Uuid::nil(),
      record_id: None,
    }
  }

  #[tokio::test]
  async fn test_each_event_runs_callback() {
    let (tx, rx) = broadcast::channel(8);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let _bridge = RealtimeBridge::spawn(Table::UserSettings, rx, move || {
      let done_tx = done_tx.clone();
      async move {
        let _ = done_tx.send(());
      }
    });

    tx.send(event()).unwrap();
    tx.send(event()).unwrap();

    for _ in 0..2 {
      tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    }
  }

  #[tokio::test]
  async fn test_closed_feed_ends_bridge() {
    let (tx, rx) = broadcast::channel::<ChangeEvent>(8);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let bridge = RealtimeBridge::spawn(Table::Meals, rx, move || {
      calls_clone.fetch_add(1, Ordering::SeqCst);
      async {}
    });

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), async {
      while !bridge.handle.is_finished() {
        tokio::task::yield_now().await;
      }
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_drop_stops_listening() {
    let (tx, rx) = broadcast::channel(8);
    let bridge = RealtimeBridge::spawn(Table::Meals, rx, || async {});
    assert_eq!(tx.receiver_count(), 1);

    drop(bridge);
    tokio::time::timeout(Duration::from_secs(5), async {
      while tx.receiver_count() > 0 {
        tokio::task::yield_now().await;
      }
    })
    .await
    .unwrap();
  }
}
