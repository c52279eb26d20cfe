//! Version counter plus listener set shared by every reader of one entity type.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener = Arc<dyn Fn(u64) + Send + Sync>;

/// Tells every live reader that cached data changed.
///
/// `notify` bumps the version and calls the listeners that were registered
/// when it started, synchronously and in no particular order. Listeners are
/// called outside the lock, so a listener may subscribe or unsubscribe.
pub struct InvalidationBus {
  version: AtomicU64,
  next_id: AtomicU64,
  listeners: Mutex<BTreeMap<u64, Listener>>,
}

impl InvalidationBus {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      version: AtomicU64::new(0),
      next_id: AtomicU64::new(0),
      listeners: Mutex::new(BTreeMap::new()),
    })
  }

  pub fn version(&self) -> u64 {
    self.version.load(Ordering::SeqCst)
  }

  /// Register a listener; it receives the new version on every notify.
  pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
  where
    F: Fn(u64) + Send + Sync + 'static,
  {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id, Arc::new(listener));

    Subscription {
      bus: Arc::downgrade(self),
      id,
    }
  }

  /// Bump the version and call every current listener. Returns the new version.
  pub fn notify(&self) -> u64 {
    let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

    let snapshot: Vec<Listener> = self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();

    for listener in snapshot {
      listener(version);
    }

    version
  }

  pub fn listener_count(&self) -> usize {
    self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  fn unsubscribe(&self, id: u64) {
    self
      .listeners
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&id);
  }
}

/// Handle returned by [`InvalidationBus::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
  bus: Weak<InvalidationBus>,
  id: u64,
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(bus) = self.bus.upgrade() {
      bus.unsubscribe(self.id);
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription").field("id", &self.id).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn test_notify_calls_each_listener_once() {
    let bus = InvalidationBus::new();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let a_clone = a.clone();
    let _sub_a = bus.subscribe(move |_| {
      a_clone.fetch_add(1, Ordering::SeqCst);
    });
    let b_clone = b.clone();
    let _sub_b = bus.subscribe(move |_| {
      b_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(bus.notify(), 1);

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(bus.version(), 1);
  }

  #[test]
  fn test_listener_receives_new_version() {
    let bus = InvalidationBus::new();
    let seen = Arc::new(AtomicU64::new(0));

    let seen_clone = seen.clone();
    let _sub = bus.subscribe(move |v| seen_clone.store(v, Ordering::SeqCst));

    bus.notify();
    bus.notify();

    assert_eq!(seen.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_listener_added_during_notify_waits_for_next_call() {
    let bus = InvalidationBus::new();
    let late_calls = Arc::new(AtomicUsize::new(0));
    let late_subs: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

    let bus_weak = Arc::downgrade(&bus);
    let late_calls_clone = late_calls.clone();
    let late_subs_clone = late_subs.clone();
    let _sub = bus.subscribe(move |_| {
      let Some(bus) = bus_weak.upgrade() else {
        return;
      };
      let calls = late_calls_clone.clone();
      let sub = bus.subscribe(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
      });
      late_subs_clone.lock().unwrap().push(sub);
    });

    bus.notify();
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    bus.notify();
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_dropping_subscription_unsubscribes() {
    let bus = InvalidationBus::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = calls.clone();
    let sub = bus.subscribe(move |_| {
      calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(bus.listener_count(), 1);

    drop(sub);
    bus.notify();

    assert_eq!(bus.listener_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(bus.version(), 1);
  }
}
