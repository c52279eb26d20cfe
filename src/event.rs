use std::time::Duration;
use tokio::sync::mpsc;

/// Events driving the `watch` loop besides reader changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Ctrl-C
  Interrupt,
  /// Periodic tick, used to notice the day rolling over
  Tick,
}

/// Event handler that produces events from Ctrl-C and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = interrupt_tx.send(Event::Interrupt);
      }
    });

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      // The first tick completes immediately.
      interval.tick().await;
      loop {
        interval.tick().await;
        if tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
