//! In-process change feed built on tokio broadcast channels.

use async_trait::async_trait;
use color_eyre::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ChangeEvent, ChangeFeed};
use crate::models::Table;

/// Channel capacity per (table, user) feed.
const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of row changes, one channel per table and owner.
#[derive(Debug, Default)]
pub struct ChangeHub {
  channels: Mutex<HashMap<(Table, Uuid), broadcast::Sender<ChangeEvent>>>,
}

impl ChangeHub {
  pub fn new() -> Self {
    Self::default()
  }

  fn sender(&self, table: Table, user_id: Uuid) -> broadcast::Sender<ChangeEvent> {
    self
      .channels
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry((table, user_id))
      .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
      .clone()
  }

  /// Deliver an event to the subscribers of its table and owner.
  pub fn publish(&self, event: ChangeEvent) {
    let sender = self.sender(event.table, event.user_id);
    // No receivers just means nobody is watching this user.
    let _ = sender.send(event);
  }
}

#[async_trait]
impl ChangeFeed for ChangeHub {
  async fn subscribe(
    &self,
    table: Table,
    user_id: Uuid,
  ) -> Result<broadcast::Receiver<ChangeEvent>> {
    Ok(self.sender(table, user_id).subscribe())
  }
}
