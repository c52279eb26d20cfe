//! Backend collaborators: row storage, image bucket and change feed.
//!
//! Two implementations exist: a local SQLite store whose change feed sees
//! writes from every connection to the same file, and a hosted REST API
//! without a change feed.

mod changes;
mod local;
mod remote;

pub use changes::ChangeHub;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::analysis::MealAnalyzer;
use crate::cache::DailyRecord;
use crate::models::{HydrationLog, Meal, ProfileUpdate, Table, UserProfile};

/// Row-level access to one record table.
#[async_trait]
pub trait RecordRepository<R: DailyRecord>: Send + Sync {
  /// Records of `user_id` created within `[start, end]`, newest first.
  async fn list_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<R>>;

  async fn insert(&self, user_id: Uuid, draft: &R::Draft) -> Result<R>;

  async fn update(&self, id: Uuid, patch: &R::Patch) -> Result<R>;

  async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Storage for the per-user settings row.
#[async_trait]
pub trait ProfileStore: Send + Sync {
  async fn fetch(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

  async fn insert(&self, profile: &UserProfile) -> Result<UserProfile>;

  async fn update(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<UserProfile>;
}

/// Bucket holding meal photos.
#[async_trait]
pub trait ImageStore: Send + Sync {
  /// Store the image and return its path inside the bucket.
  async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

  fn public_url(&self, path: &str) -> Result<String>;

  async fn delete(&self, path: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// A row change pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
  pub kind: ChangeKind,
  pub table: Table,
  pub user_id: Uuid,
  pub record_id: Option<Uuid>,
}

/// Server-pushed row changes, filtered by table and owner.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
  async fn subscribe(&self, table: Table, user_id: Uuid)
    -> Result<broadcast::Receiver<ChangeEvent>>;
}

/// The collaborators a session is built from.
#[derive(Clone)]
pub struct Backend {
  pub meals: Arc<dyn RecordRepository<Meal>>,
  pub water: Arc<dyn RecordRepository<HydrationLog>>,
  pub profiles: Arc<dyn ProfileStore>,
  pub images: Arc<dyn ImageStore>,
  pub changes: Option<Arc<dyn ChangeFeed>>,
  pub analyzer: Option<Arc<dyn MealAnalyzer>>,
}

impl Backend {
  pub fn local(backend: LocalBackend) -> Self {
    let backend = Arc::new(backend);
    Self {
      meals: backend.clone(),
      water: backend.clone(),
      profiles: backend.clone(),
      images: backend.clone(),
      changes: Some(backend),
      analyzer: None,
    }
  }

  pub fn remote(backend: RemoteBackend) -> Self {
    let backend = Arc::new(backend);
    Self {
      meals: backend.clone(),
      water: backend.clone(),
      profiles: backend.clone(),
      images: backend.clone(),
      changes: None,
      analyzer: Some(backend),
    }
  }
}
