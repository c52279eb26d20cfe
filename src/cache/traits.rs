//! Core traits for records cached by calendar day.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::models::{
  HydrationLog, Meal, MealPatch, NewMeal, NewWaterLog, Table, WaterLogPatch,
};

/// Trait for records that are fetched and cached per calendar day.
///
/// Implementors expose their owner and creation time; `created_at` is the
/// authoritative ordering key and decides which day a record belongs to.
pub trait DailyRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Fields needed to insert a new record
  type Draft: Clone + Send + Sync + Serialize + 'static;
  /// Partial update applied by id
  type Patch: Clone + Send + Sync + Serialize + 'static;

  fn id(&self) -> Uuid;

  fn user_id(&self) -> Uuid;

  fn created_at(&self) -> DateTime<Utc>;

  /// Backend table holding this record type
  fn table() -> Table;

  /// Entity type name for log output (e.g., "meal")
  fn entity_type() -> &'static str;
}

impl DailyRecord for Meal {
  type Draft = NewMeal;
  type Patch = MealPatch;

  fn id(&self) -> Uuid {
    self.id
  }

  fn user_id(&self) -> Uuid {
    self.user_id
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn table() -> Table {
    Table::Meals
  }

  fn entity_type() -> &'static str {
    "meal"
  }
}

impl DailyRecord for HydrationLog {
  type Draft = NewWaterLog;
  type Patch = WaterLogPatch;

  fn id(&self) -> Uuid {
    self.id
  }

  fn user_id(&self) -> Uuid {
    self.user_id
  }

  fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  fn table() -> Table {
    Table::WaterLogs
  }

  fn entity_type() -> &'static str {
    "water_log"
  }
}
