//! SQLite backend with a polled change feed and a directory image bucket.
//!
//! Triggers append every row change to `change_log`, whichever connection
//! or process made it. Once a reader subscribes, a background task polls
//! that log and publishes new entries through a [`ChangeHub`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
  ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, ImageStore, ProfileStore, RecordRepository,
};
use crate::models::{
  HydrationLog, Meal, MealPatch, NewMeal, NewWaterLog, ProfileUpdate, Table, UserProfile,
  WaterLogPatch,
};

/// How often the change log is checked for new entries
const CHANGE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Change log entries older than this are dropped when a database is opened
const CHANGE_LOG_RETENTION: &str = "-1 day";

/// Backend storing rows in a local SQLite database.
pub struct LocalBackend {
  conn: Arc<Mutex<Connection>>,
  images_dir: PathBuf,
  hub: Arc<ChangeHub>,
  poller: Mutex<Option<JoinHandle<()>>>,
}

impl LocalBackend {
  /// Open the database and image directory, defaulting to the data directory.
  pub fn open(path: Option<&Path>, images_dir: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => default_dir()?.join("nutrilog.db"),
    };
    let images_dir = match images_dir {
      Some(p) => absolute(p)?,
      None => default_dir()?.join("meal-images"),
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    debug!(path = %path.display(), "opened local backend");
    Self::with_connection(conn, images_dir)
  }

  /// Database that lives only as long as this value.
  pub fn open_in_memory(images_dir: PathBuf) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn, images_dir)
  }

  fn with_connection(conn: Connection, images_dir: PathBuf) -> Result<Self> {
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;
    let backend = Self {
      conn: Arc::new(Mutex::new(conn)),
      images_dir,
      hub: Arc::new(ChangeHub::new()),
      poller: Mutex::new(None),
    };
    backend.run_migrations()?;
    Ok(backend)
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    lock(&self.conn)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    conn
      .execute(
        "DELETE FROM change_log WHERE changed_at < datetime('now', ?1)",
        params![CHANGE_LOG_RETENTION],
      )
      .map_err(|e| eyre!("Failed to prune change log: {}", e))?;
    Ok(())
  }

  /// Start polling the change log unless a poller is already running.
  ///
  /// Only entries written after this call are published.
  fn ensure_poller(&self) -> Result<()> {
    let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
    if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return Ok(());
    }

    let cursor = latest_change(&*self.conn()?)?;
    debug!(cursor, "starting change log poller");
    *poller = Some(spawn_change_poller(self.conn.clone(), self.hub.clone(), cursor));
    Ok(())
  }

  // ==========================================================================
  // Meals
  // ==========================================================================

  fn meals_between(&self, user_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Meal>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals
         WHERE user_id = ?1 AND created_at >= ?2 AND created_at <= ?3
         ORDER BY created_at DESC"
      ))
      .map_err(|e| eyre!("Failed to prepare meal query: {}", e))?;

    let meals = stmt
      .query_map(
        params![user_id.to_string(), timestamp(start), timestamp(end)],
        meal_from_row,
      )
      .map_err(|e| eyre!("Failed to query meals: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read meal row: {}", e))?;

    Ok(meals)
  }

  fn meal_by_id(conn: &Connection, id: Uuid) -> Result<Option<Meal>> {
    conn
      .query_row(
        &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
        params![id.to_string()],
        meal_from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to load meal {}: {}", id, e))
  }

  fn write_meal(conn: &Connection, meal: &Meal) -> Result<()> {
    conn
      .execute(
        "INSERT INTO meals
         (id, user_id, calories, protein, carbs, fat, image_url, source, ai_model,
          description, meal_description, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
          meal.id.to_string(),
          meal.user_id.to_string(),
          meal.calories,
          meal.protein,
          meal.carbs,
          meal.fat,
          meal.image_url,
          enum_text(&meal.source)?,
          meal.ai_model,
          meal.description,
          meal.meal_description,
          meal.confidence.map(|c| c.as_str()),
          timestamp(meal.created_at),
        ],
      )
      .map_err(|e| eyre!("Failed to store meal: {}", e))?;
    Ok(())
  }

  fn insert_meal(&self, user_id: Uuid, draft: &NewMeal) -> Result<Meal> {
    let meal = Meal {
      id: Uuid::new_v4(),
      user_id,
      calories: draft.calories,
      protein: draft.protein,
      carbs: draft.carbs,
      fat: draft.fat,
      image_url: draft.image_url.clone(),
      source: draft.source,
      ai_model: draft.ai_model.clone(),
      description: draft.description.clone(),
      meal_description: draft.meal_description.clone(),
      confidence: draft.confidence,
      created_at: draft.created_at.unwrap_or_else(Utc::now),
    };
    Self::write_meal(&*self.conn()?, &meal)?;
    Ok(meal)
  }

  fn update_meal(&self, id: Uuid, patch: &MealPatch) -> Result<Meal> {
    let meal = {
      let conn = self.conn()?;
      let mut meal = Self::meal_by_id(&conn, id)?.ok_or_else(|| eyre!("No meal with id {}", id))?;
      if let Some(v) = patch.calories {
        meal.calories = v;
      }
      if let Some(v) = patch.protein {
        meal.protein = v;
      }
      if let Some(v) = patch.carbs {
        meal.carbs = v;
      }
      if let Some(v) = patch.fat {
        meal.fat = v;
      }
      if let Some(v) = &patch.description {
        meal.description = Some(v.clone());
      }
      conn
        .execute(
          "UPDATE meals SET calories = ?2, protein = ?3, carbs = ?4, fat = ?5, description = ?6
           WHERE id = ?1",
          params![
            id.to_string(),
            meal.calories,
            meal.protein,
            meal.carbs,
            meal.fat,
            meal.description,
          ],
        )
        .map_err(|e| eyre!("Failed to update meal {}: {}", id, e))?;
      meal
    };
    Ok(meal)
  }

  fn delete_row(&self, table: Table, id: Uuid) -> Result<()> {
    let deleted = self
      .conn()?
      .execute(
        &format!("DELETE FROM {} WHERE id = ?1", table.name()),
        params![id.to_string()],
      )
      .map_err(|e| eyre!("Failed to delete {} row {}: {}", table.name(), id, e))?;
    if deleted == 0 {
      return Err(eyre!("No {} row with id {}", table.name(), id));
    }
    Ok(())
  }

  // ==========================================================================
  // Water logs
  // ==========================================================================

  fn water_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<HydrationLog>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, user_id, amount_ml, created_at FROM water_logs
         WHERE user_id = ?1 AND created_at >= ?2 AND created_at <= ?3
         ORDER BY created_at DESC",
      )
      .map_err(|e| eyre!("Failed to prepare water log query: {}", e))?;

    let logs = stmt
      .query_map(
        params![user_id.to_string(), timestamp(start), timestamp(end)],
        water_from_row,
      )
      .map_err(|e| eyre!("Failed to query water logs: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read water log row: {}", e))?;

    Ok(logs)
  }

  fn write_water(conn: &Connection, log: &HydrationLog) -> Result<()> {
    conn
      .execute(
        "INSERT INTO water_logs (id, user_id, amount_ml, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
          log.id.to_string(),
          log.user_id.to_string(),
          log.amount_ml,
          timestamp(log.created_at),
        ],
      )
      .map_err(|e| eyre!("Failed to store water log: {}", e))?;
    Ok(())
  }

  fn insert_water(&self, user_id: Uuid, draft: &NewWaterLog) -> Result<HydrationLog> {
    let log = HydrationLog {
      id: Uuid::new_v4(),
      user_id,
      amount_ml: draft.amount_ml,
      created_at: draft.created_at.unwrap_or_else(Utc::now),
    };
    Self::write_water(&*self.conn()?, &log)?;
    Ok(log)
  }

  fn update_water(&self, id: Uuid, patch: &WaterLogPatch) -> Result<HydrationLog> {
    let log = {
      let conn = self.conn()?;
      let mut log = conn
        .query_row(
          "SELECT id, user_id, amount_ml, created_at FROM water_logs WHERE id = ?1",
          params![id.to_string()],
          water_from_row,
        )
        .optional()
        .map_err(|e| eyre!("Failed to load water log {}: {}", id, e))?
        .ok_or_else(|| eyre!("No water log with id {}", id))?;
      if let Some(amount) = patch.amount_ml {
        log.amount_ml = amount;
      }
      conn
        .execute(
          "UPDATE water_logs SET amount_ml = ?2 WHERE id = ?1",
          params![id.to_string(), log.amount_ml],
        )
        .map_err(|e| eyre!("Failed to update water log {}: {}", id, e))?;
      log
    };
    Ok(log)
  }

  // ==========================================================================
  // User settings
  // ==========================================================================

  fn profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    let conn = self.conn()?;
    let json: Option<String> = conn
      .query_row(
        "SELECT data FROM user_settings WHERE user_id = ?1",
        params![user_id.to_string()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load settings for {}: {}", user_id, e))?;

    json
      .map(|data| {
        serde_json::from_str(&data).map_err(|e| eyre!("Failed to parse settings: {}", e))
      })
      .transpose()
  }

  /// Insert or update the settings row; `exists` picks the statement so
  /// the change log records the right kind.
  fn write_profile(&self, profile: &UserProfile, exists: bool) -> Result<()> {
    let data =
      serde_json::to_string(profile).map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
    let sql = if exists {
      "UPDATE user_settings SET data = ?2 WHERE user_id = ?1"
    } else {
      "INSERT INTO user_settings (user_id, data) VALUES (?1, ?2)"
    };
    self
      .conn()?
      .execute(sql, params![profile.user_id.to_string(), data])
      .map_err(|e| eyre!("Failed to store settings: {}", e))?;
    Ok(())
  }

  fn image_path(&self, path: &str) -> Result<PathBuf> {
    if path.split('/').any(|part| part == ".." || part.is_empty()) {
      return Err(eyre!("Invalid image path: {}", path));
    }
    Ok(self.images_dir.join(path))
  }
}

/// Schema for the local tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meals (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    calories INTEGER NOT NULL,
    protein REAL NOT NULL,
    carbs REAL NOT NULL,
    fat REAL NOT NULL,
    image_url TEXT,
    source TEXT NOT NULL,
    ai_model TEXT,
    description TEXT,
    meal_description TEXT,
    confidence TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_meals_user_created ON meals(user_id, created_at);

CREATE TABLE IF NOT EXISTS water_logs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount_ml INTEGER NOT NULL CHECK (amount_ml > 0),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_water_logs_user_created ON water_logs(user_id, created_at);

-- One settings document per user
CREATE TABLE IF NOT EXISTS user_settings (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

-- Row changes from every connection, read by the change poller
CREATE TABLE IF NOT EXISTS change_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    user_id TEXT NOT NULL,
    record_id TEXT,
    changed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TRIGGER IF NOT EXISTS meals_inserted AFTER INSERT ON meals BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('meals', 'insert', NEW.user_id, NEW.id);
END;

CREATE TRIGGER IF NOT EXISTS meals_updated AFTER UPDATE ON meals BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('meals', 'update', NEW.user_id, NEW.id);
END;

CREATE TRIGGER IF NOT EXISTS meals_deleted AFTER DELETE ON meals BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('meals', 'delete', OLD.user_id, OLD.id);
END;

CREATE TRIGGER IF NOT EXISTS water_logs_inserted AFTER INSERT ON water_logs BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('water_logs', 'insert', NEW.user_id, NEW.id);
END;

CREATE TRIGGER IF NOT EXISTS water_logs_updated AFTER UPDATE ON water_logs BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('water_logs', 'update', NEW.user_id, NEW.id);
END;

CREATE TRIGGER IF NOT EXISTS water_logs_deleted AFTER DELETE ON water_logs BEGIN
    INSERT INTO change_log (table_name, kind, user_id, record_id)
    VALUES ('water_logs', 'delete', OLD.user_id, OLD.id);
END;

CREATE TRIGGER IF NOT EXISTS user_settings_inserted AFTER INSERT ON user_settings BEGIN
    INSERT INTO change_log (table_name, kind, user_id) VALUES ('user_settings', 'insert', NEW.user_id);
END;

CREATE TRIGGER IF NOT EXISTS user_settings_updated AFTER UPDATE ON user_settings BEGIN
    INSERT INTO change_log (table_name, kind, user_id) VALUES ('user_settings', 'update', NEW.user_id);
END;
"#;

const MEAL_COLUMNS: &str = "id, user_id, calories, protein, carbs, fat, image_url, source, \
  ai_model, description, meal_description, confidence, created_at";

/// Fixed-width UTC timestamp so text comparison matches time order.
fn timestamp(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
  let s: String = row.get(idx)?;
  Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let s: String = row.get(idx)?;
  DateTime::parse_from_rfc3339(&s)
    .map(|t| t.with_timezone(&Utc))
    .map_err(|e| conversion_error(idx, e))
}

fn enum_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
  let s: String = row.get(idx)?;
  serde_json::from_value(serde_json::Value::String(s)).map_err(|e| conversion_error(idx, e))
}

fn enum_text<T: Serialize>(value: &T) -> Result<String> {
  match serde_json::to_value(value) {
    Ok(serde_json::Value::String(s)) => Ok(s),
    Ok(other) => Err(eyre!("Expected a string enum, got {}", other)),
    Err(e) => Err(eyre!("Failed to serialize enum: {}", e)),
  }
}

fn meal_from_row(row: &Row<'_>) -> rusqlite::Result<Meal> {
  let confidence: Option<String> = row.get(11)?;
  let confidence = confidence
    .map(|s| serde_json::from_value(serde_json::Value::String(s)))
    .transpose()
    .map_err(|e| conversion_error(11, e))?;

  Ok(Meal {
    id: uuid_col(row, 0)?,
    user_id: uuid_col(row, 1)?,
    calories: row.get(2)?,
    protein: row.get(3)?,
    carbs: row.get(4)?,
    fat: row.get(5)?,
    image_url: row.get(6)?,
    source: enum_col(row, 7)?,
    ai_model: row.get(8)?,
    description: row.get(9)?,
    meal_description: row.get(10)?,
    confidence,
    created_at: time_col(row, 12)?,
  })
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, ChangeEvent)> {
  let table: String = row.get(1)?;
  let kind: String = row.get(2)?;
  let record_id: Option<String> = row.get(4)?;

  let event = ChangeEvent {
    kind: match kind.as_str() {
      "insert" => ChangeKind::Insert,
      "update" => ChangeKind::Update,
      "delete" => ChangeKind::Delete,
      other => return Err(unknown_value(2, "change kind", other)),
    },
    table: Table::from_name(&table).ok_or_else(|| unknown_value(1, "table", &table))?,
    user_id: uuid_col(row, 3)?,
    record_id: record_id
      .map(|id| Uuid::parse_str(&id))
      .transpose()
      .map_err(|e| conversion_error(4, e))?,
  };
  Ok((row.get(0)?, event))
}

fn unknown_value(idx: usize, what: &str, value: &str) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(
    idx,
    Type::Text,
    format!("unknown {} '{}'", what, value).into(),
  )
}

fn water_from_row(row: &Row<'_>) -> rusqlite::Result<HydrationLog> {
  Ok(HydrationLog {
    id: uuid_col(row, 0)?,
    user_id: uuid_col(row, 1)?,
    amount_ml: row.get(2)?,
    created_at: time_col(row, 3)?,
  })
}

// ============================================================================
// Change log
// ============================================================================

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
  conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
}

/// Sequence number of the newest change log entry, 0 when empty.
fn latest_change(conn: &Connection) -> Result<i64> {
  conn
    .query_row("SELECT COALESCE(MAX(seq), 0) FROM change_log", [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to read change log: {}", e))
}

/// Entries after `cursor`, oldest first.
fn changes_after(conn: &Connection, cursor: i64) -> Result<Vec<(i64, ChangeEvent)>> {
  let mut stmt = conn
    .prepare_cached(
      "SELECT seq, table_name, kind, user_id, record_id FROM change_log
       WHERE seq > ?1 ORDER BY seq",
    )
    .map_err(|e| eyre!("Failed to prepare change log query: {}", e))?;

  let changes = stmt
    .query_map(params![cursor], change_from_row)
    .map_err(|e| eyre!("Failed to query change log: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read change log row: {}", e))?;
  Ok(changes)
}

fn spawn_change_poller(
  conn: Arc<Mutex<Connection>>,
  hub: Arc<ChangeHub>,
  mut cursor: i64,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(CHANGE_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let changes = match lock(&conn).and_then(|conn| changes_after(&conn, cursor)) {
        Ok(changes) => changes,
        Err(e) => {
          warn!(error = %e, "change log poll failed");
          continue;
        }
      };
      for (seq, event) in changes {
        debug!(seq, table = event.table.name(), kind = ?event.kind, "change logged");
        hub.publish(event);
        cursor = seq;
      }
    }
  })
}

fn default_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("nutrilog"))
}

fn absolute(path: &Path) -> Result<PathBuf> {
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  let cwd = std::env::current_dir().map_err(|e| eyre!("Failed to read current directory: {}", e))?;
  Ok(cwd.join(path))
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl RecordRepository<Meal> for LocalBackend {
  async fn list_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<Meal>> {
    self.meals_between(user_id, start, end)
  }

  async fn insert(&self, user_id: Uuid, draft: &NewMeal) -> Result<Meal> {
    self.insert_meal(user_id, draft)
  }

  async fn update(&self, id: Uuid, patch: &MealPatch) -> Result<Meal> {
    self.update_meal(id, patch)
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    self.delete_row(Table::Meals, id)
  }
}

#[async_trait]
impl RecordRepository<HydrationLog> for LocalBackend {
  async fn list_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<HydrationLog>> {
    self.water_between(user_id, start, end)
  }

  async fn insert(&self, user_id: Uuid, draft: &NewWaterLog) -> Result<HydrationLog> {
    self.insert_water(user_id, draft)
  }

  async fn update(&self, id: Uuid, patch: &WaterLogPatch) -> Result<HydrationLog> {
    self.update_water(id, patch)
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    self.delete_row(Table::WaterLogs, id)
  }
}

#[async_trait]
impl ProfileStore for LocalBackend {
  async fn fetch(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    self.profile(user_id)
  }

  async fn insert(&self, profile: &UserProfile) -> Result<UserProfile> {
    if self.profile(profile.user_id)?.is_some() {
      return Err(eyre!("Settings for {} already exist", profile.user_id));
    }
    self.write_profile(profile, false)?;
    Ok(profile.clone())
  }

  async fn update(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<UserProfile> {
    let mut profile = self
      .profile(user_id)?
      .ok_or_else(|| eyre!("No settings for user {}", user_id))?;
    profile.apply(update);
    self.write_profile(&profile, true)?;
    Ok(profile)
  }
}

#[async_trait]
impl ImageStore for LocalBackend {
  async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
    let target = self.image_path(path)?;
    if target.exists() {
      return Err(eyre!("Image already exists: {}", path));
    }
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| eyre!("Failed to create image directory: {}", e))?;
    }
    tokio::fs::write(&target, bytes)
      .await
      .map_err(|e| eyre!("Failed to write image {}: {}", target.display(), e))?;
    Ok(path.to_string())
  }

  fn public_url(&self, path: &str) -> Result<String> {
    let target = self.image_path(path)?;
    url::Url::from_file_path(&target)
      .map(String::from)
      .map_err(|_| eyre!("Image path is not absolute: {}", target.display()))
  }

  async fn delete(&self, path: &str) -> Result<()> {
    let target = self.image_path(path)?;
    tokio::fs::remove_file(&target)
      .await
      .map_err(|e| eyre!("Failed to delete image {}: {}", target.display(), e))
  }
}

#[async_trait]
impl ChangeFeed for LocalBackend {
  async fn subscribe(
    &self,
    table: Table,
    user_id: Uuid,
  ) -> Result<broadcast::Receiver<ChangeEvent>> {
    let events = self.hub.subscribe(table, user_id).await?;
    self.ensure_poller()?;
    Ok(events)
  }
}

impl Drop for LocalBackend {
  fn drop(&mut self) {
    if let Some(handle) = self
      .poller
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      handle.abort();
    }
  }
}
