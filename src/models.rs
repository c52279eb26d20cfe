//! Domain types for meals, water logs and user settings.
//!
//! Field names match the backend rows so the same types serialize for both
//! the SQLite backend and the hosted REST API.

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_MAINTENANCE_CALORIES: u32 = 2000;
pub const DEFAULT_PROTEIN_TARGET: u32 = 150;
pub const DEFAULT_CARBS_TARGET: u32 = 200;
pub const DEFAULT_FAT_TARGET: u32 = 60;
pub const DEFAULT_WATER_TARGET_ML: u32 = 3000;

/// Quick-add water amounts in ml
pub const SMALL_CUP_ML: u32 = 250;
pub const LARGE_CUP_ML: u32 = 500;

/// Minimum length of a description sent for text-only analysis
pub const MIN_DESCRIPTION_LEN: usize = 10;

// ============================================================================
// Tables
// ============================================================================

/// Backend tables that readers and the change feed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Meals,
  WaterLogs,
  UserSettings,
}

impl Table {
  pub fn name(self) -> &'static str {
    match self {
      Table::Meals => "meals",
      Table::WaterLogs => "water_logs",
      Table::UserSettings => "user_settings",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    [Table::Meals, Table::WaterLogs, Table::UserSettings]
      .into_iter()
      .find(|table| table.name() == name)
  }
}

// ============================================================================
// Validation
// ============================================================================

/// Input rejected before any backend call.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
  #[error("{field} must be a non-negative number")]
  NegativeAmount { field: &'static str },
  #[error("{field} must be a finite number")]
  NotFinite { field: &'static str },
  #[error("water amount must be greater than zero")]
  EmptyWaterAmount,
  #[error("description must be at least {min} characters")]
  DescriptionTooShort { min: usize },
  #[error("nothing to update")]
  EmptyPatch,
}

fn check_macro(field: &'static str, value: f64) -> Result<(), ValidationError> {
  if !value.is_finite() {
    return Err(ValidationError::NotFinite { field });
  }
  if value < 0.0 {
    return Err(ValidationError::NegativeAmount { field });
  }
  Ok(())
}

// ============================================================================
// Meals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSource {
  Ai,
  Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

impl Confidence {
  pub fn as_str(self) -> &'static str {
    match self {
      Confidence::Low => "low",
      Confidence::Medium => "medium",
      Confidence::High => "high",
    }
  }
}

/// A logged meal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
  pub id: Uuid,
  pub user_id: Uuid,
  pub calories: u32,
  pub protein: f64,
  pub carbs: f64,
  pub fat: f64,
  #[serde(default)]
  pub image_url: Option<String>,
  pub source: MealSource,
  #[serde(default)]
  pub ai_model: Option<String>,
  /// User-entered description
  #[serde(default)]
  pub description: Option<String>,
  /// Description generated by the analyzer
  #[serde(default)]
  pub meal_description: Option<String>,
  #[serde(default)]
  pub confidence: Option<Confidence>,
  pub created_at: DateTime<Utc>,
}

impl Meal {
  /// Best label for listings: the user's text, then the generated one.
  pub fn title(&self) -> &str {
    self
      .description
      .as_deref()
      .or(self.meal_description.as_deref())
      .unwrap_or("(no description)")
  }

  pub fn meal_time(&self) -> MealTime {
    MealTime::of_hour(self.created_at.with_timezone(&Local).hour())
  }
}

/// Fields for a new meal. `created_at` backfills a past day when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeal {
  pub calories: u32,
  pub protein: f64,
  pub carbs: f64,
  pub fat: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  pub source: MealSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ai_model: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meal_description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<Confidence>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

impl NewMeal {
  /// A manually entered meal
  pub fn manual(calories: u32, protein: f64, carbs: f64, fat: f64) -> Self {
    Self {
      calories,
      protein,
      carbs,
      fat,
      image_url: None,
      source: MealSource::Manual,
      ai_model: None,
      description: None,
      meal_description: None,
      confidence: None,
      created_at: None,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    let description = description.into();
    if !description.trim().is_empty() {
      self.description = Some(description.trim().to_string());
    }
    self
  }

  pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
    self.created_at = Some(created_at);
    self
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    check_macro("protein", self.protein)?;
    check_macro("carbs", self.carbs)?;
    check_macro("fat", self.fat)
  }
}

/// Partial update for a meal. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub calories: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub protein: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub carbs: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fat: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl MealPatch {
  pub fn is_empty(&self) -> bool {
    self == &MealPatch::default()
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.is_empty() {
      return Err(ValidationError::EmptyPatch);
    }
    for (field, value) in [
      ("protein", self.protein),
      ("carbs", self.carbs),
      ("fat", self.fat),
    ] {
      if let Some(value) = value {
        check_macro(field, value)?;
      }
    }
    Ok(())
  }
}

/// Meal-time buckets by local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MealTime {
  Breakfast,
  Lunch,
  Snack,
  Dinner,
  LateNight,
}

impl MealTime {
  pub fn of_hour(hour: u32) -> Self {
    match hour {
      5..=10 => MealTime::Breakfast,
      11..=15 => MealTime::Lunch,
      16..=17 => MealTime::Snack,
      18..=22 => MealTime::Dinner,
      _ => MealTime::LateNight,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      MealTime::Breakfast => "Breakfast",
      MealTime::Lunch => "Lunch",
      MealTime::Snack => "Snack",
      MealTime::Dinner => "Dinner",
      MealTime::LateNight => "Late night",
    }
  }
}

// ============================================================================
// Hydration
// ============================================================================

/// A single water intake entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationLog {
  pub id: Uuid,
  pub user_id: Uuid,
  pub amount_ml: u32,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWaterLog {
  pub amount_ml: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

impl NewWaterLog {
  pub fn new(amount_ml: u32) -> Result<Self, ValidationError> {
    if amount_ml == 0 {
      return Err(ValidationError::EmptyWaterAmount);
    }
    Ok(Self {
      amount_ml,
      created_at: None,
    })
  }

  pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
    self.created_at = Some(created_at);
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterLogPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub amount_ml: Option<u32>,
}

// ============================================================================
// User settings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GoalMode {
  Cut,
  #[default]
  Maintain,
  Gain,
}

impl GoalMode {
  /// Share of maintenance calories to eat in this mode
  pub fn calorie_multiplier(self) -> f64 {
    match self {
      GoalMode::Cut => 0.85,
      GoalMode::Maintain => 1.0,
      GoalMode::Gain => 1.15,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      GoalMode::Cut => "Cutting",
      GoalMode::Maintain => "Maintaining",
      GoalMode::Gain => "Gaining",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
  Sedentary,
  Light,
  Moderate,
  Active,
  SuperActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
  Male,
  Female,
}

/// Per-user targets and physical attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id: Uuid,
  pub maintenance_calories: u32,
  pub protein_target: u32,
  pub carbs_target: u32,
  pub fat_target: u32,
  pub water_target_ml: u32,
  pub goal_mode: GoalMode,
  #[serde(default)]
  pub height_cm: Option<f64>,
  #[serde(default)]
  pub weight_kg: Option<f64>,
  #[serde(default)]
  pub age: Option<u32>,
  #[serde(default)]
  pub sex: Option<Sex>,
  #[serde(default)]
  pub activity_level: Option<ActivityLevel>,
  pub created_at: DateTime<Utc>,
}

impl UserProfile {
  /// Profile created on first access
  pub fn with_defaults(user_id: Uuid) -> Self {
    Self {
      user_id,
      maintenance_calories: DEFAULT_MAINTENANCE_CALORIES,
      protein_target: DEFAULT_PROTEIN_TARGET,
      carbs_target: DEFAULT_CARBS_TARGET,
      fat_target: DEFAULT_FAT_TARGET,
      water_target_ml: DEFAULT_WATER_TARGET_ML,
      goal_mode: GoalMode::default(),
      height_cm: None,
      weight_kg: None,
      age: None,
      sex: None,
      activity_level: None,
      created_at: Utc::now(),
    }
  }

  /// Daily calorie target after the goal-mode adjustment.
  pub fn calorie_target(&self) -> u32 {
    (self.maintenance_calories as f64 * self.goal_mode.calorie_multiplier()).round() as u32
  }

  pub fn apply(&mut self, update: &ProfileUpdate) {
    if let Some(v) = update.maintenance_calories {
      self.maintenance_calories = v;
    }
    if let Some(v) = update.protein_target {
      self.protein_target = v;
    }
    if let Some(v) = update.carbs_target {
      self.carbs_target = v;
    }
    if let Some(v) = update.fat_target {
      self.fat_target = v;
    }
    if let Some(v) = update.water_target_ml {
      self.water_target_ml = v;
    }
    if let Some(v) = update.goal_mode {
      self.goal_mode = v;
    }
    if update.height_cm.is_some() {
      self.height_cm = update.height_cm;
    }
    if update.weight_kg.is_some() {
      self.weight_kg = update.weight_kg;
    }
    if update.age.is_some() {
      self.age = update.age;
    }
    if update.sex.is_some() {
      self.sex = update.sex;
    }
    if update.activity_level.is_some() {
      self.activity_level = update.activity_level;
    }
  }
}

/// Settings edit. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub maintenance_calories: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub protein_target: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub carbs_target: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fat_target: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub water_target_ml: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub goal_mode: Option<GoalMode>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub height_cm: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub weight_kg: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub age: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sex: Option<Sex>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activity_level: Option<ActivityLevel>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    self == &ProfileUpdate::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_meal_time_buckets() {
    assert_eq!(MealTime::of_hour(5), MealTime::Breakfast);
    assert_eq!(MealTime::of_hour(10), MealTime::Breakfast);
    assert_eq!(MealTime::of_hour(11), MealTime::Lunch);
    assert_eq!(MealTime::of_hour(16), MealTime::Snack);
    assert_eq!(MealTime::of_hour(18), MealTime::Dinner);
    assert_eq!(MealTime::of_hour(23), MealTime::LateNight);
    assert_eq!(MealTime::of_hour(3), MealTime::LateNight);
  }

  #[test]
  fn test_new_meal_validation() {
    assert!(NewMeal::manual(500, 30.0, 50.0, 10.0).validate().is_ok());
    assert_eq!(
      NewMeal::manual(500, -1.0, 50.0, 10.0).validate(),
      Err(ValidationError::NegativeAmount { field: "protein" })
    );
    assert_eq!(
      NewMeal::manual(500, 1.0, f64::NAN, 10.0).validate(),
      Err(ValidationError::NotFinite { field: "carbs" })
    );
  }

  #[test]
  fn test_empty_patch_rejected() {
    assert_eq!(
      MealPatch::default().validate(),
      Err(ValidationError::EmptyPatch)
    );
    let patch = MealPatch {
      fat: Some(-2.0),
      ..Default::default()
    };
    assert_eq!(
      patch.validate(),
      Err(ValidationError::NegativeAmount { field: "fat" })
    );
  }

  #[test]
  fn test_water_amount_must_be_positive() {
    assert_eq!(NewWaterLog::new(0), Err(ValidationError::EmptyWaterAmount));
    assert_eq!(NewWaterLog::new(250).map(|w| w.amount_ml), Ok(250));
  }

  #[test]
  fn test_calorie_target_follows_goal_mode() {
    let mut profile = UserProfile::with_defaults(Uuid::new_v4());
    assert_eq!(profile.calorie_target(), 2000);

    profile.apply(&ProfileUpdate {
      goal_mode: Some(GoalMode::Cut),
      ..Default::default()
    });
    assert_eq!(profile.calorie_target(), 1700);

    profile.apply(&ProfileUpdate {
      goal_mode: Some(GoalMode::Gain),
      maintenance_calories: Some(2500),
      ..Default::default()
    });
    assert_eq!(profile.calorie_target(), 2875);
    assert_eq!(profile.protein_target, DEFAULT_PROTEIN_TARGET);
  }

  #[test]
  fn test_meal_serializes_lowercase_enums() {
    let json = serde_json::json!({
      "id": "7f1c9c6e-7a3b-4c55-9d1e-2f0a5b6c7d8e",
      "user_id": "0b8f3a4e-1c2d-4e5f-8a9b-0c1d2e3f4a5b",
      "calories": 520,
      "protein": 32.5,
      "carbs": 48.0,
      "fat": 18.25,
      "source": "ai",
      "confidence": "medium",
      "meal_description": "Chicken rice bowl",
      "created_at": "2024-01-10T12:30:00.123456+00:00"
    });
    let meal: Meal = serde_json::from_value(json).unwrap();
    assert_eq!(meal.source, MealSource::Ai);
    assert_eq!(meal.confidence, Some(Confidence::Medium));
    assert_eq!(meal.title(), "Chicken rice bowl");
    assert!(meal.image_url.is_none());
  }
}
