//! Command-line commands

use clap::{Args, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{ActivityLevel, GoalMode, MealPatch, NewMeal, ProfileUpdate, Sex};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// Meals, water and totals for the selected day
  Day,
  /// Calories for the last seven days and water for the hydration window
  Week,
  /// Log, edit or analyze meals
  #[command(subcommand)]
  Meal(MealCommand),
  /// Log or remove water
  #[command(subcommand)]
  Water(WaterCommand),
  /// Show or edit targets
  #[command(subcommand)]
  Profile(ProfileCommand),
  /// Keep the day view open and reprint it whenever data changes
  Watch,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum MealCommand {
  /// Log a meal by hand
  Add(MealArgs),
  /// Change fields of a logged meal
  Update {
    id: Uuid,
    #[command(flatten)]
    fields: MealFields,
  },
  /// Remove a meal
  Delete { id: Uuid },
  /// Estimate macros from a photo or a description
  Analyze {
    /// Photo of the meal (JPEG)
    #[arg(short, long)]
    image: Option<PathBuf>,
    /// What was eaten; required without --image
    #[arg(short, long)]
    description: Option<String>,
    /// Log the estimate as a meal
    #[arg(long)]
    save: bool,
  },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct MealArgs {
  pub calories: u32,
  pub protein: f64,
  pub carbs: f64,
  pub fat: f64,
  /// Free-text description
  #[arg(short, long)]
  pub description: Option<String>,
}

impl MealArgs {
  pub fn to_meal(&self) -> NewMeal {
    let meal = NewMeal::manual(self.calories, self.protein, self.carbs, self.fat);
    match &self.description {
      Some(description) => meal.with_description(description.as_str()),
      None => meal,
    }
  }
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct MealFields {
  #[arg(long)]
  pub calories: Option<u32>,
  #[arg(long)]
  pub protein: Option<f64>,
  #[arg(long)]
  pub carbs: Option<f64>,
  #[arg(long)]
  pub fat: Option<f64>,
  #[arg(long)]
  pub description: Option<String>,
}

impl From<MealFields> for MealPatch {
  fn from(fields: MealFields) -> Self {
    MealPatch {
      calories: fields.calories,
      protein: fields.protein,
      carbs: fields.carbs,
      fat: fields.fat,
      description: fields.description,
    }
  }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum WaterCommand {
  /// Log an amount in ml
  Add { ml: u32 },
  /// Log a small cup (250 ml)
  Small,
  /// Log a large cup (500 ml)
  Large,
  /// Remove a water log
  Delete { id: Uuid },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ProfileCommand {
  /// Print targets and attributes
  Show,
  /// Change targets or attributes
  Set(ProfileArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ProfileArgs {
  #[arg(long)]
  pub maintenance_calories: Option<u32>,
  #[arg(long)]
  pub protein: Option<u32>,
  #[arg(long)]
  pub carbs: Option<u32>,
  #[arg(long)]
  pub fat: Option<u32>,
  #[arg(long)]
  pub water: Option<u32>,
  #[arg(long, value_enum)]
  pub goal: Option<GoalMode>,
  #[arg(long)]
  pub height_cm: Option<f64>,
  #[arg(long)]
  pub weight_kg: Option<f64>,
  #[arg(long)]
  pub age: Option<u32>,
  #[arg(long, value_enum)]
  pub sex: Option<Sex>,
  #[arg(long, value_enum)]
  pub activity: Option<ActivityLevel>,
}

impl From<ProfileArgs> for ProfileUpdate {
  fn from(args: ProfileArgs) -> Self {
    ProfileUpdate {
      maintenance_calories: args.maintenance_calories,
      protein_target: args.protein,
      carbs_target: args.carbs,
      fat_target: args.fat,
      water_target_ml: args.water,
      goal_mode: args.goal,
      height_cm: args.height_cm,
      weight_kg: args.weight_kg,
      age: args.age,
      sex: args.sex,
      activity_level: args.activity,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("nutrilog").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_meal_add_parses_macros() {
    let Command::Meal(MealCommand::Add(args)) =
      parse(&["meal", "add", "520", "30", "45.5", "18", "-d", "Chicken wrap"])
    else {
      panic!("expected meal add");
    };

    let meal = args.to_meal();
    assert_eq!(meal.calories, 520);
    assert_eq!(meal.carbs, 45.5);
    assert_eq!(meal.description.as_deref(), Some("Chicken wrap"));
  }

  #[test]
  fn test_meal_update_builds_partial_patch() {
    let id = Uuid::new_v4().to_string();
    let Command::Meal(MealCommand::Update { fields, .. }) =
      parse(&["meal", "update", &id, "--calories", "480"])
    else {
      panic!("expected meal update");
    };

    let patch = MealPatch::from(fields);
    assert_eq!(patch.calories, Some(480));
    assert_eq!(patch.protein, None);
  }

  #[test]
  fn test_water_commands() {
    assert_eq!(parse(&["water", "add", "330"]), Command::Water(WaterCommand::Add { ml: 330 }));
    assert_eq!(parse(&["water", "small"]), Command::Water(WaterCommand::Small));
  }

  #[test]
  fn test_profile_set_goal() {
    let Command::Profile(ProfileCommand::Set(args)) =
      parse(&["profile", "set", "--goal", "cut", "--activity", "super-active"])
    else {
      panic!("expected profile set");
    };

    let update = ProfileUpdate::from(args);
    assert_eq!(update.goal_mode, Some(GoalMode::Cut));
    assert_eq!(update.activity_level, Some(ActivityLevel::SuperActive));
    assert!(!update.is_empty());
  }

  #[test]
  fn test_bad_uuid_rejected() {
    assert!(Cli::try_parse_from(["nutrilog", "meal", "delete", "not-a-uuid"]).is_err());
  }
}
