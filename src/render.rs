//! Plain-text views printed by the commands.

use chrono::Local;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::analysis::AnalysisResponse;
use crate::day::DayKey;
use crate::hooks::{DailySummary, WeeklySummary};
use crate::models::{HydrationLog, Meal, MealTime, UserProfile};

/// Width of the longest chart bar
const BAR_WIDTH: usize = 30;

/// Bar of `#` proportional to `value / max`.
fn bar(value: u64, max: u64, width: usize) -> String {
  if max == 0 || value == 0 {
    return String::new();
  }
  let filled = ((value as f64 / max as f64) * width as f64).round() as usize;
  "#".repeat(filled.clamp(1, width))
}

fn progress(label: &str, value: f64, target: u32, unit: &str) -> String {
  let percent = if target == 0 {
    0.0
  } else {
    value / f64::from(target) * 100.0
  };
  format!(
    "{:<9} {:>6.0} / {:<5} {:<4} {:>3.0}%",
    label, value, target, unit, percent
  )
}

pub fn day(
  day: DayKey,
  summary: &DailySummary,
  meals: &[Meal],
  water: &[HydrationLog],
  profile: Option<&UserProfile>,
) -> String {
  let mut out = String::new();

  let _ = writeln!(out, "{} {}", day.date().format("%A"), day);
  match profile {
    Some(profile) => {
      let _ = writeln!(
        out,
        "{}  ({})",
        progress("Calories", summary.total_calories as f64, profile.calorie_target(), "kcal"),
        profile.goal_mode.label()
      );
      let _ = writeln!(out, "{}", progress("Protein", summary.protein, profile.protein_target, "g"));
      let _ = writeln!(out, "{}", progress("Carbs", summary.carbs, profile.carbs_target, "g"));
      let _ = writeln!(out, "{}", progress("Fat", summary.fat, profile.fat_target, "g"));
      let _ = writeln!(
        out,
        "{}",
        progress("Water", summary.total_water as f64, profile.water_target_ml, "ml")
      );
    }
    None => {
      let _ = writeln!(
        out,
        "{} kcal  P {:.0}g  C {:.0}g  F {:.0}g  Water {} ml",
        summary.total_calories, summary.protein, summary.carbs, summary.fat, summary.total_water
      );
    }
  }

  if meals.is_empty() {
    let _ = writeln!(out, "\nNo meals logged.");
  }

  let mut by_time: BTreeMap<MealTime, Vec<&Meal>> = BTreeMap::new();
  for meal in meals {
    by_time.entry(meal.meal_time()).or_default().push(meal);
  }
  for (time, group) in by_time {
    let _ = writeln!(out, "\n{}", time.label());
    for meal in group.iter().rev() {
      let _ = writeln!(
        out,
        "  {}  {:>5} kcal  P {:>3.0}g C {:>3.0}g F {:>3.0}g  {}  [{}]",
        meal.created_at.with_timezone(&Local).format("%H:%M"),
        meal.calories,
        meal.protein,
        meal.carbs,
        meal.fat,
        meal.title(),
        meal.id
      );
    }
  }

  if !water.is_empty() {
    let _ = writeln!(out, "\nWater");
    for log in water.iter().rev() {
      let _ = writeln!(
        out,
        "  {}  {:>5} ml  [{}]",
        log.created_at.with_timezone(&Local).format("%H:%M"),
        log.amount_ml,
        log.id
      );
    }
  }

  out
}

fn chart(out: &mut String, title: &str, summary: &WeeklySummary, unit: &str) {
  let _ = writeln!(out, "{}", title);
  let max = summary.max();
  for slot in &summary.days {
    let _ = writeln!(
      out,
      "{} {}{} {:>6} {:<4} {}",
      slot.label,
      slot.day,
      if slot.is_today { "*" } else { " " },
      slot.total,
      unit,
      bar(slot.total, max, BAR_WIDTH)
    );
  }
}

pub fn week(calories: &WeeklySummary, water: &WeeklySummary, profile: Option<&UserProfile>) -> String {
  let mut out = String::new();
  chart(&mut out, "Calories", calories, "kcal");
  let days = calories.days.len().max(1) as u64;
  let _ = write!(out, "Average {} kcal/day", calories.total() / days);
  match profile {
    Some(profile) => {
      let _ = writeln!(out, " (target {})", profile.calorie_target());
    }
    None => out.push('\n'),
  }

  out.push('\n');
  chart(&mut out, "Water", water, "ml");
  out
}

pub fn profile(profile: &UserProfile) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "Goal            {}", profile.goal_mode.label());
  let _ = writeln!(
    out,
    "Calories        {} kcal (maintenance {})",
    profile.calorie_target(),
    profile.maintenance_calories
  );
  let _ = writeln!(out, "Protein         {} g", profile.protein_target);
  let _ = writeln!(out, "Carbs           {} g", profile.carbs_target);
  let _ = writeln!(out, "Fat             {} g", profile.fat_target);
  let _ = writeln!(out, "Water           {} ml", profile.water_target_ml);
  if let Some(height) = profile.height_cm {
    let _ = writeln!(out, "Height          {:.0} cm", height);
  }
  if let Some(weight) = profile.weight_kg {
    let _ = writeln!(out, "Weight          {:.1} kg", weight);
  }
  if let Some(age) = profile.age {
    let _ = writeln!(out, "Age             {}", age);
  }
  if let Some(sex) = profile.sex {
    let _ = writeln!(out, "Sex             {:?}", sex);
  }
  if let Some(activity) = profile.activity_level {
    let _ = writeln!(out, "Activity        {:?}", activity);
  }
  out
}

pub fn analysis(analysis: &AnalysisResponse) -> String {
  let mut out = String::new();
  if let Some(description) = &analysis.meal_description {
    let _ = writeln!(out, "{}", description);
  }
  let _ = writeln!(
    out,
    "{} kcal  P {:.0}g  C {:.0}g  F {:.0}g  ({} confidence)",
    analysis.calories,
    analysis.protein,
    analysis.carbs,
    analysis.fat,
    analysis.confidence.as_str()
  );
  if let Some(model) = &analysis.ai_model_used {
    let _ = writeln!(out, "Estimated by {}", model);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::DayCache;
  use crate::models::{Confidence, MealSource};
  use chrono::Utc;
  use uuid::Uuid;

  fn meal(calories: u32, description: &str) -> Meal {
    Meal {
      id: Uuid::new_v4(),
      user_id: Uuid::nil(),
      calories,
      protein: 20.0,
      carbs: 30.0,
      fat: 10.0,
      image_url: None,
      source: MealSource::Manual,
      ai_model: None,
      description: Some(description.into()),
      meal_description: None,
      confidence: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn test_bar_scales_to_max() {
    assert_eq!(bar(0, 100, 10), "");
    assert_eq!(bar(100, 100, 10), "##########");
    assert_eq!(bar(50, 100, 10), "#####");
    assert_eq!(bar(1, 1000, 10), "#");
  }

  #[test]
  fn test_day_lists_meals_and_targets() {
    let profile = UserProfile::with_defaults(Uuid::nil());
    let day_key: DayKey = "2024-01-10".parse().unwrap();

    let meals = [meal(500, "Oatmeal"), meal(700, "Curry")];
    let summary = DailySummary::from_meals(&meals);

    let out = day(day_key, &summary, &meals, &[], Some(&profile));

    assert!(out.starts_with("Wednesday 2024-01-10"));
    assert!(out.contains("1200 / 2000"));
    assert!(out.contains("Oatmeal"));
    assert!(out.contains("Curry"));
    assert!(!out.contains("No meals logged"));
  }

  #[test]
  fn test_empty_day() {
    let out = day("2024-01-10".parse().unwrap(), &DailySummary::default(), &[], &[], None);
    assert!(out.contains("0 kcal"));
    assert!(out.contains("No meals logged."));
  }

  #[test]
  fn test_week_marks_today() {
    let today: DayKey = "2024-01-10".parse().unwrap();
    let cache = DayCache::new();
    cache.set(today, vec![meal(900, "Dinner")]);
    let calories = WeeklySummary::from_cache(&cache, today, 7, |m: &Meal| u64::from(m.calories));
    let water = WeeklySummary::from_cache(&DayCache::<HydrationLog>::new(), today, 5, |l| {
      u64::from(l.amount_ml)
    });

    let out = week(&calories, &water, None);

    assert!(out.contains("W 2024-01-10*    900 kcal"));
    assert!(out.contains("Average 128 kcal/day"));
  }

  #[test]
  fn test_analysis_output() {
    let response = AnalysisResponse {
      calories: 640,
      protein: 35.0,
      carbs: 70.0,
      fat: 20.0,
      confidence: Confidence::Low,
      meal_description: Some("Pasta".into()),
      ai_model_used: None,
    };

    let out = analysis(&response);

    assert!(out.starts_with("Pasta\n"));
    assert!(out.contains("640 kcal"));
    assert!(out.contains("low confidence"));
  }
}
