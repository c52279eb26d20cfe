//! Aggregates derived from day records.

use crate::cache::DayCache;
use crate::day::DayKey;
use crate::models::{HydrationLog, Meal};

/// Days covered by the weekly calorie chart
pub const WEEK_LEN: usize = 7;

/// Totals for one day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySummary {
  pub total_calories: u64,
  pub protein: f64,
  pub carbs: f64,
  pub fat: f64,
  pub total_water: u64,
  pub meals_count: usize,
}

impl DailySummary {
  pub fn from_meals(meals: &[Meal]) -> Self {
    meals.iter().fold(Self::default(), |mut acc, meal| {
      acc.total_calories += u64::from(meal.calories);
      acc.protein += meal.protein;
      acc.carbs += meal.carbs;
      acc.fat += meal.fat;
      acc.meals_count += 1;
      acc
    })
  }

  /// Attach the day's water total.
  pub fn with_water(mut self, logs: &[HydrationLog]) -> Self {
    self.total_water = total_water(logs);
    self
  }
}

pub fn total_water(logs: &[HydrationLog]) -> u64 {
  logs.iter().map(|log| u64::from(log.amount_ml)).sum()
}

/// One bar of a trailing-window chart
#[derive(Debug, Clone, PartialEq)]
pub struct DaySlot {
  pub day: DayKey,
  pub label: char,
  pub is_today: bool,
  /// Sum for the day, 0 when the day is not cached
  pub total: u64,
}

/// Trailing window of per-day totals, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummary {
  pub days: Vec<DaySlot>,
}

impl WeeklySummary {
  /// Roll up `len` days ending today from whatever is cached.
  ///
  /// Only the cache is read; a day that was never fetched counts as 0.
  pub fn from_cache<R>(cache: &DayCache<R>, today: DayKey, len: usize, value: impl Fn(&R) -> u64) -> Self {
    let days = today
      .trailing(len)
      .into_iter()
      .map(|day| DaySlot {
        day,
        label: day.weekday_letter(),
        is_today: day == today,
        total: cache
          .get(day)
          .map(|records| records.iter().map(&value).sum())
          .unwrap_or(0),
      })
      .collect();
    Self { days }
  }

  pub fn total(&self) -> u64 {
    self.days.iter().map(|slot| slot.total).sum()
  }

  pub fn max(&self) -> u64 {
    self.days.iter().map(|slot| slot.total).max().unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{MealSource, NewMeal};
  use chrono::Utc;
  use uuid::Uuid;

  fn meal(calories: u32, protein: f64) -> Meal {
    let draft = NewMeal::manual(calories, protein, 10.0, 5.0);
    Meal {
      id: Uuid::new_v4(),
      user_id: Uuid::nil(),
      calories: draft.calories,
      protein: draft.protein,
      carbs: draft.carbs,
      fat: draft.fat,
      image_url: None,
      source: MealSource::Manual,
      ai_model: None,
      description: None,
      meal_description: None,
      confidence: None,
      created_at: Utc::now(),
    }
  }

  fn water(ml: u32) -> HydrationLog {
    HydrationLog {
      id: Uuid::new_v4(),
      user_id: Uuid::nil(),
      amount_ml: ml,
      created_at: Utc::now(),
    }
  }

  fn day(s: &str) -> DayKey {
    s.parse().unwrap()
  }

  #[test]
  fn test_daily_summary_sums_every_meal() {
    let summary = DailySummary::from_meals(&[meal(500, 30.0), meal(250, 12.5)])
      .with_water(&[water(250), water(500)]);

    assert_eq!(summary.total_calories, 750);
    assert_eq!(summary.protein, 42.5);
    assert_eq!(summary.carbs, 20.0);
    assert_eq!(summary.fat, 10.0);
    assert_eq!(summary.meals_count, 2);
    assert_eq!(summary.total_water, 750);
  }

  #[test]
  fn test_totals_do_not_wrap_past_u32() {
    let summary = DailySummary::from_meals(&[meal(3_000_000_000, 1.0), meal(3_000_000_000, 1.0)])
      .with_water(&[water(u32::MAX), water(u32::MAX)]);

    assert_eq!(summary.total_calories, 6_000_000_000);
    assert_eq!(summary.total_water, 2 * u64::from(u32::MAX));
  }

  #[test]
  fn test_known_empty_day_is_zero() {
    assert_eq!(DailySummary::from_meals(&[]), DailySummary::default());
  }

  #[test]
  fn test_weekly_summary_reports_zero_for_uncached_days() {
    let today = day("2024-01-10");
    let cache = DayCache::new();
    for (i, d) in today.trailing(7).into_iter().take(5).enumerate() {
      cache.set(d, vec![meal(100 * (i as u32 + 1), 1.0)]);
    }

    let week = WeeklySummary::from_cache(&cache, today, WEEK_LEN, |m: &Meal| u64::from(m.calories));

    let totals: Vec<u64> = week.days.iter().map(|s| s.total).collect();
    assert_eq!(totals, vec![100, 200, 300, 400, 500, 0, 0]);
    assert_eq!(week.days[0].day, day("2024-01-04"));
    assert!(week.days[6].is_today);
    assert!(!week.days[5].is_today);
    assert_eq!(week.total(), 1500);
    assert_eq!(week.max(), 500);
  }

  #[test]
  fn test_weekly_labels_are_sunday_first_letters() {
    // 2024-01-07 is a Sunday.
    let week = WeeklySummary::from_cache(&DayCache::<Meal>::new(), day("2024-01-13"), WEEK_LEN, |m| {
      u64::from(m.calories)
    });

    let labels: String = week.days.iter().map(|s| s.label).collect();
    assert_eq!(labels, "SMTWTFS");
  }
}
