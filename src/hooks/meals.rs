//! Meals reader: selected-day meals, mutations and calorie summaries.

use uuid::Uuid;

use super::records::RecordsHook;
use super::summary::{DailySummary, WeeklySummary, WEEK_LEN};
use crate::models::{Meal, MealPatch, NewMeal};
use crate::query::MutationResult;

pub type MealsHook = RecordsHook<Meal>;

impl RecordsHook<Meal> {
  /// Log a meal. Invalid macros are rejected before the backend is called.
  pub async fn add_meal(&mut self, meal: NewMeal) -> MutationResult<Meal> {
    if let Err(e) = meal.validate() {
      return MutationResult::err(e.to_string());
    }
    self.insert(&meal).await
  }

  pub async fn update_meal(&mut self, id: Uuid, patch: MealPatch) -> MutationResult<Meal> {
    if let Err(e) = patch.validate() {
      return MutationResult::err(e.to_string());
    }
    self.update(id, &patch).await
  }

  pub async fn delete_meal(&mut self, id: Uuid) -> MutationResult<()> {
    self.delete(id).await
  }

  /// Totals over the selected day's meals.
  pub fn daily_summary(&self) -> DailySummary {
    DailySummary::from_meals(self.records())
  }

  /// Calories for the last seven days from the shared cache.
  pub fn weekly_summary(&self) -> WeeklySummary {
    WeeklySummary::from_cache(
      self.store.cache(),
      self.store.clock().today(),
      WEEK_LEN,
      |meal| u64::from(meal.calories),
    )
  }
}
