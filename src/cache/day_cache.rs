//! In-memory map from calendar day to that day's records.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::day::DayKey;

/// Day-keyed record cache.
///
/// A missing key means the day was never fetched; an empty list is a fetched
/// day with no records. Entries are replaced wholesale and never expire.
pub struct DayCache<R> {
  entries: RwLock<HashMap<DayKey, Arc<Vec<R>>>>,
}

impl<R> DayCache<R> {
  pub fn new() -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
    }
  }

  pub fn get(&self, day: DayKey) -> Option<Arc<Vec<R>>> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&day)
      .cloned()
  }

  /// Store the records for a day, replacing whatever was there.
  pub fn set(&self, day: DayKey, records: Vec<R>) -> Arc<Vec<R>> {
    let records = Arc::new(records);
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(day, Arc::clone(&records));
    records
  }

  pub fn has(&self, day: DayKey) -> bool {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(&day)
  }

  /// Drop every day.
  pub fn clear(&self) {
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }

  /// Cached days in calendar order
  pub fn keys(&self) -> Vec<DayKey> {
    let mut keys: Vec<DayKey> = self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .copied()
      .collect();
    keys.sort();
    keys
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }
}

impl<R> Default for DayCache<R> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(s: &str) -> DayKey {
    s.parse().unwrap()
  }

  #[test]
  fn test_unknown_until_set() {
    let cache: DayCache<u32> = DayCache::new();
    let key = day("2024-01-10");

    assert!(cache.get(key).is_none());
    assert!(!cache.has(key));

    cache.set(key, vec![500]);

    assert_eq!(cache.get(key).as_deref(), Some(&vec![500]));
    assert!(cache.has(key));
    assert!(!cache.has(day("2024-01-09")));
  }

  #[test]
  fn test_empty_day_is_distinct_from_miss() {
    let cache: DayCache<u32> = DayCache::new();
    let key = day("2024-01-10");

    cache.set(key, Vec::new());

    assert!(cache.has(key));
    assert_eq!(cache.get(key).map(|r| r.len()), Some(0));
  }

  #[test]
  fn test_set_overwrites() {
    let cache: DayCache<u32> = DayCache::new();
    let key = day("2024-01-10");

    cache.set(key, vec![1, 2, 3]);
    cache.set(key, vec![4]);

    assert_eq!(cache.get(key).as_deref(), Some(&vec![4]));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_clear_forgets_every_day() {
    let cache: DayCache<u32> = DayCache::new();
    cache.set(day("2024-01-10"), vec![1]);
    cache.set(day("2024-01-08"), Vec::new());
    assert_eq!(cache.keys(), vec![day("2024-01-08"), day("2024-01-10")]);

    cache.clear();

    assert!(cache.get(day("2024-01-10")).is_none());
    assert!(!cache.has(day("2024-01-08")));
    assert_eq!(cache.len(), 0);
  }
}
