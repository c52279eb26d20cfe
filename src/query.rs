//! Loading/data/error bookkeeping for readers, and mutation results.
//!
//! A reader keeps its last good data when a refetch fails, so the error and
//! the data live side by side instead of in one enum.

use color_eyre::Result;

/// Lifecycle of a reader's fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing requested yet
  Idle,
  /// A fetch is in flight
  Loading,
  /// The last fetch finished (successfully or not)
  Settled,
}

/// State of one reader's data.
#[derive(Debug, Clone)]
pub struct Query<T> {
  status: QueryStatus,
  data: Option<T>,
  error: Option<String>,
}

impl<T> Query<T> {
  pub fn new() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Mark a fetch as started. Existing data stays visible.
  pub fn start(&mut self) {
    self.status = QueryStatus::Loading;
  }

  pub fn succeed(&mut self, data: T) {
    self.status = QueryStatus::Settled;
    self.data = Some(data);
    self.error = None;
  }

  /// Record a failure without touching the previous data.
  pub fn fail(&mut self, error: impl Into<String>) {
    self.status = QueryStatus::Settled;
    self.error = Some(error.into());
  }

  /// Apply a fetch result.
  pub fn settle(&mut self, result: Result<T>) {
    match result {
      Ok(data) => self.succeed(data),
      Err(e) => self.fail(e.to_string()),
    }
  }
}

impl<T> Default for Query<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Outcome of a reader mutation: data on success, a message on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
  pub data: Option<T>,
  pub error: Option<String>,
}

impl<T> MutationResult<T> {
  pub fn ok(data: T) -> Self {
    Self {
      data: Some(data),
      error: None,
    }
  }

  pub fn err(error: impl Into<String>) -> Self {
    Self {
      data: None,
      error: Some(error.into()),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }

  /// Back into a `Result` for callers that want `?`.
  pub fn into_result(self) -> Result<Option<T>> {
    match self.error {
      Some(e) => Err(color_eyre::eyre::eyre!(e)),
      None => Ok(self.data),
    }
  }
}

impl<T> From<Result<T>> for MutationResult<T> {
  fn from(result: Result<T>) -> Self {
    match result {
      Ok(data) => Self::ok(data),
      Err(e) => Self::err(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  #[test]
  fn test_query_success() {
    let mut query = Query::new();
    assert!(!query.is_loading());
    assert_eq!(query.data(), None::<&Vec<i32>>);

    query.start();
    assert!(query.is_loading());

    query.settle(Ok(vec![1, 2, 3]));
    assert!(!query.is_loading());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert_eq!(query.error(), None);
  }

  #[test]
  fn test_failure_keeps_previous_data() {
    let mut query = Query::new();
    query.succeed(42);

    query.start();
    query.settle(Err(eyre!("Something went wrong")));

    assert_eq!(query.data(), Some(&42));
    assert_eq!(query.error(), Some("Something went wrong"));
    assert!(!query.is_loading());
  }

  #[test]
  fn test_success_clears_error() {
    let mut query: Query<i32> = Query::new();
    query.fail("offline");
    query.succeed(1);
    assert_eq!(query.error(), None);
  }

  #[test]
  fn test_mutation_result_from_result() {
    let ok: MutationResult<i32> = Ok(5).into();
    assert_eq!(ok, MutationResult::ok(5));
    assert!(ok.is_ok());

    let failed: MutationResult<i32> = Err(eyre!("insert failed")).into();
    assert_eq!(failed.data, None);
    assert_eq!(failed.error.as_deref(), Some("insert failed"));
    assert!(failed.into_result().is_err());
  }
}
