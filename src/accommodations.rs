//! Accommodation scheduler: per-student exceptions to timing and visibility.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::Accommodation;
use crate::registry::AccommodationStore;

pub const MIN_TIME_LIMIT: f64 = 1.0;
pub const MAX_TIME_LIMIT: f64 = 5.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccommodationError {
  #[error("Choose one or more students")]
  NoStudents,
  #[error("Time limit multiplier must be between 1.0 and 5.0")]
  TimeLimitOutOfRange,
  #[error("Extra days cannot be negative")]
  NegativeExtraDays,
}

/// Scheduler form: the selected students and assignments plus the override values.
/// No assignments means the exception applies to all of them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AccommodationRequest {
  pub students: Vec<String>,
  #[serde(default)] pub assignments: Vec<u64>,
  #[serde(default)] pub time_limit: Option<f64>,
  #[serde(default)] pub due_date: Option<i64>,
  #[serde(default)] pub visible: bool,
}

impl AccommodationRequest {
  pub fn validate(&self) -> Result<(), AccommodationError> {
    if self.students.iter().all(|s| s.trim().is_empty()) {
      return Err(AccommodationError::NoStudents);
    }
    if let Some(t) = self.time_limit {
      if !(MIN_TIME_LIMIT..=MAX_TIME_LIMIT).contains(&t) {
        return Err(AccommodationError::TimeLimitOutOfRange);
      }
    }
    if self.due_date.map_or(false, |d| d < 0) {
      return Err(AccommodationError::NegativeExtraDays);
    }
    Ok(())
  }

  /// One exception per student and assignment.
  pub fn expand(&self) -> Vec<Accommodation> {
    let targets: Vec<Option<u64>> = if self.assignments.is_empty() {
      vec![None]
    } else {
      self.assignments.iter().copied().map(Some).collect()
    };
    self
      .students
      .iter()
      .map(|s| s.trim())
      .filter(|s| !s.is_empty())
      .flat_map(|sid| {
        targets.iter().map(move |assignment_id| Accommodation {
          sid: sid.to_string(),
          assignment_id: *assignment_id,
          time_limit: self.time_limit,
          due_date: self.due_date,
          visible: self.visible,
        })
      })
      .collect()
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AccommodationFailure {
  pub sid: String,
  pub assignment_id: Option<u64>,
  pub error: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct AccommodationReport {
  pub saved: usize,
  pub failed: Vec<AccommodationFailure>,
}

/// Validate, expand and save every exception concurrently.
#[instrument(level = "info", skip(store, req), fields(students = req.students.len(), assignments = req.assignments.len()))]
pub async fn save_all(store: &dyn AccommodationStore, req: &AccommodationRequest) -> Result<AccommodationReport, AccommodationError> {
  req.validate()?;
  let items = req.expand();
  let results = join_all(items.iter().cloned().map(|acc| store.save_accommodation(acc))).await;

  let mut report = AccommodationReport::default();
  for (acc, res) in items.into_iter().zip(results) {
    match res {
      Ok(()) => report.saved += 1,
      Err(e) => {
        warn!(target: "builder", sid = %acc.sid, assignment_id = ?acc.assignment_id, error = %e, "Accommodation not saved");
        report.failed.push(AccommodationFailure { sid: acc.sid, assignment_id: acc.assignment_id, error: e.to_string() });
      }
    }
  }
  info!(target: "builder", saved = report.saved, failed = report.failed.len(), "Accommodations saved");
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryBackend;

  fn req(students: &[&str], assignments: &[u64]) -> AccommodationRequest {
    AccommodationRequest {
      students: students.iter().map(|s| s.to_string()).collect(),
      assignments: assignments.to_vec(),
      time_limit: Some(1.5),
      due_date: Some(2),
      visible: true,
    }
  }

  #[test]
  fn expands_students_by_assignments() {
    let items = req(&["alice", "bob"], &[1, 2, 3]).expand();
    assert_eq!(items.len(), 6);
    assert!(items.iter().all(|a| a.time_limit == Some(1.5) && a.visible));
    assert_eq!(items[3].sid, "bob");
    assert_eq!(items[3].assignment_id, Some(1));
  }

  #[test]
  fn no_assignment_means_all_assignments() {
    let items = req(&["alice"], &[]).expand();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].assignment_id, None);
  }

  #[test]
  fn validation() {
    assert_eq!(req(&[], &[]).validate(), Err(AccommodationError::NoStudents));
    let mut r = req(&["a"], &[]);
    r.time_limit = Some(5.5);
    assert_eq!(r.validate(), Err(AccommodationError::TimeLimitOutOfRange));
    r.time_limit = None;
    r.due_date = Some(-1);
    assert_eq!(r.validate(), Err(AccommodationError::NegativeExtraDays));
    r.due_date = None;
    assert_eq!(r.validate(), Ok(()));
  }

  #[tokio::test]
  async fn saves_every_exception() {
    let backend = MemoryBackend::default();
    let report = save_all(&backend, &req(&["alice", "bob"], &[4])).await.unwrap();
    assert_eq!(report.saved, 2);
    assert!(report.failed.is_empty());
    let stored = backend.list_accommodations().await.unwrap();
    assert_eq!(stored.len(), 2);
  }
}
