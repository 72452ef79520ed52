//! Readings selector: which book sections are attached to an assignment, and
//! bulk attach/detach of whole chapters.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::{AssignmentExercise, AssignmentExerciseFields, ReadingData, ReadingNode, ReadingsFilter};
use crate::registry::{ExerciseStore, ReadingCatalog, RegistryError};

pub const READING_AUTOGRADE: &str = "interaction";
pub const READING_WHICH_TO_GRADE: &str = "best_answer";

/// Tree-table checkbox state for one key.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionState {
  pub checked: bool,
  #[serde(rename = "partialChecked")]
  pub partial_checked: bool,
}

/// Drop every node without a title, at every depth.
pub fn prune_untitled(nodes: Vec<ReadingNode>) -> Vec<ReadingNode> {
  nodes
    .into_iter()
    .filter(has_title)
    .map(|mut node| {
      node.children = prune_untitled(std::mem::take(&mut node.children));
      node
    })
    .collect()
}

fn has_title(node: &ReadingNode) -> bool {
  node.data.as_ref().map_or(false, |d| !d.title.is_empty())
}

/// Reading exercises of an assignment, ordered by sorting priority.
pub fn reading_exercises(exercises: &[AssignmentExercise]) -> Vec<AssignmentExercise> {
  let mut out: Vec<AssignmentExercise> = exercises.iter().filter(|e| e.reading_assignment).cloned().collect();
  out.sort_by_key(|e| e.sorting_priority);
  out
}

/// Checked keys for the tree: every attached subchapter, plus each chapter
/// (fully checked when all its children are attached, partial when some are).
pub fn selection_keys(tree: &[ReadingNode], readings: &[AssignmentExercise]) -> BTreeMap<String, SelectionState> {
  let attached = |key: &str| readings.iter().any(|r| r.subchapter == key);
  let mut keys: BTreeMap<String, SelectionState> = readings
    .iter()
    .map(|r| (r.subchapter.clone(), SelectionState { checked: true, partial_checked: false }))
    .collect();
  for chapter in tree {
    let state = SelectionState {
      checked: chapter.children.iter().all(|c| attached(&c.key)),
      partial_checked: chapter.children.iter().any(|c| attached(&c.key)),
    };
    keys.insert(chapter.key.clone(), state);
  }
  keys
}

/// 80% of a section's questions, rounded.
pub fn activities_required(num_questions: u32) -> u32 {
  (f64::from(num_questions) * 0.8).round() as u32
}

/// Leaves under `node` (the node itself when it has no children).
pub fn leaf_readings(node: &ReadingNode) -> Vec<&ReadingData> {
  if node.children.is_empty() {
    return node.data.iter().collect();
  }
  node.children.iter().flat_map(leaf_readings).collect()
}

/// Fields for attaching one reading. `existing` are the assignment's current
/// reading exercises in sorting order; `offset` positions it after them.
pub fn reading_fields(assignment_id: u64, data: &ReadingData, existing: &[AssignmentExercise], offset: usize) -> AssignmentExerciseFields {
  let required = activities_required(data.num_questions);
  AssignmentExerciseFields {
    assignment_id,
    question_id: data.id,
    points: existing.last().map_or(1, |e| e.points),
    sorting_priority: (existing.len() + offset) as u32,
    reading_assignment: true,
    autograde: READING_AUTOGRADE.into(),
    which_to_grade: READING_WHICH_TO_GRADE.into(),
    activities_required: required,
    required: required != 0,
    chapter: data.chapter.clone(),
    subchapter: data.subchapter.clone(),
    title: data.title.clone(),
    num: data.num,
    num_questions: data.num_questions,
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BulkFailure {
  pub question_id: u64,
  pub title: String,
  pub error: String,
}

/// Outcome of a bulk add. Failures are listed per reading.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct BulkAddReport {
  pub added: usize,
  pub failed: Vec<BulkFailure>,
}

impl BulkAddReport {
  pub fn summary(&self) -> String {
    if self.failed.is_empty() {
      format!("{} readings successfully added", self.added)
    } else {
      format!("{} readings successfully added, {} failed", self.added, self.failed.len())
    }
  }
}

/// Attach every leaf under `node` to the assignment. Calls run concurrently;
/// the report is built after all of them complete.
#[instrument(level = "info", skip(store, node), fields(node = %node.key))]
pub async fn add_readings(store: &dyn ExerciseStore, assignment_id: u64, node: &ReadingNode) -> Result<BulkAddReport, RegistryError> {
  let current = reading_exercises(&store.list_assignment_exercises(assignment_id).await?);
  let leaves = leaf_readings(node);

  let calls = leaves
    .iter()
    .enumerate()
    .map(|(i, data)| store.add_assignment_exercise(reading_fields(assignment_id, data, &current, i)));
  let results = join_all(calls).await;

  let mut report = BulkAddReport::default();
  for (data, res) in leaves.iter().zip(results) {
    match res {
      Ok(()) => report.added += 1,
      Err(e) => {
        warn!(target: "readings", question_id = data.id, error = %e, "Reading not added");
        report.failed.push(BulkFailure { question_id: data.id, title: data.title.clone(), error: e.to_string() });
      }
    }
  }
  info!(target: "readings", assignment_id, added = report.added, failed = report.failed.len(), "Bulk add finished");
  Ok(report)
}

/// Detach exercises by id. Returns how many were requested.
#[instrument(level = "info", skip(store))]
pub async fn remove_readings(store: &dyn ExerciseStore, ids: &[u64]) -> Result<usize, RegistryError> {
  store.remove_assignment_exercises(ids).await?;
  Ok(ids.len())
}

/// Ids of the assignment exercises backing the readings under `node`.
pub fn exercise_ids_for_node(node: &ReadingNode, exercises: &[AssignmentExercise]) -> Vec<u64> {
  let question_ids: Vec<u64> = leaf_readings(node).iter().map(|d| d.id).collect();
  exercises.iter().filter(|e| question_ids.contains(&e.question_id)).map(|e| e.id).collect()
}

/// Everything the selector renders for one assignment.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReadingsOverview {
  pub readings: Vec<ReadingNode>,
  pub reading_exercises: Vec<AssignmentExercise>,
  pub selected_keys: BTreeMap<String, SelectionState>,
}

pub async fn load_overview(
  catalog: &dyn ReadingCatalog,
  store: &dyn ExerciseStore,
  assignment_id: u64,
) -> Result<ReadingsOverview, RegistryError> {
  let filter = ReadingsFilter::default();
  let (tree, exercises) = futures::join!(
    catalog.list_available_readings(&filter),
    store.list_assignment_exercises(assignment_id),
  );
  let readings = prune_untitled(tree?);
  let reading_exercises = reading_exercises(&exercises?);
  let selected_keys = selection_keys(&readings, &reading_exercises);
  Ok(ReadingsOverview { readings, reading_exercises, selected_keys })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryBackend;

  fn leaf(key: &str, id: u64, title: &str, nq: u32) -> ReadingNode {
    ReadingNode {
      key: key.into(),
      data: Some(ReadingData {
        id,
        title: title.into(),
        chapter: "ch1".into(),
        subchapter: key.into(),
        num: 1,
        num_questions: nq,
      }),
      children: vec![],
    }
  }

  fn chapter(key: &str, children: Vec<ReadingNode>) -> ReadingNode {
    ReadingNode {
      key: key.into(),
      data: Some(ReadingData { title: key.to_uppercase(), ..Default::default() }),
      children,
    }
  }

  fn exercise(id: u64, subchapter: &str, priority: u32, points: u32) -> AssignmentExercise {
    AssignmentExercise {
      id,
      assignment_id: 7,
      question_id: id * 10,
      name: subchapter.into(),
      chapter: "ch1".into(),
      subchapter: subchapter.into(),
      title: subchapter.into(),
      points,
      sorting_priority: priority,
      reading_assignment: true,
      autograde: READING_AUTOGRADE.into(),
      which_to_grade: READING_WHICH_TO_GRADE.into(),
      activities_required: 0,
      required: false,
      htmlsrc: String::new(),
    }
  }

  #[test]
  fn untitled_nodes_are_pruned_at_every_depth() {
    let tree = vec![
      chapter("ch1", vec![leaf("a", 1, "A", 5), leaf("b", 2, "", 5)]),
      ReadingNode { key: "ghost".into(), data: None, children: vec![leaf("c", 3, "C", 1)] },
    ];
    let pruned = prune_untitled(tree);
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].children.len(), 1);
    assert_eq!(pruned[0].children[0].key, "a");
  }

  #[test]
  fn chapter_selection_is_full_or_partial() {
    let tree = vec![
      chapter("ch1", vec![leaf("a", 1, "A", 5), leaf("b", 2, "B", 5)]),
      chapter("ch2", vec![leaf("c", 3, "C", 5)]),
    ];
    let keys = selection_keys(&tree, &[exercise(1, "a", 0, 1), exercise(2, "c", 1, 1)]);
    assert_eq!(keys["a"], SelectionState { checked: true, partial_checked: false });
    assert_eq!(keys["ch1"], SelectionState { checked: false, partial_checked: true });
    assert_eq!(keys["ch2"], SelectionState { checked: true, partial_checked: true });
  }

  #[test]
  fn reading_fields_follow_existing_readings() {
    let existing = vec![exercise(1, "a", 0, 1), exercise(2, "b", 1, 4)];
    let data = leaf("c", 30, "C", 3).data.unwrap();
    let f = reading_fields(7, &data, &existing, 1);
    assert_eq!(f.points, 4);
    assert_eq!(f.sorting_priority, 3);
    assert_eq!(f.activities_required, 2);
    assert!(f.required);
    assert_eq!(f.autograde, "interaction");

    let none = reading_fields(7, &leaf("d", 31, "D", 0).data.unwrap(), &[], 0);
    assert_eq!((none.points, none.activities_required, none.required), (1, 0, false));
  }

  #[test]
  fn reading_exercises_are_sorted_and_filtered() {
    let mut other = exercise(9, "x", 0, 1);
    other.reading_assignment = false;
    let sorted = reading_exercises(&[exercise(1, "a", 5, 1), other, exercise(2, "b", 2, 1)]);
    assert_eq!(sorted.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1]);
  }

  #[tokio::test]
  async fn bulk_add_then_remove_a_chapter() {
    let backend = MemoryBackend::default();
    let node = chapter("ch1", vec![leaf("a", 101, "A", 5), leaf("b", 102, "B", 10)]);

    let report = add_readings(&backend, 7, &node).await.unwrap();
    assert_eq!(report.added, 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.summary(), "2 readings successfully added");

    let overview = load_overview(&backend, &backend, 7).await.unwrap();
    let priorities: Vec<u32> = overview.reading_exercises.iter().map(|e| e.sorting_priority).collect();
    assert_eq!(priorities, vec![0, 1]);

    let ids = exercise_ids_for_node(&node, &overview.reading_exercises);
    assert_eq!(remove_readings(&backend, &ids).await.unwrap(), 2);
    let after = load_overview(&backend, &backend, 7).await.unwrap();
    assert!(after.reading_exercises.is_empty());
  }

  #[tokio::test]
  async fn bulk_add_reports_each_failure() {
    let backend = MemoryBackend::default();
    let node = chapter("ch1", vec![leaf("a", 101, "A", 5)]);
    add_readings(&backend, 7, &node).await.unwrap();

    let again = add_readings(&backend, 7, &node).await.unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(again.failed.len(), 1);
    assert_eq!(again.failed[0].question_id, 101);
  }
}
