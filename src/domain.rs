//! Domain models used by the builder: exercise drafts, data files, readings,
//! assignment exercises and accommodations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which editor is authoring the draft. Fixed for the lifetime of an editor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
  ActiveCode,
  MultipleChoice,
}

impl ExerciseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExerciseType::ActiveCode => "activecode",
      ExerciseType::MultipleChoice => "multiplechoice",
    }
  }
}

/// Prefix / starter / suffix bodies of a code exercise.
/// Kept as three fields; the sentinel-joined form only exists in generated markup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeParts {
  #[serde(default)] pub prefix: String,
  #[serde(default)] pub starter: String,
  #[serde(default)] pub suffix: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveCodeBody {
  #[serde(default)] pub instructions: String,
  #[serde(default)] pub language: String,
  #[serde(default)] pub code: CodeParts,
  /// Name of a data file in the registry. A back-reference, never a copy.
  #[serde(default)] pub datafile: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
  #[serde(default)] pub text: String,
  #[serde(default)] pub feedback: String,
  #[serde(default)] pub correct: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultipleChoiceBody {
  #[serde(default)] pub statement: String,
  #[serde(default)] pub choices: Vec<Choice>,
}

/// Type-specific part of a draft. The variant is the exercise-type discriminant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "question_type", rename_all = "lowercase")]
pub enum ExercisePayload {
  ActiveCode(ActiveCodeBody),
  MultipleChoice(MultipleChoiceBody),
}

impl ExercisePayload {
  pub fn exercise_type(&self) -> ExerciseType {
    match self {
      ExercisePayload::ActiveCode(_) => ExerciseType::ActiveCode,
      ExercisePayload::MultipleChoice(_) => ExerciseType::MultipleChoice,
    }
  }
}

/// In-progress, unpersisted exercise.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseDraft {
  pub name: String,
  #[serde(default)] pub author: String,
  #[serde(default)] pub topic: String,
  #[serde(default)] pub chapter: String,
  #[serde(default)] pub subchapter: String,
  #[serde(default)] pub tags: String,
  #[serde(default = "default_points")] pub points: u32,
  #[serde(default = "default_difficulty")] pub difficulty: u8,
  /// Rendered markup, refreshed at save time.
  #[serde(default)] pub htmlsrc: String,
  #[serde(flatten)]
  pub payload: ExercisePayload,
}

fn default_points() -> u32 { 1 }
fn default_difficulty() -> u8 { 3 }

impl ExerciseDraft {
  /// Fresh draft with editor defaults and a generated identifier.
  pub fn new(kind: ExerciseType) -> Self {
    let payload = match kind {
      ExerciseType::ActiveCode => ExercisePayload::ActiveCode(ActiveCodeBody::default()),
      ExerciseType::MultipleChoice => ExercisePayload::MultipleChoice(MultipleChoiceBody {
        statement: String::new(),
        choices: vec![Choice::default(), Choice::default()],
      }),
    };
    Self {
      name: generate_exercise_id(),
      author: String::new(),
      topic: String::new(),
      chapter: String::new(),
      subchapter: String::new(),
      tags: String::new(),
      points: default_points(),
      difficulty: default_difficulty(),
      htmlsrc: String::new(),
      payload,
    }
  }

  pub fn exercise_type(&self) -> ExerciseType {
    self.payload.exercise_type()
  }

  pub fn active_code(&self) -> Option<&ActiveCodeBody> {
    match &self.payload {
      ExercisePayload::ActiveCode(b) => Some(b),
      _ => None,
    }
  }

  pub fn multiple_choice(&self) -> Option<&MultipleChoiceBody> {
    match &self.payload {
      ExercisePayload::MultipleChoice(b) => Some(b),
      _ => None,
    }
  }
}

/// Identifier used when the author has not named the exercise yet.
pub fn generate_exercise_id() -> String {
  let raw = Uuid::new_v4().simple().to_string();
  format!("exercise_{}", &raw[..8])
}

/// A named, reusable resource attachable to a code exercise.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFileRecord {
  pub id: u64,
  /// Unique display name; drafts reference the file by this value.
  pub name: String,
  pub filename: String,
  pub file_type: String,
  /// Text, or base64 for images.
  pub file_content: String,
  #[serde(default)] pub is_editable: bool,
  #[serde(default)] pub rows: u32,
  #[serde(default)] pub cols: u32,
}

/// Body of a create-data-file request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFileRequest {
  pub name: String,
  pub filename: String,
  pub file_content: String,
  pub file_type: String,
  pub is_editable: bool,
  pub rows: u32,
  pub cols: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFileCreated {
  pub id: u64,
  pub acid: String,
  pub filename: String,
}

/// Exercise as stored against an assignment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssignmentExercise {
  pub id: u64,
  pub assignment_id: u64,
  pub question_id: u64,
  pub name: String,
  #[serde(default)] pub chapter: String,
  #[serde(default)] pub subchapter: String,
  #[serde(default)] pub title: String,
  pub points: u32,
  pub sorting_priority: u32,
  #[serde(default)] pub reading_assignment: bool,
  #[serde(default)] pub autograde: String,
  #[serde(default)] pub which_to_grade: String,
  #[serde(default)] pub activities_required: u32,
  #[serde(default)] pub required: bool,
  #[serde(default)] pub htmlsrc: String,
}

/// Fields sent when attaching an exercise (typically a reading) to an assignment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssignmentExerciseFields {
  pub assignment_id: u64,
  pub question_id: u64,
  pub points: u32,
  pub sorting_priority: u32,
  pub reading_assignment: bool,
  pub autograde: String,
  pub which_to_grade: String,
  pub activities_required: u32,
  pub required: bool,
  pub chapter: String,
  pub subchapter: String,
  pub title: String,
  #[serde(default)] pub num: u32,
  #[serde(rename = "numQuestions", default)]
  pub num_questions: u32,
}

/// One node of the available-readings tree.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReadingNode {
  pub key: String,
  #[serde(default)] pub data: Option<ReadingData>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<ReadingNode>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReadingData {
  #[serde(default)] pub id: u64,
  #[serde(default)] pub title: String,
  #[serde(default)] pub chapter: String,
  #[serde(default)] pub subchapter: String,
  #[serde(default)] pub num: u32,
  #[serde(rename = "numQuestions", default)]
  pub num_questions: u32,
}

/// Filter accepted by the readings catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadingsFilter {
  #[serde(default)] pub skipreading: bool,
  #[serde(default = "yes")] pub from_source_only: bool,
  #[serde(default)] pub pages_only: bool,
}

fn yes() -> bool { true }

impl Default for ReadingsFilter {
  fn default() -> Self {
    Self { skipreading: false, from_source_only: true, pages_only: false }
  }
}

/// Per-student timing/visibility override. `assignment_id == None` applies to all assignments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Accommodation {
  pub sid: String,
  pub assignment_id: Option<u64>,
  pub time_limit: Option<f64>,
  /// Extra days added to the deadline.
  pub due_date: Option<i64>,
  pub visible: bool,
}
