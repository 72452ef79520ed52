//! Collaborator seams: everything the builder reads from or writes to outside
//! its own in-memory editor state.
//!
//! Two implementations exist: `memory::MemoryBackend` (local stores) and
//! `client::RunestoneClient` (remote server over HTTP).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
  Accommodation, AssignmentExercise, AssignmentExerciseFields, DataFileCreated, DataFileRecord,
  DataFileRequest, ExerciseDraft, ReadingNode, ReadingsFilter,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
  #[error("not found: {0}")]
  NotFound(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("rejected ({status}): {message}")]
  Rejected { status: u16, message: String },
  #[error("transport error: {0}")]
  Transport(String),
  #[error("malformed response: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for RegistryError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      RegistryError::Decode(e.to_string())
    } else {
      RegistryError::Transport(e.to_string())
    }
  }
}

/// Result of persisting a draft against an assignment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SavedExercise {
  pub id: u64,
  pub name: String,
}

/// Whether a save may overwrite an existing exercise of the same name.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
  #[default]
  Create,
  Replace,
}

/// One student answer event as sent to the event log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEvent {
  pub event: String,
  pub act: String,
  pub answer: String,
  pub div_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sid: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub course: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<DateTime<Utc>>,
}

/// Server-side view of a student's answer, with an optional late resubmission.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
  #[serde(default)] pub answer: Option<String>,
  #[serde(default)] pub timestamp: Option<DateTime<Utc>>,
  #[serde(default)] pub last_answer: Option<String>,
  #[serde(default)] pub last_timestamp: Option<DateTime<Utc>>,
  #[serde(default)] pub score: Option<f64>,
  #[serde(default)] pub comment: Option<String>,
}

/// File chosen for upload alongside an answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentFile {
  pub filename: String,
  pub bytes: Vec<u8>,
}

#[async_trait]
pub trait DataFileRegistry: Send + Sync {
  async fn list_data_files(&self) -> Result<Vec<DataFileRecord>, RegistryError>;
  async fn create_data_file(&self, req: DataFileRequest) -> Result<DataFileCreated, RegistryError>;
}

#[async_trait]
pub trait ExerciseStore: Send + Sync {
  async fn save_exercise(&self, assignment_id: u64, draft: &ExerciseDraft, mode: SaveMode) -> Result<SavedExercise, RegistryError>;
  async fn list_assignment_exercises(&self, assignment_id: u64) -> Result<Vec<AssignmentExercise>, RegistryError>;
  async fn add_assignment_exercise(&self, fields: AssignmentExerciseFields) -> Result<(), RegistryError>;
  async fn remove_assignment_exercises(&self, ids: &[u64]) -> Result<(), RegistryError>;
}

#[async_trait]
pub trait ReadingCatalog: Send + Sync {
  async fn list_available_readings(&self, filter: &ReadingsFilter) -> Result<Vec<ReadingNode>, RegistryError>;
}

#[async_trait]
pub trait AnswerLog: Send + Sync {
  async fn log_answer_event(&self, event: AnswerEvent) -> Result<(), RegistryError>;
  async fn upload_attachment(&self, div_id: &str, sid: Option<&str>, file: AttachmentFile) -> Result<(), RegistryError>;
  /// Storage key of the attachment, if one was uploaded.
  async fn fetch_attachment_name(&self, div_id: &str, sid: Option<&str>) -> Result<Option<String>, RegistryError>;
  async fn fetch_answer(
    &self,
    div_id: &str,
    sid: &str,
    deadline: Option<DateTime<Utc>>,
  ) -> Result<Option<AnswerRecord>, RegistryError>;
}

#[async_trait]
pub trait AccommodationStore: Send + Sync {
  async fn save_accommodation(&self, acc: Accommodation) -> Result<(), RegistryError>;
  async fn list_accommodations(&self) -> Result<Vec<Accommodation>, RegistryError>;
}
