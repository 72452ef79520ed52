//! Student-facing short-answer component, as a state machine plus a pure view.
//!
//! The text is mirrored to a local store on every check (a reload-surviving
//! checkpoint, never the system of record) and sent to the answer log on save.
//! A restored record with a late resubmission exposes an on-time/late toggle
//! that only flips what is displayed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::registry::{AnswerEvent, AnswerLog, AnswerRecord, AttachmentFile, RegistryError};
use crate::util::{basename, file_suffix};

pub const ALLOWED_SUFFIXES: &[&str] = &["jpg", "jpeg", "png", "gif", "pdf"];
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

pub const MSG_UNANSWERED: &str = "You have not answered this question yet.";
pub const MSG_NOT_SAVED: &str = "Your answer has not been saved yet!";
pub const MSG_AUTOSAVED: &str = "Your answer is automatically saved.";
pub const MSG_SAVED: &str = "Your answer has been saved.";
pub const MSG_RESTORED: &str = "Your current saved answer is shown above.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachmentError {
  #[error("File type not allowed. Please upload a jpg, jpeg, png, gif, or pdf file.")]
  TypeNotAllowed,
  #[error("File size exceeds 5MB limit. Please upload a smaller file.")]
  TooLarge,
}

#[derive(Debug, Error, PartialEq)]
pub enum ShortAnswerError {
  #[error(transparent)]
  Attachment(#[from] AttachmentError),
  #[error("Your answer could not be saved: {0}")]
  Registry(#[from] RegistryError),
}

/// Reject disallowed attachments before anything is transmitted.
pub fn check_attachment(file: &AttachmentFile) -> Result<(), AttachmentError> {
  let suffix = file_suffix(&file.filename);
  if !ALLOWED_SUFFIXES.contains(&suffix.as_str()) {
    return Err(AttachmentError::TypeNotAllowed);
  }
  if file.bytes.len() > MAX_ATTACHMENT_BYTES {
    return Err(AttachmentError::TooLarge);
  }
  Ok(())
}

/// Browser-style key/value storage.
pub trait LocalStore {
  fn get_item(&self, key: &str) -> Option<String>;
  fn set_item(&self, key: &str, value: String);
  fn remove_item(&self, key: &str);
}

/// In-memory `LocalStore`. Clones share the same entries, so a new component
/// built over a clone sees what an earlier one wrote.
#[derive(Clone, Default)]
pub struct MemoryStorage {
  items: Arc<Mutex<HashMap<String, String>>>,
}

impl LocalStore for MemoryStorage {
  fn get_item(&self, key: &str) -> Option<String> {
    self.items.lock().ok()?.get(key).cloned()
  }
  fn set_item(&self, key: &str, value: String) {
    if let Ok(mut items) = self.items.lock() {
      items.insert(key.to_string(), value);
    }
  }
  fn remove_item(&self, key: &str) {
    if let Ok(mut items) = self.items.lock() {
      items.remove(key);
    }
  }
}

/// Shape of the local checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredAnswer {
  pub answer: String,
  pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
  Unanswered,
  AnsweredUnsaved,
  AnsweredSaved,
  FeedbackAvailable,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShownAnswer {
  OnTime,
  Late,
}

#[derive(Clone, Debug)]
struct AnswerVersions {
  on_time: (String, Option<DateTime<Utc>>),
  late: (String, Option<DateTime<Utc>>),
  shown: ShownAnswer,
}

#[derive(Clone, Debug, Default)]
pub struct ShortAnswerOptions {
  pub div_id: String,
  pub course: String,
  /// Student id; graders pass the student being graded.
  pub sid: Option<String>,
  pub grader_active: bool,
  pub attachment: bool,
  pub is_timed: bool,
  pub placeholder: Option<String>,
}

/// Everything a renderer needs, derived from component state.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ShortAnswerView {
  pub div_id: String,
  pub placeholder: String,
  pub text: String,
  pub rendered_answer: String,
  pub state: AnswerState,
  pub feedback: String,
  pub feedback_class: &'static str,
  pub timestamp: Option<DateTime<Utc>>,
  pub toggle_label: Option<&'static str>,
  pub shown: Option<ShownAnswer>,
  pub attachment_name: Option<String>,
}

pub struct ShortAnswer<S: LocalStore> {
  opts: ShortAnswerOptions,
  store: S,
  text: String,
  state: AnswerState,
  feedback: String,
  feedback_ok: bool,
  timestamp: Option<DateTime<Utc>>,
  versions: Option<AnswerVersions>,
  pending: Option<AttachmentFile>,
  attachment_name: Option<String>,
}

fn math_patterns() -> Option<&'static (Regex, Regex)> {
  static RES: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
  RES
    .get_or_init(|| Some((Regex::new(r"\$\$(.*?)\$\$").ok()?, Regex::new(r"\$(.*?)\$").ok()?)))
    .as_ref()
}

/// Convert `$$..$$` / `$..$` to MathJax delimiters and newlines to `<br/>`.
pub fn render_math(value: &str) -> String {
  let Some((display, inline)) = math_patterns() else {
    return value.replace('\n', "<br/>");
  };
  let v = display.replace_all(value, r"\[ ${1} \]");
  let v = inline.replace_all(&v, r"\( ${1} \)");
  v.replace('\n', "<br/>")
}

impl<S: LocalStore> ShortAnswer<S> {
  pub fn new(opts: ShortAnswerOptions, store: S) -> Self {
    Self {
      opts,
      store,
      text: String::new(),
      state: AnswerState::Unanswered,
      feedback: MSG_UNANSWERED.into(),
      feedback_ok: false,
      timestamp: None,
      versions: None,
      pending: None,
      attachment_name: None,
    }
  }

  pub fn state(&self) -> AnswerState { self.state }
  pub fn text(&self) -> &str { &self.text }
  pub fn store(&self) -> &S { &self.store }

  /// Key of this question's local checkpoint for the current student.
  pub fn local_storage_key(&self) -> String {
    let who = self.opts.sid.as_deref().unwrap_or("anonymous");
    format!("{}:{}:{}-given", who, self.opts.course, self.opts.div_id)
  }

  /// Text edit from the student.
  pub fn set_text(&mut self, value: impl Into<String>) {
    self.text = value.into();
    self.state = AnswerState::AnsweredUnsaved;
    self.feedback = if self.opts.is_timed { MSG_AUTOSAVED } else { MSG_NOT_SAVED }.into();
    self.feedback_ok = false;
  }

  pub fn attach(&mut self, file: AttachmentFile) {
    self.pending = Some(file);
  }

  /// Mirror the current text to the local store. Graders never write.
  pub fn check_current_answer(&mut self) {
    if self.opts.grader_active {
      return;
    }
    let stored = StoredAnswer { answer: self.text.clone(), timestamp: Utc::now() };
    match serde_json::to_string(&stored) {
      Ok(json) => self.store.set_item(&self.local_storage_key(), json),
      Err(e) => warn!(target: "shortanswer", div_id = %self.opts.div_id, error = %e, "Could not serialize local answer"),
    }
  }

  /// Checkpoint locally, then send the answer (and pending attachment) to the log.
  #[instrument(level = "info", skip(self, log), fields(div_id = %self.opts.div_id, answer_len = self.text.len()))]
  pub async fn log_current_answer(&mut self, log: &dyn AnswerLog) -> Result<(), ShortAnswerError> {
    if let Some(file) = self.pending.as_ref().filter(|_| self.opts.attachment) {
      if let Err(e) = check_attachment(file) {
        info!(target: "shortanswer", filename = %file.filename, size = file.bytes.len(), reason = %e, "Attachment rejected");
        self.feedback = e.to_string();
        self.feedback_ok = false;
        return Err(e.into());
      }
    }

    self.check_current_answer();
    let event = AnswerEvent {
      event: "shortanswer".into(),
      act: self.text.clone(),
      answer: self.text.clone(),
      div_id: self.opts.div_id.clone(),
      sid: self.opts.sid.clone(),
      course: Some(self.opts.course.clone()).filter(|c| !c.is_empty()),
      timestamp: Some(Utc::now()),
    };
    if let Err(e) = log.log_answer_event(event).await {
      self.fail(&e);
      return Err(e.into());
    }

    if self.opts.attachment {
      if let Some(file) = self.pending.take() {
        let filename = file.filename.clone();
        if let Err(e) = log.upload_attachment(&self.opts.div_id, self.opts.sid.as_deref(), file).await {
          self.fail(&e);
          return Err(e.into());
        }
        self.attachment_name = Some(filename);
      }
    }

    self.state = AnswerState::AnsweredSaved;
    self.feedback = MSG_SAVED.into();
    self.feedback_ok = true;
    Ok(())
  }

  fn fail(&mut self, e: &RegistryError) {
    warn!(target: "shortanswer", div_id = %self.opts.div_id, error = %e, "Answer log call failed");
    self.feedback = ShortAnswerError::Registry(e.clone()).to_string();
    self.feedback_ok = false;
  }

  /// Repopulate from the local checkpoint. Corrupt entries are dropped.
  pub fn check_local_storage(&mut self) {
    if self.opts.grader_active {
      return;
    }
    let key = self.local_storage_key();
    let Some(raw) = self.store.get_item(&key) else {
      return;
    };
    match serde_json::from_str::<StoredAnswer>(&raw) {
      Ok(stored) => {
        self.text = stored.answer;
        self.timestamp = Some(stored.timestamp);
        self.state = AnswerState::AnsweredSaved;
        self.feedback = MSG_RESTORED.into();
        self.feedback_ok = true;
      }
      Err(e) => {
        warn!(target: "shortanswer", %key, error = %e, "Discarding unparsable local answer");
        self.store.remove_item(&key);
      }
    }
  }

  /// Hydrate from the server's record.
  pub fn restore_answers(&mut self, record: AnswerRecord) {
    let answer = record.answer.unwrap_or_default();
    self.text = answer.clone();
    self.timestamp = record.timestamp;
    self.versions = record
      .last_answer
      .filter(|late| !late.is_empty())
      .map(|late| AnswerVersions {
        on_time: (answer, record.timestamp),
        late: (late, record.last_timestamp),
        shown: ShownAnswer::OnTime,
      });

    let mut feedback = MSG_RESTORED.to_string();
    if let Some(score) = record.score {
      feedback = format!("Score: {score}");
    }
    if let Some(comment) = record.comment.as_deref().filter(|c| !c.is_empty()) {
      feedback.push_str(&format!(" -- {comment}"));
    }
    self.state = if record.score.is_some() || record.comment.is_some() {
      AnswerState::FeedbackAvailable
    } else {
      AnswerState::AnsweredSaved
    };
    self.feedback = feedback;
    self.feedback_ok = true;
  }

  /// Flip between on-time and late answers. Returns false when there is nothing to toggle.
  pub fn toggle_answer(&mut self) -> bool {
    let Some(v) = self.versions.as_mut() else {
      return false;
    };
    v.shown = match v.shown {
      ShownAnswer::OnTime => ShownAnswer::Late,
      ShownAnswer::Late => ShownAnswer::OnTime,
    };
    let (text, ts) = match v.shown {
      ShownAnswer::OnTime => v.on_time.clone(),
      ShownAnswer::Late => v.late.clone(),
    };
    debug!(target: "shortanswer", div_id = %self.opts.div_id, shown = ?v.shown, "Toggled answer");
    self.text = text;
    self.timestamp = ts;
    true
  }

  /// Ask the log whether an attachment exists and remember its file name.
  pub async fn load_attachment_name(&mut self, log: &dyn AnswerLog) -> Result<Option<&str>, RegistryError> {
    let key = log.fetch_attachment_name(&self.opts.div_id, self.opts.sid.as_deref()).await?;
    self.attachment_name = key.map(|k| basename(&k).to_string());
    Ok(self.attachment_name.as_deref())
  }

  pub fn view(&self) -> ShortAnswerView {
    let shown = self.versions.as_ref().map(|v| v.shown);
    ShortAnswerView {
      div_id: self.opts.div_id.clone(),
      placeholder: self.opts.placeholder.clone().unwrap_or_else(|| "Write your answer here".into()),
      text: self.text.clone(),
      rendered_answer: render_math(&self.text),
      state: self.state,
      feedback: self.feedback.clone(),
      feedback_class: if self.feedback_ok { "alert alert-success" } else { "alert alert-danger" },
      timestamp: self.timestamp,
      toggle_label: shown.map(|s| match s {
        ShownAnswer::OnTime => "Show Late Answer",
        ShownAnswer::Late => "Show on-Time Answer",
      }),
      shown,
      attachment_name: self.attachment_name.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use chrono::TimeZone;

  #[derive(Default)]
  struct RecordingLog {
    events: Mutex<Vec<AnswerEvent>>,
    uploads: Mutex<Vec<String>>,
    fail: bool,
  }

  impl RecordingLog {
    fn calls(&self) -> usize {
      self.events.lock().unwrap().len() + self.uploads.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl AnswerLog for RecordingLog {
    async fn log_answer_event(&self, event: AnswerEvent) -> Result<(), RegistryError> {
      if self.fail {
        return Err(RegistryError::Transport("offline".into()));
      }
      self.events.lock().unwrap().push(event);
      Ok(())
    }
    async fn upload_attachment(&self, _div_id: &str, _sid: Option<&str>, file: AttachmentFile) -> Result<(), RegistryError> {
      self.uploads.lock().unwrap().push(file.filename);
      Ok(())
    }
    async fn fetch_attachment_name(&self, _div_id: &str, _sid: Option<&str>) -> Result<Option<String>, RegistryError> {
      Ok(Some("course/q1/alice/essay.pdf".into()))
    }
    async fn fetch_answer(&self, _: &str, _: &str, _: Option<DateTime<Utc>>) -> Result<Option<AnswerRecord>, RegistryError> {
      Ok(None)
    }
  }

  fn opts(attachment: bool) -> ShortAnswerOptions {
    ShortAnswerOptions {
      div_id: "q1".into(),
      course: "cs1".into(),
      sid: Some("alice".into()),
      attachment,
      ..Default::default()
    }
  }

  fn file(name: &str, size: usize) -> AttachmentFile {
    AttachmentFile { filename: name.into(), bytes: vec![0u8; size] }
  }

  #[test]
  fn attachment_rules() {
    assert_eq!(check_attachment(&file("run.exe", 10)), Err(AttachmentError::TypeNotAllowed));
    assert_eq!(check_attachment(&file("big.png", 6 * 1024 * 1024)), Err(AttachmentError::TooLarge));
    assert_eq!(check_attachment(&file("ok.png", 1024 * 1024)), Ok(()));
  }

  #[tokio::test]
  async fn rejected_attachments_are_never_transmitted() {
    let log = RecordingLog::default();
    let mut sa = ShortAnswer::new(opts(true), MemoryStorage::default());
    sa.set_text("my answer");

    sa.attach(file("virus.exe", 100));
    let err = sa.log_current_answer(&log).await.unwrap_err();
    assert_eq!(err, ShortAnswerError::Attachment(AttachmentError::TypeNotAllowed));
    assert!(sa.view().feedback.starts_with("File type not allowed"));

    sa.attach(file("scan.png", 6 * 1024 * 1024));
    let err = sa.log_current_answer(&log).await.unwrap_err();
    assert_eq!(err, ShortAnswerError::Attachment(AttachmentError::TooLarge));
    assert_eq!(log.calls(), 0);

    sa.attach(file("scan.png", 1024 * 1024));
    sa.log_current_answer(&log).await.unwrap();
    assert_eq!(log.uploads.lock().unwrap().as_slice(), ["scan.png".to_string()]);
    assert_eq!(sa.state(), AnswerState::AnsweredSaved);
    assert_eq!(sa.view().feedback, MSG_SAVED);
  }

  #[tokio::test]
  async fn checkpoint_survives_reload() {
    let storage = MemoryStorage::default();
    let mut first = ShortAnswer::new(opts(false), storage.clone());
    first.set_text("draft text");
    assert_eq!(first.state(), AnswerState::AnsweredUnsaved);
    first.check_current_answer();

    let mut reloaded = ShortAnswer::new(opts(false), storage);
    assert_eq!(reloaded.state(), AnswerState::Unanswered);
    reloaded.check_local_storage();
    assert_eq!(reloaded.text(), "draft text");
    assert_eq!(reloaded.view().feedback, MSG_RESTORED);
  }

  #[test]
  fn corrupt_checkpoint_is_discarded() {
    let storage = MemoryStorage::default();
    let mut sa = ShortAnswer::new(opts(false), storage.clone());
    storage.set_item(&sa.local_storage_key(), "{not json".into());
    sa.check_local_storage();
    assert_eq!(sa.state(), AnswerState::Unanswered);
    assert!(storage.get_item(&sa.local_storage_key()).is_none());
  }

  #[test]
  fn grader_never_touches_local_storage() {
    let storage = MemoryStorage::default();
    let mut sa = ShortAnswer::new(ShortAnswerOptions { grader_active: true, ..opts(false) }, storage.clone());
    sa.set_text("x");
    sa.check_current_answer();
    assert!(storage.get_item(&sa.local_storage_key()).is_none());
  }

  #[tokio::test]
  async fn failed_log_keeps_answer_unsaved() {
    let log = RecordingLog { fail: true, ..Default::default() };
    let mut sa = ShortAnswer::new(opts(false), MemoryStorage::default());
    sa.set_text("x");
    assert!(matches!(sa.log_current_answer(&log).await, Err(ShortAnswerError::Registry(_))));
    assert_eq!(sa.state(), AnswerState::AnsweredUnsaved);
    assert_eq!(sa.view().feedback_class, "alert alert-danger");
  }

  #[tokio::test]
  async fn toggle_swaps_between_on_time_and_late() {
    let log = RecordingLog::default();
    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
    let storage = MemoryStorage::default();
    let mut sa = ShortAnswer::new(opts(false), storage.clone());
    sa.restore_answers(AnswerRecord {
      answer: Some("on time".into()),
      timestamp: Some(t1),
      last_answer: Some("late one".into()),
      last_timestamp: Some(t2),
      score: Some(8.0),
      comment: Some("good".into()),
    });

    let v = sa.view();
    assert_eq!((v.text.as_str(), v.timestamp), ("on time", Some(t1)));
    assert_eq!(v.toggle_label, Some("Show Late Answer"));
    assert_eq!(v.feedback, "Score: 8 -- good");
    assert_eq!(v.state, AnswerState::FeedbackAvailable);

    assert!(sa.toggle_answer());
    let v = sa.view();
    assert_eq!((v.text.as_str(), v.timestamp), ("late one", Some(t2)));
    assert_eq!(v.toggle_label, Some("Show on-Time Answer"));

    assert!(sa.toggle_answer());
    assert_eq!(sa.text(), "on time");
    assert_eq!(log.calls(), 0);
    assert!(storage.get_item(&sa.local_storage_key()).is_none());
  }

  #[test]
  fn no_toggle_without_late_answer() {
    let mut sa = ShortAnswer::new(opts(false), MemoryStorage::default());
    sa.restore_answers(AnswerRecord { answer: None, ..Default::default() });
    assert_eq!(sa.text(), "");
    assert!(!sa.toggle_answer());
    assert_eq!(sa.view().toggle_label, None);
    assert_eq!(sa.state(), AnswerState::AnsweredSaved);
  }

  #[tokio::test]
  async fn attachment_name_is_basename() {
    let log = RecordingLog::default();
    let mut sa = ShortAnswer::new(opts(true), MemoryStorage::default());
    assert_eq!(sa.load_attachment_name(&log).await.unwrap(), Some("essay.pdf"));
  }

  #[test]
  fn math_rendering() {
    assert_eq!(render_math("$$x^2$$ and $y$\nnext"), r"\[ x^2 \] and \( y \)<br/>next");
  }
}
