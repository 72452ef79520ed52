//! Exercise-builder wizard: owns one draft, the active step and the derived
//! validity, independent of any rendering layer.
//!
//! Lifecycle: `Editing` until `save` succeeds (`Saved`) or `cancel` is called
//! (`Cancelled`). While a save is in flight the phase is `Saving`. Terminal
//! phases reject further mutation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Choice, DataFileRecord, ExerciseDraft, ExercisePayload, ExerciseType};
use crate::preview::generate_preview;
use crate::registry::{ExerciseStore, RegistryError, SaveMode, SavedExercise};
use crate::steps::{
  language_supports_datafiles, steps_for, steps_validity, validate_form, validate_step, StepDescriptor,
  ValidationError, MAX_CHOICES, MIN_CHOICES, PREVIEW_LABEL,
};
use crate::util::replace_tag;

pub const TOO_FEW_CHOICES: &str = "At least two choices are required";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
  Editing,
  Saving,
  Saved,
  Cancelled,
}

impl WizardPhase {
  /// `Saved` and `Cancelled` accept no further edits.
  pub fn is_terminal(self) -> bool {
    matches!(self, WizardPhase::Saved | WizardPhase::Cancelled)
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum WizardError {
  #[error("current step has {} validation error(s)", .0.len())]
  StepInvalid(Vec<ValidationError>),
  #[error("exercise has {} validation error(s)", .0.len())]
  FormInvalid(Vec<ValidationError>),
  #[error("step {0} does not exist")]
  StepOutOfRange(usize),
  #[error("field `{0}` does not apply to this exercise type")]
  FieldNotApplicable(&'static str),
  #[error("choice {0} does not exist")]
  NoSuchChoice(usize),
  #[error("At least two choices are required")]
  TooFewChoices,
  #[error("editor is closed")]
  Closed,
  #[error("failed to save exercise: {0}")]
  Save(#[from] RegistryError),
}

/// One typed field edit. JSON form: `{"field": "language", "value": "python"}`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate {
  Name(String),
  Author(String),
  Topic(String),
  Chapter(String),
  Subchapter(String),
  Tags(String),
  Points(u32),
  Difficulty(u8),
  Instructions(String),
  Language(String),
  PrefixCode(String),
  StarterCode(String),
  SuffixCode(String),
  Datafile(Option<String>),
  Statement(String),
  ChoiceText { index: usize, text: String },
  ChoiceFeedback { index: usize, feedback: String },
  ChoiceCorrect { index: usize, correct: bool },
}

impl FieldUpdate {
  fn key(&self) -> &'static str {
    match self {
      FieldUpdate::Name(_) => "name",
      FieldUpdate::Author(_) => "author",
      FieldUpdate::Topic(_) => "topic",
      FieldUpdate::Chapter(_) => "chapter",
      FieldUpdate::Subchapter(_) => "subchapter",
      FieldUpdate::Tags(_) => "tags",
      FieldUpdate::Points(_) => "points",
      FieldUpdate::Difficulty(_) => "difficulty",
      FieldUpdate::Instructions(_) => "instructions",
      FieldUpdate::Language(_) => "language",
      FieldUpdate::PrefixCode(_) => "prefix_code",
      FieldUpdate::StarterCode(_) => "starter_code",
      FieldUpdate::SuffixCode(_) => "suffix_code",
      FieldUpdate::Datafile(_) => "datafile",
      FieldUpdate::Statement(_) => "statement",
      FieldUpdate::ChoiceText { .. } => "choice_text",
      FieldUpdate::ChoiceFeedback { .. } => "choice_feedback",
      FieldUpdate::ChoiceCorrect { .. } => "choice_correct",
    }
  }
}

/// Render-ready snapshot of the wizard.
#[derive(Clone, Debug, Serialize)]
pub struct WizardView {
  pub exercise_type: ExerciseType,
  pub is_edit: bool,
  pub phase: WizardPhase,
  pub active_step: usize,
  pub steps: Vec<StepDescriptor>,
  pub steps_validity: Vec<bool>,
  pub is_current_step_valid: bool,
  pub errors: Vec<ValidationError>,
  pub preview: String,
  pub notice: Option<String>,
  pub draft: ExerciseDraft,
}

pub struct ExerciseWizard {
  draft: ExerciseDraft,
  steps: &'static [StepDescriptor],
  active_step: usize,
  phase: WizardPhase,
  is_edit: bool,
  errors: Vec<ValidationError>,
  preview: String,
  notice: Option<String>,
  /// Known data files, used to resolve the draft's reference for previews.
  datafiles: Vec<DataFileRecord>,
}

impl ExerciseWizard {
  /// New editor with default draft.
  pub fn new(kind: ExerciseType) -> Self {
    Self::build(ExerciseDraft::new(kind), false)
  }

  /// Editor hydrated from an existing exercise.
  pub fn edit(draft: ExerciseDraft) -> Self {
    Self::build(draft, true)
  }

  fn build(draft: ExerciseDraft, is_edit: bool) -> Self {
    let steps = steps_for(draft.exercise_type());
    let mut w = Self {
      draft,
      steps,
      active_step: 0,
      phase: WizardPhase::Editing,
      is_edit,
      errors: Vec::new(),
      preview: String::new(),
      notice: None,
      datafiles: Vec::new(),
    };
    w.refresh();
    w
  }

  pub fn draft(&self) -> &ExerciseDraft { &self.draft }
  pub fn active_step(&self) -> usize { self.active_step }
  pub fn phase(&self) -> WizardPhase { self.phase }
  pub fn errors(&self) -> &[ValidationError] { &self.errors }
  pub fn preview(&self) -> &str { &self.preview }
  pub fn notice(&self) -> Option<&str> { self.notice.as_deref() }
  pub fn steps(&self) -> &'static [StepDescriptor] { self.steps }

  pub fn is_current_step_valid(&self) -> bool {
    validate_step(self.active_step, &self.draft).is_empty()
  }

  pub fn view(&self) -> WizardView {
    WizardView {
      exercise_type: self.draft.exercise_type(),
      is_edit: self.is_edit,
      phase: self.phase,
      active_step: self.active_step,
      steps: self.steps.to_vec(),
      steps_validity: steps_validity(&self.draft),
      is_current_step_valid: self.is_current_step_valid(),
      errors: self.errors.clone(),
      preview: self.preview.clone(),
      notice: self.notice.clone(),
      draft: self.draft.clone(),
    }
  }

  /// Replace the known data-file list (e.g. after the registry was refetched).
  pub fn set_datafiles(&mut self, datafiles: Vec<DataFileRecord>) {
    self.datafiles = datafiles;
    self.refresh();
  }

  fn ensure_open(&self) -> Result<(), WizardError> {
    match self.phase {
      WizardPhase::Editing => Ok(()),
      _ => Err(WizardError::Closed),
    }
  }

  fn on_preview_step(&self) -> bool {
    self.steps.get(self.active_step).is_some_and(|s| s.label == PREVIEW_LABEL)
  }

  fn resolved_datafile(&self) -> Option<&DataFileRecord> {
    let name = self.draft.active_code()?.datafile.as_deref()?;
    self.datafiles.iter().find(|df| df.name == name)
  }

  fn render(&self) -> String {
    generate_preview(&self.draft, self.resolved_datafile())
  }

  /// Recompute the active step's errors and, on the preview step, the markup.
  fn refresh(&mut self) {
    self.errors = validate_step(self.active_step, &self.draft);
    if self.on_preview_step() {
      self.preview = self.render();
    }
  }

  #[instrument(level = "debug", skip(self, update), fields(field = update.key(), name = %self.draft.name))]
  pub fn update_field(&mut self, update: FieldUpdate) -> Result<(), WizardError> {
    self.ensure_open()?;
    let key = update.key();
    let d = &mut self.draft;
    match update {
      FieldUpdate::Name(v) => d.name = v,
      FieldUpdate::Author(v) => d.author = v,
      FieldUpdate::Topic(v) => d.topic = v,
      FieldUpdate::Chapter(v) => d.chapter = v,
      FieldUpdate::Subchapter(v) => d.subchapter = v,
      FieldUpdate::Tags(v) => d.tags = v,
      FieldUpdate::Points(v) => d.points = v,
      FieldUpdate::Difficulty(v) => d.difficulty = v,
      other => match (&mut d.payload, other) {
        (ExercisePayload::ActiveCode(b), FieldUpdate::Instructions(v)) => b.instructions = v,
        (ExercisePayload::ActiveCode(b), FieldUpdate::Language(v)) => {
          let old = std::mem::replace(&mut b.language, v);
          d.tags = replace_tag(&d.tags, &b.language, Some(old.as_str()));
          if !language_supports_datafiles(&b.language) && b.datafile.take().is_some() {
            debug!(target: "builder", language = %b.language, "Cleared data file for unsupported language");
          }
        }
        (ExercisePayload::ActiveCode(b), FieldUpdate::PrefixCode(v)) => b.code.prefix = v,
        (ExercisePayload::ActiveCode(b), FieldUpdate::StarterCode(v)) => b.code.starter = v,
        (ExercisePayload::ActiveCode(b), FieldUpdate::SuffixCode(v)) => b.code.suffix = v,
        (ExercisePayload::ActiveCode(b), FieldUpdate::Datafile(v)) => {
          b.datafile = v.filter(|s| !s.is_empty());
        }
        (ExercisePayload::MultipleChoice(b), FieldUpdate::Statement(v)) => b.statement = v,
        (ExercisePayload::MultipleChoice(b), FieldUpdate::ChoiceText { index, text }) => {
          b.choices.get_mut(index).ok_or(WizardError::NoSuchChoice(index))?.text = text;
        }
        (ExercisePayload::MultipleChoice(b), FieldUpdate::ChoiceFeedback { index, feedback }) => {
          b.choices.get_mut(index).ok_or(WizardError::NoSuchChoice(index))?.feedback = feedback;
        }
        (ExercisePayload::MultipleChoice(b), FieldUpdate::ChoiceCorrect { index, correct }) => {
          b.choices.get_mut(index).ok_or(WizardError::NoSuchChoice(index))?.correct = correct;
        }
        _ => return Err(WizardError::FieldNotApplicable(key)),
      },
    }
    self.notice = None;
    self.refresh();
    Ok(())
  }

  /// Append an empty choice. Returns false (no change) once the list is full.
  pub fn add_choice(&mut self) -> Result<bool, WizardError> {
    self.ensure_open()?;
    let ExercisePayload::MultipleChoice(b) = &mut self.draft.payload else {
      return Err(WizardError::FieldNotApplicable("choices"));
    };
    if b.choices.len() >= MAX_CHOICES {
      return Ok(false);
    }
    b.choices.push(Choice::default());
    self.refresh();
    Ok(true)
  }

  /// Remove a choice; refused while only the minimum number remain.
  pub fn remove_choice(&mut self, index: usize) -> Result<(), WizardError> {
    self.ensure_open()?;
    let ExercisePayload::MultipleChoice(b) = &mut self.draft.payload else {
      return Err(WizardError::FieldNotApplicable("choices"));
    };
    if b.choices.len() <= MIN_CHOICES {
      self.notice = Some(TOO_FEW_CHOICES.to_string());
      return Err(WizardError::TooFewChoices);
    }
    if index >= b.choices.len() {
      return Err(WizardError::NoSuchChoice(index));
    }
    b.choices.remove(index);
    self.refresh();
    Ok(())
  }

  /// Advance one step if the current one is valid. No-op on the last step.
  pub fn go_next(&mut self) -> Result<(), WizardError> {
    self.ensure_open()?;
    let errors = validate_step(self.active_step, &self.draft);
    if !errors.is_empty() {
      self.errors = errors.clone();
      return Err(WizardError::StepInvalid(errors));
    }
    if self.active_step + 1 < self.steps.len() {
      self.active_step += 1;
    }
    self.refresh();
    Ok(())
  }

  /// Step back; never gated.
  pub fn go_prev(&mut self) -> Result<(), WizardError> {
    self.ensure_open()?;
    self.active_step = self.active_step.saturating_sub(1);
    self.refresh();
    Ok(())
  }

  /// Jump to any step as long as no invalid step lies strictly between here and there.
  /// Neither the step being left nor the target is checked.
  pub fn jump_to_step(&mut self, target: usize) -> Result<(), WizardError> {
    self.ensure_open()?;
    if target >= self.steps.len() {
      return Err(WizardError::StepOutOfRange(target));
    }
    let current = self.active_step;
    let gated: Vec<usize> = if target > current {
      (current + 1..target).collect()
    } else {
      (target + 1..current).collect()
    };
    for step in gated {
      let errors = validate_step(step, &self.draft);
      if !errors.is_empty() {
        debug!(target: "builder", from = current, to = target, blocked_at = step, "Step jump refused");
        self.errors = errors.clone();
        return Err(WizardError::StepInvalid(errors));
      }
    }
    self.active_step = target;
    self.refresh();
    Ok(())
  }

  /// Validate the whole draft, render final markup and persist it.
  /// On any failure the wizard stays in `Editing` so the author can retry.
  #[instrument(level = "info", skip(self, store), fields(name = %self.draft.name, kind = self.draft.exercise_type().as_str()))]
  pub async fn save(&mut self, store: &dyn ExerciseStore, assignment_id: u64) -> Result<SavedExercise, WizardError> {
    self.ensure_open()?;
    let errors = validate_form(&self.draft);
    if !errors.is_empty() {
      info!(target: "builder", errors = errors.len(), "Save blocked by validation");
      self.errors = errors.clone();
      return Err(WizardError::FormInvalid(errors));
    }

    self.preview = self.render();
    self.draft.htmlsrc = self.preview.clone();
    self.phase = WizardPhase::Saving;

    let mode = if self.is_edit { SaveMode::Replace } else { SaveMode::Create };
    match store.save_exercise(assignment_id, &self.draft, mode).await {
      Ok(saved) => {
        self.phase = WizardPhase::Saved;
        self.notice = Some(format!("Exercise \"{}\" saved", saved.name));
        info!(target: "builder", id = saved.id, "Exercise saved");
        Ok(saved)
      }
      Err(e) => {
        self.phase = WizardPhase::Editing;
        self.notice = Some(format!("Failed to save exercise: {e}"));
        warn!(target: "builder", error = %e, "Exercise save failed");
        Err(WizardError::Save(e))
      }
    }
  }

  /// Discard the draft.
  pub fn cancel(&mut self) {
    if self.phase == WizardPhase::Editing {
      self.phase = WizardPhase::Cancelled;
      debug!(target: "builder", name = %self.draft.name, "Editor cancelled");
    }
  }
}
