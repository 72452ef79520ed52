//! Wizard step sequences and their validators.
//!
//! Each editor type has a fixed ordered list of steps. A step is valid iff its
//! validator returns no errors. `validate_form` is the concatenation of every
//! step validator, so a draft passes the save-time check exactly when each
//! step passes on its own.

use serde::{Deserialize, Serialize};

use crate::domain::{ActiveCodeBody, ExerciseDraft, ExercisePayload, ExerciseType, MultipleChoiceBody};

/// Languages that may carry a data file.
pub const DATAFILE_LANGUAGES: &[&str] = &["python", "java"];

pub const MAX_LONG_TEXT: usize = 10_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MIN_CHOICES: usize = 2;
pub const MAX_CHOICES: usize = 10;
pub const MAX_DIFFICULTY: u8 = 5;

pub const PREVIEW_LABEL: &str = "Preview";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct StepDescriptor {
  pub label: &'static str,
}

pub const ACTIVE_CODE_STEPS: &[StepDescriptor] = &[
  StepDescriptor { label: "Language & DataFile" },
  StepDescriptor { label: "Instructions" },
  StepDescriptor { label: "Hidden Prefix" },
  StepDescriptor { label: "Starter Code" },
  StepDescriptor { label: "Hidden Suffix" },
  StepDescriptor { label: "Settings" },
  StepDescriptor { label: PREVIEW_LABEL },
];

pub const MULTIPLE_CHOICE_STEPS: &[StepDescriptor] = &[
  StepDescriptor { label: "Question Prompt" },
  StepDescriptor { label: "Choices" },
  StepDescriptor { label: "Correct Answers" },
  StepDescriptor { label: "Feedback" },
  StepDescriptor { label: "Settings" },
  StepDescriptor { label: PREVIEW_LABEL },
];

pub fn steps_for(kind: ExerciseType) -> &'static [StepDescriptor] {
  match kind {
    ExerciseType::ActiveCode => ACTIVE_CODE_STEPS,
    ExerciseType::MultipleChoice => MULTIPLE_CHOICE_STEPS,
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
  pub field: String,
  pub message: String,
}

impl ValidationError {
  fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self { field: field.into(), message: message.into() }
  }
}

/// Ordered errors for one step; empty means valid.
pub type ValidationResult = Vec<ValidationError>;

pub fn language_supports_datafiles(language: &str) -> bool {
  let lang = language.trim().to_lowercase();
  DATAFILE_LANGUAGES.iter().any(|l| *l == lang)
}

/// Validate one step of the draft's wizard. Out-of-range steps have nothing to check.
pub fn validate_step(step: usize, draft: &ExerciseDraft) -> ValidationResult {
  match &draft.payload {
    ExercisePayload::ActiveCode(body) => match step {
      0 => language_step(body),
      1 => required_long_text("instructions", "Instructions", &body.instructions),
      5 => settings_step(draft),
      _ => Vec::new(),
    },
    ExercisePayload::MultipleChoice(body) => match step {
      0 => required_long_text("statement", "Question prompt", &body.statement),
      1 => choices_step(body),
      2 => correct_answers_step(body),
      3 => feedback_step(body),
      4 => settings_step(draft),
      _ => Vec::new(),
    },
  }
}

/// Whole-draft check run before saving.
pub fn validate_form(draft: &ExerciseDraft) -> ValidationResult {
  let steps = steps_for(draft.exercise_type());
  let mut out: ValidationResult = Vec::new();
  for idx in 0..steps.len() {
    for err in validate_step(idx, draft) {
      if !out.contains(&err) {
        out.push(err);
      }
    }
  }
  out
}

/// Validity flag per step, in step order.
pub fn steps_validity(draft: &ExerciseDraft) -> Vec<bool> {
  (0..steps_for(draft.exercise_type()).len())
    .map(|idx| validate_step(idx, draft).is_empty())
    .collect()
}

fn language_step(body: &ActiveCodeBody) -> ValidationResult {
  let mut errors = Vec::new();
  if body.language.trim().is_empty() {
    errors.push(ValidationError::new("language", "Language is required"));
  } else if body.datafile.as_deref().is_some_and(|d| !d.is_empty())
    && !language_supports_datafiles(&body.language)
  {
    errors.push(ValidationError::new(
      "datafile",
      format!("Data files are not supported for {}", body.language),
    ));
  }
  errors
}

fn required_long_text(field: &str, label: &str, value: &str) -> ValidationResult {
  let mut errors = Vec::new();
  let len = value.trim().chars().count();
  if len == 0 {
    errors.push(ValidationError::new(field, format!("{label} is required")));
  } else if value.chars().count() > MAX_LONG_TEXT {
    errors.push(ValidationError::new(field, format!("Maximum {MAX_LONG_TEXT} symbols allowed")));
  }
  errors
}

fn choices_step(body: &MultipleChoiceBody) -> ValidationResult {
  let mut errors = Vec::new();
  let n = body.choices.len();
  if n < MIN_CHOICES {
    errors.push(ValidationError::new("choices", "At least two choices are required"));
  } else if n > MAX_CHOICES {
    errors.push(ValidationError::new("choices", format!("At most {MAX_CHOICES} choices are allowed")));
  }
  for (i, c) in body.choices.iter().enumerate() {
    if c.text.trim().is_empty() {
      errors.push(ValidationError::new(format!("choices.{i}.text"), "Choice text is required"));
    }
  }
  errors
}

fn correct_answers_step(body: &MultipleChoiceBody) -> ValidationResult {
  if body.choices.iter().any(|c| c.correct) {
    Vec::new()
  } else {
    vec![ValidationError::new("choices", "Mark at least one choice as correct")]
  }
}

fn feedback_step(body: &MultipleChoiceBody) -> ValidationResult {
  body
    .choices
    .iter()
    .enumerate()
    .filter(|(_, c)| c.feedback.trim().is_empty())
    .map(|(i, _)| ValidationError::new(format!("choices.{i}.feedback"), "Feedback is required"))
    .collect()
}

fn settings_step(draft: &ExerciseDraft) -> ValidationResult {
  let mut errors = Vec::new();
  let name = draft.name.trim();
  if name.is_empty() {
    errors.push(ValidationError::new("name", "Exercise name is required"));
  } else if name.chars().count() > MAX_NAME_LEN {
    errors.push(ValidationError::new("name", format!("Maximum {MAX_NAME_LEN} symbols allowed")));
  }
  if draft.chapter.trim().is_empty() {
    errors.push(ValidationError::new("chapter", "Chapter is required"));
  }
  if draft.difficulty == 0 || draft.difficulty > MAX_DIFFICULTY {
    errors.push(ValidationError::new("difficulty", format!("Difficulty must be between 1 and {MAX_DIFFICULTY}")));
  }
  errors
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Choice;

  fn filled_code_draft() -> ExerciseDraft {
    let mut d = ExerciseDraft::new(ExerciseType::ActiveCode);
    d.chapter = "intro".into();
    if let ExercisePayload::ActiveCode(b) = &mut d.payload {
      b.language = "python".into();
      b.instructions = "Print hello".into();
    }
    d
  }

  fn filled_mc_draft() -> ExerciseDraft {
    let mut d = ExerciseDraft::new(ExerciseType::MultipleChoice);
    d.chapter = "intro".into();
    if let ExercisePayload::MultipleChoice(b) = &mut d.payload {
      b.statement = "Pick one".into();
      b.choices = vec![
        Choice { text: "a".into(), feedback: "yes".into(), correct: true },
        Choice { text: "b".into(), feedback: "no".into(), correct: false },
      ];
    }
    d
  }

  #[test]
  fn step_counts_match_editor_type() {
    assert_eq!(steps_for(ExerciseType::ActiveCode).len(), 7);
    assert_eq!(steps_for(ExerciseType::MultipleChoice).len(), 6);
  }

  #[test]
  fn language_step_requires_a_language() {
    let d = ExerciseDraft::new(ExerciseType::ActiveCode);
    let errs = validate_step(0, &d);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].field, "language");
  }

  #[test]
  fn code_body_steps_have_no_required_fields() {
    let d = ExerciseDraft::new(ExerciseType::ActiveCode);
    for step in 2..=4 {
      assert!(validate_step(step, &d).is_empty(), "step {step}");
    }
    assert!(validate_step(99, &d).is_empty());
  }

  #[test]
  fn datafile_on_unsupported_language_is_flagged() {
    let mut d = filled_code_draft();
    if let ExercisePayload::ActiveCode(b) = &mut d.payload {
      b.language = "javascript".into();
      b.datafile = Some("ds1".into());
    }
    let errs = validate_step(0, &d);
    assert_eq!(errs[0].field, "datafile");
  }

  #[test]
  fn long_instructions_are_rejected() {
    let mut d = filled_code_draft();
    if let ExercisePayload::ActiveCode(b) = &mut d.payload {
      b.instructions = "x".repeat(MAX_LONG_TEXT + 1);
    }
    assert_eq!(validate_step(1, &d)[0].message, "Maximum 10000 symbols allowed");
  }

  #[test]
  fn multiple_choice_steps() {
    let mut d = filled_mc_draft();
    assert!(validate_form(&d).is_empty());

    if let ExercisePayload::MultipleChoice(b) = &mut d.payload {
      b.choices[1].text.clear();
      b.choices[0].correct = false;
      b.choices[0].feedback.clear();
    }
    assert_eq!(validate_step(1, &d)[0].field, "choices.1.text");
    assert_eq!(validate_step(2, &d).len(), 1);
    assert_eq!(validate_step(3, &d)[0].field, "choices.0.feedback");
  }

  #[test]
  fn tolerates_missing_optional_fields() {
    let d: ExerciseDraft = serde_json::from_value(serde_json::json!({
      "name": "bare",
      "question_type": "activecode"
    }))
    .unwrap();
    assert_eq!(d.points, 1);
    let errs = validate_form(&d);
    assert!(errs.iter().any(|e| e.field == "language"));
    assert!(errs.iter().any(|e| e.field == "chapter"));
  }

  #[test]
  fn form_validity_agrees_with_every_step() {
    let mut drafts = vec![
      ExerciseDraft::new(ExerciseType::ActiveCode),
      ExerciseDraft::new(ExerciseType::MultipleChoice),
      filled_code_draft(),
      filled_mc_draft(),
    ];
    let mut no_name = filled_code_draft();
    no_name.name.clear();
    drafts.push(no_name);
    let mut bad_difficulty = filled_mc_draft();
    bad_difficulty.difficulty = 9;
    drafts.push(bad_difficulty);

    for d in &drafts {
      let all_steps_valid = steps_validity(d).iter().all(|v| *v);
      assert_eq!(validate_form(d).is_empty(), all_steps_valid, "{}", d.name);
    }
  }
}
