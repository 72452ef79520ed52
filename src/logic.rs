//! Core operations shared by the HTTP and WebSocket front ends.

use tracing::{info, instrument, warn};

use crate::datafile::DataFileAssociation;
use crate::domain::{DataFileRecord, ExerciseDraft};
use crate::preview::{generate_preview, hydrate_draft};
use crate::protocol::{EditorQuery, SaveExerciseRequest, ValidateOut};
use crate::registry::{RegistryError, SavedExercise};
use crate::state::AppState;
use crate::steps::{steps_validity, validate_form, validate_step};
use crate::wizard::{ExerciseWizard, WizardError};

/// Look up the data file a code draft references. Registry failures degrade to "no data file".
pub async fn resolve_datafile(state: &AppState, draft: &ExerciseDraft) -> Option<DataFileRecord> {
  let name = draft.active_code()?.datafile.clone()?;
  match state.datafiles.list_data_files().await {
    Ok(files) => files.into_iter().find(|df| df.name == name),
    Err(e) => {
      warn!(target: "builder", %name, error = %e, "Data file lookup failed; previewing without it");
      None
    }
  }
}

pub async fn render_preview(state: &AppState, draft: &ExerciseDraft, datafile: Option<DataFileRecord>) -> String {
  let datafile = match datafile {
    Some(df) => Some(df),
    None => resolve_datafile(state, draft).await,
  };
  generate_preview(draft, datafile.as_ref())
}

/// One step's errors, or the whole form's when `step` is None.
pub fn validate(step: Option<usize>, draft: &ExerciseDraft) -> ValidateOut {
  let errors = match step {
    Some(s) => validate_step(s, draft),
    None => validate_form(draft),
  };
  ValidateOut { valid: errors.is_empty(), errors, steps_validity: steps_validity(draft) }
}

/// Validate, render and persist a complete draft.
#[instrument(level = "info", skip(state, req), fields(assignment_id = req.assignment_id, name = %req.draft.name, mode = ?req.mode))]
pub async fn save_draft(state: &AppState, req: SaveExerciseRequest) -> Result<SavedExercise, WizardError> {
  let mut draft = req.draft;
  let errors = validate_form(&draft);
  if !errors.is_empty() {
    return Err(WizardError::FormInvalid(errors));
  }
  draft.htmlsrc = render_preview(state, &draft, None).await;
  let saved = state.exercises.save_exercise(req.assignment_id, &draft, req.mode).await?;
  info!(target: "builder", id = saved.id, html_len = draft.htmlsrc.len(), "Exercise saved over HTTP");
  Ok(saved)
}

/// Wizard and data-file picker for a new editor session.
#[instrument(level = "info", skip(state))]
pub async fn open_editor(state: &AppState, q: &EditorQuery) -> Result<(ExerciseWizard, DataFileAssociation), RegistryError> {
  let known = state.datafiles.list_data_files().await?;

  let mut wizard = match &q.edit {
    Some(name) => {
      let existing = state.exercises.list_assignment_exercises(q.assignment_id).await?;
      let ex = existing
        .iter()
        .find(|e| &e.name == name)
        .ok_or_else(|| RegistryError::NotFound(format!("exercise {name} in assignment {}", q.assignment_id)))?;
      let draft = hydrate_draft(ex, &known);
      if draft.exercise_type() != q.kind {
        warn!(target: "builder", %name, requested = q.kind.as_str(), stored = draft.exercise_type().as_str(), "Editing with stored exercise type");
      }
      ExerciseWizard::edit(draft)
    }
    None => ExerciseWizard::new(q.kind),
  };
  wizard.set_datafiles(known.clone());
  Ok((wizard, DataFileAssociation::new(known)))
}
