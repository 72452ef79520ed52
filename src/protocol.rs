//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datafile::{DataFileField, DataFileForm, DataFileOption, SourceType};
use crate::domain::{DataFileRecord, ExerciseDraft, ExerciseType, ReadingNode};
use crate::registry::SaveMode;
use crate::steps::ValidationError;
use crate::wizard::{FieldUpdate, WizardView};

/// Envelope used by every JSON response, success or error.
#[derive(Debug, Serialize, Deserialize)]
pub struct Detail<T> {
    pub detail: T,
}

impl<T> Detail<T> {
    pub fn new(detail: T) -> Self {
        Self { detail }
    }
}

/// Messages the editor client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    UpdateField {
        update: FieldUpdate,
    },
    Next,
    Prev,
    JumpTo {
        step: usize,
    },
    AddChoice,
    RemoveChoice {
        index: usize,
    },
    /// `""` clears, `CREATE_NEW` opens the create form, anything else is a data-file name.
    SelectDataFile {
        value: String,
    },
    DataFileSource {
        source: SourceType,
    },
    DataFileText {
        content: String,
    },
    DataFileField {
        update: DataFileField,
    },
    DataFileUpload {
        filename: String,
        #[serde(rename = "contentBase64")]
        content_base64: String,
    },
    CreateDataFile,
    Save,
    Cancel,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Wizard {
        editor: EditorSnapshot,
    },
    Error {
        message: String,
    },
}

/// Everything the editor UI renders: wizard state plus the data-file picker.
#[derive(Debug, Serialize)]
pub struct EditorSnapshot {
    pub wizard: WizardView,
    pub datafile_options: Vec<DataFileOption>,
    /// Present while the create-new form is open.
    pub datafile_form: Option<DataFileForm>,
}

#[derive(Debug, Deserialize)]
pub struct EditorQuery {
    #[serde(rename = "type")]
    pub kind: ExerciseType,
    #[serde(default)]
    pub assignment_id: u64,
    /// Name of an existing exercise in the assignment to edit.
    #[serde(default)]
    pub edit: Option<String>,
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub backend: &'static str,
    pub course: String,
}

#[derive(Debug, Deserialize)]
pub struct DataFileOptionsQuery {
    #[serde(default)]
    pub language: String,
}

/// `question` anchors the fragment; it defaults to the data-file name.
#[derive(Debug, Deserialize)]
pub struct DataFilePreviewQuery {
    pub name: String,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Deserialize)]
pub struct PreviewIn {
    pub draft: ExerciseDraft,
    /// Overrides registry lookup of the draft's data-file reference.
    #[serde(default)]
    pub datafile: Option<DataFileRecord>,
}

#[derive(Serialize)]
pub struct PreviewOut {
    pub html: String,
}

#[derive(Deserialize)]
pub struct ValidateIn {
    #[serde(default)]
    pub step: Option<usize>,
    pub draft: ExerciseDraft,
}

#[derive(Serialize)]
pub struct ValidateOut {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub steps_validity: Vec<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveExerciseRequest {
    pub assignment_id: u64,
    #[serde(default)]
    pub mode: SaveMode,
    pub draft: ExerciseDraft,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveExercisesRequest {
    pub ids: Vec<u64>,
}

#[derive(Serialize)]
pub struct RemovedOut {
    pub removed: usize,
    pub message: String,
}

#[derive(Deserialize)]
pub struct AddReadingsIn {
    pub assignment_id: u64,
    pub node: ReadingNode,
}

#[derive(Debug, Deserialize)]
pub struct SidQuery {
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub sid: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct UploadOut {
    pub filename: String,
}
