//! Data-file association for code exercises: the selector options, the
//! create-new form and its client-side checks, and the create call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::{DataFileCreated, DataFileRecord, DataFileRequest};
use crate::preview::is_image_type;
use crate::registry::{DataFileRegistry, RegistryError};
use crate::steps::language_supports_datafiles;
use crate::util::file_suffix;

/// Sentinel option value for "create a new data file".
pub const CREATE_NEW: &str = "CREATE_NEW";
pub const MAX_FILE_SIZE: usize = 15_000_000;
pub const TEXTAREA_FILENAME: &str = "content.txt";
const DEFAULT_FILE_TYPE: &str = "txt";
pub const DEFAULT_ROWS: u32 = 10;
pub const DEFAULT_COLS: u32 = 50;

#[derive(Debug, Error, PartialEq)]
pub enum DataFileError {
  #[error("All fields are required")]
  MissingFields,
  #[error("DataFile with this name already exists")]
  DuplicateName,
  #[error("File exceeds the 15MB limit")]
  TooLarge,
  #[error("Text files must be UTF-8")]
  NotUtf8,
  #[error("Data files are not available for {0}")]
  LanguageNotSupported(String),
  #[error("Failed to create DataFile: {0}")]
  Registry(#[from] RegistryError),
}

/// Size of the file a request carries: decoded bytes for images (sent as
/// base64), the text length otherwise. This is what `MAX_FILE_SIZE` caps.
pub fn content_size(file_type: &str, file_content: &str) -> usize {
  if !is_image_type(file_type) {
    return file_content.len();
  }
  let padding = file_content.bytes().rev().take_while(|b| *b == b'=').count();
  (file_content.len() / 4 * 3).saturating_sub(padding)
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DataFileOption {
  pub label: String,
  pub value: String,
  pub description: String,
}

/// Options offered by the selector for a given exercise language.
pub fn selector_options(language: &str, known: &[DataFileRecord]) -> Vec<DataFileOption> {
  let mut options = vec![DataFileOption {
    label: "No DataFile".into(),
    value: String::new(),
    description: "Don't use any data file".into(),
  }];
  if !language_supports_datafiles(language) {
    return options;
  }
  options.push(DataFileOption {
    label: "+ Create New DataFile".into(),
    value: CREATE_NEW.into(),
    description: "Create a new data file".into(),
  });
  options.extend(known.iter().map(|df| DataFileOption {
    label: format!("{} ({})", df.name, df.filename),
    value: df.name.clone(),
    description: format!(
      "{} • {} KB",
      df.file_type.to_uppercase(),
      (df.file_content.len() as f64 / 1024.0).round() as u64
    ),
  }));
  options
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  #[default]
  Textarea,
  File,
}

/// The create-new form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFileForm {
  pub name: String,
  pub filename: String,
  pub file_content: String,
  pub file_type: String,
  pub source_type: SourceType,
  pub is_editable: bool,
  pub rows: u32,
  pub cols: u32,
  /// Typed body kept separately so switching back to text restores it.
  pub textarea_content: String,
}

impl Default for DataFileForm {
  fn default() -> Self {
    Self {
      name: String::new(),
      filename: String::new(),
      file_content: String::new(),
      file_type: DEFAULT_FILE_TYPE.into(),
      source_type: SourceType::Textarea,
      is_editable: false,
      rows: DEFAULT_ROWS,
      cols: DEFAULT_COLS,
      textarea_content: String::new(),
    }
  }
}

/// Scalar form edits. JSON form: `{"field": "rows", "value": 12}`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum DataFileField {
  Name(String),
  Filename(String),
  IsEditable(bool),
  Rows(u32),
  Cols(u32),
}

impl DataFileForm {
  pub fn set_source_type(&mut self, source: SourceType) {
    self.source_type = source;
    match source {
      SourceType::Textarea => {
        self.filename = TEXTAREA_FILENAME.into();
        self.file_type = DEFAULT_FILE_TYPE.into();
        self.file_content = self.textarea_content.clone();
      }
      SourceType::File => {
        self.filename.clear();
        self.file_type.clear();
        self.file_content.clear();
        self.textarea_content.clear();
      }
    }
  }

  pub fn set_text(&mut self, content: String) {
    self.file_content = content.clone();
    self.textarea_content = content;
  }

  pub fn set_field(&mut self, field: DataFileField) {
    match field {
      DataFileField::Name(v) => self.name = v,
      DataFileField::Filename(v) => self.filename = v,
      DataFileField::IsEditable(v) => self.is_editable = v,
      DataFileField::Rows(v) => self.rows = if v == 0 { DEFAULT_ROWS } else { v },
      DataFileField::Cols(v) => self.cols = if v == 0 { DEFAULT_COLS } else { v },
    }
  }

  /// Load an uploaded file: images become base64, anything else must be UTF-8 text.
  pub fn load_upload(&mut self, filename: &str, bytes: &[u8]) -> Result<(), DataFileError> {
    if bytes.len() > MAX_FILE_SIZE {
      return Err(DataFileError::TooLarge);
    }
    let mut file_type = file_suffix(filename);
    if file_type.is_empty() {
      file_type = DEFAULT_FILE_TYPE.into();
    }
    let content = if is_image_type(&file_type) {
      BASE64.encode(bytes)
    } else {
      String::from_utf8(bytes.to_vec()).map_err(|_| DataFileError::NotUtf8)?
    };
    self.filename = filename.to_string();
    self.file_type = file_type;
    self.file_content = content;
    Ok(())
  }

  /// Client-side checks before anything is sent to the registry.
  pub fn validate(&self, known: &[DataFileRecord]) -> Result<DataFileRequest, DataFileError> {
    if self.name.trim().is_empty() || self.filename.trim().is_empty() || self.file_content.is_empty() {
      return Err(DataFileError::MissingFields);
    }
    if known.iter().any(|df| df.name == self.name) {
      return Err(DataFileError::DuplicateName);
    }
    Ok(DataFileRequest {
      name: self.name.clone(),
      filename: self.filename.clone(),
      file_content: self.file_content.clone(),
      file_type: self.file_type.clone(),
      is_editable: self.is_editable,
      rows: self.rows,
      cols: self.cols,
    })
  }
}

/// Selection state of one editor's data-file picker.
#[derive(Default)]
pub struct DataFileAssociation {
  known: Vec<DataFileRecord>,
  pub form: DataFileForm,
}

impl DataFileAssociation {
  pub fn new(known: Vec<DataFileRecord>) -> Self {
    Self { known, form: DataFileForm::default() }
  }

  pub fn known(&self) -> &[DataFileRecord] { &self.known }

  pub fn options(&self, language: &str) -> Vec<DataFileOption> {
    selector_options(language, &self.known)
  }

  pub fn find(&self, name: &str) -> Option<&DataFileRecord> {
    self.known.iter().find(|df| df.name == name)
  }

  #[instrument(level = "debug", skip(self, registry))]
  pub async fn refresh(&mut self, registry: &dyn DataFileRegistry) -> Result<(), RegistryError> {
    self.known = registry.list_data_files().await?;
    Ok(())
  }

  /// Validate the form, create the record and refetch the list.
  /// The returned `acid` is what the draft should reference.
  #[instrument(level = "info", skip(self, registry), fields(name = %self.form.name, bytes = self.form.file_content.len()))]
  pub async fn create(
    &mut self,
    registry: &dyn DataFileRegistry,
    language: &str,
  ) -> Result<DataFileCreated, DataFileError> {
    if !language_supports_datafiles(language) {
      return Err(DataFileError::LanguageNotSupported(language.to_string()));
    }
    let request = self.form.validate(&self.known)?;
    let created = registry.create_data_file(request).await.map_err(|e| {
      warn!(target: "datafile", error = %e, "DataFile create failed");
      DataFileError::Registry(e)
    })?;
    info!(target: "datafile", acid = %created.acid, filename = %created.filename, "DataFile created");
    self.form = DataFileForm::default();
    if let Err(e) = self.refresh(registry).await {
      warn!(target: "datafile", error = %e, "DataFile list refetch failed");
    }
    Ok(created)
  }
}
