//! Loading builder configuration (course + optional data-file and readings banks) from TOML.
//!
//! See `BuilderConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::datafile::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::domain::DataFileRequest;
use crate::util::file_suffix;

pub const DEFAULT_COURSE: &str = "overview";

#[derive(Clone, Debug, Deserialize)]
pub struct BuilderConfig {
  #[serde(default = "default_course")]
  pub course: String,
  #[serde(default)]
  pub datafiles: Vec<DataFileCfg>,
  #[serde(default)]
  pub readings: Vec<ChapterCfg>,
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self { course: default_course(), datafiles: Vec::new(), readings: Vec::new() }
  }
}

fn default_course() -> String {
  DEFAULT_COURSE.into()
}

/// Data-file entry accepted in TOML configuration. `file_type` defaults to the filename suffix.
#[derive(Clone, Debug, Deserialize)]
pub struct DataFileCfg {
  pub name: String,
  pub filename: String,
  pub content: String,
  #[serde(default)] pub file_type: Option<String>,
  #[serde(default)] pub is_editable: bool,
  #[serde(default)] pub rows: Option<u32>,
  #[serde(default)] pub cols: Option<u32>,
}

impl DataFileCfg {
  pub fn to_request(&self) -> DataFileRequest {
    let file_type = self
      .file_type
      .clone()
      .filter(|t| !t.is_empty())
      .unwrap_or_else(|| file_suffix(&self.filename));
    DataFileRequest {
      name: self.name.clone(),
      filename: self.filename.clone(),
      file_content: self.content.clone(),
      file_type,
      is_editable: self.is_editable,
      rows: self.rows.unwrap_or(DEFAULT_ROWS),
      cols: self.cols.unwrap_or(DEFAULT_COLS),
    }
  }
}

/// One chapter of the readings bank.
#[derive(Clone, Debug, Deserialize)]
pub struct ChapterCfg {
  pub chapter: String,
  pub title: String,
  #[serde(default)]
  pub subchapters: Vec<SubchapterCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubchapterCfg {
  pub id: u64,
  pub subchapter: String,
  pub title: String,
  #[serde(default)] pub num: u32,
  #[serde(default)] pub num_questions: u32,
}

/// Attempt to load `BuilderConfig` from BUILDER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_builder_config_from_env() -> Option<BuilderConfig> {
  let path = std::env::var("BUILDER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<BuilderConfig>(&s) {
      Ok(cfg) => {
        info!(target: "runestone_builder", %path, course = %cfg.course, "Loaded builder config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "runestone_builder", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "runestone_builder", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
