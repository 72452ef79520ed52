//! Application state: the collaborator set every handler works against.
//!
//! This module owns:
//!   - the course the builder serves
//!   - one handle per collaborator trait (data files, exercises, readings,
//!     answer log, accommodations)
//!
//! With RUNESTONE_BASE_URL set, every collaborator is the remote client;
//! otherwise an in-memory backend seeded from config and built-in data.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::RunestoneClient;
use crate::config::{load_builder_config_from_env, BuilderConfig};
use crate::memory::MemoryBackend;
use crate::registry::{AccommodationStore, AnswerLog, DataFileRegistry, ExerciseStore, ReadingCatalog};
use crate::seeds::{readings_from_config, seed_datafiles, seed_readings};

#[derive(Clone)]
pub struct AppState {
    pub course: String,
    /// "memory" or "remote"
    pub backend: &'static str,
    pub datafiles: Arc<dyn DataFileRegistry>,
    pub exercises: Arc<dyn ExerciseStore>,
    pub readings: Arc<dyn ReadingCatalog>,
    pub answers: Arc<dyn AnswerLog>,
    pub accommodations: Arc<dyn AccommodationStore>,
}

impl AppState {
    /// Build state from env: load config, then pick the remote client or a seeded memory backend.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_builder_config_from_env().unwrap_or_default();

        if let Some(client) = RunestoneClient::from_env() {
            info!(target: "runestone_builder", base_url = %client.base_url, course = %cfg.course, "Using remote Runestone server.");
            return Self::with_remote(client, cfg.course);
        }
        info!(target: "runestone_builder", course = %cfg.course, "No RUNESTONE_BASE_URL. Using in-memory backend.");
        Self::with_memory(seeded_backend(&cfg))
    }

    pub fn with_memory(backend: MemoryBackend) -> Self {
        let course = backend.course().to_string();
        Self::from_backend(backend, "memory", course)
    }

    pub fn with_remote(client: RunestoneClient, course: String) -> Self {
        Self::from_backend(client, "remote", course)
    }

    fn from_backend<B>(backend: B, kind: &'static str, course: String) -> Self
    where
        B: DataFileRegistry + ExerciseStore + ReadingCatalog + AnswerLog + AccommodationStore + 'static,
    {
        let b = Arc::new(backend);
        Self {
            course,
            backend: kind,
            datafiles: b.clone(),
            exercises: b.clone(),
            readings: b.clone(),
            answers: b.clone(),
            accommodations: b,
        }
    }
}

/// Memory backend holding the config banks, falling back to built-in seeds when a bank is empty.
pub fn seeded_backend(cfg: &BuilderConfig) -> MemoryBackend {
    let datafiles = if cfg.datafiles.is_empty() {
        seed_datafiles()
    } else {
        cfg.datafiles.iter().map(|d| d.to_request()).collect()
    };
    let readings = if cfg.readings.is_empty() {
        seed_readings()
    } else {
        readings_from_config(&cfg.readings)
    };
    MemoryBackend::seeded(cfg.course.clone(), datafiles, readings)
}
