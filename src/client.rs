//! HTTP client for a remote Runestone server.
//!
//! Speaks the same `{"detail": ...}` API that `routes::http` exposes, so a
//! builder can sit in front of another builder instance or a real server.
//! Calls log paths, status codes and latencies, never payload bodies or the token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::domain::{
  Accommodation, AssignmentExercise, AssignmentExerciseFields, DataFileCreated, DataFileRecord,
  DataFileRequest, ExerciseDraft, ReadingNode, ReadingsFilter,
};
use crate::protocol::{Detail, RemoveExercisesRequest, SaveExerciseRequest};
use crate::registry::{
  AccommodationStore, AnswerEvent, AnswerLog, AnswerRecord, AttachmentFile, DataFileRegistry,
  ExerciseStore, ReadingCatalog, RegistryError, SaveMode, SavedExercise,
};

const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Clone)]
pub struct RunestoneClient {
  client: reqwest::Client,
  pub base_url: String,
  token: Option<String>,
}

impl RunestoneClient {
  /// Build the client if RUNESTONE_BASE_URL is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("RUNESTONE_BASE_URL").ok()?;
    let token = std::env::var("RUNESTONE_API_TOKEN").ok().filter(|t| !t.is_empty());
    let timeout = std::env::var("RUNESTONE_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(DEFAULT_TIMEOUT_SECS);
    match Self::new(&base_url, token, Duration::from_secs(timeout)) {
      Ok(c) => Some(c),
      Err(e) => {
        warn!(target: "runestone_builder", error = %e, "Could not build Runestone client");
        None
      }
    }
  }

  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, RegistryError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), token })
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let rb = self
      .client
      .request(method, format!("{}{}", self.base_url, path))
      .header(USER_AGENT, concat!("runestone-builder/", env!("CARGO_PKG_VERSION")));
    match &self.token {
      Some(t) => rb.header(AUTHORIZATION, format!("Bearer {t}")),
      None => rb,
    }
  }

  /// Send and unwrap the `detail` envelope.
  #[instrument(level = "debug", skip(self, rb))]
  async fn send<T: DeserializeOwned>(&self, path: &str, rb: RequestBuilder) -> Result<T, RegistryError> {
    let start = std::time::Instant::now();
    let res = rb.send().await?;
    let status = res.status();
    debug!(target: "runestone_builder", %path, status = status.as_u16(), elapsed = ?start.elapsed(), "Remote call");

    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(status_error(status, &body));
    }
    let body: Detail<T> = res.json().await?;
    Ok(body.detail)
  }
}

/// Map a non-success response to a `RegistryError`, preferring the `detail` message.
fn status_error(status: StatusCode, body: &str) -> RegistryError {
  let message = serde_json::from_str::<Detail<serde_json::Value>>(body)
    .map(|d| match d.detail {
      serde_json::Value::String(s) => s,
      other => other.to_string(),
    })
    .unwrap_or_else(|_| body.to_string());
  match status {
    StatusCode::NOT_FOUND => RegistryError::NotFound(message),
    StatusCode::CONFLICT => RegistryError::Conflict(message),
    _ => RegistryError::Rejected { status: status.as_u16(), message },
  }
}

#[async_trait]
impl DataFileRegistry for RunestoneClient {
  async fn list_data_files(&self) -> Result<Vec<DataFileRecord>, RegistryError> {
    let path = "/assignment/instructor/datafiles";
    self.send(path, self.request(Method::GET, path)).await
  }

  async fn create_data_file(&self, req: DataFileRequest) -> Result<DataFileCreated, RegistryError> {
    let path = "/assignment/instructor/datafile";
    self.send(path, self.request(Method::POST, path).json(&req)).await
  }
}

#[async_trait]
impl ExerciseStore for RunestoneClient {
  async fn save_exercise(&self, assignment_id: u64, draft: &ExerciseDraft, mode: SaveMode) -> Result<SavedExercise, RegistryError> {
    let path = "/assignment/instructor/exercise";
    let body = SaveExerciseRequest { assignment_id, mode, draft: draft.clone() };
    self.send(path, self.request(Method::POST, path).json(&body)).await
  }

  async fn list_assignment_exercises(&self, assignment_id: u64) -> Result<Vec<AssignmentExercise>, RegistryError> {
    let path = format!("/assignment/instructor/assignment_exercises/{assignment_id}");
    self.send(&path, self.request(Method::GET, &path)).await
  }

  async fn add_assignment_exercise(&self, fields: AssignmentExerciseFields) -> Result<(), RegistryError> {
    let path = "/assignment/instructor/assignment_exercise";
    let _: serde_json::Value = self.send(path, self.request(Method::POST, path).json(&fields)).await?;
    Ok(())
  }

  async fn remove_assignment_exercises(&self, ids: &[u64]) -> Result<(), RegistryError> {
    let path = "/assignment/instructor/readings/remove";
    let body = RemoveExercisesRequest { ids: ids.to_vec() };
    let _: serde_json::Value = self.send(path, self.request(Method::POST, path).json(&body)).await?;
    Ok(())
  }
}

#[async_trait]
impl ReadingCatalog for RunestoneClient {
  async fn list_available_readings(&self, filter: &ReadingsFilter) -> Result<Vec<ReadingNode>, RegistryError> {
    let path = "/assignment/instructor/available_readings";
    self.send(path, self.request(Method::GET, path).query(filter)).await
  }
}

#[async_trait]
impl AnswerLog for RunestoneClient {
  async fn log_answer_event(&self, event: AnswerEvent) -> Result<(), RegistryError> {
    let path = "/ns/logger/bookevent";
    let _: serde_json::Value = self.send(path, self.request(Method::POST, path).json(&event)).await?;
    Ok(())
  }

  async fn upload_attachment(&self, div_id: &str, sid: Option<&str>, file: AttachmentFile) -> Result<(), RegistryError> {
    let path = format!("/ns/logger/upload/{div_id}");
    let part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.filename);
    let form = reqwest::multipart::Form::new().part("file", part);
    let mut rb = self.request(Method::POST, &path).multipart(form);
    if let Some(sid) = sid {
      rb = rb.query(&[("sid", sid)]);
    }
    let _: serde_json::Value = self.send(&path, rb).await?;
    Ok(())
  }

  async fn fetch_attachment_name(&self, div_id: &str, sid: Option<&str>) -> Result<Option<String>, RegistryError> {
    let path = format!("/ns/assessment/has_attachment/{div_id}");
    let mut rb = self.request(Method::GET, &path);
    if let Some(sid) = sid {
      rb = rb.query(&[("sid", sid)]);
    }
    self.send(&path, rb).await
  }

  async fn fetch_answer(
    &self,
    div_id: &str,
    sid: &str,
    deadline: Option<DateTime<Utc>>,
  ) -> Result<Option<AnswerRecord>, RegistryError> {
    let path = format!("/ns/assessment/results/{div_id}");
    let mut rb = self.request(Method::GET, &path).query(&[("sid", sid)]);
    if let Some(d) = deadline {
      rb = rb.query(&[("deadline", d.to_rfc3339())]);
    }
    self.send(&path, rb).await
  }
}

#[async_trait]
impl AccommodationStore for RunestoneClient {
  async fn save_accommodation(&self, acc: Accommodation) -> Result<(), RegistryError> {
    let path = "/assignment/instructor/accommodation";
    let _: serde_json::Value = self.send(path, self.request(Method::POST, path).json(&acc)).await?;
    Ok(())
  }

  async fn list_accommodations(&self) -> Result<Vec<Accommodation>, RegistryError> {
    let path = "/assignment/instructor/accommodations";
    self.send(path, self.request(Method::GET, path)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_status_maps_to_registry_error() {
    let e = status_error(StatusCode::CONFLICT, r#"{"detail":"DataFile with this name already exists"}"#);
    assert_eq!(e, RegistryError::Conflict("DataFile with this name already exists".into()));
    let e = status_error(StatusCode::NOT_FOUND, "plain body");
    assert_eq!(e, RegistryError::NotFound("plain body".into()));
    let e = status_error(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":[{"loc":["x"]}]}"#);
    assert!(matches!(e, RegistryError::Rejected { status: 422, .. }));
  }

  #[test]
  fn base_url_is_normalized() {
    let c = RunestoneClient::new("http://localhost:8080/", None, Duration::from_secs(1)).unwrap();
    assert_eq!(c.base_url, "http://localhost:8080");
  }
}
