//! HTTP endpoint handlers. These are thin wrappers that forward to core logic
//! and the collaborators in `AppState`. Every JSON body is wrapped in `{"detail": ...}`.

use std::sync::Arc;
use axum::{
  extract::{Multipart, Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::accommodations::{save_all, AccommodationError, AccommodationReport, AccommodationRequest};
use crate::datafile::{content_size, selector_options, DataFileError, DataFileOption, MAX_FILE_SIZE};
use crate::domain::{
  Accommodation, AssignmentExercise, AssignmentExerciseFields, DataFileCreated, DataFileRecord, DataFileRequest,
  ReadingNode, ReadingsFilter,
};
use crate::logic;
use crate::preview::datafile_preview;
use crate::protocol::*;
use crate::readings::{add_readings, load_overview, remove_readings, BulkAddReport, ReadingsOverview};
use crate::registry::{AnswerEvent, AnswerRecord, AttachmentFile, RegistryError, SavedExercise};
use crate::shortanswer::{check_attachment, AttachmentError};
use crate::state::AppState;
use crate::wizard::WizardError;

/// Error half of every handler; rendered as `{"detail": ...}` with a status code.
#[derive(Debug)]
pub enum ApiError {
  BadRequest(serde_json::Value),
  NotFound(String),
  Conflict(String),
  Upstream(String),
}

impl ApiError {
  fn bad_request(message: impl Into<String>) -> Self {
    ApiError::BadRequest(serde_json::Value::String(message.into()))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, detail) = match self {
      ApiError::BadRequest(v) => (StatusCode::BAD_REQUEST, v),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.into()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.into()),
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.into()),
    };
    (status, Json(Detail::new(detail))).into_response()
  }
}

impl From<RegistryError> for ApiError {
  fn from(e: RegistryError) -> Self {
    match e {
      RegistryError::NotFound(m) => ApiError::NotFound(m),
      RegistryError::Conflict(m) => ApiError::Conflict(m),
      RegistryError::Rejected { status, message } if (400..500).contains(&status) => ApiError::bad_request(message),
      other => ApiError::Upstream(other.to_string()),
    }
  }
}

impl From<WizardError> for ApiError {
  fn from(e: WizardError) -> Self {
    match e {
      WizardError::FormInvalid(errors) | WizardError::StepInvalid(errors) => {
        ApiError::BadRequest(serde_json::to_value(errors).unwrap_or_default())
      }
      WizardError::Save(e) => e.into(),
      other => ApiError::bad_request(other.to_string()),
    }
  }
}

impl From<DataFileError> for ApiError {
  fn from(e: DataFileError) -> Self {
    match e {
      DataFileError::Registry(e) => e.into(),
      DataFileError::DuplicateName => ApiError::Conflict(e.to_string()),
      other => ApiError::bad_request(other.to_string()),
    }
  }
}

impl From<AccommodationError> for ApiError {
  fn from(e: AccommodationError) -> Self {
    ApiError::bad_request(e.to_string())
  }
}

impl From<AttachmentError> for ApiError {
  fn from(e: AttachmentError) -> Self {
    ApiError::bad_request(e.to_string())
  }
}

pub type ApiResult<T> = Result<Json<Detail<T>>, ApiError>;

fn ok<T: Serialize>(v: T) -> ApiResult<T> {
  Ok(Json(Detail::new(v)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(Detail::new(HealthOut { ok: true, backend: state.backend, course: state.course.clone() }))
}

//
// Data files
//

#[instrument(level = "info", skip(state))]
pub async fn http_list_datafiles(State(state): State<Arc<AppState>>) -> ApiResult<Vec<DataFileRecord>> {
  ok(state.datafiles.list_data_files().await?)
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name, filename = %body.filename, bytes = body.file_content.len()))]
pub async fn http_create_datafile(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DataFileRequest>,
) -> ApiResult<DataFileCreated> {
  if body.name.trim().is_empty() || body.filename.trim().is_empty() || body.file_content.is_empty() {
    return Err(DataFileError::MissingFields.into());
  }
  if content_size(&body.file_type, &body.file_content) > MAX_FILE_SIZE {
    return Err(DataFileError::TooLarge.into());
  }
  let created = state.datafiles.create_data_file(body).await?;
  info!(target: "datafile", acid = %created.acid, "HTTP data file created");
  ok(created)
}

#[instrument(level = "info", skip(state))]
pub async fn http_datafile_options(
  State(state): State<Arc<AppState>>,
  Query(q): Query<DataFileOptionsQuery>,
) -> ApiResult<Vec<DataFileOption>> {
  let known = state.datafiles.list_data_files().await?;
  ok(selector_options(&q.language, &known))
}

#[instrument(level = "info", skip(state))]
pub async fn http_datafile_preview(
  State(state): State<Arc<AppState>>,
  Query(q): Query<DataFilePreviewQuery>,
) -> ApiResult<PreviewOut> {
  let known = state.datafiles.list_data_files().await?;
  let df = known
    .iter()
    .find(|df| df.name == q.name)
    .ok_or_else(|| ApiError::NotFound(format!("DataFile {} not found", q.name)))?;
  let question = q.question.as_deref().unwrap_or(&df.name);
  ok(PreviewOut { html: datafile_preview(df, question) })
}

//
// Exercises
//

#[instrument(level = "info", skip(state, body), fields(name = %body.draft.name))]
pub async fn http_preview(State(state): State<Arc<AppState>>, Json(body): Json<PreviewIn>) -> ApiResult<PreviewOut> {
  let html = logic::render_preview(&state, &body.draft, body.datafile).await;
  ok(PreviewOut { html })
}

#[instrument(level = "info", skip(body), fields(name = %body.draft.name, step = ?body.step))]
pub async fn http_validate(Json(body): Json<ValidateIn>) -> ApiResult<ValidateOut> {
  ok(logic::validate(body.step, &body.draft))
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_exercises(
  State(state): State<Arc<AppState>>,
  Path(assignment_id): Path<u64>,
) -> ApiResult<Vec<AssignmentExercise>> {
  ok(state.exercises.list_assignment_exercises(assignment_id).await?)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_save_exercise(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SaveExerciseRequest>,
) -> ApiResult<SavedExercise> {
  ok(logic::save_draft(&state, body).await?)
}

#[instrument(level = "info", skip(state, body), fields(assignment_id = body.assignment_id, question_id = body.question_id))]
pub async fn http_add_assignment_exercise(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssignmentExerciseFields>,
) -> ApiResult<&'static str> {
  state.exercises.add_assignment_exercise(body).await?;
  ok("ok")
}

//
// Readings
//

#[instrument(level = "info", skip(state))]
pub async fn http_available_readings(
  State(state): State<Arc<AppState>>,
  Query(filter): Query<ReadingsFilter>,
) -> ApiResult<Vec<ReadingNode>> {
  ok(state.readings.list_available_readings(&filter).await?)
}

#[instrument(level = "info", skip(state))]
pub async fn http_readings_overview(
  State(state): State<Arc<AppState>>,
  Path(assignment_id): Path<u64>,
) -> ApiResult<ReadingsOverview> {
  ok(load_overview(state.readings.as_ref(), state.exercises.as_ref(), assignment_id).await?)
}

#[instrument(level = "info", skip(state, body), fields(assignment_id = body.assignment_id, node = %body.node.key))]
pub async fn http_add_readings(State(state): State<Arc<AppState>>, Json(body): Json<AddReadingsIn>) -> ApiResult<BulkAddReport> {
  let report = add_readings(state.exercises.as_ref(), body.assignment_id, &body.node).await?;
  info!(target: "readings", summary = %report.summary(), "HTTP readings added");
  ok(report)
}

#[instrument(level = "info", skip(state, body), fields(count = body.ids.len()))]
pub async fn http_remove_readings(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RemoveExercisesRequest>,
) -> ApiResult<RemovedOut> {
  let removed = remove_readings(state.exercises.as_ref(), &body.ids).await?;
  ok(RemovedOut { removed, message: format!("{removed} exercises successfully removed") })
}

//
// Accommodations
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_save_accommodations(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AccommodationRequest>,
) -> ApiResult<AccommodationReport> {
  ok(save_all(state.accommodations.as_ref(), &body).await?)
}

#[instrument(level = "info", skip(state, body), fields(sid = %body.sid, assignment_id = ?body.assignment_id))]
pub async fn http_save_accommodation(
  State(state): State<Arc<AppState>>,
  Json(body): Json<Accommodation>,
) -> ApiResult<&'static str> {
  state.accommodations.save_accommodation(body).await?;
  ok("ok")
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_accommodations(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Accommodation>> {
  ok(state.accommodations.list_accommodations().await?)
}

//
// Student answers
//

#[instrument(level = "info", skip(state, body), fields(div_id = %body.div_id, event = %body.event, answer_len = body.answer.len()))]
pub async fn http_log_event(State(state): State<Arc<AppState>>, Json(body): Json<AnswerEvent>) -> ApiResult<&'static str> {
  state.answers.log_answer_event(body).await?;
  ok("ok")
}

#[instrument(level = "info", skip(state, multipart))]
pub async fn http_upload(
  State(state): State<Arc<AppState>>,
  Path(div_id): Path<String>,
  Query(q): Query<SidQuery>,
  mut multipart: Multipart,
) -> ApiResult<UploadOut> {
  let mut file = None;
  while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::bad_request(e.to_string()))? {
    if field.name() != Some("file") {
      continue;
    }
    let filename = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
    file = Some(AttachmentFile { filename, bytes: bytes.to_vec() });
  }
  let file = file.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
  if let Err(e) = check_attachment(&file) {
    warn!(target: "shortanswer", %div_id, filename = %file.filename, size = file.bytes.len(), "Upload rejected");
    return Err(e.into());
  }
  let filename = file.filename.clone();
  state.answers.upload_attachment(&div_id, q.sid.as_deref(), file).await?;
  ok(UploadOut { filename })
}

#[instrument(level = "info", skip(state))]
pub async fn http_has_attachment(
  State(state): State<Arc<AppState>>,
  Path(div_id): Path<String>,
  Query(q): Query<SidQuery>,
) -> ApiResult<Option<String>> {
  ok(state.answers.fetch_attachment_name(&div_id, q.sid.as_deref()).await?)
}

#[instrument(level = "info", skip(state))]
pub async fn http_results(
  State(state): State<Arc<AppState>>,
  Path(div_id): Path<String>,
  Query(q): Query<ResultsQuery>,
) -> ApiResult<Option<AnswerRecord>> {
  ok(state.answers.fetch_answer(&div_id, &q.sid, q.deadline).await?)
}
