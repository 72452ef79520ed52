//! In-memory implementation of every collaborator trait.
//!
//! Used when no remote server is configured, and by the tests. Ids are
//! assigned from a single counter; all maps sit behind `tokio::sync::RwLock`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{
    Accommodation, AssignmentExercise, AssignmentExerciseFields, DataFileCreated, DataFileRecord,
    DataFileRequest, ExerciseDraft, ExerciseType, ReadingNode, ReadingsFilter,
};
use crate::registry::{
    AccommodationStore, AnswerEvent, AnswerLog, AnswerRecord, AttachmentFile, DataFileRegistry,
    ExerciseStore, ReadingCatalog, RegistryError, SaveMode, SavedExercise,
};

#[derive(Clone, Default)]
pub struct MemoryBackend {
    course: String,
    next_id: Arc<AtomicU64>,
    datafiles: Arc<RwLock<Vec<DataFileRecord>>>,
    exercises: Arc<RwLock<Vec<AssignmentExercise>>>,
    readings: Arc<RwLock<Vec<ReadingNode>>>,
    answers: Arc<RwLock<Vec<AnswerEvent>>>,
    /// (div_id, sid) -> storage key
    attachments: Arc<RwLock<HashMap<(String, String), String>>>,
    accommodations: Arc<RwLock<Vec<Accommodation>>>,
}

impl MemoryBackend {
    pub fn new(course: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            ..Default::default()
        }
    }

    /// Backend preloaded with data files and a readings tree.
    pub fn seeded(course: impl Into<String>, datafiles: Vec<DataFileRequest>, readings: Vec<ReadingNode>) -> Self {
        let mut backend = Self::new(course);
        let records: Vec<DataFileRecord> = datafiles
            .into_iter()
            .map(|req| backend.record_from(req))
            .collect();
        info!(target: "runestone_builder", datafiles = records.len(), chapters = readings.len(), "Seeded in-memory backend");
        backend.datafiles = Arc::new(RwLock::new(records));
        backend.readings = Arc::new(RwLock::new(readings));
        backend
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_from(&self, req: DataFileRequest) -> DataFileRecord {
        DataFileRecord {
            id: self.next_id(),
            name: req.name,
            filename: req.filename,
            file_type: req.file_type,
            file_content: req.file_content,
            is_editable: req.is_editable,
            rows: req.rows,
            cols: req.cols,
        }
    }
}

fn default_autograde(kind: ExerciseType) -> &'static str {
    match kind {
        ExerciseType::ActiveCode => "pct_correct",
        ExerciseType::MultipleChoice => "all_or_nothing",
    }
}

#[async_trait]
impl DataFileRegistry for MemoryBackend {
    async fn list_data_files(&self) -> Result<Vec<DataFileRecord>, RegistryError> {
        Ok(self.datafiles.read().await.clone())
    }

    async fn create_data_file(&self, req: DataFileRequest) -> Result<DataFileCreated, RegistryError> {
        let mut files = self.datafiles.write().await;
        if files.iter().any(|f| f.name == req.name) {
            return Err(RegistryError::Conflict("DataFile with this name already exists".into()));
        }
        let record = self.record_from(req);
        let created = DataFileCreated {
            id: record.id,
            acid: record.name.clone(),
            filename: record.filename.clone(),
        };
        files.push(record);
        Ok(created)
    }
}

#[async_trait]
impl ExerciseStore for MemoryBackend {
    async fn save_exercise(&self, assignment_id: u64, draft: &ExerciseDraft, mode: SaveMode) -> Result<SavedExercise, RegistryError> {
        let mut all = self.exercises.write().await;
        let existing = all
            .iter()
            .position(|e| e.assignment_id == assignment_id && e.name == draft.name);

        match (existing, mode) {
            (Some(_), SaveMode::Create) => Err(RegistryError::Conflict(format!(
                "An exercise named \"{}\" already exists in this assignment",
                draft.name
            ))),
            (Some(i), SaveMode::Replace) => {
                let ex = &mut all[i];
                ex.chapter = draft.chapter.clone();
                ex.subchapter = draft.subchapter.clone();
                ex.points = draft.points;
                ex.htmlsrc = draft.htmlsrc.clone();
                debug!(target: "runestone_builder", id = ex.question_id, "Exercise replaced");
                Ok(SavedExercise { id: ex.question_id, name: ex.name.clone() })
            }
            (None, _) => {
                let question_id = self.next_id();
                let sorting_priority = all.iter().filter(|e| e.assignment_id == assignment_id).count() as u32;
                all.push(AssignmentExercise {
                    id: self.next_id(),
                    assignment_id,
                    question_id,
                    name: draft.name.clone(),
                    chapter: draft.chapter.clone(),
                    subchapter: draft.subchapter.clone(),
                    title: draft.name.clone(),
                    points: draft.points,
                    sorting_priority,
                    reading_assignment: false,
                    autograde: default_autograde(draft.exercise_type()).into(),
                    which_to_grade: "best_answer".into(),
                    activities_required: 0,
                    required: false,
                    htmlsrc: draft.htmlsrc.clone(),
                });
                Ok(SavedExercise { id: question_id, name: draft.name.clone() })
            }
        }
    }

    async fn list_assignment_exercises(&self, assignment_id: u64) -> Result<Vec<AssignmentExercise>, RegistryError> {
        Ok(self
            .exercises
            .read()
            .await
            .iter()
            .filter(|e| e.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn add_assignment_exercise(&self, fields: AssignmentExerciseFields) -> Result<(), RegistryError> {
        let mut all = self.exercises.write().await;
        if all
            .iter()
            .any(|e| e.assignment_id == fields.assignment_id && e.question_id == fields.question_id)
        {
            return Err(RegistryError::Conflict(format!(
                "Question {} is already part of assignment {}",
                fields.question_id, fields.assignment_id
            )));
        }
        all.push(AssignmentExercise {
            id: self.next_id(),
            assignment_id: fields.assignment_id,
            question_id: fields.question_id,
            name: fields.subchapter.clone(),
            chapter: fields.chapter,
            subchapter: fields.subchapter,
            title: fields.title,
            points: fields.points,
            sorting_priority: fields.sorting_priority,
            reading_assignment: fields.reading_assignment,
            autograde: fields.autograde,
            which_to_grade: fields.which_to_grade,
            activities_required: fields.activities_required,
            required: fields.required,
            htmlsrc: String::new(),
        });
        Ok(())
    }

    async fn remove_assignment_exercises(&self, ids: &[u64]) -> Result<(), RegistryError> {
        let mut all = self.exercises.write().await;
        let before = all.len();
        all.retain(|e| !ids.contains(&e.id));
        debug!(target: "runestone_builder", removed = before - all.len(), "Assignment exercises removed");
        Ok(())
    }
}

#[async_trait]
impl ReadingCatalog for MemoryBackend {
    async fn list_available_readings(&self, filter: &ReadingsFilter) -> Result<Vec<ReadingNode>, RegistryError> {
        let tree = self.readings.read().await.clone();
        if !filter.pages_only {
            return Ok(tree);
        }
        // pages only: chapters keep their subchapters, nothing deeper
        Ok(tree
            .into_iter()
            .map(|mut chapter| {
                for sub in chapter.children.iter_mut() {
                    sub.children.clear();
                }
                chapter
            })
            .collect())
    }
}

#[async_trait]
impl AnswerLog for MemoryBackend {
    async fn log_answer_event(&self, mut event: AnswerEvent) -> Result<(), RegistryError> {
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }
        debug!(target: "runestone_builder", div_id = %event.div_id, answer_len = event.answer.len(), "Answer logged");
        self.answers.write().await.push(event);
        Ok(())
    }

    async fn upload_attachment(&self, div_id: &str, sid: Option<&str>, file: AttachmentFile) -> Result<(), RegistryError> {
        let sid = sid.unwrap_or("anonymous");
        let key = format!("{}/{}/{}/{}", self.course, div_id, sid, file.filename);
        debug!(target: "runestone_builder", %key, bytes = file.bytes.len(), "Attachment stored");
        self.attachments
            .write()
            .await
            .insert((div_id.to_string(), sid.to_string()), key);
        Ok(())
    }

    async fn fetch_attachment_name(&self, div_id: &str, sid: Option<&str>) -> Result<Option<String>, RegistryError> {
        let sid = sid.unwrap_or("anonymous");
        Ok(self
            .attachments
            .read()
            .await
            .get(&(div_id.to_string(), sid.to_string()))
            .cloned())
    }

    async fn fetch_answer(
        &self,
        div_id: &str,
        sid: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<AnswerRecord>, RegistryError> {
        let answers = self.answers.read().await;
        let mut events: Vec<&AnswerEvent> = answers
            .iter()
            .filter(|e| e.div_id == div_id && e.sid.as_deref() == Some(sid))
            .collect();
        if events.is_empty() {
            return Ok(None);
        }
        events.sort_by_key(|e| e.timestamp);

        let (on_time, late): (Vec<&AnswerEvent>, Vec<&AnswerEvent>) = match deadline {
            Some(d) => events.into_iter().partition(|e| e.timestamp.map_or(true, |t| t <= d)),
            None => (events, Vec::new()),
        };
        let current = on_time.last();
        let resubmitted = late
            .last()
            .filter(|l| current.map_or(true, |c| c.answer != l.answer));

        Ok(Some(AnswerRecord {
            answer: current.map(|e| e.answer.clone()),
            timestamp: current.and_then(|e| e.timestamp),
            last_answer: resubmitted.map(|e| e.answer.clone()),
            last_timestamp: resubmitted.and_then(|e| e.timestamp),
            score: None,
            comment: None,
        }))
    }
}

#[async_trait]
impl AccommodationStore for MemoryBackend {
    async fn save_accommodation(&self, acc: Accommodation) -> Result<(), RegistryError> {
        let mut all = self.accommodations.write().await;
        all.retain(|a| !(a.sid == acc.sid && a.assignment_id == acc.assignment_id));
        all.push(acc);
        Ok(())
    }

    async fn list_accommodations(&self) -> Result<Vec<Accommodation>, RegistryError> {
        Ok(self.accommodations.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(answer: &str, ts: DateTime<Utc>) -> AnswerEvent {
        AnswerEvent {
            event: "shortanswer".into(),
            act: answer.into(),
            answer: answer.into(),
            div_id: "q1".into(),
            sid: Some("alice".into()),
            course: None,
            timestamp: Some(ts),
        }
    }

    fn df(name: &str) -> DataFileRequest {
        DataFileRequest {
            name: name.into(),
            filename: "data.csv".into(),
            file_content: "a,b".into(),
            file_type: "csv".into(),
            is_editable: false,
            rows: 10,
            cols: 50,
        }
    }

    #[tokio::test]
    async fn datafile_names_are_unique() {
        let backend = MemoryBackend::new("cs1");
        let created = backend.create_data_file(df("scores")).await.unwrap();
        assert_eq!(created.acid, "scores");
        let err = backend.create_data_file(df("scores")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(backend.list_data_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exercise_names_are_unique_per_assignment() {
        let backend = MemoryBackend::new("cs1");
        let mut draft = ExerciseDraft::new(ExerciseType::ActiveCode);
        draft.name = "loops_1".into();

        let first = backend.save_exercise(1, &draft, SaveMode::Create).await.unwrap();
        assert!(backend.save_exercise(1, &draft, SaveMode::Create).await.is_err());
        assert!(backend.save_exercise(2, &draft, SaveMode::Create).await.is_ok());

        draft.points = 5;
        let replaced = backend.save_exercise(1, &draft, SaveMode::Replace).await.unwrap();
        assert_eq!(replaced.id, first.id);
        let listed = backend.list_assignment_exercises(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].points, 5);
    }

    #[tokio::test]
    async fn answer_record_splits_at_deadline() {
        let backend = MemoryBackend::new("cs1");
        let t = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        backend.log_answer_event(event("first", t(1))).await.unwrap();
        backend.log_answer_event(event("second", t(2))).await.unwrap();
        backend.log_answer_event(event("late", t(9))).await.unwrap();

        let rec = backend.fetch_answer("q1", "alice", Some(t(5))).await.unwrap().unwrap();
        assert_eq!(rec.answer.as_deref(), Some("second"));
        assert_eq!(rec.timestamp, Some(t(2)));
        assert_eq!(rec.last_answer.as_deref(), Some("late"));
        assert_eq!(rec.last_timestamp, Some(t(9)));

        let rec = backend.fetch_answer("q1", "alice", None).await.unwrap().unwrap();
        assert_eq!(rec.answer.as_deref(), Some("late"));
        assert_eq!(rec.last_answer, None);

        assert!(backend.fetch_answer("q1", "bob", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identical_late_answer_is_not_a_resubmission() {
        let backend = MemoryBackend::new("cs1");
        let t = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        backend.log_answer_event(event("same", t(1))).await.unwrap();
        backend.log_answer_event(event("same", t(9))).await.unwrap();
        let rec = backend.fetch_answer("q1", "alice", Some(t(5))).await.unwrap().unwrap();
        assert_eq!(rec.last_answer, None);
    }

    #[tokio::test]
    async fn attachment_key_includes_path() {
        let backend = MemoryBackend::new("cs1");
        let file = AttachmentFile { filename: "scan.pdf".into(), bytes: vec![1, 2, 3] };
        backend.upload_attachment("q1", Some("alice"), file).await.unwrap();
        let key = backend.fetch_attachment_name("q1", Some("alice")).await.unwrap();
        assert_eq!(key.as_deref(), Some("cs1/q1/alice/scan.pdf"));
        assert_eq!(backend.fetch_attachment_name("q1", Some("bob")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn accommodation_is_replaced_per_student_and_assignment() {
        let backend = MemoryBackend::new("cs1");
        let acc = |t| Accommodation { sid: "alice".into(), assignment_id: Some(3), time_limit: Some(t), due_date: None, visible: false };
        backend.save_accommodation(acc(1.5)).await.unwrap();
        backend.save_accommodation(acc(2.0)).await.unwrap();
        let all = backend.list_accommodations().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].time_limit, Some(2.0));
    }
}
