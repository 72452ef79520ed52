use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;
use runestone_builder::{
    config::BuilderConfig,
    routes::build_router,
    state::{seeded_backend, AppState},
};

fn test_app() -> Router {
    let backend = seeded_backend(&BuilderConfig::default());
    build_router(Arc::new(AppState::with_memory(backend)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn code_draft(name: &str) -> Value {
    json!({
        "name": name,
        "chapter": "ch1",
        "question_type": "activecode",
        "language": "python",
        "instructions": "Print the first city",
        "code": { "prefix": "import csv", "starter": "print()", "suffix": "" },
        "datafile": "weather"
    })
}

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = test_app();
    let (status, json) = call(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["ok"], true);
    assert_eq!(json["detail"]["backend"], "memory");
    assert_eq!(json["detail"]["course"], "overview");
}

#[tokio::test]
async fn test_datafile_create_and_duplicate_conflict() {
    let app = test_app();
    let body = json!({
        "name": "grades",
        "filename": "grades.csv",
        "file_content": "a,b\n1,2",
        "file_type": "csv",
        "is_editable": false,
        "rows": 10,
        "cols": 50
    });
    let (status, json) = call(&app, "POST", "/assignment/instructor/datafile", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["acid"], "grades");

    let (status, json) = call(&app, "POST", "/assignment/instructor/datafile", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["detail"], "DataFile with this name already exists");

    let (_, json) = call(&app, "GET", "/assignment/instructor/datafiles", None).await;
    let names: Vec<&str> = json["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"grades"));
}

#[tokio::test]
async fn test_datafile_missing_fields_is_bad_request() {
    let app = test_app();
    let body = json!({
        "name": "",
        "filename": "x.txt",
        "file_content": "x",
        "file_type": "txt",
        "is_editable": false,
        "rows": 10,
        "cols": 50
    });
    let (status, json) = call(&app, "POST", "/assignment/instructor/datafile", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "All fields are required");
}

fn image_datafile(name: &str, raw_len: usize) -> Value {
    json!({
        "name": name,
        "filename": format!("{name}.png"),
        "file_content": BASE64.encode(vec![0u8; raw_len]),
        "file_type": "png",
        "is_editable": false,
        "rows": 10,
        "cols": 50
    })
}

#[tokio::test]
async fn test_image_datafile_limit_applies_to_decoded_bytes() {
    let app = test_app();
    let limit = runestone_builder::datafile::MAX_FILE_SIZE;

    let (status, json) = call(&app, "POST", "/assignment/instructor/datafile", Some(image_datafile("photo", limit - 1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["acid"], "photo");

    let (status, json) = call(&app, "POST", "/assignment/instructor/datafile", Some(image_datafile("huge", limit + 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "File exceeds the 15MB limit");
}

#[tokio::test]
async fn test_standalone_datafile_preview() {
    let app = test_app();
    let (status, json) = call(
        &app,
        "GET",
        "/assignment/instructor/datafile_preview?name=notes&question=q1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let html = json["detail"]["html"].as_str().unwrap();
    assert!(html.contains("Data: notes.txt"));
    assert!(html.contains(r#"<textarea id="q1""#));

    let (_, json) = call(&app, "GET", "/assignment/instructor/datafile_preview?name=weather", None).await;
    let html = json["detail"]["html"].as_str().unwrap();
    assert!(html.contains(r#"<pre id="weather""#));

    let (status, _) = call(&app, "GET", "/assignment/instructor/datafile_preview?name=missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_datafile_options_follow_language() {
    let app = test_app();
    let (_, json) = call(&app, "GET", "/assignment/instructor/datafile_options?language=javascript", None).await;
    assert_eq!(json["detail"].as_array().unwrap().len(), 1);

    let (_, json) = call(&app, "GET", "/assignment/instructor/datafile_options?language=python", None).await;
    let options = json["detail"].as_array().unwrap();
    assert_eq!(options[1]["value"], "CREATE_NEW");
    assert!(options.len() > 2);
}

#[tokio::test]
async fn test_preview_embeds_resolved_datafile() {
    let app = test_app();
    let (status, json) = call(
        &app,
        "POST",
        "/assignment/instructor/preview",
        Some(json!({ "draft": code_draft("Weather One") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let html = json["detail"]["html"].as_str().unwrap();
    assert!(html.contains(r#"id="weather_one""#));
    assert!(html.contains("data-datafile='weather.csv'"));
    assert!(html.contains("import csv\n^^^^\nprint()\n====\n"));
}

#[tokio::test]
async fn test_validate_reports_step_and_form_errors() {
    let app = test_app();
    let mut draft = code_draft("v1");
    draft["instructions"] = json!("");
    let (_, json) = call(
        &app,
        "POST",
        "/assignment/instructor/validate",
        Some(json!({ "step": 1, "draft": draft.clone() })),
    )
    .await;
    assert_eq!(json["detail"]["valid"], false);
    assert_eq!(json["detail"]["errors"][0]["field"], "instructions");

    let (_, json) = call(&app, "POST", "/assignment/instructor/validate", Some(json!({ "step": 0, "draft": draft }))).await;
    assert_eq!(json["detail"]["valid"], true);
}

#[tokio::test]
async fn test_save_exercise_then_list_and_conflict() {
    let app = test_app();
    let body = json!({ "assignment_id": 5, "draft": code_draft("loop_1") });
    let (status, json) = call(&app, "POST", "/assignment/instructor/exercise", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["name"], "loop_1");

    let (status, _) = call(&app, "POST", "/assignment/instructor/exercise", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = call(&app, "GET", "/assignment/instructor/assignment_exercises/5", None).await;
    let list = json["detail"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["htmlsrc"].as_str().unwrap().contains("data-component=\"activecode\""));
}

#[tokio::test]
async fn test_save_invalid_exercise_lists_errors() {
    let app = test_app();
    let mut draft = code_draft("bad");
    draft["chapter"] = json!("");
    let (status, json) = call(
        &app,
        "POST",
        "/assignment/instructor/exercise",
        Some(json!({ "assignment_id": 5, "draft": draft })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_array().unwrap().iter().any(|e| e["field"] == "chapter"));
}

#[tokio::test]
async fn test_readings_add_overview_and_remove() {
    let app = test_app();
    let (_, json) = call(&app, "GET", "/assignment/instructor/available_readings", None).await;
    let chapter = json["detail"][0].clone();
    assert_eq!(chapter["key"], "GeneralIntro");

    let (status, json) = call(
        &app,
        "POST",
        "/assignment/instructor/readings/add",
        Some(json!({ "assignment_id": 9, "node": chapter })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["added"], 2);

    let (_, json) = call(&app, "GET", "/assignment/instructor/readings/9", None).await;
    let overview = &json["detail"];
    assert_eq!(overview["selected_keys"]["GeneralIntro"]["checked"], true);
    let ids: Vec<u64> = overview["reading_exercises"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);

    let (_, json) = call(&app, "POST", "/assignment/instructor/readings/remove", Some(json!({ "ids": ids }))).await;
    assert_eq!(json["detail"]["message"], "2 exercises successfully removed");

    let (_, json) = call(&app, "GET", "/assignment/instructor/readings/9", None).await;
    assert_eq!(json["detail"]["selected_keys"]["GeneralIntro"]["checked"], false);
}

#[tokio::test]
async fn test_accommodations_expand_and_validate() {
    let app = test_app();
    let body = json!({ "students": ["alice", "bob"], "assignments": [1, 2], "time_limit": 1.5, "visible": true });
    let (status, json) = call(&app, "POST", "/assignment/instructor/accommodations", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detail"]["saved"], 4);

    let (_, json) = call(&app, "GET", "/assignment/instructor/accommodations", None).await;
    assert_eq!(json["detail"].as_array().unwrap().len(), 4);

    let body = json!({ "students": ["alice"], "time_limit": 7.0 });
    let (status, _) = call(&app, "POST", "/assignment/instructor/accommodations", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_answer_results_split_at_deadline() {
    let app = test_app();
    for (answer, ts) in [("on time", "2024-03-01T10:00:00Z"), ("late", "2024-03-09T10:00:00Z")] {
        let event = json!({
            "event": "shortanswer", "act": answer, "answer": answer,
            "div_id": "sa1", "sid": "alice", "timestamp": ts
        });
        let (status, _) = call(&app, "POST", "/ns/logger/bookevent", Some(event)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, json) = call(
        &app,
        "GET",
        "/ns/assessment/results/sa1?sid=alice&deadline=2024-03-05T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(json["detail"]["answer"], "on time");
    assert_eq!(json["detail"]["last_answer"], "late");

    let (_, json) = call(&app, "GET", "/ns/assessment/results/sa1?sid=bob", None).await;
    assert!(json["detail"].is_null());
}

fn multipart_upload(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "XBOUNDARYX";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type_and_accepts_pdf() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(multipart_upload("/ns/logger/upload/sa1?sid=alice", "run.exe", b"MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(multipart_upload("/ns/logger/upload/sa1?sid=alice", "essay.pdf", b"%PDF-1.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, json) = call(&app, "GET", "/ns/assessment/has_attachment/sa1?sid=alice", None).await;
    assert_eq!(json["detail"], "overview/sa1/alice/essay.pdf");
}
