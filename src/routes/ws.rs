//! WebSocket editor sessions. Each socket owns one exercise wizard and one
//! data-file picker; closing it discards the draft. Every client message gets
//! exactly one JSON reply, and the socket closes once the draft is saved or cancelled.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, error, info, instrument, warn};

use crate::datafile::{DataFileAssociation, CREATE_NEW};
use crate::logic::open_editor;
use crate::protocol::{ClientWsMessage, EditorQuery, EditorSnapshot, ServerWsMessage};
use crate::state::AppState;
use crate::wizard::{ExerciseWizard, FieldUpdate};

/// Per-connection editor state.
struct EditorSession {
  wizard: ExerciseWizard,
  datafiles: DataFileAssociation,
  assignment_id: u64,
  creating_datafile: bool,
}

impl EditorSession {
  fn language(&self) -> String {
    self.wizard.draft().active_code().map(|b| b.language.clone()).unwrap_or_default()
  }

  fn snapshot(&self) -> ServerWsMessage {
    ServerWsMessage::Wizard {
      editor: EditorSnapshot {
        wizard: self.wizard.view(),
        datafile_options: self.datafiles.options(&self.language()),
        datafile_form: self.creating_datafile.then(|| self.datafiles.form.clone()),
      },
    }
  }
}

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_editor(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<EditorQuery>,
) -> impl IntoResponse {
  info!(target: "builder", kind = q.kind.as_str(), assignment_id = q.assignment_id, edit = ?q.edit, "Editor upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, q))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, q: EditorQuery) {
  let mut session = match open_editor(&state, &q).await {
    Ok((wizard, datafiles)) => EditorSession { wizard, datafiles, assignment_id: q.assignment_id, creating_datafile: false },
    Err(e) => {
      warn!(target: "builder", error = %e, "Could not open editor");
      let _ = send(&mut socket, &ServerWsMessage::Error { message: e.to_string() }).await;
      return;
    }
  };
  info!(target: "builder", "Editor connected");
  if send(&mut socket, &session.snapshot()).await.is_err() {
    return;
  }

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "builder", kind = message_kind(&incoming), "WS received");
            handle_client_ws(incoming, &mut session, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };
        if let Err(e) = send(&mut socket, &reply).await {
          error!(target: "builder", error = %e, "WS send error");
          break;
        }
        if session.wizard.phase().is_terminal() {
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  session.wizard.cancel();
  info!(target: "builder", phase = ?session.wizard.phase(), "Editor disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

fn message_kind(msg: &ClientWsMessage) -> &'static str {
  match msg {
    ClientWsMessage::Ping => "ping",
    ClientWsMessage::UpdateField { .. } => "update_field",
    ClientWsMessage::Next => "next",
    ClientWsMessage::Prev => "prev",
    ClientWsMessage::JumpTo { .. } => "jump_to",
    ClientWsMessage::AddChoice => "add_choice",
    ClientWsMessage::RemoveChoice { .. } => "remove_choice",
    ClientWsMessage::SelectDataFile { .. } => "select_data_file",
    ClientWsMessage::DataFileSource { .. } => "data_file_source",
    ClientWsMessage::DataFileText { .. } => "data_file_text",
    ClientWsMessage::DataFileField { .. } => "data_file_field",
    ClientWsMessage::DataFileUpload { .. } => "data_file_upload",
    ClientWsMessage::CreateDataFile => "create_data_file",
    ClientWsMessage::Save => "save",
    ClientWsMessage::Cancel => "cancel",
  }
}

/// Apply one client message. Errors become an `error` frame; the session stays usable.
async fn handle_client_ws(msg: ClientWsMessage, session: &mut EditorSession, state: &AppState) -> ServerWsMessage {
  let result: Result<(), String> = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::UpdateField { update } => session.wizard.update_field(update).map_err(|e| e.to_string()),
    ClientWsMessage::Next => session.wizard.go_next().map_err(|e| e.to_string()),
    ClientWsMessage::Prev => session.wizard.go_prev().map_err(|e| e.to_string()),
    ClientWsMessage::JumpTo { step } => session.wizard.jump_to_step(step).map_err(|e| e.to_string()),
    ClientWsMessage::AddChoice => session.wizard.add_choice().map(|_| ()).map_err(|e| e.to_string()),
    ClientWsMessage::RemoveChoice { index } => session.wizard.remove_choice(index).map_err(|e| e.to_string()),

    ClientWsMessage::SelectDataFile { value } => {
      if value == CREATE_NEW {
        session.creating_datafile = true;
        Ok(())
      } else {
        session.creating_datafile = false;
        let name = Some(value).filter(|v| !v.is_empty());
        session.wizard.update_field(FieldUpdate::Datafile(name)).map_err(|e| e.to_string())
      }
    }
    ClientWsMessage::DataFileSource { source } => {
      session.datafiles.form.set_source_type(source);
      Ok(())
    }
    ClientWsMessage::DataFileText { content } => {
      session.datafiles.form.set_text(content);
      Ok(())
    }
    ClientWsMessage::DataFileField { update } => {
      session.datafiles.form.set_field(update);
      Ok(())
    }
    ClientWsMessage::DataFileUpload { filename, content_base64 } => match BASE64.decode(content_base64.as_bytes()) {
      Ok(bytes) => session.datafiles.form.load_upload(&filename, &bytes).map_err(|e| e.to_string()),
      Err(e) => Err(format!("Invalid base64 upload: {e}")),
    },
    ClientWsMessage::CreateDataFile => {
      let language = session.language();
      match session.datafiles.create(state.datafiles.as_ref(), &language).await {
        Ok(created) => {
          session.creating_datafile = false;
          session.wizard.set_datafiles(session.datafiles.known().to_vec());
          session
            .wizard
            .update_field(FieldUpdate::Datafile(Some(created.acid)))
            .map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
      }
    }

    ClientWsMessage::Save => session
      .wizard
      .save(state.exercises.as_ref(), session.assignment_id)
      .await
      .map(|_| ())
      .map_err(|e| e.to_string()),
    ClientWsMessage::Cancel => {
      session.wizard.cancel();
      Ok(())
    }
  };

  match result {
    Ok(()) => session.snapshot(),
    Err(message) => ServerWsMessage::Error { message },
  }
}
