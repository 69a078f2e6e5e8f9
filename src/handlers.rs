use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{AppError, ErrorDetail, QuizError};
use crate::models::{FontSize, Letter, Mode, Theme};
use crate::session::{Advance, KeyOutcome, LoadSummary, SelectOutcome};
use crate::state::AppState;
use crate::view::{QuestionView, SessionView};
use crate::ws_protocol::{WsEnvelope, COMMAND_ERROR, KEY_PRESS};

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Serialize)]
pub struct CommandResponse<T> {
    pub result: T,
    pub state: SessionView,
}

type CommandResult<T> = Result<Json<CommandResponse<T>>, AppError>;

async fn run<T>(
    state: &AppState,
    headers: &HeaderMap,
    command: impl FnOnce(&mut crate::session::QuizSession) -> Result<T, QuizError>,
) -> CommandResult<T> {
    let (result, view) = state
        .mutate(command)
        .await
        .map_err(|err| AppError::from_quiz(err, request_id_from_headers(headers)))?;
    Ok(Json(CommandResponse { result, state: view }))
}

pub async fn get_state(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.view().await)
}

pub async fn load_bank(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> CommandResult<LoadSummary> {
    let response = run(&state, &headers, |s| s.load_bytes(&body)).await?;
    state.stop_timer();
    info!(
        "bank uploaded: {} loaded, {} rejected",
        response.result.loaded,
        response.result.rejected.len()
    );
    Ok(response)
}

pub async fn load_sample(State(state): State<AppState>, headers: HeaderMap) -> CommandResult<LoadSummary> {
    let response = run(&state, &headers, |s| s.load_sample()).await?;
    state.stop_timer();
    Ok(response)
}

pub async fn start_quiz(State(state): State<AppState>, headers: HeaderMap) -> CommandResult<()> {
    let response = run(&state, &headers, |s| s.start()).await?;
    state.start_timer();
    Ok(response)
}

pub async fn display_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(index): Path<usize>,
) -> CommandResult<QuestionView> {
    run(&state, &headers, |s| s.display_question(index)).await
}

#[derive(Debug, Deserialize)]
pub struct SelectPayload {
    pub letter: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectResult {
    pub selection: Vec<Letter>,
    pub committed: Option<crate::models::AnswerRecord>,
}

impl From<SelectOutcome> for SelectResult {
    fn from(outcome: SelectOutcome) -> Self {
        Self {
            selection: outcome.selection.into_iter().collect(),
            committed: outcome.committed,
        }
    }
}

pub async fn select_option(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SelectPayload>,
) -> CommandResult<SelectResult> {
    let Some(letter) = Letter::from_token(payload.letter.trim()) else {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "invalid option letter",
            request_id_from_headers(&headers),
        )
        .with_details(vec![ErrorDetail {
            field: "letter".into(),
            issue: "must be one of A, B, C, D".into(),
        }]));
    };
    run(&state, &headers, |s| s.select_option(letter).map(SelectResult::from)).await
}

pub async fn commit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> CommandResult<crate::models::AnswerRecord> {
    run(&state, &headers, |s| s.commit()).await
}

#[derive(Debug, Deserialize)]
pub struct ModePayload {
    pub mode: Mode,
}

pub async fn set_mode(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ModePayload>,
) -> CommandResult<Mode> {
    run(&state, &headers, |s| {
        s.set_mode(payload.mode);
        Ok(payload.mode)
    })
    .await
}

#[derive(Debug, Default, Serialize)]
pub struct NavResult {
    pub moved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance: Option<Advance>,
}

pub async fn navigate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> CommandResult<NavResult> {
    match target.as_str() {
        "first" => {
            run(&state, &headers, |s| {
                s.go_first()?;
                Ok(NavResult { moved: true, advance: None })
            })
            .await
        }
        "prev" => {
            run(&state, &headers, |s| {
                let moved = s.retreat()?;
                Ok(NavResult { moved, advance: None })
            })
            .await
        }
        "next" => {
            run(&state, &headers, |s| {
                let advance = s.advance()?;
                Ok(NavResult {
                    moved: advance != Advance::EndOfBank,
                    advance: Some(advance),
                })
            })
            .await
        }
        "last" => {
            run(&state, &headers, |s| {
                s.go_last()?;
                Ok(NavResult { moved: true, advance: None })
            })
            .await
        }
        _ => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "unknown navigation target",
            request_id_from_headers(&headers),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct JumpPayload {
    pub index: usize,
}

pub async fn jump(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<JumpPayload>,
) -> CommandResult<()> {
    run(&state, &headers, |s| s.jump(payload.index)).await
}

pub async fn toggle_show_answer(State(state): State<AppState>, headers: HeaderMap) -> CommandResult<bool> {
    run(&state, &headers, |s| Ok(s.toggle_show_answer())).await
}

#[derive(Debug, Deserialize)]
pub struct KeyPayload {
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "camelCase")]
pub enum KeyResult {
    Ignored,
    Selected(SelectResult),
    Advanced(Advance),
    Retreated(bool),
    ShowAnswer(bool),
}

impl From<KeyOutcome> for KeyResult {
    fn from(outcome: KeyOutcome) -> Self {
        match outcome {
            KeyOutcome::Ignored => KeyResult::Ignored,
            KeyOutcome::Selected(s) => KeyResult::Selected(s.into()),
            KeyOutcome::Advanced(a) => KeyResult::Advanced(a),
            KeyOutcome::Retreated(moved) => KeyResult::Retreated(moved),
            KeyOutcome::ShowAnswer(on) => KeyResult::ShowAnswer(on),
        }
    }
}

pub async fn press_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<KeyPayload>,
) -> CommandResult<KeyResult> {
    run(&state, &headers, |s| s.handle_key(&payload.key).map(KeyResult::from)).await
}

#[derive(Debug, Deserialize, Default)]
pub struct ResetPayload {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPayload>,
) -> CommandResult<()> {
    if !payload.confirm {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "CONFIRMATION_REQUIRED",
            "reset must be confirmed",
            request_id_from_headers(&headers),
        ));
    }
    run(&state, &headers, |s| {
        s.reset();
        Ok(())
    })
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearancePayload {
    pub theme: Option<Theme>,
    pub font_size: Option<FontSize>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AppearancePayload>,
) -> CommandResult<()> {
    run(&state, &headers, |s| {
        if let Some(theme) = payload.theme {
            s.set_theme(theme);
        }
        if let Some(font_size) = payload.font_size {
            s.set_font_size(font_size);
        }
        Ok(())
    })
    .await
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(stream: WebSocket, state: AppState) {
    let mut receiver = state.events.subscribe();
    // Replies meant for this client only.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WsEnvelope>();
    let (mut sender_ws, mut receiver_ws) = stream.split();

    let initial = WsEnvelope::state_update(&state.view().await);
    let Ok(text) = serde_json::to_string(&initial) else { return; };
    if sender_ws.send(Message::Text(text)).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                update = receiver.recv() => match update {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("ws client lagged by {} updates", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
            };
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender_ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(message)) = receiver_ws.next().await {
        let Message::Text(txt) = message else { continue; };
        let Ok(env) = serde_json::from_str::<WsEnvelope>(&txt) else { continue; };
        if env.event != KEY_PRESS {
            continue;
        }
        let key = env
            .payload
            .get("key")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        // The resulting state reaches this client through the broadcast.
        if let Err(err) = state.mutate(|s| s.handle_key(&key)).await {
            warn!("ws key {:?} refused: {}", key, err);
            let _ = reply_tx.send(WsEnvelope::new(
                COMMAND_ERROR,
                json!({ "message": err.to_string() }),
                env.request_id.clone(),
            ));
        }
    }

    send_task.abort();
    info!("ws client disconnected");
}
