//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! orchestrators; the talking/quiz handlers bridge an orchestrator task
//! to the response body through a channel, so a client disconnect drops
//! the channel and cancels the turn cooperatively.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
  body::Body,
  extract::{Form, Query, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt as _};
use tracing::{error, info, instrument};

use crate::protocol::{CharacterQuery, HealthOut, QuizForm, TalkingForm, TtsForm};
use crate::quiz::{self, QuizRequest};
use crate::state::AppState;
use crate::talking::{self, TalkingRequest};

const FRAME_CHANNEL_CAPACITY: usize = 32;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_book_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.books.list().to_vec())
}

#[instrument(level = "info", skip(state), fields(book_id = %q.book_id))]
pub async fn http_characters(
  State(state): State<Arc<AppState>>,
  Query(q): Query<CharacterQuery>,
) -> impl IntoResponse {
  Json(state.books.characters(&q.book_id))
}

/// Wrap a channel of frames into a streamed `text/event-stream` body.
fn framed_response(rx: mpsc::Receiver<String>) -> Response {
  let stream = ReceiverStream::new(rx).map(Ok::<String, Infallible>);
  (
    [(header::CONTENT_TYPE, "text/event-stream")],
    Body::from_stream(stream),
  )
    .into_response()
}

#[instrument(level = "info", skip(state, form), fields(book_id = %form.book_id, character = %form.character, initial = form.initial, is_final = form.is_final, query_len = form.query.len()))]
pub async fn http_talking(
  State(state): State<Arc<AppState>>,
  Form(form): Form<TalkingForm>,
) -> Response {
  let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
  let req = TalkingRequest {
    book_id: form.book_id,
    character: form.character,
    session_id: form.session_id,
    query: form.query,
    initial: form.initial,
    is_final: form.is_final,
  };
  tokio::spawn(async move {
    if let Err(e) = talking::run(state, req, tx).await {
      if e.is_cancellation() {
        info!(target: "talking", "Client disconnected");
      } else {
        error!(target: "talking", error = %e, "Talking turn failed");
      }
    }
  });
  framed_response(rx)
}

#[instrument(level = "info", skip(state, form), fields(book_id = %form.book_id, is_final = form.is_final, query_len = form.query.len()))]
pub async fn http_quiz(
  State(state): State<Arc<AppState>>,
  Form(form): Form<QuizForm>,
) -> Response {
  let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
  let req = QuizRequest {
    book_id: form.book_id,
    session_id: form.session_id,
    query: form.query,
    is_final: form.is_final,
  };
  tokio::spawn(async move {
    if let Err(e) = quiz::run(state, req, tx).await {
      if e.is_cancellation() {
        info!(target: "quiz", "Client disconnected");
      } else {
        error!(target: "quiz", error = %e, "Quiz turn failed");
      }
    }
  });
  framed_response(rx)
}

#[instrument(level = "info", skip(state, form), fields(speaker = %form.speaker, text_len = form.text.len()))]
pub async fn http_tts(
  State(state): State<Arc<AppState>>,
  Form(form): Form<TtsForm>,
) -> Response {
  let Some(tts) = &state.tts else {
    return (StatusCode::SERVICE_UNAVAILABLE, "speech synthesis is not configured").into_response();
  };
  match tts.synthesize(&form.text, &form.speaker, form.speed).await {
    Ok(audio) => ([(header::CONTENT_TYPE, "audio/mp3")], audio).into_response(),
    Err(e) => {
      error!(target: "storytalk_backend", error = %e, "TTS failed");
      (StatusCode::BAD_GATEWAY, "speech synthesis failed").into_response()
    }
  }
}
