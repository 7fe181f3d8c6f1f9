//! Storytalk · Book Companion Backend
//!
//! - Axum HTTP API with streamed talking/quiz turns
//! - CEFR-adaptive difficulty (external 6-way classifier + local policy)
//! - Optional OpenAI generation and Google TTS (via environment variables)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   CEFR_MODEL_URL    : inference endpoint for the CEFR classifier (required)
//!   CEFR_MODEL_ID     : default "AbdulSami/bert-base-cased-cefr"
//!   CEFR_API_KEY      : optional bearer token for the inference endpoint
//!   OPENAI_API_KEY    : enables generation if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o"
//!   GOOGLE_TTS_API_KEY: enables speech synthesis if present
//!   AGENT_CONFIG_PATH : path to TOML config (prompt templates + defaults)
//!   BOOK_DATA_DIR     : book content root (default "./ebook")
//!   BOOK_LIST_PATH    : catalog file (default "./data/ebook_list.txt")
//!   BAD_WORDS_PATH    : denylist file (default "./data/bad_words.txt")
//!   SESSION_TTL_SECS  : history TTL (default 3600)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod profile;
mod stabilizer;
mod filter;
mod classifier;
mod corpus;
mod retriever;
mod history;
mod generator;
mod error;
mod protocol;
mod state;
mod talking;
mod quiz;
mod tts;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (stores, classifier, clients, prompts).
  let state = Arc::new(AppState::new()?);

  // The classifier is a hard dependency: probe it before serving so an
  // unavailable model fails the process, not the first student turn.
  state.classifier.warmup().await?;

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "storytalk_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
