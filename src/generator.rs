//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions with `stream: true` and forward the
//! delta fragments through a channel. Calls are instrumented and log
//! model names and latencies (not contents).
//!
//! Cancellation is cooperative: when the consumer drops the receiving
//! half, the forwarding task notices the failed send and returns, which
//! drops the in-flight HTTP response. The caller is responsible for not
//! committing a partial response to history.
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("generation request failed: {0}")]
  Http(String),
  #[error("generation stream failed: {0}")]
  Stream(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

impl ChatMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".into(), content: content.into() }
  }
}

#[derive(Clone)]
pub struct OpenAI {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessage>,
  temperature: f32,
  stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
  choices: Vec<StreamChoice>,
}
#[derive(Deserialize)]
struct StreamChoice {
  delta: StreamDelta,
}
#[derive(Deserialize)]
struct StreamDelta {
  #[serde(default)]
  content: Option<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  /// Streamed chat completion. Returns a receiver of text fragments in
  /// generation order; the sequence is finite and not restartable. An
  /// error item terminates the stream.
  #[instrument(level = "info", skip(self, messages), fields(model = %self.model, messages = messages.len()))]
  pub async fn chat_stream(
    &self,
    messages: Vec<ChatMessage>,
    temperature: f32,
  ) -> Result<mpsc::Receiver<Result<String, GenerateError>>, GenerateError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest { model: self.model.clone(), messages, temperature, stream: true };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "storytalk-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| GenerateError::Http(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerateError::Http(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let (tx, rx) = mpsc::channel::<Result<String, GenerateError>>(32);
    let started = std::time::Instant::now();
    tokio::spawn(async move {
      let mut bytes = res.bytes_stream();
      let mut buffer = String::new();
      let mut fragments = 0usize;
      'outer: while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
          Ok(c) => c,
          Err(e) => {
            let _ = tx.send(Err(GenerateError::Stream(e.to_string()))).await;
            return;
          }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = buffer.find('\n') {
          let line = buffer[..pos].trim().to_string();
          buffer.drain(..=pos);
          let Some(payload) = line.strip_prefix("data:").map(str::trim) else { continue };
          if payload == "[DONE]" {
            break 'outer;
          }
          let fragment = match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk.choices.into_iter().next().and_then(|c| c.delta.content),
            Err(e) => {
              let _ = tx.send(Err(GenerateError::Stream(format!("bad stream chunk: {}", e)))).await;
              return;
            }
          };
          if let Some(text) = fragment {
            if !text.is_empty() {
              fragments += 1;
              if tx.send(Ok(text)).await.is_err() {
                // Consumer gone: cancel by dropping the response.
                debug!(target: "storytalk_backend", "Generation consumer dropped; canceling stream");
                return;
              }
            }
          }
        }
      }
      info!(target: "storytalk_backend", fragments, elapsed = ?started.elapsed(), "Generation stream complete");
    });

    Ok(rx)
  }
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_openai_error_message() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"rate_limit"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("not json"), None);
  }
}
