//! Public wire surface: request DTOs for the HTTP endpoints and the
//! framing of the multiplexed response stream.
//!
//! The stream is plain text parsed by string search downstream, so every
//! frame shape here is format-significant: a `content=` prefix per
//! fragment, bracketed `<session_id>=` / `<USER_CEFR>=` / `<AI_CEFR>=`
//! markers embedded in the fragment text, and the uppercase quiz control
//! tokens leading the relevant fragment.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::CefrLevel;
use crate::error::TurnError;

/// Quiz control tokens, emitted as the first characters of the fragment.
pub const CORRECT_TOKEN: &str = "<CORRECT>";
pub const HINT1_TOKEN: &str = "<HINT1>";
pub const HINT2_TOKEN: &str = "<HINT2>";
pub const NOTCORRECT_TOKEN: &str = "<NOTCORRECT>";
/// Sent by the student to skip the current question.
pub const SKIP_TOKEN: &str = "<NEXT>";

/// Sentinel user message recorded for the system-initiated greeting turn.
pub const INITIAL_GREETING: &str = "[INITIAL_GREETING]";

/// One content fragment tagged with its session.
pub fn frame_content(fragment: &str, session_id: &str) -> String {
  format!("content={fragment}<session_id>={session_id}\n")
}

/// The measured level of the student's input, emitted before generation.
pub fn frame_user_level(level: CefrLevel) -> String {
  format!("content=<USER_CEFR>={level}\n")
}

/// The measured (and, for ongoing turns, stabilized) level of the
/// assistant's full output, emitted after streaming completes.
pub fn frame_ai_level(session_id: &str, level: CefrLevel) -> String {
  format!("content=<session_id>={session_id}<AI_CEFR>={level}\n")
}

/// A content fragment that also carries the assistant level, used for the
/// filter short-circuit where no separate level frame follows.
pub fn frame_content_with_level(fragment: &str, session_id: &str, level: CefrLevel) -> String {
  format!("content={fragment}<session_id>={session_id}<AI_CEFR>={level}\n")
}

/// Deliver one frame to the transport. A failed send means the client
/// dropped the response stream; surfaced as a cancellation so callers
/// abort without committing partial work.
pub async fn send_frame(tx: &mpsc::Sender<String>, frame: String) -> Result<(), TurnError> {
  tx.send(frame).await.map_err(|_| TurnError::Canceled)
}

//
// HTTP request/response DTOs
//

fn default_character() -> String {
  "main".into()
}

#[derive(Debug, Deserialize)]
pub struct TalkingForm {
  pub book_id: String,
  #[serde(default = "default_character")]
  pub character: String,
  #[serde(default)]
  pub session_id: String,
  #[serde(default)]
  pub query: String,
  /// First turn of a session: system-initiated greeting, no student input.
  #[serde(default)]
  pub initial: bool,
  /// Evaluation turn: classify the last student message, no generation.
  #[serde(default, rename = "final")]
  pub is_final: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuizForm {
  pub book_id: String,
  #[serde(default)]
  pub session_id: String,
  #[serde(default)]
  pub query: String,
  /// Scoring turn: deterministic scan of the transcript, no generation.
  #[serde(default, rename = "final")]
  pub is_final: bool,
}

fn default_speaker() -> String {
  "en-US-Chirp3-HD-Achernar".into()
}

fn default_speed() -> f32 {
  0.9
}

#[derive(Debug, Deserialize)]
pub struct TtsForm {
  pub text: String,
  #[serde(default = "default_speaker")]
  pub speaker: String,
  #[serde(default = "default_speed")]
  pub speed: f32,
}

#[derive(Debug, Deserialize)]
pub struct CharacterQuery {
  pub book_id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_match_the_wire_format() {
    assert_eq!(frame_content("Hello!", "abc12345"), "content=Hello!<session_id>=abc12345\n");
    assert_eq!(frame_user_level(CefrLevel::B1), "content=<USER_CEFR>=B1\n");
    assert_eq!(
      frame_ai_level("abc12345", CefrLevel::B2),
      "content=<session_id>=abc12345<AI_CEFR>=B2\n"
    );
    assert_eq!(
      frame_content_with_level("Careful!", "abc12345", CefrLevel::A1),
      "content=Careful!<session_id>=abc12345<AI_CEFR>=A1\n"
    );
  }

  #[test]
  fn talking_form_fills_defaults() {
    let form: TalkingForm =
      serde_urlencoded::from_str("book_id=ACS001").unwrap();
    assert_eq!(form.book_id, "ACS001");
    assert_eq!(form.character, "main");
    assert_eq!(form.session_id, "");
    assert!(!form.initial);
    assert!(!form.is_final);
  }

  #[test]
  fn final_field_uses_the_wire_name() {
    let form: TalkingForm =
      serde_urlencoded::from_str("book_id=ACS001&final=true&query=bye").unwrap();
    assert!(form.is_final);
    assert_eq!(form.query, "bye");
  }
}
