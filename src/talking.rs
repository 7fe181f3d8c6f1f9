//! Dialogue orchestrator: the per-turn pipeline for conversation mode.
//!
//! Three turn shapes share one entry point:
//!   - initial greeting (no student input yet, simplest band, level
//!     reported but not stabilized)
//!   - ongoing turn (classify input -> filter -> retrieve -> constrained
//!     generation -> classify output -> stabilize -> report)
//!   - final evaluation (classify the last student message, no generation)
//!
//! Each turn is stateless apart from reading the history log at start and
//! appending to it after the stream completes; a turn that is canceled
//! mid-stream appends nothing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::domain::{CefrLevel, Mode, Turn};
use crate::error::TurnError;
use crate::generator::ChatMessage;
use crate::history::{last_user_turn, render_transcript};
use crate::profile::profile_for;
use crate::protocol::{
  frame_ai_level, frame_content, frame_content_with_level, frame_user_level, send_frame,
  INITIAL_GREETING,
};
use crate::retriever::DEFAULT_TOP_K;
use crate::state::AppState;
use crate::util::fill_template;

const TALKING_TEMPERATURE: f32 = 0.7;

pub struct TalkingRequest {
  pub book_id: String,
  pub character: String,
  pub session_id: String,
  pub query: String,
  pub initial: bool,
  pub is_final: bool,
}

/// Run one conversation turn, delivering frames through `tx`.
#[instrument(level = "info", skip(state, req, tx), fields(book_id = %req.book_id, character = %req.character, initial = req.initial, is_final = req.is_final))]
pub async fn run(state: Arc<AppState>, req: TalkingRequest, tx: mpsc::Sender<String>) -> Result<(), TurnError> {
  let session_id = if req.session_id.is_empty() {
    state.history.create_session().await
  } else {
    req.session_id.clone()
  };

  if req.initial {
    initial_turn(&state, &req, &session_id, &tx).await
  } else if req.is_final {
    final_turn(&state, &session_id, &tx).await
  } else {
    ongoing_turn(&state, &req, &session_id, &tx).await
  }
}

/// System-initiated greeting: character identity plus a story-summary
/// context, no difficulty profile (the greeting is always the simplest
/// band). The output level is informational only.
async fn initial_turn(
  state: &AppState,
  req: &TalkingRequest,
  session_id: &str,
  tx: &mpsc::Sender<String>,
) -> Result<(), TurnError> {
  let index = state.index_for(&req.book_id).await;
  let context = index.context_for("story summary", DEFAULT_TOP_K);
  let description = state.books.description(&req.book_id, &req.character);

  let prompt = fill_template(
    &state.config.prompts.initial_talking_template,
    &[("character", &req.character), ("description", &description), ("context", &context)],
  );

  let full = stream_generation(state, prompt, session_id, tx).await?;

  let ai_level = state.classifier.classify(&full).await?.level;
  send_frame(tx, frame_ai_level(session_id, ai_level)).await?;

  state.history.append(session_id, Turn::user(INITIAL_GREETING)).await;
  state.history.append(session_id, Turn::assistant(full).with_level(ai_level)).await;
  Ok(())
}

/// Ordinary student turn: the full classify/filter/retrieve/generate/
/// stabilize pipeline.
async fn ongoing_turn(
  state: &AppState,
  req: &TalkingRequest,
  session_id: &str,
  tx: &mpsc::Sender<String>,
) -> Result<(), TurnError> {
  // (1) Measure the student first; the profile lookup anchors on this.
  let mut student_level = CefrLevel::A1;
  if !req.query.trim().is_empty() {
    let classification = state.classifier.classify(&req.query).await?;
    student_level = classification.level;
    if classification.needs_review {
      info!(target: "cefr", candidates = ?classification.candidates, "Ambiguous student level");
    }
    send_frame(tx, frame_user_level(student_level)).await?;
  }

  // (2) Denylist trip is a successful outcome with a substituted payload:
  // skip generation entirely and tag the fixed redirect as A1.
  let scan = state.filter.scan(&req.query);
  if scan.blocked {
    info!(target: "talking", %session_id, "Input blocked by content filter");
    send_frame(tx, frame_content_with_level(&scan.safe_text, session_id, CefrLevel::A1)).await?;
    return Ok(());
  }

  // (3) Assemble the constrained generation request.
  let index = state.index_for(&req.book_id).await;
  let context = index.context_for(&req.query, DEFAULT_TOP_K);
  let description = state.books.description(&req.book_id, &req.character);
  let history = state.history.read_all(session_id).await;
  let profile = profile_for(student_level, Mode::Talking);

  let word_limit = profile.word_limit.to_string();
  let prompt = fill_template(
    &state.config.prompts.talking_template,
    &[
      ("question", &req.query),
      ("difficulty", student_level.as_str()),
      ("character", &req.character),
      ("description", &description),
      ("word_limit", &word_limit),
      ("sentence_count", profile.sentence_count),
      ("vocab_level", profile.vocab_level),
      ("context", &context),
      ("chat_history", &render_transcript(&history)),
    ],
  );

  // (4) Stream and accumulate.
  let full = stream_generation(state, prompt, session_id, tx).await?;

  // (5)(6) Classify the draft, then clamp it to the student's band.
  let draft_level = state.classifier.classify(&full).await?.level;
  let stabilized = crate::stabilizer::stabilize(student_level, draft_level);
  send_frame(tx, frame_ai_level(session_id, stabilized)).await?;

  state.history.append(session_id, Turn::user(&req.query).with_level(student_level)).await;
  state.history.append(session_id, Turn::assistant(full).with_level(stabilized)).await;
  Ok(())
}

/// Final evaluation: measure the last thing the student said. No
/// generation call and no history append.
async fn final_turn(
  state: &AppState,
  session_id: &str,
  tx: &mpsc::Sender<String>,
) -> Result<(), TurnError> {
  let history = state.history.read_all(session_id).await;
  let level = match last_user_turn(&history) {
    Some(turn) => state.classifier.classify(&turn.text).await?.level,
    None => state.config.default_level,
  };
  info!(target: "talking", %session_id, %level, "Final evaluation");
  send_frame(tx, frame_content(level.as_str(), session_id)).await?;
  Ok(())
}

/// Drive the generator, forwarding each fragment as a content frame and
/// returning the accumulated text. Errors and cancellations propagate
/// before anything is committed to history.
pub(crate) async fn stream_generation(
  state: &AppState,
  prompt: String,
  session_id: &str,
  tx: &mpsc::Sender<String>,
) -> Result<String, TurnError> {
  let generator = state.generator.as_ref().ok_or(TurnError::GeneratorUnavailable)?;
  let mut rx = generator.chat_stream(vec![ChatMessage::user(prompt)], TALKING_TEMPERATURE).await?;

  let mut full = String::new();
  while let Some(item) = rx.recv().await {
    let fragment = item?;
    full.push_str(&fragment);
    send_frame(tx, frame_content(&fragment, session_id)).await?;
  }
  Ok(full)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::{ContentFilter, REDIRECT_MESSAGE};
  use std::io::Write;

  // The pure pieces (stabilizer, profiles, classifier policy) have their
  // own module tests; here we drive whole turns that need no live
  // collaborators.

  fn test_state() -> Arc<AppState> {
    // Unreachable model endpoint: only paths that never call it may run.
    std::env::set_var("CEFR_MODEL_URL", "http://127.0.0.1:1/models");
    Arc::new(AppState::new().expect("state"))
  }

  #[test]
  fn blocked_input_produces_the_fixed_redirect_frame() {
    let filter = ContentFilter::from_words(["donkey"]);
    let scan = filter.scan("you are a donkey and forty more words about the story");
    assert!(scan.blocked);
    let frame = frame_content_with_level(&scan.safe_text, "abc12345", CefrLevel::A1);
    assert_eq!(frame, format!("content={REDIRECT_MESSAGE}<session_id>=abc12345<AI_CEFR>=A1\n"));
  }

  #[test]
  fn empty_history_scans_to_no_user_turn() {
    assert!(last_user_turn(&[]).is_none());
    let greeting_only = [Turn::assistant("Hello! Who am I?")];
    assert!(last_user_turn(&greeting_only).is_none());
  }

  #[tokio::test]
  async fn final_evaluation_with_no_user_turns_reports_the_default_level() {
    let state = test_state();
    let session_id = state.history.create_session().await;
    let (tx, mut rx) = mpsc::channel(8);

    let req = TalkingRequest {
      book_id: "ACS001".into(),
      character: "main".into(),
      session_id: session_id.clone(),
      query: String::new(),
      initial: false,
      is_final: true,
    };
    run(state, req, tx).await.expect("final turn");

    let frame = rx.recv().await.expect("one frame");
    assert_eq!(frame, format!("content=A1<session_id>={session_id}\n"));
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn blocked_turn_short_circuits_without_generation_or_history() {
    let mut denylist = tempfile::NamedTempFile::new().unwrap();
    writeln!(denylist, "donkey").unwrap();
    std::env::set_var("BAD_WORDS_PATH", denylist.path());
    let state = test_state();
    let session_id = state.history.create_session().await;
    let (tx, mut rx) = mpsc::channel(8);

    // One word: the short-text rule measures it without the model, and
    // the filter then stops the turn before any generation could start.
    let req = TalkingRequest {
      book_id: "ACS001".into(),
      character: "main".into(),
      session_id: session_id.clone(),
      query: "donkey".into(),
      initial: false,
      is_final: false,
    };
    run(state.clone(), req, tx).await.expect("blocked turn");

    assert_eq!(rx.recv().await.unwrap(), "content=<USER_CEFR>=A1\n");
    assert_eq!(
      rx.recv().await.unwrap(),
      format!("content={REDIRECT_MESSAGE}<session_id>={session_id}<AI_CEFR>=A1\n")
    );
    assert!(rx.recv().await.is_none());
    // Nothing was committed to the log.
    assert!(state.history.read_all(&session_id).await.is_empty());
  }
}
