//! Quiz orchestrator: a 5-question quiz with a 3-attempt/2-hint budget
//! per question and a deterministic score over the transcript.
//!
//! Progress is never stored: every turn recomputes the question index and
//! the attempt/hint counters by scanning the assistant's control tokens
//! in the history log. The generator judges answer correctness (the
//! questions are its own), but the budget rules are enforced here: the
//! per-turn directive tells it exactly which control tokens it may lead
//! with, and skip/exhausted turns leave it no hint option at all.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::domain::{Mode, Role, Turn};
use crate::error::TurnError;
use crate::history::render_transcript;
use crate::profile::profile_for;
use crate::protocol::{
  frame_content, send_frame, CORRECT_TOKEN, HINT1_TOKEN, HINT2_TOKEN, NOTCORRECT_TOKEN, SKIP_TOKEN,
};
use crate::retriever::DEFAULT_TOP_K;
use crate::state::AppState;
use crate::talking::stream_generation;
use crate::util::fill_template;

pub const TOTAL_QUESTIONS: u8 = 5;
pub const MAX_HINTS: u8 = 2;
pub const MAX_ATTEMPTS: u8 = 3;

/// Derived per-turn quiz position. `attempts` counts wrong replies on the
/// current question, `hints` the hints already issued for it; the two
/// move together until the final attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuizState {
  pub question: u8,
  pub attempts: u8,
  pub hints: u8,
  pub started: bool,
  pub completed: bool,
}

impl QuizState {
  fn fresh() -> Self {
    QuizState { question: 1, attempts: 0, hints: 0, started: false, completed: false }
  }
}

/// Rebuild the quiz position from the transcript's control tokens.
pub fn recompute(turns: &[Turn]) -> QuizState {
  let mut state = QuizState::fresh();
  for turn in turns.iter().filter(|t| t.role == Role::Assistant) {
    state.started = true;
    let text = turn.text.as_str();
    if text.starts_with(HINT1_TOKEN) || text.starts_with(HINT2_TOKEN) {
      state.hints = (state.hints + 1).min(MAX_HINTS);
      state.attempts = (state.attempts + 1).min(MAX_ATTEMPTS);
    } else if text.starts_with(CORRECT_TOKEN) || text.starts_with(NOTCORRECT_TOKEN) {
      if state.question >= TOTAL_QUESTIONS {
        state.completed = true;
      } else {
        state.question += 1;
      }
      state.attempts = 0;
      state.hints = 0;
    }
  }
  state
}

/// What the current turn must do, decided before generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnDirective {
  /// First turn: present question 1, nothing to judge.
  Start,
  /// Judge the reply; a wrong answer still has hint budget left.
  Judge,
  /// Both hints are spent: this reply is the final attempt and the
  /// question resolves either way.
  ForceResolve,
  /// Student sent the skip token: resolve as not-correct immediately.
  Skip,
  /// All five questions resolved; only the goodbye remains.
  Finished,
}

pub fn directive_for(state: &QuizState, query: &str) -> TurnDirective {
  if state.completed {
    TurnDirective::Finished
  } else if !state.started {
    TurnDirective::Start
  } else if query.trim() == SKIP_TOKEN {
    TurnDirective::Skip
  } else if state.hints >= MAX_HINTS {
    TurnDirective::ForceResolve
  } else {
    TurnDirective::Judge
  }
}

fn directive_text(directive: TurnDirective, state: &QuizState) -> String {
  let q = state.question;
  let next = "explain, then present the next quiz (or, if this was Quiz 5, thank the student and say goodbye instead)";
  match directive {
    TurnDirective::Start => {
      "This is the very first quiz turn. Present Quiz 1 with its five choices now. Do not judge anything yet.".into()
    }
    TurnDirective::Judge => format!(
      "Judge the student's reply to Quiz {q}. If it is the correct choice, start with <CORRECT>, {next}. \
       If it is wrong, off-topic, or \"I don't know\", start with <HINT{n}> and give ONE short hint for the same quiz.",
      n = state.hints + 1,
    ),
    TurnDirective::ForceResolve => format!(
      "The student already used both hints, so this reply is the final attempt for Quiz {q}. \
       If it is the correct choice, start with <CORRECT>, {next}. Otherwise you MUST NOT give another hint: \
       start with <NOTCORRECT>, give the correct answer and why, then present the next quiz \
       (or, if this was Quiz 5, thank the student and say goodbye instead)."
    ),
    TurnDirective::Skip => format!(
      "The student sent <NEXT> to skip Quiz {q}. Do not judge and do not hint: start with <NOTCORRECT>, {next}."
    ),
    TurnDirective::Finished => {
      "All 5 quizzes are resolved. Thank the student for their hard work, praise them, and say goodbye. Do not present another quiz.".into()
    }
  }
}

fn points_for(hints: u8) -> u32 {
  match hints {
    0 => 20,
    1 => 15,
    _ => 10,
  }
}

/// Deterministic score over the full transcript: per question 20/15/10
/// points for a correct answer with 0/1/2 hints, 0 when never correct
/// (exhausted attempts or skipped). Total is within [0, 100].
pub fn score_transcript(turns: &[Turn]) -> u32 {
  let mut total = 0u32;
  let mut hints = 0u8;
  let mut resolved = 0u8;
  for turn in turns.iter().filter(|t| t.role == Role::Assistant) {
    if resolved >= TOTAL_QUESTIONS {
      break;
    }
    let text = turn.text.as_str();
    if text.starts_with(HINT1_TOKEN) || text.starts_with(HINT2_TOKEN) {
      hints = (hints + 1).min(MAX_HINTS);
    } else if text.starts_with(CORRECT_TOKEN) {
      total += points_for(hints);
      hints = 0;
      resolved += 1;
    } else if text.starts_with(NOTCORRECT_TOKEN) {
      hints = 0;
      resolved += 1;
    }
  }
  total
}

pub struct QuizRequest {
  pub book_id: String,
  pub session_id: String,
  pub query: String,
  pub is_final: bool,
}

/// Run one quiz turn, delivering frames through `tx`.
#[instrument(level = "info", skip(state, req, tx), fields(book_id = %req.book_id, is_final = req.is_final))]
pub async fn run(state: Arc<AppState>, req: QuizRequest, tx: mpsc::Sender<String>) -> Result<(), TurnError> {
  let session_id = if req.session_id.is_empty() {
    state.history.create_session().await
  } else {
    req.session_id.clone()
  };

  let turns = state.history.read_all(&session_id).await;

  // Scoring turn: a pure scan, no generation and no history append.
  if req.is_final {
    let score = score_transcript(&turns);
    info!(target: "quiz", %session_id, score, "Quiz scored");
    send_frame(&tx, frame_content(&score.to_string(), &session_id)).await?;
    return Ok(());
  }

  let quiz_state = recompute(&turns);
  let directive = directive_for(&quiz_state, &req.query);
  info!(target: "quiz", %session_id, question = quiz_state.question, attempts = quiz_state.attempts,
        hints = quiz_state.hints, ?directive, "Quiz turn");

  // The question/choice bands track the student's measured level.
  let student_level = state.classifier.classify(&req.query).await?.level;
  let profile = profile_for(student_level, Mode::Quiz);

  let index = state.index_for(&req.book_id).await;
  let context = index.context_for(&req.query, DEFAULT_TOP_K);

  let question_number = quiz_state.question.to_string();
  let attempts = quiz_state.attempts.to_string();
  let hints = quiz_state.hints.to_string();
  let prompt = fill_template(
    &state.config.prompts.quiz_template,
    &[
      ("question_number", &question_number),
      ("attempts", &attempts),
      ("hints", &hints),
      ("state_directive", &directive_text(directive, &quiz_state)),
      ("question_words", profile.question_words),
      ("choice_words", profile.choice_words),
      ("vocab_level", profile.vocab_level),
      ("context", &context),
      ("chat_history", &render_transcript(&turns)),
      ("query", &req.query),
    ],
  );

  let full = stream_generation(&state, prompt, &session_id, &tx).await?;

  // A resolving turn that came back without its token can't advance the
  // recomputed state next turn; worth an audit line.
  if matches!(directive, TurnDirective::Skip | TurnDirective::ForceResolve)
    && !full.starts_with(CORRECT_TOKEN)
    && !full.starts_with(NOTCORRECT_TOKEN)
  {
    warn!(target: "quiz", %session_id, "Resolving turn missing its control token");
  }

  state.history.append(&session_id, Turn::user(&req.query)).await;
  state.history.append(&session_id, Turn::assistant(full)).await;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assistant(text: &str) -> Turn {
    Turn::assistant(text)
  }

  fn user(text: &str) -> Turn {
    Turn::user(text)
  }

  #[test]
  fn fresh_transcript_starts_at_question_one() {
    let state = recompute(&[]);
    assert_eq!(state, QuizState { question: 1, attempts: 0, hints: 0, started: false, completed: false });
    assert_eq!(directive_for(&state, ""), TurnDirective::Start);
  }

  #[test]
  fn hints_increment_counters_on_the_same_question() {
    let turns = vec![
      assistant("Quiz 1: Who planted the turnip?\nChoices:\n 1. The farmer..."),
      user("the mouse"),
      assistant("<HINT1>Think about who owns the garden."),
      user("the cat"),
      assistant("<HINT2>He wears a straw hat."),
    ];
    let state = recompute(&turns);
    assert_eq!(state.question, 1);
    assert_eq!(state.hints, 2);
    assert_eq!(state.attempts, 2);
    assert!(!state.completed);
  }

  #[test]
  fn correct_resolution_advances_and_resets() {
    let turns = vec![
      assistant("Quiz 1: Who planted the turnip?"),
      user("the farmer"),
      assistant("<CORRECT>Yes! Quiz 2: What grew and grew?"),
    ];
    let state = recompute(&turns);
    assert_eq!(state.question, 2);
    assert_eq!(state.attempts, 0);
    assert_eq!(state.hints, 0);
  }

  #[test]
  fn third_wrong_attempt_forces_resolution_regardless_of_content() {
    let turns = vec![
      assistant("Quiz 1: Who planted the turnip?"),
      assistant("<HINT1>Think about the garden."),
      assistant("<HINT2>He wears a straw hat."),
    ];
    let state = recompute(&turns);
    // Budget exhausted: whatever the student writes next, no hint path
    // remains and the question must resolve.
    assert_eq!(directive_for(&state, "the dog maybe"), TurnDirective::ForceResolve);
    assert_eq!(directive_for(&state, "complete nonsense"), TurnDirective::ForceResolve);

    let after = recompute(
      &[
        turns.clone(),
        vec![assistant("<NOTCORRECT>The farmer planted it. Quiz 2: ...")],
      ]
      .concat(),
    );
    assert_eq!(after.question, 2);
    assert_eq!(after.attempts, 0);
    assert_eq!(after.hints, 0);
  }

  #[test]
  fn skip_token_resolves_immediately() {
    let turns = vec![assistant("Quiz 1: Who planted the turnip?")];
    let state = recompute(&turns);
    assert_eq!(directive_for(&state, "<NEXT>"), TurnDirective::Skip);
    assert_eq!(directive_for(&state, "  <NEXT>  "), TurnDirective::Skip);
    assert_eq!(directive_for(&state, "next please"), TurnDirective::Judge);
  }

  #[test]
  fn fifth_resolution_completes_the_quiz() {
    let mut turns = vec![assistant("Quiz 1: ...")];
    for i in 0..5 {
      turns.push(assistant(&format!("<CORRECT>Well done. Quiz {}: ...", i + 2)));
    }
    let state = recompute(&turns);
    assert!(state.completed);
    assert_eq!(directive_for(&state, "thanks"), TurnDirective::Finished);
  }

  #[test]
  fn scoring_follows_the_hint_table() {
    // Q1 correct with 0 hints (20), Q2 with 1 hint (15), Q3 with 2 hints
    // (10), Q4 never correct (0), Q5 skipped (0) => 45.
    let turns = vec![
      assistant("Quiz 1: ..."),
      assistant("<CORRECT>Right away."),
      assistant("<HINT1>..."),
      assistant("<CORRECT>Good, after one hint."),
      assistant("<HINT1>..."),
      assistant("<HINT2>..."),
      assistant("<CORRECT>Finally, after two hints."),
      assistant("<HINT1>..."),
      assistant("<HINT2>..."),
      assistant("<NOTCORRECT>The answer was the mouse."),
      assistant("<NOTCORRECT>Skipped. That was Quiz 5."),
    ];
    assert_eq!(score_transcript(&turns), 45);
  }

  #[test]
  fn perfect_quiz_scores_one_hundred() {
    let turns: Vec<Turn> = (0..5).map(|_| assistant("<CORRECT>Yes!")).collect();
    assert_eq!(score_transcript(&turns), 100);
  }

  #[test]
  fn all_missed_scores_zero_and_extra_tokens_are_ignored() {
    let mut turns: Vec<Turn> = (0..5).map(|_| assistant("<NOTCORRECT>No.")).collect();
    // Tokens after the fifth resolution must not change the score.
    turns.push(assistant("<CORRECT>stray token"));
    assert_eq!(score_transcript(&turns), 0);
  }

  #[test]
  fn score_is_always_within_bounds() {
    let turns: Vec<Turn> = (0..20).map(|_| assistant("<CORRECT>Yes!")).collect();
    assert!(score_transcript(&turns) <= 100);
  }

  #[test]
  fn user_turns_never_affect_the_state() {
    // A student echoing a control token must not advance the quiz.
    let turns = vec![assistant("Quiz 1: ..."), user("<CORRECT>")];
    let state = recompute(&turns);
    assert_eq!(state.question, 1);
    assert_eq!(score_transcript(&turns), 0);
  }
}
