//! Turn-level error taxonomy. Collaborator failures stay distinguishable
//! so the transport can tell a client disconnect from a backend failure;
//! nothing here is retried internally.

use thiserror::Error;

use crate::classifier::ModelError;
use crate::generator::GenerateError;

#[derive(Debug, Error)]
pub enum TurnError {
  #[error("text generation is not configured (OPENAI_API_KEY missing)")]
  GeneratorUnavailable,
  #[error(transparent)]
  Generator(#[from] GenerateError),
  #[error(transparent)]
  Model(#[from] ModelError),
  /// The caller went away mid-stream; re-raised, never swallowed, so the
  /// transport can distinguish "disconnected" from "failed". The partial
  /// response is discarded and never appended to history.
  #[error("client disconnected mid-stream")]
  Canceled,
}

impl TurnError {
  pub fn is_cancellation(&self) -> bool {
    matches!(self, TurnError::Canceled)
  }
}
