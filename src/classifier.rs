//! CEFR classification: a thin policy layer over a pretrained 6-way text
//! classifier served over HTTP.
//!
//! The policy is deterministic over the model's ranked distribution:
//!   - inputs under 7 words never reach the model and come back A1/low
//!   - a top-2 score gap under 0.15 is ambiguous (low confidence, flagged
//!     for external review with both candidates exposed)
//!   - a gap of 0.30 or more is high confidence, anything between is medium
//!
//! The model client is constructed once at process start; an unreachable
//! model is a fatal initialization error, there is no per-call fallback.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::{CefrLevel, Classification, Confidence, ScoredLevel};
use crate::util::word_count;

/// Word counts below this are too degenerate for the statistical model.
const MIN_MODEL_WORDS: usize = 7;
/// Top-2 gap below which the ranked labels are considered ambiguous.
const AMBIGUOUS_GAP: f32 = 0.15;
/// Top-2 gap at or above which the top label is high confidence.
const HIGH_CONFIDENCE_GAP: f32 = 0.30;

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("CEFR model is not configured: {0}")]
  Config(String),
  #[error("CEFR model request failed: {0}")]
  Http(String),
  #[error("CEFR model returned an unusable response: {0}")]
  Decode(String),
}

/// HTTP client for the inference endpoint hosting the 6-way classifier.
#[derive(Clone)]
pub struct HttpLevelModel {
  client: reqwest::Client,
  base_url: String,
  model_id: String,
  api_key: Option<String>,
}

#[derive(Deserialize)]
struct LabelScore {
  label: String,
  score: f32,
}

impl HttpLevelModel {
  /// Build the model client from CEFR_MODEL_URL / CEFR_MODEL_ID /
  /// CEFR_API_KEY. A missing endpoint is a configuration error: the
  /// classifier is a hard dependency, unlike the optional generator.
  pub fn from_env() -> Result<Self, ModelError> {
    let base_url = std::env::var("CEFR_MODEL_URL")
      .map_err(|_| ModelError::Config("CEFR_MODEL_URL is not set".into()))?;
    let model_id = std::env::var("CEFR_MODEL_ID")
      .unwrap_or_else(|_| "AbdulSami/bert-base-cased-cefr".into());
    let api_key = std::env::var("CEFR_API_KEY").ok();

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .map_err(|e| ModelError::Config(e.to_string()))?;

    Ok(Self { client, base_url, model_id, api_key })
  }

  /// Ranked (label, score) distribution for `text`, best first.
  #[instrument(level = "debug", skip(self, text), fields(model = %self.model_id, text_len = text.len()))]
  async fn rank(&self, text: &str) -> Result<Vec<ScoredLevel>, ModelError> {
    let url = format!("{}/{}", self.base_url.trim_end_matches('/'), self.model_id);
    let mut req = self
      .client
      .post(&url)
      .header(USER_AGENT, "storytalk-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&serde_json::json!({ "inputs": text }));
    if let Some(key) = &self.api_key {
      req = req.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let res = req.send().await.map_err(|e| ModelError::Http(e.to_string()))?;
    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(ModelError::Http(format!("HTTP {}: {}", status, body)));
    }

    // Inference servers wrap single-input results in one extra array.
    let raw: serde_json::Value = res.json().await.map_err(|e| ModelError::Decode(e.to_string()))?;
    let entries: Vec<LabelScore> = match &raw {
      serde_json::Value::Array(items) if items.first().map(|v| v.is_array()).unwrap_or(false) => {
        serde_json::from_value(items[0].clone()).map_err(|e| ModelError::Decode(e.to_string()))?
      }
      _ => serde_json::from_value(raw).map_err(|e| ModelError::Decode(e.to_string()))?,
    };

    let mut scores = Vec::with_capacity(entries.len());
    for e in entries {
      let level: CefrLevel = e
        .label
        .parse()
        .map_err(|_| ModelError::Decode(format!("unexpected label {:?}", e.label)))?;
      scores.push(ScoredLevel { level, score: e.score });
    }
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    if scores.len() < 2 {
      return Err(ModelError::Decode(format!("degenerate distribution ({} labels)", scores.len())));
    }
    Ok(scores)
  }
}

/// The classifier service handle: shared by reference across concurrent
/// turns, never mutated by a call.
#[derive(Clone)]
pub struct CefrClassifier {
  model: HttpLevelModel,
}

impl CefrClassifier {
  pub fn new(model: HttpLevelModel) -> Self {
    Self { model }
  }

  /// Probe the model once at startup so an unavailable model fails the
  /// process instead of the first student turn.
  pub async fn warmup(&self) -> Result<(), ModelError> {
    let probe = "The farmer pulled the enormous turnip out of the ground.";
    let scores = self.model.rank(probe).await?;
    info!(target: "cefr", top = %scores[0].level, "CEFR model warmup ok");
    Ok(())
  }

  /// Classify one utterance. Deterministic in the input text and the fixed
  /// model weights; no state is carried across calls.
  #[instrument(level = "info", skip(self, text), fields(words = word_count(text)))]
  pub async fn classify(&self, text: &str) -> Result<Classification, ModelError> {
    let words = word_count(text);
    if words < MIN_MODEL_WORDS {
      return Ok(short_text_result());
    }
    let scores = self.model.rank(text).await?;
    Ok(resolve(scores))
  }
}

/// Synthetic result for inputs too short for the model.
fn short_text_result() -> Classification {
  Classification {
    level: CefrLevel::A1,
    confidence: Confidence::Low,
    needs_review: false,
    candidates: None,
    scores: vec![
      ScoredLevel { level: CefrLevel::A1, score: 0.95 },
      ScoredLevel { level: CefrLevel::A2, score: 0.05 },
    ],
  }
}

/// Confidence/ambiguity policy over a ranked distribution, best first.
fn resolve(scores: Vec<ScoredLevel>) -> Classification {
  let gap = scores[0].score - scores[1].score;
  let level = scores[0].level;
  if gap < AMBIGUOUS_GAP {
    Classification {
      level,
      confidence: Confidence::Low,
      needs_review: true,
      candidates: Some((scores[0].level, scores[1].level)),
      scores,
    }
  } else {
    Classification {
      level,
      confidence: if gap >= HIGH_CONFIDENCE_GAP { Confidence::High } else { Confidence::Medium },
      needs_review: false,
      candidates: None,
      scores,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dist(pairs: &[(CefrLevel, f32)]) -> Vec<ScoredLevel> {
    pairs.iter().map(|&(level, score)| ScoredLevel { level, score }).collect()
  }

  fn unreachable_classifier() -> CefrClassifier {
    // Points at nothing; only the short-text path may run against it.
    std::env::set_var("CEFR_MODEL_URL", "http://127.0.0.1:1/models");
    CefrClassifier::new(HttpLevelModel::from_env().unwrap())
  }

  #[tokio::test]
  async fn short_text_returns_a1_low_without_model_call() {
    let classifier = unreachable_classifier();
    for text in ["Hi", "I like it", "one two three four five six"] {
      let c = classifier.classify(text).await.unwrap();
      assert_eq!(c.level, CefrLevel::A1);
      assert_eq!(c.confidence, Confidence::Low);
      assert!(!c.needs_review);
      assert_eq!(c.scores.len(), 2);
      assert_eq!(c.scores[0].level, CefrLevel::A1);
    }
  }

  #[tokio::test]
  async fn seven_words_reach_the_model() {
    let classifier = unreachable_classifier();
    let err = classifier.classify("one two three four five six seven").await.unwrap_err();
    assert!(matches!(err, ModelError::Http(_)));
  }

  #[test]
  fn narrow_gap_is_ambiguous_and_flagged() {
    let c = resolve(dist(&[
      (CefrLevel::B2, 0.40),
      (CefrLevel::B1, 0.30),
      (CefrLevel::C1, 0.15),
      (CefrLevel::A2, 0.08),
      (CefrLevel::C2, 0.05),
      (CefrLevel::A1, 0.02),
    ]));
    assert_eq!(c.level, CefrLevel::B2);
    assert_eq!(c.confidence, Confidence::Low);
    assert!(c.needs_review);
    assert_eq!(c.candidates, Some((CefrLevel::B2, CefrLevel::B1)));
  }

  #[test]
  fn wide_gap_is_high_confidence() {
    let c = resolve(dist(&[(CefrLevel::C1, 0.70), (CefrLevel::B2, 0.20)]));
    assert_eq!(c.confidence, Confidence::High);
    assert!(!c.needs_review);
    assert_eq!(c.candidates, None);
  }

  #[test]
  fn middle_gap_is_medium_confidence() {
    let c = resolve(dist(&[(CefrLevel::A2, 0.55), (CefrLevel::B1, 0.35)]));
    assert_eq!(c.confidence, Confidence::Medium);
    assert!(!c.needs_review);
  }

  #[test]
  fn gap_boundaries() {
    // Exact binary fractions, so the gaps land crisply on each side.
    let c = resolve(dist(&[(CefrLevel::B1, 0.5), (CefrLevel::B2, 0.34375)]));
    assert_eq!(c.confidence, Confidence::Medium);
    let c = resolve(dist(&[(CefrLevel::B1, 0.8125), (CefrLevel::B2, 0.5)]));
    assert_eq!(c.confidence, Confidence::High);
    let c = resolve(dist(&[(CefrLevel::B1, 0.5), (CefrLevel::B2, 0.375)]));
    assert_eq!(c.confidence, Confidence::Low);
    assert!(c.needs_review);
  }
}
