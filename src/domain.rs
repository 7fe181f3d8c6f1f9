//! Domain models used by the backend: CEFR levels, classification results,
//! generation modes, and conversation turns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CEFR proficiency level, ordered A1 (lowest) to C2 (highest).
///
/// Levels map to ranks 1..=6 for the arithmetic the stabilizer and the
/// difficulty bands need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CefrLevel {
  A1,
  A2,
  B1,
  B2,
  C1,
  C2,
}

impl CefrLevel {
  pub const ALL: [CefrLevel; 6] = [
    CefrLevel::A1,
    CefrLevel::A2,
    CefrLevel::B1,
    CefrLevel::B2,
    CefrLevel::C1,
    CefrLevel::C2,
  ];

  /// Integer rank, 1 for A1 through 6 for C2.
  pub fn rank(self) -> i32 {
    match self {
      CefrLevel::A1 => 1,
      CefrLevel::A2 => 2,
      CefrLevel::B1 => 3,
      CefrLevel::B2 => 4,
      CefrLevel::C1 => 5,
      CefrLevel::C2 => 6,
    }
  }

  /// Inverse of `rank`, clamping out-of-range values to the [1, 6] bound.
  pub fn from_rank(rank: i32) -> CefrLevel {
    match rank {
      i32::MIN..=1 => CefrLevel::A1,
      2 => CefrLevel::A2,
      3 => CefrLevel::B1,
      4 => CefrLevel::B2,
      5 => CefrLevel::C1,
      _ => CefrLevel::C2,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      CefrLevel::A1 => "A1",
      CefrLevel::A2 => "A2",
      CefrLevel::B1 => "B1",
      CefrLevel::B2 => "B2",
      CefrLevel::C1 => "C1",
      CefrLevel::C2 => "C2",
    }
  }
}

impl fmt::Display for CefrLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CefrLevel {
  type Err = UnknownLevel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "A1" | "a1" => Ok(CefrLevel::A1),
      "A2" | "a2" => Ok(CefrLevel::A2),
      "B1" | "b1" => Ok(CefrLevel::B1),
      "B2" | "b2" => Ok(CefrLevel::B2),
      "C1" | "c1" => Ok(CefrLevel::C1),
      "C2" | "c2" => Ok(CefrLevel::C2),
      other => Err(UnknownLevel(other.to_string())),
    }
  }
}

/// A string that is not one of the six CEFR tokens. Rejected at the
/// boundary; core lookups default unknown levels to A1 instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown CEFR level: {:?}", self.0)
  }
}

impl std::error::Error for UnknownLevel {}

/// How sure the classifier is about its top-ranked level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

/// One (level, score) entry of the ranked distribution, score in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredLevel {
  pub level: CefrLevel,
  pub score: f32,
}

/// Result of one classification call. Produced per call, never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct Classification {
  pub level: CefrLevel,
  pub confidence: Confidence,
  /// True when the top-2 gap is ambiguous and a downstream arbitration
  /// step could re-decide between `candidates`.
  pub needs_review: bool,
  /// Top-2 candidate labels, present only on the ambiguous path.
  pub candidates: Option<(CefrLevel, CefrLevel)>,
  /// Ranked distribution, best first. Two synthetic entries on the
  /// short-text path, all six levels otherwise.
  pub scores: Vec<ScoredLevel>,
}

/// Which difficulty table a lookup targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
  Talking,
  Quiz,
}

/// Who authored a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  User,
  Assistant,
}

/// One entry of a session's append-only history log.
///
/// The single fixed shape every history record takes; validated at the
/// store boundary so the orchestrators never branch on record shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
  pub role: Role,
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub level: Option<CefrLevel>,
}

impl Turn {
  pub fn user(text: impl Into<String>) -> Self {
    Turn { role: Role::User, text: text.into(), level: None }
  }

  pub fn assistant(text: impl Into<String>) -> Self {
    Turn { role: Role::Assistant, text: text.into(), level: None }
  }

  pub fn with_level(mut self, level: CefrLevel) -> Self {
    self.level = Some(level);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ranks_round_trip() {
    for level in CefrLevel::ALL {
      assert_eq!(CefrLevel::from_rank(level.rank()), level);
    }
  }

  #[test]
  fn from_rank_clamps_to_bounds() {
    assert_eq!(CefrLevel::from_rank(0), CefrLevel::A1);
    assert_eq!(CefrLevel::from_rank(-3), CefrLevel::A1);
    assert_eq!(CefrLevel::from_rank(7), CefrLevel::C2);
  }

  #[test]
  fn parse_accepts_exactly_six_tokens() {
    assert_eq!("B2".parse::<CefrLevel>().unwrap(), CefrLevel::B2);
    assert_eq!(" c1 ".parse::<CefrLevel>().unwrap(), CefrLevel::C1);
    assert!("A3".parse::<CefrLevel>().is_err());
    assert!("".parse::<CefrLevel>().is_err());
    assert!("beginner".parse::<CefrLevel>().is_err());
  }

  #[test]
  fn levels_are_totally_ordered() {
    assert!(CefrLevel::A1 < CefrLevel::A2);
    assert!(CefrLevel::B2 < CefrLevel::C1);
    assert!(CefrLevel::C2 > CefrLevel::A1);
  }
}
