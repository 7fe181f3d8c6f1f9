//! Lexical content filter: case-insensitive whole-word scan against a
//! denylist file, with a fixed redirect message on a match.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

/// Fixed reply substituted for a blocked message. Never varies.
pub const REDIRECT_MESSAGE: &str = "Let’s keep our chat nice and safe for everyone!";

/// Outcome of one scan. A match is a defined successful outcome with a
/// substituted payload, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scan {
  pub blocked: bool,
  pub safe_text: String,
}

pub struct ContentFilter {
  denylist: HashSet<String>,
}

impl ContentFilter {
  /// Load the denylist from `path`, one lowercase word per line. A missing
  /// or unreadable file degrades to an empty denylist (the filter never
  /// blocks) with a logged warning; it is not fatal.
  pub fn load(path: &Path) -> Self {
    let denylist = match std::fs::read_to_string(path) {
      Ok(contents) => {
        let words: HashSet<String> = contents
          .lines()
          .map(|line| line.trim().to_lowercase())
          .filter(|w| !w.is_empty())
          .collect();
        info!(target: "storytalk_backend", path = %path.display(), words = words.len(), "Denylist loaded");
        words
      }
      Err(e) => {
        warn!(target: "storytalk_backend", path = %path.display(), error = %e, "Denylist file unavailable; filter will never block");
        HashSet::new()
      }
    };
    Self { denylist }
  }

  #[cfg(test)]
  pub fn from_words<I: IntoIterator<Item = S>, S: Into<String>>(words: I) -> Self {
    Self { denylist: words.into_iter().map(|w| w.into().to_lowercase()).collect() }
  }

  /// Scan `text` for denylisted words. Whole-word match over alphanumeric
  /// tokens, so a listed term embedded inside a longer word does not trip.
  /// Empty or all-whitespace input is never blocked and yields "".
  pub fn scan(&self, text: &str) -> Scan {
    let trimmed = text.trim();
    if trimmed.is_empty() {
      return Scan { blocked: false, safe_text: String::new() };
    }

    if !self.denylist.is_empty() {
      let lowered = trimmed.to_lowercase();
      for word in lowered.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if !word.is_empty() && self.denylist.contains(word) {
          // The matched term goes to the audit log only, never to the user.
          warn!(target: "storytalk_backend", matched = %word, "Denylisted word detected");
          return Scan { blocked: true, safe_text: REDIRECT_MESSAGE.to_string() };
        }
      }
    }

    Scan { blocked: false, safe_text: trimmed.to_string() }
  }
}
