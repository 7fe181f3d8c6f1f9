//! Static difficulty table: generation constraints per CEFR level, for
//! free conversation and for quizzes. Loaded once, never mutated.

use crate::domain::{CefrLevel, Mode};

/// Generation constraints for one (level, mode) cell.
///
/// `word_limit` bounds the reply length in words; `sentence_count` is a
/// band like "2-3"; `vocab_level` is the vocabulary descriptor fed to the
/// prompt. The quiz bands constrain question and choice word counts and
/// are empty in talking mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifficultyProfile {
  pub word_limit: u32,
  pub sentence_count: &'static str,
  pub vocab_level: &'static str,
  pub question_words: &'static str,
  pub choice_words: &'static str,
}

const TALKING: [DifficultyProfile; 6] = [
  DifficultyProfile { word_limit: 5, sentence_count: "1", vocab_level: "very basic", question_words: "", choice_words: "" },
  DifficultyProfile { word_limit: 10, sentence_count: "1-2", vocab_level: "basic", question_words: "", choice_words: "" },
  DifficultyProfile { word_limit: 15, sentence_count: "2", vocab_level: "common", question_words: "", choice_words: "" },
  DifficultyProfile { word_limit: 20, sentence_count: "2-3", vocab_level: "varied", question_words: "", choice_words: "" },
  DifficultyProfile { word_limit: 25, sentence_count: "3", vocab_level: "advanced", question_words: "", choice_words: "" },
  DifficultyProfile { word_limit: 30, sentence_count: "3-4", vocab_level: "sophisticated", question_words: "", choice_words: "" },
];

const QUIZ: [DifficultyProfile; 6] = [
  DifficultyProfile { word_limit: 5, sentence_count: "1", vocab_level: "very basic vocabulary", question_words: "3-5", choice_words: "1-2" },
  DifficultyProfile { word_limit: 10, sentence_count: "1-2", vocab_level: "basic vocabulary", question_words: "5-8", choice_words: "2-3" },
  DifficultyProfile { word_limit: 15, sentence_count: "2", vocab_level: "common vocabulary", question_words: "8-12", choice_words: "3-5" },
  DifficultyProfile { word_limit: 20, sentence_count: "2-3", vocab_level: "varied vocabulary", question_words: "12-15", choice_words: "5-7" },
  DifficultyProfile { word_limit: 25, sentence_count: "3", vocab_level: "advanced vocabulary", question_words: "15-18", choice_words: "7-9" },
  DifficultyProfile { word_limit: 30, sentence_count: "3-4", vocab_level: "sophisticated vocabulary", question_words: "18-20", choice_words: "9-10" },
];

/// Total lookup over the 6x2 domain. No error path: unknown level strings
/// must be rejected (or defaulted to A1) before reaching this table.
pub fn profile_for(level: CefrLevel, mode: Mode) -> &'static DifficultyProfile {
  let idx = (level.rank() - 1) as usize;
  match mode {
    Mode::Talking => &TALKING[idx],
    Mode::Quiz => &QUIZ[idx],
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn total_over_all_twelve_cells() {
    for level in CefrLevel::ALL {
      for mode in [Mode::Talking, Mode::Quiz] {
        let p = profile_for(level, mode);
        assert!(p.word_limit > 0);
        assert!(!p.sentence_count.is_empty());
        assert!(!p.vocab_level.is_empty());
      }
    }
  }

  #[test]
  fn word_limits_non_decreasing_in_rank() {
    for mode in [Mode::Talking, Mode::Quiz] {
      let mut prev = 0;
      for level in CefrLevel::ALL {
        let limit = profile_for(level, mode).word_limit;
        assert!(limit >= prev, "{level} {mode:?} regressed: {limit} < {prev}");
        prev = limit;
      }
    }
  }

  #[test]
  fn talking_constants_match_design_table() {
    assert_eq!(profile_for(CefrLevel::A1, Mode::Talking).word_limit, 5);
    assert_eq!(profile_for(CefrLevel::A2, Mode::Talking).sentence_count, "1-2");
    assert_eq!(profile_for(CefrLevel::B1, Mode::Talking).vocab_level, "common");
    assert_eq!(profile_for(CefrLevel::C2, Mode::Talking).word_limit, 30);
    assert_eq!(profile_for(CefrLevel::C2, Mode::Talking).sentence_count, "3-4");
  }

  #[test]
  fn quiz_bands_present_for_every_level() {
    for level in CefrLevel::ALL {
      let p = profile_for(level, Mode::Quiz);
      assert!(!p.question_words.is_empty());
      assert!(!p.choice_words.is_empty());
    }
    assert_eq!(profile_for(CefrLevel::A1, Mode::Quiz).question_words, "3-5");
    assert_eq!(profile_for(CefrLevel::C2, Mode::Quiz).choice_words, "9-10");
  }
}
