//! Bounds the assistant's output level to within one band of the
//! student's current level, so one noisy classification of generated text
//! cannot cause a jarring difficulty jump.

use crate::domain::CefrLevel;

/// Clamp `proposed` into [student - 1, student + 1], further clamped to
/// the global [1, 6] rank bound. The anchor is always the student's
/// current level, not the assistant's previous one.
pub fn stabilize(student: CefrLevel, proposed: CefrLevel) -> CefrLevel {
  let min_allowed = (student.rank() - 1).max(1);
  let max_allowed = (student.rank() + 1).min(6);
  CefrLevel::from_rank(proposed.rank().clamp(min_allowed, max_allowed))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn result_always_within_one_band_of_student() {
    for student in CefrLevel::ALL {
      for proposed in CefrLevel::ALL {
        let out = stabilize(student, proposed);
        assert!((out.rank() - student.rank()).abs() <= 1);
        assert!((1..=6).contains(&out.rank()));
      }
    }
  }

  #[test]
  fn in_band_levels_pass_through() {
    assert_eq!(stabilize(CefrLevel::B1, CefrLevel::A2), CefrLevel::A2);
    assert_eq!(stabilize(CefrLevel::B1, CefrLevel::B1), CefrLevel::B1);
    assert_eq!(stabilize(CefrLevel::B1, CefrLevel::B2), CefrLevel::B2);
  }

  #[test]
  fn b1_student_with_c2_draft_clamps_to_b2() {
    assert_eq!(stabilize(CefrLevel::B1, CefrLevel::C2), CefrLevel::B2);
  }

  #[test]
  fn clamps_at_the_scale_edges() {
    assert_eq!(stabilize(CefrLevel::A1, CefrLevel::C2), CefrLevel::A2);
    assert_eq!(stabilize(CefrLevel::C2, CefrLevel::A1), CefrLevel::C1);
  }
}
