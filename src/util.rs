//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Whitespace-delimited word count. The classifier's short-text rule and
/// prompt length constraints both count words this way.
pub fn word_count(text: &str) -> usize {
  text.split_whitespace().count()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
#[allow(dead_code)]
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let cut = s
    .char_indices()
    .map(|(i, _)| i)
    .take_while(|i| *i <= max)
    .last()
    .unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
