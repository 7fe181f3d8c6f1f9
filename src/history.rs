//! Session history: an append-only per-session log with a TTL measured
//! from the last write. The orchestrators read the full log at the start
//! of every turn and never edit committed entries; all cross-turn state
//! lives here, accessed by value each time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{Role, Turn};

const SESSION_ID_LEN: usize = 8;
const SESSION_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

struct SessionEntry {
  turns: Vec<Turn>,
  expires_at: Instant,
}

/// In-memory key-value store for session transcripts. Sessions expire
/// lazily: an expired entry is dropped the next time it is touched.
#[derive(Clone)]
pub struct SessionStore {
  ttl: Duration,
  sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

fn random_session_id() -> String {
  let mut rng = rand::thread_rng();
  (0..SESSION_ID_LEN)
    .map(|_| SESSION_ID_CHARSET[rng.gen_range(0..SESSION_ID_CHARSET.len())] as char)
    .collect()
}

impl SessionStore {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, sessions: Arc::new(RwLock::new(HashMap::new())) }
  }

  /// Create a fresh session and return its opaque id, unique at creation
  /// time (8 lowercase-alphanumeric chars).
  #[instrument(level = "debug", skip(self))]
  pub async fn create_session(&self) -> String {
    let mut sessions = self.sessions.write().await;
    loop {
      let id = random_session_id();
      if let Some(entry) = sessions.get(&id) {
        if entry.expires_at > Instant::now() {
          continue;
        }
      }
      sessions.insert(id.clone(), SessionEntry { turns: Vec::new(), expires_at: Instant::now() + self.ttl });
      debug!(target: "storytalk_backend", session_id = %id, "Session created");
      return id;
    }
  }

  /// Append one turn, refreshing the TTL. Appending to an unknown or
  /// expired session starts a fresh log under that id.
  #[instrument(level = "debug", skip(self, turn), fields(session_id = %session_id))]
  pub async fn append(&self, session_id: &str, turn: Turn) {
    let mut sessions = self.sessions.write().await;
    let now = Instant::now();
    let entry = sessions
      .entry(session_id.to_string())
      .and_modify(|e| {
        if e.expires_at <= now {
          e.turns.clear();
        }
      })
      .or_insert_with(|| SessionEntry { turns: Vec::new(), expires_at: now });
    entry.turns.push(turn);
    entry.expires_at = now + self.ttl;
  }

  /// The full ordered log for a session; empty for unknown or expired ids.
  pub async fn read_all(&self, session_id: &str) -> Vec<Turn> {
    let sessions = self.sessions.read().await;
    match sessions.get(session_id) {
      Some(entry) if entry.expires_at > Instant::now() => entry.turns.clone(),
      _ => Vec::new(),
    }
  }
}

/// Last user-authored turn, scanning the log in reverse.
pub fn last_user_turn(turns: &[Turn]) -> Option<&Turn> {
  turns.iter().rev().find(|t| t.role == Role::User)
}

/// Render a transcript for prompt embedding, one line per turn.
pub fn render_transcript(turns: &[Turn]) -> String {
  turns
    .iter()
    .map(|t| match t.role {
      Role::User => format!("Student: {}", t.text),
      Role::Assistant => format!("Assistant: {}", t.text),
    })
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn create_append_read_round_trip() {
    let store = SessionStore::new(Duration::from_secs(60));
    let sid = store.create_session().await;
    assert_eq!(sid.len(), SESSION_ID_LEN);
    assert!(sid.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

    store.append(&sid, Turn::user("Hello there")).await;
    store.append(&sid, Turn::assistant("Hi! I am the Farmer.")).await;
    let turns = store.read_all(&sid).await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].text, "Hi! I am the Farmer.");
  }

  #[tokio::test]
  async fn unknown_session_reads_empty() {
    let store = SessionStore::new(Duration::from_secs(60));
    assert!(store.read_all("nope1234").await.is_empty());
  }

  #[tokio::test]
  async fn sessions_expire_after_ttl_from_last_write() {
    let store = SessionStore::new(Duration::from_millis(50));
    let sid = store.create_session().await;
    store.append(&sid, Turn::user("hi")).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(store.read_all(&sid).await.is_empty());
  }

  #[tokio::test]
  async fn writes_refresh_the_ttl() {
    let store = SessionStore::new(Duration::from_millis(300));
    let sid = store.create_session().await;
    store.append(&sid, Turn::user("one")).await;
    tokio::time::sleep(Duration::from_millis(180)).await;
    store.append(&sid, Turn::user("two")).await;
    tokio::time::sleep(Duration::from_millis(180)).await;
    // 360ms after the first write but only 180ms after the second: the
    // refresh pushed the expiry forward.
    assert_eq!(store.read_all(&sid).await.len(), 2);
  }

  #[test]
  fn last_user_turn_scans_in_reverse() {
    let turns = vec![
      Turn::user("first"),
      Turn::assistant("reply"),
      Turn::user("second"),
      Turn::assistant("reply again"),
    ];
    assert_eq!(last_user_turn(&turns).unwrap().text, "second");
    assert!(last_user_turn(&[]).is_none());
    assert!(last_user_turn(&[Turn::assistant("only ai")]).is_none());
  }

  #[test]
  fn transcript_renders_one_line_per_turn() {
    let turns = vec![Turn::user("hi"), Turn::assistant("hello")];
    assert_eq!(render_transcript(&turns), "Student: hi\nAssistant: hello");
  }
}
