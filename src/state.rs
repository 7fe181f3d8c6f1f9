//! Application state: book store, content filter, classifier handle,
//! per-book retrieval indices, session history, and the optional
//! generator/TTS clients.
//!
//! Everything here is built once at startup and shared by reference
//! across concurrent turns; no call mutates the classifier or the
//! profile table, and the only mutable pieces (retrieval index cache,
//! session store) sit behind their own locks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::classifier::{CefrClassifier, HttpLevelModel, ModelError};
use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::corpus::BookStore;
use crate::filter::ContentFilter;
use crate::generator::OpenAI;
use crate::history::SessionStore;
use crate::retriever::BookIndex;
use crate::tts::GoogleTts;

const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

pub struct AppState {
  pub config: AgentConfig,
  pub books: BookStore,
  pub filter: ContentFilter,
  pub classifier: CefrClassifier,
  pub history: SessionStore,
  pub generator: Option<OpenAI>,
  pub tts: Option<GoogleTts>,
  indices: RwLock<HashMap<String, Arc<BookIndex>>>,
}

impl AppState {
  /// Build state from env: load config, book catalog, denylist, model
  /// client, and the optional generator/TTS clients. A missing CEFR
  /// model endpoint is fatal; everything else degrades.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Result<Self, ModelError> {
    let config = load_agent_config_from_env().unwrap_or_default();

    let book_root = std::env::var("BOOK_DATA_DIR").unwrap_or_else(|_| "./ebook".into());
    let catalog_path =
      std::env::var("BOOK_LIST_PATH").unwrap_or_else(|_| "./data/ebook_list.txt".into());
    let books = BookStore::load(book_root, &PathBuf::from(catalog_path));

    let bad_words_path =
      std::env::var("BAD_WORDS_PATH").unwrap_or_else(|_| "./data/bad_words.txt".into());
    let filter = ContentFilter::load(&PathBuf::from(bad_words_path));

    let classifier = CefrClassifier::new(HttpLevelModel::from_env()?);

    let ttl = std::env::var("SESSION_TTL_SECS")
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(DEFAULT_SESSION_TTL_SECS);
    let history = SessionStore::new(Duration::from_secs(ttl));

    let generator = OpenAI::from_env();
    match &generator {
      Some(oa) => info!(target: "storytalk_backend", base_url = %oa.base_url, model = %oa.model, "Generator enabled"),
      None => info!(target: "storytalk_backend", "Generator disabled (no OPENAI_API_KEY); talking/quiz turns will fail"),
    }

    let tts = GoogleTts::from_env();
    if tts.is_none() {
      info!(target: "storytalk_backend", "TTS disabled (no GOOGLE_TTS_API_KEY)");
    }

    Ok(Self {
      config,
      books,
      filter,
      classifier,
      history,
      generator,
      tts,
      indices: RwLock::new(HashMap::new()),
    })
  }

  /// Retrieval index for a book, built on first use and cached. Unknown
  /// books get an index over zero pages, which retrieves nothing.
  pub async fn index_for(&self, book_id: &str) -> Arc<BookIndex> {
    if let Some(idx) = self.indices.read().await.get(book_id) {
      return idx.clone();
    }
    let pages = self.books.book(book_id).map(|b| b.pages).unwrap_or_default();
    let idx = Arc::new(BookIndex::new(&pages));
    self.indices.write().await.entry(book_id.to_string()).or_insert_with(|| idx.clone());
    idx
  }
}
