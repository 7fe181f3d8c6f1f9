//! Read-only book content: the catalog, per-book pages, and character
//! descriptions. Files are owned by the content pipeline; this module
//! only reads them, and a missing book or character yields empty values
//! rather than an error.
//!
//! Layout on disk (fixed by the content pipeline):
//!   data/ebook_list.txt                                 one book id per line
//!   ebook/{book_id}/common/data/ebook_data.json         BOOK_NAME + PAGE[]
//!   ebook/{book_id}/common/data/ebook_character.json    name -> description

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Clone, Debug, Deserialize)]
pub struct Page {
  #[serde(rename = "PAGE_NO", default)]
  pub number: u32,
  #[serde(rename = "PAGE_TEXT", default)]
  pub text: String,
  #[serde(rename = "PAGE_IMG", default)]
  pub image: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Book {
  #[serde(rename = "BOOK_NAME", default)]
  pub name: String,
  #[serde(rename = "PAGE", default)]
  pub pages: Vec<Page>,
}

pub struct BookStore {
  root: PathBuf,
  catalog: Vec<String>,
}

impl BookStore {
  /// Read the catalog and remember the content root. A missing catalog
  /// file leaves the list empty with a logged warning.
  pub fn load(root: impl Into<PathBuf>, catalog_path: &Path) -> Self {
    let catalog = match std::fs::read_to_string(catalog_path) {
      Ok(s) => s.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect(),
      Err(e) => {
        warn!(target: "storytalk_backend", path = %catalog_path.display(), error = %e, "Book catalog unavailable");
        Vec::new()
      }
    };
    let store = Self { root: root.into(), catalog };
    info!(target: "storytalk_backend", books = store.catalog.len(), root = %store.root.display(), "Book store ready");
    store
  }

  pub fn list(&self) -> &[String] {
    &self.catalog
  }

  fn data_path(&self, book_id: &str, file: &str) -> PathBuf {
    self.root.join(book_id).join("common").join("data").join(file)
  }

  /// Full book record, or None when the book does not exist on disk.
  pub fn book(&self, book_id: &str) -> Option<Book> {
    let path = self.data_path(book_id, "ebook_data.json");
    let contents = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<Book>(&contents) {
      Ok(book) => Some(book),
      Err(e) => {
        warn!(target: "storytalk_backend", %book_id, error = %e, "Malformed book data");
        None
      }
    }
  }

  fn character_map(&self, book_id: &str) -> BTreeMap<String, String> {
    let path = self.data_path(book_id, "ebook_character.json");
    std::fs::read_to_string(&path)
      .ok()
      .and_then(|s| serde_json::from_str(&s).ok())
      .unwrap_or_default()
  }

  /// Character names for a book; empty when the book is unknown.
  pub fn characters(&self, book_id: &str) -> Vec<String> {
    self.character_map(book_id).into_keys().collect()
  }

  /// Character description; empty when the book or character is unknown.
  pub fn description(&self, book_id: &str, character: &str) -> String {
    self.character_map(book_id).remove(character).unwrap_or_default()
  }

  /// The whole book as one context blob: title line plus every page text.
  #[allow(dead_code)]
  pub fn full_context(&self, book_id: &str) -> String {
    match self.book(book_id) {
      Some(book) => {
        let mut out = format!("BOOK_NAME: {}", book.name);
        for page in &book.pages {
          out.push('\n');
          out.push_str(&page.text);
        }
        out
      }
      None => String::new(),
    }
  }
}
