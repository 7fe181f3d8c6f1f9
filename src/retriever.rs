//! Keyword retrieval over a book's pages: BM25 ranking with a
//! deterministic tie-break on page order. Built once per book and shared
//! across turns.

use std::collections::HashMap;

use crate::corpus::Page;

const K1: f32 = 1.5;
const B: f32 = 0.75;
pub const DEFAULT_TOP_K: usize = 10;

/// One retrieved page of context.
#[derive(Clone, Debug, PartialEq)]
pub struct Passage {
  pub page: u32,
  pub text: String,
}

struct IndexedPage {
  page: u32,
  text: String,
  terms: HashMap<String, u32>,
  len: f32,
}

pub struct BookIndex {
  pages: Vec<IndexedPage>,
  doc_freq: HashMap<String, u32>,
  avg_len: f32,
}

fn tokenize(text: &str) -> Vec<String> {
  text
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(|t| t.to_string())
    .collect()
}

impl BookIndex {
  pub fn new(pages: &[Page]) -> Self {
    let mut indexed = Vec::with_capacity(pages.len());
    let mut doc_freq: HashMap<String, u32> = HashMap::new();
    for page in pages {
      let tokens = tokenize(&page.text);
      let mut terms: HashMap<String, u32> = HashMap::new();
      for t in &tokens {
        *terms.entry(t.clone()).or_insert(0) += 1;
      }
      for term in terms.keys() {
        *doc_freq.entry(term.clone()).or_insert(0) += 1;
      }
      indexed.push(IndexedPage {
        page: page.number,
        text: page.text.clone(),
        len: tokens.len() as f32,
        terms,
      });
    }
    let avg_len = if indexed.is_empty() {
      0.0
    } else {
      indexed.iter().map(|p| p.len).sum::<f32>() / indexed.len() as f32
    };
    Self { pages: indexed, doc_freq, avg_len }
  }

  fn idf(&self, term: &str) -> f32 {
    let n = self.pages.len() as f32;
    let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
  }

  fn score(&self, page: &IndexedPage, query_terms: &[String]) -> f32 {
    let mut score = 0.0;
    for term in query_terms {
      let tf = page.terms.get(term).copied().unwrap_or(0) as f32;
      if tf == 0.0 {
        continue;
      }
      let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * page.len / self.avg_len.max(1.0)));
      score += self.idf(term) * norm;
    }
    score
  }

  /// Top-k pages for `query`, best first; ties (including an empty query,
  /// where every page scores zero) fall back to page order.
  pub fn top_k(&self, query: &str, k: usize) -> Vec<Passage> {
    let query_terms = tokenize(query);
    let mut ranked: Vec<(usize, f32)> = self
      .pages
      .iter()
      .enumerate()
      .map(|(i, p)| (i, self.score(p, &query_terms)))
      .collect();
    ranked.sort_by(|a, b| {
      b.1
        .partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| self.pages[a.0].page.cmp(&self.pages[b.0].page))
    });
    ranked
      .into_iter()
      .take(k)
      .map(|(i, _)| Passage { page: self.pages[i].page, text: self.pages[i].text.clone() })
      .collect()
  }

  /// Retrieved passages joined into one prompt context block.
  pub fn context_for(&self, query: &str, k: usize) -> String {
    self
      .top_k(query, k)
      .into_iter()
      .map(|p| p.text)
      .collect::<Vec<_>>()
      .join("\n")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn page(number: u32, text: &str) -> Page {
    serde_json::from_value(serde_json::json!({
      "PAGE_NO": number,
      "PAGE_TEXT": text,
      "PAGE_IMG": format!("p{number}.png"),
    }))
    .unwrap()
  }

  fn index() -> BookIndex {
    BookIndex::new(&[
      page(1, "The farmer planted a tiny turnip seed in spring."),
      page(2, "The turnip grew bigger and bigger every day."),
      page(3, "The mouse helped the family pull the giant turnip."),
      page(4, "Everyone ate turnip soup for dinner that night."),
    ])
  }

  #[test]
  fn ranks_matching_pages_first() {
    let idx = index();
    let hits = idx.top_k("who helped pull the turnip", 2);
    assert_eq!(hits[0].page, 3);
  }

  #[test]
  fn empty_query_returns_pages_in_order() {
    let idx = index();
    let hits = idx.top_k("", 3);
    assert_eq!(hits.iter().map(|p| p.page).collect::<Vec<_>>(), [1, 2, 3]);
  }

  #[test]
  fn identical_query_is_deterministic() {
    let idx = index();
    assert_eq!(idx.top_k("turnip soup", 4), idx.top_k("turnip soup", 4));
  }

  #[test]
  fn k_caps_the_result_count() {
    let idx = index();
    assert_eq!(idx.top_k("turnip", 2).len(), 2);
    assert_eq!(idx.top_k("turnip", 10).len(), 4);
  }

  #[test]
  fn context_joins_page_texts() {
    let idx = index();
    let ctx = idx.context_for("mouse", 1);
    assert!(ctx.contains("mouse helped"));
  }
}
