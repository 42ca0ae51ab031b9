//! Reloadable FAQ corpus collaborator.
//!
//! A flat list of question/answer pairs, loaded from a JSON file and
//! reloadable on demand without restarting the engine. The engine pairs it
//! with the embedding index's FAQ side for semantic retrieval.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::models::FaqEntry;

pub struct FaqCorpus {
    path: Option<PathBuf>,
    entries: Vec<FaqEntry>,
}

impl FaqCorpus {
    /// Load the corpus from a JSON file. A missing or malformed file yields
    /// an empty corpus.
    pub fn load(path: PathBuf) -> Self {
        let mut corpus = Self {
            path: Some(path),
            entries: Vec::new(),
        };
        corpus.reload();
        corpus
    }

    /// A corpus with fixed entries and no backing file (tests, embedding in
    /// other services).
    pub fn from_entries(entries: Vec<FaqEntry>) -> Self {
        Self {
            path: None,
            entries,
        }
    }

    /// Re-read the backing file, replacing the held entries. A corpus
    /// without a backing file keeps its entries.
    pub fn reload(&mut self) {
        let path = match &self.path {
            Some(p) => p,
            None => return,
        };
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                self.entries.clear();
                return;
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => {
                self.entries = entries;
                debug!(count = self.entries.len(), "loaded FAQ corpus");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed FAQ file, treating as empty");
                self.entries.clear();
            }
        }
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&FaqEntry> {
        self.entries.get(index)
    }
}
