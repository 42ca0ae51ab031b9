//! Directory collaborator: contact lookup for email-intent queries.
//!
//! The matching pipeline only consults the directory when the input carries
//! one of a fixed set of email-intent keywords; otherwise the collaborator
//! is never called.

use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use crate::models::DirectoryEntry;

/// Tokens that signal the user is asking how to reach someone.
pub const EMAIL_INTENT_KEYWORDS: [&str; 7] =
    ["email", "contact", "mail", "reach", "address", "send", "message"];

/// True if any input token is an email-intent keyword.
pub fn has_email_intent(tokens: &[String]) -> bool {
    tokens
        .iter()
        .any(|t| EMAIL_INTENT_KEYWORDS.contains(&t.as_str()))
}

/// External directory of named contacts.
pub trait Directory: Send + Sync {
    /// Entries whose name contains any of the input tokens.
    fn lookup(&self, tokens: &[String]) -> Result<Vec<DirectoryEntry>>;
}

/// Directory backed by a JSON file of [`DirectoryEntry`] values, re-read on
/// every lookup so edits take effect without a restart.
pub struct JsonDirectory {
    path: PathBuf,
}

impl JsonDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn entries(&self) -> Vec<DirectoryEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed directory file");
                Vec::new()
            }
        }
    }
}

impl Directory for JsonDirectory {
    fn lookup(&self, tokens: &[String]) -> Result<Vec<DirectoryEntry>> {
        Ok(filter_by_name(&self.entries(), tokens))
    }
}

/// An in-memory directory for tests and embedding into other services.
pub struct StaticDirectory {
    entries: Vec<DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }
}

impl Directory for StaticDirectory {
    fn lookup(&self, tokens: &[String]) -> Result<Vec<DirectoryEntry>> {
        Ok(filter_by_name(&self.entries, tokens))
    }
}

fn filter_by_name(entries: &[DirectoryEntry], tokens: &[String]) -> Vec<DirectoryEntry> {
    entries
        .iter()
        .filter(|e| {
            let name = e.name.to_lowercase();
            tokens.iter().any(|t| name.contains(t.as_str()))
        })
        .cloned()
        .collect()
}

/// Render matched entries as the multi-line listing the pipeline replies
/// with.
pub fn format_listing(entries: &[DirectoryEntry]) -> String {
    let mut out = String::from("Here are the contacts I found:");
    for entry in entries {
        out.push_str(&format!("\n- {}: {}", entry.name, entry.contact));
    }
    out
}
