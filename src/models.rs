//! Core data models used throughout rulechat.
//!
//! These types represent the rules, media rules, and replies that flow
//! through the repository and the matching pipeline.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The audience a request arrives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    User,
    Guest,
}

impl Audience {
    pub fn other(self) -> Audience {
        match self {
            Audience::User => Audience::Guest,
            Audience::Guest => Audience::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Audience::User => "user",
            Audience::Guest => "guest",
        }
    }
}

impl std::str::FromStr for Audience {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Audience::User),
            "guest" => Ok(Audience::Guest),
            other => Err(Error::Validation(format!(
                "unknown audience: {other}. Use user or guest."
            ))),
        }
    }
}

/// Which audiences a rule is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    User,
    Guest,
    #[default]
    Both,
}

impl Visibility {
    pub fn includes(self, audience: Audience) -> bool {
        matches!(
            (self, audience),
            (Visibility::Both, _)
                | (Visibility::User, Audience::User)
                | (Visibility::Guest, Audience::Guest)
        )
    }
}

impl std::str::FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Visibility::User),
            "guest" => Ok(Visibility::Guest),
            "both" => Ok(Visibility::Both),
            other => Err(Error::Validation(format!(
                "unknown visibility: {other}. Use user, guest, or both."
            ))),
        }
    }
}

/// An ordinary question/answer rule stored under a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Stable unique id. Missing ids are generated at load time.
    #[serde(default)]
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// An OR-of-ANDs keyword structure: `[[k1, k2], [k3]]` matches input
/// containing both `k1` and `k2`, or containing `k3`.
///
/// All members are normalized (lowercased) tokens. An empty group never
/// matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(pub Vec<Vec<String>>);

impl KeywordSet {
    /// A set with a single AND-group over the given tokens.
    pub fn single_group(tokens: Vec<String>) -> Self {
        KeywordSet(vec![tokens])
    }

    /// Returns the token count of the largest matching AND-group, or `None`
    /// if no group matches. A group matches iff every one of its tokens is
    /// present in `tokens`.
    pub fn best_match(&self, tokens: &[String]) -> Option<usize> {
        self.0
            .iter()
            .filter(|group| {
                !group.is_empty() && group.iter().all(|k| tokens.iter().any(|t| t == k))
            })
            .map(|group| group.len())
            .max()
    }
}

/// Which of the two media partitions a media rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Locations,
    Visuals,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Locations => "locations",
            MediaKind::Visuals => "visuals",
        }
    }
}

/// A media-backed rule matched by exact keywords rather than semantically.
///
/// Visibility is carried per entry because media partitions are not split
/// by audience file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRule {
    #[serde(default)]
    pub id: String,
    pub keywords: KeywordSet,
    pub answer: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub primary_url: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Which pipeline stage produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Media,
    SemanticRule,
    Directory,
    Faq,
    Fallback,
    Empty,
}

/// The engine's answer to a single request.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub kind: MatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// A rule tagged with its resolved category, as returned by listings.
#[derive(Debug, Clone, Serialize)]
pub struct ListedRule {
    pub category: String,
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// One directory collaborator entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub contact: String,
}

/// One question/answer pair in the FAQ corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}
