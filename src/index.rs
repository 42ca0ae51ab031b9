//! Derived semantic index over rule questions and the FAQ corpus.
//!
//! The index is a disposable cache keyed by rule id: it never owns rule
//! content and is fully rebuilt from the repository by [`EmbeddingIndex::recompute`]
//! whenever a free-text partition group mutates. Recomputation clears the
//! group first, so a failed embedding call leaves the group empty rather
//! than stale.
//!
//! With no provider configured every group stays empty and queries return
//! `None`; semantic stages degrade gracefully rather than erroring.

use anyhow::Result;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::{Audience, FaqEntry};

/// One `(rule id, vector)` pair, derived from the rule's current question
/// text.
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub rule_id: String,
    pub vector: Vec<f32>,
}

#[derive(Default)]
pub struct EmbeddingIndex {
    user: Vec<EmbeddingEntry>,
    guest: Vec<EmbeddingEntry>,
    /// Position-aligned with the FAQ corpus it was computed from.
    faq: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, audience: Audience) -> &Vec<EmbeddingEntry> {
        match audience {
            Audience::User => &self.user,
            Audience::Guest => &self.guest,
        }
    }

    fn group_mut(&mut self, audience: Audience) -> &mut Vec<EmbeddingEntry> {
        match audience {
            Audience::User => &mut self.user,
            Audience::Guest => &mut self.guest,
        }
    }

    /// Rebuild one partition group from `(rule id, question)` pairs.
    ///
    /// The group is cleared up front; on provider failure it stays empty
    /// and the error is returned for the caller to log.
    pub async fn recompute(
        &mut self,
        group: Audience,
        items: &[(String, String)],
        provider: Option<&dyn EmbeddingProvider>,
    ) -> Result<()> {
        self.group_mut(group).clear();

        let provider = match provider {
            Some(p) => p,
            None => return Ok(()),
        };
        if items.is_empty() {
            return Ok(());
        }

        let questions: Vec<String> = items.iter().map(|(_, q)| q.clone()).collect();
        let vectors = provider.embed_batch(&questions).await?;

        let entries = self.group_mut(group);
        for ((rule_id, _), vector) in items.iter().zip(vectors) {
            entries.push(EmbeddingEntry {
                rule_id: rule_id.clone(),
                vector,
            });
        }
        Ok(())
    }

    /// Rebuild the FAQ side of the index from the current corpus.
    pub async fn recompute_faq(
        &mut self,
        corpus: &[FaqEntry],
        provider: Option<&dyn EmbeddingProvider>,
    ) -> Result<()> {
        self.faq.clear();

        let provider = match provider {
            Some(p) => p,
            None => return Ok(()),
        };
        if corpus.is_empty() {
            return Ok(());
        }

        let questions: Vec<String> = corpus.iter().map(|e| e.question.clone()).collect();
        self.faq = provider.embed_batch(&questions).await?;
        Ok(())
    }

    /// Best-scoring rule for a query vector, as `(rule id, score)`.
    /// Thresholding is the caller's concern.
    pub fn query(&self, group: Audience, query_vec: &[f32]) -> Option<(&str, f32)> {
        best_entry(
            self.group(group)
                .iter()
                .map(|e| (e.rule_id.as_str(), e.vector.as_slice())),
            query_vec,
        )
    }

    /// Best-scoring FAQ question for a query vector, as
    /// `(corpus position, score)`.
    pub fn query_faq(&self, query_vec: &[f32]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, vector) in self.faq.iter().enumerate() {
            let score = cosine_similarity(query_vec, vector);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best
    }

    pub fn group_len(&self, group: Audience) -> usize {
        self.group(group).len()
    }

    pub fn faq_len(&self) -> usize {
        self.faq.len()
    }
}

fn best_entry<'a>(
    entries: impl Iterator<Item = (&'a str, &'a [f32])>,
    query_vec: &[f32],
) -> Option<(&'a str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for (id, vector) in entries {
        let score = cosine_similarity(query_vec, vector);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((id, score));
        }
    }
    best
}
