//! The matching pipeline.
//!
//! [`Engine::respond`] runs a request through the stages in strict priority
//! order, terminal on first success:
//!
//! 1. Input guard: empty input → canned prompt.
//! 2. Media exact match: best keyword-set hit over the media partitions.
//! 3. Semantic rule match: best embedding hit at or above the similarity
//!    threshold, weighed against stage 2 by an explicit two-tier comparator.
//! 4. Directory lookup, only when the input carries email intent.
//! 5. FAQ semantic retrieval.
//! 6. Rotating fallback.
//!
//! Any stage 2–5 hit resets the consecutive-miss counter; a fallback
//! increments it. Embedding failures never surface to the caller: the
//! affected stage is skipped.
//!
//! Mutating methods recompute the embedding index for the affected
//! partition groups before returning, so a caller holding exclusive access
//! (e.g. behind an outer `RwLock`) never exposes a repository whose rule
//! text and index have diverged.

use tracing::{debug, warn};

use crate::config::{Config, MatchingConfig};
use crate::directory::{format_listing, has_email_intent, Directory, JsonDirectory};
use crate::embedding::{create_provider, embed_one, EmbeddingProvider};
use crate::error::Result;
use crate::fallback::{FallbackRotator, EMPTY_INPUT_PROMPT};
use crate::faq::FaqCorpus;
use crate::index::EmbeddingIndex;
use crate::models::{Audience, ListedRule, MatchKind, MediaRule, Reply, Visibility};
use crate::repository::{is_media_category, RuleRepository, RuleSlot};
use crate::store::{JsonStore, RuleStore};
use crate::tokenize::tokenize;

pub struct Engine {
    repo: RuleRepository,
    index: EmbeddingIndex,
    provider: Option<Box<dyn EmbeddingProvider>>,
    directory: Box<dyn Directory>,
    faq: FaqCorpus,
    fallback: FallbackRotator,
    threshold: f32,
    consecutive_misses: u32,
}

struct MediaHit {
    count: usize,
    id: String,
    text: String,
}

impl Engine {
    /// Assemble an engine from configuration: JSON stores under the data
    /// directory, the configured embedding provider, and a freshly built
    /// index.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Box::new(JsonStore::new(&config.store));
        let provider = create_provider(&config.embedding)?;
        let directory = Box::new(JsonDirectory::new(config.store.directory_path()));
        let faq = FaqCorpus::load(config.store.faq_path());
        Ok(Self::with_components(store, provider, directory, faq, &config.matching).await)
    }

    /// Assemble an engine from explicit collaborators. The index is built
    /// immediately from the loaded repository.
    pub async fn with_components(
        store: Box<dyn RuleStore>,
        provider: Option<Box<dyn EmbeddingProvider>>,
        directory: Box<dyn Directory>,
        faq: FaqCorpus,
        matching: &MatchingConfig,
    ) -> Self {
        let repo = RuleRepository::load(store, &matching.default_category);
        let mut engine = Self {
            repo,
            index: EmbeddingIndex::new(),
            provider,
            directory,
            faq,
            fallback: FallbackRotator::default(),
            threshold: matching.similarity_threshold,
            consecutive_misses: 0,
        };
        engine.reindex().await;
        engine
    }

    /// Answer one request.
    pub async fn respond(&mut self, input: &str, audience: Audience) -> Reply {
        if input.trim().is_empty() {
            return Reply {
                text: EMPTY_INPUT_PROMPT.to_string(),
                kind: MatchKind::Empty,
                rule_id: None,
            };
        }

        let tokens = tokenize(input);

        let media = self.best_media_match(&tokens, audience);

        // One embedding per request, shared by the rule and FAQ stages.
        let query_vec = match &self.provider {
            Some(provider) => match embed_one(provider.as_ref(), input).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "embedding backend failed, skipping semantic stages");
                    None
                }
            },
            None => None,
        };

        let semantic = query_vec
            .as_deref()
            .and_then(|vec| self.semantic_rule_hit(vec, audience));

        match (media, semantic) {
            (Some(hit), Some((sem_id, sem_answer, score))) => {
                if semantic_overrides(hit.count, score) {
                    return self.hit(sem_answer, MatchKind::SemanticRule, Some(sem_id));
                }
                return self.hit(hit.text, MatchKind::Media, Some(hit.id));
            }
            (Some(hit), None) => {
                return self.hit(hit.text, MatchKind::Media, Some(hit.id));
            }
            (None, Some((sem_id, sem_answer, _))) => {
                return self.hit(sem_answer, MatchKind::SemanticRule, Some(sem_id));
            }
            (None, None) => {}
        }

        if has_email_intent(&tokens) {
            match self.directory.lookup(&tokens) {
                Ok(entries) if !entries.is_empty() => {
                    return self.hit(format_listing(&entries), MatchKind::Directory, None);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "directory lookup failed"),
            }
        }

        if let Some(vec) = query_vec.as_deref() {
            if let Some((pos, score)) = self.index.query_faq(vec) {
                if score >= self.threshold {
                    if let Some(entry) = self.faq.get(pos) {
                        let answer = entry.answer.clone();
                        return self.hit(answer, MatchKind::Faq, None);
                    }
                }
            }
        }

        self.consecutive_misses += 1;
        debug!(misses = self.consecutive_misses, "no stage matched, falling back");
        Reply {
            text: self.fallback.next_message(),
            kind: MatchKind::Fallback,
            rule_id: None,
        }
    }

    fn hit(&mut self, text: String, kind: MatchKind, rule_id: Option<String>) -> Reply {
        self.consecutive_misses = 0;
        Reply {
            text,
            kind,
            rule_id,
        }
    }

    /// Stage 2: the media rule whose best AND-group matched the most input
    /// tokens. Ties keep the first rule in iteration order.
    fn best_media_match(&self, tokens: &[String], audience: Audience) -> Option<MediaHit> {
        let mut best: Option<(usize, &MediaRule)> = None;
        for rule in self.repo.media_rules() {
            if !rule.visibility.includes(audience) {
                continue;
            }
            if let Some(count) = rule.keywords.best_match(tokens) {
                if best.map_or(true, |(c, _)| count > c) {
                    best = Some((count, rule));
                }
            }
        }
        best.map(|(count, rule)| MediaHit {
            count,
            id: rule.id.clone(),
            text: media_reply_text(rule),
        })
    }

    /// Stage 3: best semantic hit at or above the threshold, resolved back
    /// to the rule's current answer.
    fn semantic_rule_hit(
        &self,
        query_vec: &[f32],
        audience: Audience,
    ) -> Option<(String, String, f32)> {
        let (rule_id, score) = self.index.query(audience, query_vec)?;
        if score < self.threshold {
            return None;
        }
        let (_, rule) = self.repo.get_rule(audience, rule_id)?;
        Some((rule.id.clone(), rule.answer.clone(), score))
    }

    // ============ Mutations ============

    /// Add a rule and recompute the index for the affected groups.
    /// See [`RuleRepository::add_rule`] for routing semantics.
    pub async fn add_rule(
        &mut self,
        visibility: Visibility,
        category: &str,
        question: &str,
        answer: &str,
    ) -> Result<String> {
        let id = self.repo.add_rule(visibility, category, question, answer)?;
        if !is_media_category(category) {
            // Media partitions are keyword-matched only.
            if visibility.includes(Audience::User) {
                self.recompute_group(Audience::User).await;
            }
            if visibility.includes(Audience::Guest) {
                self.recompute_group(Audience::Guest).await;
            }
        }
        Ok(id)
    }

    /// Edit a rule by id. Returns `false` if the id is unknown.
    pub async fn edit_rule(
        &mut self,
        id: &str,
        audience: Audience,
        question: &str,
        answer: &str,
    ) -> Result<bool> {
        match self.repo.edit_rule(id, audience, question, answer)? {
            Some(RuleSlot::Ordinary(aud)) => {
                self.recompute_group(aud).await;
                Ok(true)
            }
            Some(RuleSlot::Media(_)) => Ok(true),
            None => Ok(false),
        }
    }

    /// Delete a rule by id. Returns `false` if the id is unknown.
    pub async fn delete_rule(&mut self, id: &str, audience: Audience) -> bool {
        match self.repo.delete_rule(id, audience) {
            Some(RuleSlot::Ordinary(aud)) => {
                self.recompute_group(aud).await;
                true
            }
            Some(RuleSlot::Media(_)) => true,
            None => false,
        }
    }

    pub fn list_rules(&self, audience: Audience) -> Vec<ListedRule> {
        self.repo.list_rules(audience)
    }

    pub fn categories(&self) -> Vec<String> {
        self.repo.categories()
    }

    /// Register a category. A new category holds no rules yet, so the index
    /// is untouched.
    pub fn add_category(&mut self, name: &str) -> bool {
        self.repo.add_category(name)
    }

    /// Remove a category and its rules, then recompute both groups.
    pub async fn remove_category(&mut self, name: &str) -> bool {
        let removed = self.repo.remove_category(name);
        if removed {
            self.recompute_group(Audience::User).await;
            self.recompute_group(Audience::Guest).await;
        }
        removed
    }

    /// Re-read the FAQ corpus and rebuild its index side.
    pub async fn reload_faq(&mut self) {
        self.faq.reload();
        self.recompute_faq().await;
    }

    /// Rebuild the entire index from current repository and FAQ state.
    pub async fn reindex(&mut self) {
        self.recompute_group(Audience::User).await;
        self.recompute_group(Audience::Guest).await;
        self.recompute_faq().await;
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    async fn recompute_group(&mut self, audience: Audience) {
        let items = self.repo.embedding_items(audience);
        if let Err(e) = self
            .index
            .recompute(audience, &items, self.provider.as_deref())
            .await
        {
            // The group was cleared; better no semantic matches than stale ones.
            warn!(audience = audience.as_str(), error = %e, "embedding recompute failed");
        }
    }

    async fn recompute_faq(&mut self) {
        if let Err(e) = self
            .index
            .recompute_faq(self.faq.entries(), self.provider.as_deref())
            .await
        {
            warn!(error = %e, "FAQ embedding recompute failed");
        }
    }
}

/// Two-tier comparator between the media and semantic stages.
///
/// A media keyword hit is displaced only when the semantic score strictly
/// exceeds the matched token count. Cosine scores never exceed 1.0, so a
/// media match of at least one token wins in practice; the condition is
/// kept explicit so the override boundary is visible and testable.
fn semantic_overrides(media_token_count: usize, semantic_score: f32) -> bool {
    semantic_score > media_token_count as f32
}

/// A media rule's reply text: the answer payload followed by its URLs,
/// primary first, one per line.
fn media_reply_text(rule: &MediaRule) -> String {
    let mut text = rule.answer.clone();
    if let Some(url) = &rule.primary_url {
        text.push('\n');
        text.push_str(url);
    }
    for url in &rule.urls {
        if rule.primary_url.as_deref() == Some(url.as_str()) {
            continue;
        }
        text.push('\n');
        text.push_str(url);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::models::{DirectoryEntry, FaqEntry};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hashed_bow(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for token in tokenize(text) {
            let mut h = DefaultHasher::new();
            token.hash(&mut h);
            v[(h.finish() % 64) as usize] += 1.0;
        }
        v
    }

    struct StubProvider;

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "hashed-bow"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| hashed_bow(t)).collect())
        }
    }

    async fn engine(provider: Option<Box<dyn EmbeddingProvider>>) -> Engine {
        Engine::with_components(
            Box::new(MemoryStore::new()),
            provider,
            Box::new(StaticDirectory::new(vec![DirectoryEntry {
                name: "Registrar Office".to_string(),
                contact: "registrar@example.edu".to_string(),
            }])),
            FaqCorpus::from_entries(Vec::new()),
            &MatchingConfig::default(),
        )
        .await
    }

    async fn bare_engine() -> Engine {
        engine(None).await
    }

    async fn semantic_engine() -> Engine {
        engine(Some(Box::new(StubProvider))).await
    }

    #[tokio::test]
    async fn test_whitespace_input_returns_prompt_for_both_audiences() {
        let mut engine = bare_engine().await;
        for audience in [Audience::User, Audience::Guest] {
            let reply = engine.respond("   \t ", audience).await;
            assert_eq!(reply.kind, MatchKind::Empty);
            assert_eq!(reply.text, EMPTY_INPUT_PROMPT);
        }
        assert_eq!(engine.consecutive_misses(), 0);
    }

    #[tokio::test]
    async fn test_media_keyword_set_requires_all_group_tokens() {
        let mut engine = bare_engine().await;
        engine
            .add_rule(
                Visibility::Both,
                "locations",
                "library hours",
                "Open 8am to 5pm.",
            )
            .await
            .unwrap();

        let reply = engine
            .respond("what are the library hours", Audience::Guest)
            .await;
        assert_eq!(reply.kind, MatchKind::Media);
        assert_eq!(reply.text, "Open 8am to 5pm.");

        let reply = engine.respond("what are the hours", Audience::Guest).await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_higher_token_count_wins_regardless_of_order() {
        let mut engine = bare_engine().await;
        engine
            .add_rule(Visibility::Both, "locations", "gym", "The gym.")
            .await
            .unwrap();
        engine
            .add_rule(Visibility::Both, "visuals", "gym schedule", "The schedule poster.")
            .await
            .unwrap();

        // The 2-token rule sits later in iteration order but wins.
        let reply = engine.respond("show the gym schedule", Audience::User).await;
        assert_eq!(reply.text, "The schedule poster.");
    }

    #[tokio::test]
    async fn test_media_visibility_is_per_entry() {
        let mut engine = bare_engine().await;
        engine
            .add_rule(Visibility::User, "locations", "staff lounge", "Third floor.")
            .await
            .unwrap();

        let reply = engine.respond("where is the staff lounge", Audience::User).await;
        assert_eq!(reply.kind, MatchKind::Media);

        let reply = engine
            .respond("where is the staff lounge", Audience::Guest)
            .await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_semantic_rule_match() {
        let mut engine = semantic_engine().await;
        let id = engine
            .add_rule(
                Visibility::User,
                "registrar",
                "when is the enrollment deadline",
                "Enrollment closes August 30.",
            )
            .await
            .unwrap();

        let reply = engine
            .respond("when is the enrollment deadline", Audience::User)
            .await;
        assert_eq!(reply.kind, MatchKind::SemanticRule);
        assert_eq!(reply.rule_id.as_deref(), Some(id.as_str()));
        assert_eq!(reply.text, "Enrollment closes August 30.");

        // Guest never sees a user-only rule.
        let reply = engine
            .respond("when is the enrollment deadline", Audience::Guest)
            .await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_media_match_beats_semantic_match() {
        let mut engine = semantic_engine().await;
        engine
            .add_rule(
                Visibility::Both,
                "locations",
                "library hours",
                "Open 8am to 5pm.",
            )
            .await
            .unwrap();
        engine
            .add_rule(
                Visibility::Both,
                "general",
                "what are the library hours",
                "Semantic answer.",
            )
            .await
            .unwrap();

        // Identical question text gives the semantic stage a perfect score,
        // but 1.0 does not strictly exceed the 2-token media count.
        let reply = engine
            .respond("what are the library hours", Audience::User)
            .await;
        assert_eq!(reply.kind, MatchKind::Media);
        assert_eq!(reply.text, "Open 8am to 5pm.");
    }

    #[tokio::test]
    async fn test_stale_embedding_regression_on_edit() {
        let mut engine = semantic_engine().await;
        let id = engine
            .add_rule(
                Visibility::User,
                "general",
                "cafeteria menu today",
                "Pasta.",
            )
            .await
            .unwrap();

        assert!(engine
            .edit_rule(&id, Audience::User, "parking permit renewal", "Office B12.")
            .await
            .unwrap());

        let reply = engine
            .respond("parking permit renewal", Audience::User)
            .await;
        assert_eq!(reply.kind, MatchKind::SemanticRule);
        assert_eq!(reply.text, "Office B12.");

        let reply = engine.respond("cafeteria menu today", Audience::User).await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_deleted_rule_no_longer_matches() {
        let mut engine = semantic_engine().await;
        let id = engine
            .add_rule(Visibility::User, "general", "shuttle timetable", "Every 20 minutes.")
            .await
            .unwrap();
        assert!(engine.delete_rule(&id, Audience::User).await);

        let reply = engine.respond("shuttle timetable", Audience::User).await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_directory_requires_email_intent() {
        let mut engine = bare_engine().await;

        let reply = engine
            .respond("how do I email the registrar", Audience::Guest)
            .await;
        assert_eq!(reply.kind, MatchKind::Directory);
        assert!(reply.text.contains("registrar@example.edu"));

        // Same name token, no intent keyword: the directory is never consulted.
        let reply = engine.respond("who runs the registrar", Audience::Guest).await;
        assert_eq!(reply.kind, MatchKind::Fallback);
    }

    #[tokio::test]
    async fn test_faq_semantic_retrieval() {
        let mut engine = Engine::with_components(
            Box::new(MemoryStore::new()),
            Some(Box::new(StubProvider)),
            Box::new(StaticDirectory::new(Vec::new())),
            FaqCorpus::from_entries(vec![FaqEntry {
                question: "how do I reset my password".to_string(),
                answer: "Use the account portal.".to_string(),
            }]),
            &MatchingConfig::default(),
        )
        .await;

        let reply = engine
            .respond("how do I reset my password", Audience::Guest)
            .await;
        assert_eq!(reply.kind, MatchKind::Faq);
        assert_eq!(reply.text, "Use the account portal.");
    }

    #[tokio::test]
    async fn test_fallback_rotation_and_miss_counter() {
        let mut engine = bare_engine().await;
        engine
            .add_rule(Visibility::Both, "locations", "library", "Building C.")
            .await
            .unwrap();

        let first = engine.respond("zzz unknown", Audience::User).await;
        let second = engine.respond("zzz unknown", Audience::User).await;
        assert_eq!(first.kind, MatchKind::Fallback);
        assert_ne!(first.text, second.text);
        assert_eq!(engine.consecutive_misses(), 2);

        // A hit resets the miss counter but not the rotation cursor.
        let hit = engine.respond("where is the library", Audience::User).await;
        assert_eq!(hit.kind, MatchKind::Media);
        assert_eq!(engine.consecutive_misses(), 0);

        let third = engine.respond("zzz unknown", Audience::User).await;
        assert_eq!(third.text, crate::fallback::FALLBACK_RESPONSES[2]);
        assert_eq!(engine.consecutive_misses(), 1);

        // Fourth fallback wraps to the start of the list.
        let fourth = engine.respond("zzz unknown", Audience::User).await;
        assert_eq!(fourth.text, crate::fallback::FALLBACK_RESPONSES[0]);
    }

    #[tokio::test]
    async fn test_remove_category_purges_semantic_matches() {
        let mut engine = semantic_engine().await;
        engine
            .add_rule(
                Visibility::Both,
                "soict",
                "soict office hours",
                "8am to 5pm.",
            )
            .await
            .unwrap();

        assert!(engine.remove_category("soict").await);
        for audience in [Audience::User, Audience::Guest] {
            assert!(engine.list_rules(audience).is_empty());
            let reply = engine.respond("soict office hours", audience).await;
            assert_eq!(reply.kind, MatchKind::Fallback);
        }
    }
}
