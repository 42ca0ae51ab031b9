//! End-to-end tests over the library API with JSON file stores.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use async_trait::async_trait;
use tempfile::TempDir;

use rulechat::config::{MatchingConfig, StoreConfig};
use rulechat::directory::JsonDirectory;
use rulechat::embedding::EmbeddingProvider;
use rulechat::engine::Engine;
use rulechat::faq::FaqCorpus;
use rulechat::models::{Audience, MatchKind, Visibility};
use rulechat::store::JsonStore;
use rulechat::tokenize::tokenize;

/// Deterministic bag-of-words embedding for tests: identical text embeds
/// identically, disjoint token sets score low.
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

fn store_config(dir: &Path) -> StoreConfig {
    StoreConfig {
        data_dir: dir.to_path_buf(),
    }
}

async fn engine_at(dir: &Path, semantic: bool) -> Engine {
    let store_config = store_config(dir);
    let provider: Option<Box<dyn EmbeddingProvider>> = if semantic {
        Some(Box::new(StubProvider))
    } else {
        None
    };
    Engine::with_components(
        Box::new(JsonStore::new(&store_config)),
        provider,
        Box::new(JsonDirectory::new(store_config.directory_path())),
        FaqCorpus::load(store_config.faq_path()),
        &MatchingConfig::default(),
    )
    .await
}

#[tokio::test]
async fn test_rules_survive_reload_across_engines() {
    let tmp = TempDir::new().unwrap();

    let mut engine = engine_at(tmp.path(), true).await;
    let shared = engine
        .add_rule(Visibility::Both, "general", "opening hours", "8am to 5pm.")
        .await
        .unwrap();
    engine
        .add_rule(Visibility::User, "registrar", "transcript request", "Form R-2.")
        .await
        .unwrap();
    engine
        .add_rule(Visibility::Guest, "admissions", "application deadline", "July 1.")
        .await
        .unwrap();
    engine
        .add_rule(Visibility::Both, "locations", "library", "Building C.")
        .await
        .unwrap();
    engine
        .add_rule(Visibility::Both, "visuals", "campus map", "Attached map.")
        .await
        .unwrap();
    drop(engine);

    // A fresh engine over the same files sees the same rules, same ids.
    let mut reloaded = engine_at(tmp.path(), true).await;
    let user_rules = reloaded.list_rules(Audience::User);
    assert_eq!(user_rules.len(), 2);
    assert!(user_rules.iter().any(|r| r.id == shared));
    assert_eq!(reloaded.list_rules(Audience::Guest).len(), 2);

    let reply = reloaded.respond("where is the library", Audience::Guest).await;
    assert_eq!(reply.kind, MatchKind::Media);
    assert_eq!(reply.text, "Building C.");

    let reply = reloaded.respond("transcript request", Audience::User).await;
    assert_eq!(reply.kind, MatchKind::SemanticRule);
    assert_eq!(reply.text, "Form R-2.");
}

#[tokio::test]
async fn test_category_removal_persists() {
    let tmp = TempDir::new().unwrap();

    let mut engine = engine_at(tmp.path(), false).await;
    engine
        .add_rule(Visibility::Both, "soict", "soict office hours", "8am to 5pm.")
        .await
        .unwrap();
    assert!(engine.remove_category("soict").await);
    drop(engine);

    let engine = engine_at(tmp.path(), false).await;
    for audience in [Audience::User, Audience::Guest] {
        assert!(engine
            .list_rules(audience)
            .iter()
            .all(|r| !r.category.eq_ignore_ascii_case("soict")));
    }
}

#[tokio::test]
async fn test_directory_and_faq_collaborators_from_files() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("directory.json"),
        r#"[{"name": "Admissions Office", "contact": "admissions@example.edu"}]"#,
    )
    .unwrap();
    std::fs::write(
        tmp.path().join("faq.json"),
        r#"[{"question": "is there wifi on campus", "answer": "Yes, eduroam."}]"#,
    )
    .unwrap();

    let mut engine = engine_at(tmp.path(), true).await;

    let reply = engine
        .respond("how can I contact admissions", Audience::Guest)
        .await;
    assert_eq!(reply.kind, MatchKind::Directory);
    assert!(reply.text.contains("admissions@example.edu"));

    let reply = engine
        .respond("is there wifi on campus", Audience::Guest)
        .await;
    assert_eq!(reply.kind, MatchKind::Faq);
    assert_eq!(reply.text, "Yes, eduroam.");
}

#[tokio::test]
async fn test_faq_reload_picks_up_new_entries() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("faq.json"), "[]").unwrap();

    let mut engine = engine_at(tmp.path(), true).await;
    let reply = engine
        .respond("is parking free for visitors", Audience::Guest)
        .await;
    assert_eq!(reply.kind, MatchKind::Fallback);

    std::fs::write(
        tmp.path().join("faq.json"),
        r#"[{"question": "is parking free for visitors", "answer": "First hour only."}]"#,
    )
    .unwrap();
    engine.reload_faq().await;

    let reply = engine
        .respond("is parking free for visitors", Audience::Guest)
        .await;
    assert_eq!(reply.kind, MatchKind::Faq);
    assert_eq!(reply.text, "First hour only.");
}

#[tokio::test]
async fn test_malformed_rule_file_treated_as_empty() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("user_rules.json"), "{ not json").unwrap();

    let mut engine = engine_at(tmp.path(), false).await;
    assert!(engine.list_rules(Audience::User).is_empty());

    // The engine is still fully operational.
    engine
        .add_rule(Visibility::User, "general", "hello", "hi")
        .await
        .unwrap();
    assert_eq!(engine.list_rules(Audience::User).len(), 1);
}

#[tokio::test]
async fn test_fallback_cursor_is_independent_of_misses() {
    let tmp = TempDir::new().unwrap();
    let mut engine = engine_at(tmp.path(), false).await;

    let a = engine.respond("unmatched one", Audience::User).await;
    let b = engine.respond("unmatched two", Audience::User).await;
    let c = engine.respond("unmatched three", Audience::User).await;
    let d = engine.respond("unmatched four", Audience::User).await;
    assert_eq!(engine.consecutive_misses(), 4);

    // 3-element list: calls 1..4 yield entries 0, 1, 2, 0.
    assert_eq!(a.text, d.text);
    assert_ne!(a.text, b.text);
    assert_ne!(b.text, c.text);
}
