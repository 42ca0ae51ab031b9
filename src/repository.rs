//! The rule repository: partitioned, mutable rule sets plus the category
//! catalog.
//!
//! Rules live in two audience files (user and guest; `both`-visibility rules
//! are stored in each) partitioned by category, plus two media partitions
//! (`locations`, `visuals`) holding keyword-matched [`MediaRule`]s with
//! per-entry visibility. Persistence is delegated to an injected
//! [`RuleStore`]; a failed save is logged and the in-memory state stays
//! authoritative until the next successful save.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Audience, KeywordSet, ListedRule, MediaKind, MediaRule, Rule, Visibility};
use crate::store::{CategoryMap, RuleStore};
use crate::tokenize::tokenize;

/// Where a rule was found by an audience-prioritized search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSlot {
    Ordinary(Audience),
    Media(MediaKind),
}

pub struct RuleRepository {
    store: Box<dyn RuleStore>,
    user: CategoryMap,
    guest: CategoryMap,
    locations: Vec<MediaRule>,
    visuals: Vec<MediaRule>,
    default_category: String,
}

impl RuleRepository {
    /// Load all partitions from the store. A partition that fails to load
    /// is treated as empty.
    pub fn load(store: Box<dyn RuleStore>, default_category: &str) -> Self {
        let user = load_or_empty(store.load_rules(Audience::User), "user rules");
        let guest = load_or_empty(store.load_rules(Audience::Guest), "guest rules");
        let locations = load_or_empty(store.load_media(MediaKind::Locations), "locations");
        let visuals = load_or_empty(store.load_media(MediaKind::Visuals), "visuals");
        Self {
            store,
            user,
            guest,
            locations,
            visuals,
            default_category: default_category.to_string(),
        }
    }

    fn partition(&self, audience: Audience) -> &CategoryMap {
        match audience {
            Audience::User => &self.user,
            Audience::Guest => &self.guest,
        }
    }

    fn partition_mut(&mut self, audience: Audience) -> &mut CategoryMap {
        match audience {
            Audience::User => &mut self.user,
            Audience::Guest => &mut self.guest,
        }
    }

    /// All rules visible to an audience, tagged with their category.
    pub fn list_rules(&self, audience: Audience) -> Vec<ListedRule> {
        self.partition(audience)
            .iter()
            .flat_map(|(category, rules)| {
                rules.iter().map(move |r| ListedRule {
                    category: category.clone(),
                    id: r.id.clone(),
                    question: r.question.clone(),
                    answer: r.answer.clone(),
                })
            })
            .collect()
    }

    /// Media rules in stable iteration order: locations first, then visuals,
    /// each in stored order.
    pub fn media_rules(&self) -> impl Iterator<Item = &MediaRule> {
        self.locations.iter().chain(self.visuals.iter())
    }

    /// Find a rule by id in an audience's ordinary partitions.
    pub fn get_rule(&self, audience: Audience, id: &str) -> Option<(&str, &Rule)> {
        self.partition(audience).iter().find_map(|(category, rules)| {
            rules
                .iter()
                .find(|r| r.id == id)
                .map(|r| (category.as_str(), r))
        })
    }

    /// `(id, question)` pairs for one audience's free-text rules, the inputs
    /// to embedding recomputation.
    pub fn embedding_items(&self, audience: Audience) -> Vec<(String, String)> {
        self.partition(audience)
            .values()
            .flat_map(|rules| rules.iter().map(|r| (r.id.clone(), r.question.clone())))
            .collect()
    }

    /// Category names currently known (union of both audience files),
    /// deduplicated case-insensitively.
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in self.user.keys().chain(self.guest.keys()) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(key)) {
                names.push(key.clone());
            }
        }
        names
    }

    /// Add a rule. Ordinary categories store question/answer under the
    /// category in the audience file(s) selected by `visibility`; the
    /// special categories `locations`/`visuals` instead derive a single
    /// AND-group [`KeywordSet`] from the question text and store a media
    /// rule (visibility recorded per entry). Returns the new rule's id.
    pub fn add_rule(
        &mut self,
        visibility: Visibility,
        category: &str,
        question: &str,
        answer: &str,
    ) -> Result<String> {
        if question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }
        if answer.trim().is_empty() {
            return Err(Error::Validation("answer must not be empty".to_string()));
        }

        let category = if category.trim().is_empty() {
            self.default_category.clone()
        } else {
            category.to_string()
        };

        if let Some(kind) = media_kind_for(&category) {
            return Ok(self.add_media_rule(kind, visibility, question, answer));
        }

        let id = Uuid::new_v4().to_string();
        let rule = Rule {
            id: id.clone(),
            question: question.to_string(),
            answer: answer.to_string(),
        };

        if visibility.includes(Audience::User) {
            self.insert_rule(Audience::User, &category, rule.clone());
            self.persist_rules(Audience::User);
        }
        if visibility.includes(Audience::Guest) {
            self.insert_rule(Audience::Guest, &category, rule.clone());
            self.persist_rules(Audience::Guest);
        }

        debug!(id = %id, category = %category, "added rule");
        Ok(id)
    }

    fn add_media_rule(
        &mut self,
        kind: MediaKind,
        visibility: Visibility,
        question: &str,
        answer: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let rule = MediaRule {
            id: id.clone(),
            keywords: KeywordSet::single_group(tokenize(question)),
            answer: answer.to_string(),
            urls: Vec::new(),
            primary_url: None,
            visibility,
        };
        match kind {
            MediaKind::Locations => self.locations.push(rule),
            MediaKind::Visuals => self.visuals.push(rule),
        }
        self.persist_media(kind);
        debug!(id = %id, partition = kind.as_str(), "added media rule");
        id
    }

    /// Edit a rule in place: ordinary partitions first (declared audience,
    /// then the other), then media partitions. Returns the slot it was
    /// found in, or `None`.
    pub fn edit_rule(
        &mut self,
        id: &str,
        audience: Audience,
        question: &str,
        answer: &str,
    ) -> Result<Option<RuleSlot>> {
        if question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }
        if answer.trim().is_empty() {
            return Err(Error::Validation("answer must not be empty".to_string()));
        }

        for aud in [audience, audience.other()] {
            let partition = self.partition_mut(aud);
            if let Some(rule) = partition
                .values_mut()
                .flat_map(|rules| rules.iter_mut())
                .find(|r| r.id == id)
            {
                rule.question = question.to_string();
                rule.answer = answer.to_string();
                self.persist_rules(aud);
                debug!(id = %id, audience = aud.as_str(), "edited rule");
                return Ok(Some(RuleSlot::Ordinary(aud)));
            }
        }

        for kind in [MediaKind::Locations, MediaKind::Visuals] {
            let rules = self.media_mut(kind);
            if let Some(rule) = rules.iter_mut().find(|r| r.id == id) {
                rule.keywords = KeywordSet::single_group(tokenize(question));
                rule.answer = answer.to_string();
                self.persist_media(kind);
                debug!(id = %id, partition = kind.as_str(), "edited media rule");
                return Ok(Some(RuleSlot::Media(kind)));
            }
        }

        debug!(id = %id, "rule not found for edit");
        Ok(None)
    }

    /// Delete a rule, audience-prioritized: the declared audience's
    /// partitions first, then the other audience's, then media. Removes the
    /// first match only.
    pub fn delete_rule(&mut self, id: &str, audience: Audience) -> Option<RuleSlot> {
        for aud in [audience, audience.other()] {
            let partition = self.partition_mut(aud);
            let mut found = false;
            for rules in partition.values_mut() {
                let before = rules.len();
                rules.retain(|r| r.id != id);
                if rules.len() < before {
                    found = true;
                    break;
                }
            }
            if found {
                self.persist_rules(aud);
                debug!(id = %id, audience = aud.as_str(), "deleted rule");
                return Some(RuleSlot::Ordinary(aud));
            }
        }

        for kind in [MediaKind::Locations, MediaKind::Visuals] {
            let rules = self.media_mut(kind);
            let before = rules.len();
            rules.retain(|r| r.id != id);
            if rules.len() < before {
                self.persist_media(kind);
                debug!(id = %id, partition = kind.as_str(), "deleted media rule");
                return Some(RuleSlot::Media(kind));
            }
        }

        debug!(id = %id, "rule not found for deletion");
        None
    }

    /// Register a category in both audience files. Returns `false` if a
    /// category with that name (case-insensitive) already exists.
    pub fn add_category(&mut self, name: &str) -> bool {
        if name.trim().is_empty() {
            return false;
        }
        let exists = self
            .categories()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name));
        if exists {
            return false;
        }
        self.user.insert(name.to_string(), Vec::new());
        self.guest.insert(name.to_string(), Vec::new());
        self.persist_rules(Audience::User);
        self.persist_rules(Audience::Guest);
        debug!(category = %name, "added category");
        true
    }

    /// Remove a category and all its rules from both audience files.
    /// Returns `false` if no such category exists.
    pub fn remove_category(&mut self, name: &str) -> bool {
        let mut removed = false;
        for aud in [Audience::User, Audience::Guest] {
            let partition = self.partition_mut(aud);
            let keys: Vec<String> = partition
                .keys()
                .filter(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .collect();
            if keys.is_empty() {
                continue;
            }
            for key in keys {
                partition.remove(&key);
            }
            self.persist_rules(aud);
            removed = true;
        }
        if removed {
            debug!(category = %name, "removed category");
        }
        removed
    }

    fn insert_rule(&mut self, audience: Audience, category: &str, rule: Rule) {
        let partition = self.partition_mut(audience);
        let key = partition
            .keys()
            .find(|k| k.eq_ignore_ascii_case(category))
            .cloned()
            .unwrap_or_else(|| category.to_string());
        partition.entry(key).or_default().push(rule);
    }

    fn media_mut(&mut self, kind: MediaKind) -> &mut Vec<MediaRule> {
        match kind {
            MediaKind::Locations => &mut self.locations,
            MediaKind::Visuals => &mut self.visuals,
        }
    }

    // Saves are non-fatal: on failure the in-memory state stays
    // authoritative until the next successful save.
    fn persist_rules(&self, audience: Audience) {
        if let Err(e) = self.store.save_rules(audience, self.partition(audience)) {
            warn!(audience = audience.as_str(), error = %e, "failed to save rules");
        }
    }

    fn persist_media(&self, kind: MediaKind) {
        let rules = match kind {
            MediaKind::Locations => &self.locations,
            MediaKind::Visuals => &self.visuals,
        };
        if let Err(e) = self.store.save_media(kind, rules) {
            warn!(partition = kind.as_str(), error = %e, "failed to save media rules");
        }
    }
}

/// Whether a category name routes rules into a media partition instead of
/// the ordinary audience files.
pub fn is_media_category(category: &str) -> bool {
    media_kind_for(category).is_some()
}

fn media_kind_for(category: &str) -> Option<MediaKind> {
    if category.eq_ignore_ascii_case("locations") {
        Some(MediaKind::Locations)
    } else if category.eq_ignore_ascii_case("visuals") {
        Some(MediaKind::Visuals)
    } else {
        None
    }
}

fn load_or_empty<T: Default>(result: Result<T>, what: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!(partition = what, error = %e, "failed to load partition, treating as empty");
            T::default()
        }
    }
}
