//! # rulechat
//!
//! A rule-based conversational response engine with layered keyword and
//! semantic matching.
//!
//! Given free-text input and an audience tag, the engine selects the
//! best-fitting pre-authored answer from a partitioned, mutable knowledge
//! base, degrading gracefully from exact keyword matches to semantic
//! similarity to a rotating fallback.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌────────────┐
//! │ Tokenizer│──▶│ Matching Engine │◀──│ Embedding   │
//! └──────────┘   │  media ▸ rule   │   │ Index       │
//!                │  ▸ directory    │   └─────┬──────┘
//!                │  ▸ faq ▸ fall-  │         │ derived
//!                │    back         │   ┌─────▼──────┐
//!                └───────┬────────┘   │ Rule        │
//!                        │            │ Repository  │
//!                   ┌────▼─────┐      └─────┬──────┘
//!                   │  Reply   │      ┌─────▼──────┐
//!                   └──────────┘      │ RuleStore  │
//!                                     │ (JSON)     │
//!                                     └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rulechat init                          # seed the data directory
//! rulechat rules add --category general "office hours?" "8am to 5pm"
//! rulechat ask "what are the office hours" --audience guest
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`tokenize`] | Input normalization |
//! | [`store`] | Rule persistence abstraction |
//! | [`repository`] | Partitioned rule sets and categories |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Derived semantic index |
//! | [`directory`] | Contact directory collaborator |
//! | [`faq`] | Reloadable FAQ corpus |
//! | [`fallback`] | Rotating fallback responses |
//! | [`engine`] | The matching pipeline |

pub mod config;
pub mod directory;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod faq;
pub mod index;
pub mod models;
pub mod repository;
pub mod store;
pub mod tokenize;
