//! # rulechat CLI
//!
//! Admin and one-shot chat interface for the rulechat engine.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rulechat init` | Create the data directory and seed starter categories |
//! | `rulechat ask "<text>"` | Run one message through the matching pipeline |
//! | `rulechat rules list` | List rules visible to an audience |
//! | `rulechat rules add` | Add a rule |
//! | `rulechat rules edit <id>` | Edit a rule by id |
//! | `rulechat rules delete <id>` | Delete a rule by id |
//! | `rulechat category add <name>` | Register a category |
//! | `rulechat category remove <name>` | Remove a category and its rules |
//! | `rulechat reindex` | Rebuild the embedding index and reload the FAQ |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rulechat::config::load_config;
use rulechat::engine::Engine;
use rulechat::models::{Audience, Visibility};

const STARTER_CATEGORIES: [&str; 4] = ["general", "admissions", "registrar", "faculty"];

/// rulechat — a rule-based conversational response engine with layered
/// keyword and semantic matching.
#[derive(Parser)]
#[command(
    name = "rulechat",
    about = "A rule-based conversational response engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "config/rulechat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and seed starter categories.
    Init,
    /// Run one message through the matching pipeline.
    Ask {
        /// The message text.
        text: String,
        /// Audience to answer as: user or guest.
        #[arg(long, default_value = "guest")]
        audience: String,
    },
    /// Manage rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manage categories.
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Rebuild the embedding index and reload the FAQ corpus.
    Reindex,
}

#[derive(Subcommand)]
enum RulesCommands {
    /// List rules visible to an audience.
    List {
        #[arg(long, default_value = "user")]
        audience: String,
    },
    /// Add a rule. Categories `locations`/`visuals` derive keywords from
    /// the question text.
    Add {
        question: String,
        answer: String,
        #[arg(long, default_value = "general")]
        category: String,
        /// Who sees the rule: user, guest, or both.
        #[arg(long, default_value = "both")]
        visibility: String,
    },
    /// Edit a rule by id.
    Edit {
        id: String,
        question: String,
        answer: String,
        #[arg(long, default_value = "user")]
        audience: String,
    },
    /// Delete a rule by id.
    Delete {
        id: String,
        #[arg(long, default_value = "user")]
        audience: String,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Register a new category in both audience files.
    Add { name: String },
    /// Remove a category and all its rules.
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            std::fs::create_dir_all(&config.store.data_dir)?;
            let mut engine = Engine::from_config(&config).await?;
            for category in STARTER_CATEGORIES {
                engine.add_category(category);
            }
            println!("Initialized data directory: {}", config.store.data_dir.display());
        }
        Commands::Ask { text, audience } => {
            let audience: Audience = audience.parse()?;
            let mut engine = Engine::from_config(&config).await?;
            let reply = engine.respond(&text, audience).await;
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            println!("[{}] ({:?})", timestamp, reply.kind);
            println!("{}", reply.text);
        }
        Commands::Rules { command } => {
            let mut engine = Engine::from_config(&config).await?;
            match command {
                RulesCommands::List { audience } => {
                    let audience: Audience = audience.parse()?;
                    for rule in engine.list_rules(audience) {
                        println!("{} [{}]", rule.id, rule.category);
                        println!("    q: {}", rule.question);
                        println!("    a: {}", rule.answer);
                    }
                }
                RulesCommands::Add {
                    question,
                    answer,
                    category,
                    visibility,
                } => {
                    let visibility: Visibility = visibility.parse()?;
                    let id = engine
                        .add_rule(visibility, &category, &question, &answer)
                        .await?;
                    println!("Added rule {}", id);
                }
                RulesCommands::Edit {
                    id,
                    question,
                    answer,
                    audience,
                } => {
                    let audience: Audience = audience.parse()?;
                    if engine.edit_rule(&id, audience, &question, &answer).await? {
                        println!("Edited rule {}", id);
                    } else {
                        println!("Rule not found: {}", id);
                    }
                }
                RulesCommands::Delete { id, audience } => {
                    let audience: Audience = audience.parse()?;
                    if engine.delete_rule(&id, audience).await {
                        println!("Deleted rule {}", id);
                    } else {
                        println!("Rule not found: {}", id);
                    }
                }
            }
        }
        Commands::Category { command } => {
            let mut engine = Engine::from_config(&config).await?;
            match command {
                CategoryCommands::Add { name } => {
                    if engine.add_category(&name) {
                        println!("Added category {}", name);
                    } else {
                        println!("Category already exists: {}", name);
                    }
                }
                CategoryCommands::Remove { name } => {
                    if engine.remove_category(&name).await {
                        println!("Removed category {}", name);
                    } else {
                        println!("No such category: {}", name);
                    }
                }
            }
        }
        Commands::Reindex => {
            let mut engine = Engine::from_config(&config).await?;
            engine.reload_faq().await;
            engine.reindex().await;
            println!("Index rebuilt.");
        }
    }

    Ok(())
}
