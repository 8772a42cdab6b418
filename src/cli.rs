//! CLI interface for collection-engine
//!
//! Drives the engine against a JSON fixture standing in for the remote
//! store. Mutating commands write the resulting state back to the fixture.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::catalog::{CompletionStatus, DateFilter, Designation, FilterState, RatingFilter};
use crate::collections::{Session, TaggedSource};
use crate::config::{self, Config};
use crate::engine::CollectionEngine;
use crate::repository::memory::Fixture;
use crate::repository::{InMemoryConversationLog, InMemoryRepository};
use crate::types::{ItemKind, ALL_COURSES_SCOPE};

#[derive(Parser)]
#[command(name = "collection-engine")]
#[command(about = "Collection membership, aggregation and course filtering over a fixture store", long_about = None)]
#[command(version)]
struct Cli {
    /// Fixture file acting as the remote store
    #[arg(short, long, env = "COLLECTION_ENGINE_FIXTURE", default_value = "fixture.json")]
    fixture: PathBuf,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the items of a collection (id, alias or "conversations")
    List {
        collection: String,
    },
    /// Filter the course catalog
    Filter {
        /// Collection scope (alias, id, "academy" or "dashboard")
        #[arg(short, long, default_value = ALL_COURSES_SCOPE)]
        scope: String,
        /// Search text
        #[arg(short = 'q', long, default_value = "")]
        search: String,
        /// Exact category
        #[arg(long)]
        category: Option<String>,
        /// Credit tag (repeatable, any match passes)
        #[arg(long = "credit")]
        credits: Vec<String>,
        /// REQUIRED or RECOMMENDED (repeatable)
        #[arg(long = "designation")]
        designations: Vec<String>,
        /// NOT_STARTED, IN_PROGRESS or COMPLETED (repeatable)
        #[arg(long = "status")]
        statuses: Vec<String>,
        /// ALL, NOT_RATED or <N>_PLUS
        #[arg(long, default_value = "ALL")]
        rating: String,
        /// ALL, SINCE_LOGIN, THIS_MONTH or LAST_X_DAYS
        #[arg(long, default_value = "ALL")]
        date: String,
        /// Day count for LAST_X_DAYS
        #[arg(long, default_value = "")]
        days: String,
        /// Search lesson titles too
        #[arg(long)]
        include_lessons: bool,
    },
    /// Add an item to a collection
    Add {
        item_id: String,
        collection: String,
        #[arg(short, long, default_value = "course")]
        kind: String,
    },
    /// Remove an item from a collection
    Remove {
        item_id: String,
        collection: String,
        #[arg(short, long, default_value = "course")]
        kind: String,
    },
    /// Create a custom collection
    Create {
        label: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename a collection
    Rename {
        collection: String,
        label: String,
    },
    /// Delete a custom collection
    Delete {
        collection: String,
    },
    /// Delete a note and all of its memberships
    DeleteNote {
        note_id: String,
    },
    /// Show membership counts per collection
    Counts {
        /// Use local state instead of asking the store
        #[arg(long)]
        local: bool,
    },
    /// Show or initialise configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
        /// Write the default configuration
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))
}

fn save_fixture(path: &Path, fixture: &Fixture) -> Result<()> {
    let content = serde_json::to_string_pretty(fixture).context("Failed to serialize fixture")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write fixture {}", path.display()))
}

fn parse_kind(kind: &str) -> Result<ItemKind> {
    kind.parse().map_err(anyhow::Error::msg)
}

fn parse_set<T: Ord>(values: &[String], parse: impl Fn(&str) -> Result<T>) -> Result<std::collections::BTreeSet<T>> {
    values.iter().map(|v| parse(v)).collect()
}

fn parse_designation(value: &str) -> Result<Designation> {
    match value.trim().to_uppercase().as_str() {
        "REQUIRED" => Ok(Designation::Required),
        "RECOMMENDED" => Ok(Designation::Recommended),
        other => anyhow::bail!("unknown designation '{}'", other),
    }
}

fn parse_status(value: &str) -> Result<CompletionStatus> {
    match value.trim().to_uppercase().replace('-', "_").as_str() {
        "NOT_STARTED" => Ok(CompletionStatus::NotStarted),
        "IN_PROGRESS" => Ok(CompletionStatus::InProgress),
        "COMPLETED" => Ok(CompletionStatus::Completed),
        other => anyhow::bail!("unknown status '{}'", other),
    }
}

/// Run CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { show, path, init } = &cli.command {
        return config_command(cli.config.as_deref(), *show, *path, *init);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    let fixture = load_fixture(&cli.fixture)?;
    let repo = Arc::new(InMemoryRepository::from_fixture(&fixture));
    let conversations: Arc<dyn TaggedSource> =
        Arc::new(InMemoryConversationLog::new(fixture.conversations.clone()));
    let session = Session::user(fixture.user_id.clone()).with_orgs(fixture.org_ids.clone());
    let engine = CollectionEngine::new(&config, repo.clone(), vec![conversations], session)?;

    let report = engine.bootstrap().await?;
    let mut dirty = !report.seeded.is_empty();

    match cli.command {
        Commands::List { collection } => {
            let items = engine.list_items(&collection).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("{} is empty.", collection);
            } else {
                for item in &items {
                    let marker = if item.is_virtual { " (placeholder)" } else { "" };
                    println!("{:<18} {:<24} {}{}", item.kind, item.id, item.title, marker);
                }
            }
        }
        Commands::Filter {
            scope,
            search,
            category,
            credits,
            designations,
            statuses,
            rating,
            date,
            days,
            include_lessons,
        } => {
            let mut filters = FilterState::initial();
            filters.search_query = search;
            if let Some(category) = category {
                filters.category = category;
            }
            filters.credits = credits.into_iter().collect();
            filters.designations = parse_set(&designations, parse_designation)?;
            filters.status = parse_set(&statuses, parse_status)?;
            filters.rating_filter = rating.parse::<RatingFilter>().map_err(anyhow::Error::msg)?;
            filters.date_filter_type = date.parse::<DateFilter>().map_err(anyhow::Error::msg)?;
            filters.custom_days = days;
            filters.include_lessons = include_lessons;

            let courses = engine.apply_filters(&filters, &fixture.courses, &scope);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&courses)?);
            } else {
                println!("{} of {} course(s) match.", courses.len(), fixture.courses.len());
                for course in &courses {
                    let saved = if course.saved { "*" } else { " " };
                    println!("{} {:<12} {:<40} {:>3}% {:.1}", saved, course.id, course.title, course.progress, course.rating);
                }
            }
        }
        Commands::Add { item_id, collection, kind } => {
            engine.add(&item_id, parse_kind(&kind)?, &collection).await?;
            println!("Added {} to {}.", item_id, collection);
            dirty = true;
        }
        Commands::Remove { item_id, collection, kind } => {
            engine.remove(&item_id, parse_kind(&kind)?, &collection).await?;
            println!("Removed {} from {}.", item_id, collection);
            dirty = true;
        }
        Commands::Create { label, color } => {
            let created = engine.create_collection(&label, color).await?;
            println!("Created collection '{}' ({}).", created.label, created.id);
            dirty = true;
        }
        Commands::Rename { collection, label } => {
            engine.rename_collection(&collection, &label).await?;
            println!("Renamed {} to '{}'.", collection, label.trim());
            dirty = true;
        }
        Commands::Delete { collection } => {
            engine.delete_collection(&collection).await?;
            println!("Deleted {}.", collection);
            dirty = true;
        }
        Commands::DeleteNote { note_id } => {
            engine.delete_note(&note_id).await?;
            println!("Deleted note {}.", note_id);
            dirty = true;
        }
        Commands::Counts { local } => {
            let counts = if local {
                engine.local_counts()
            } else {
                engine.fetch_counts().await?
            };
            let mut rows: Vec<_> = engine
                .collections()
                .into_iter()
                .map(|c| (c.label, counts.get(&c.id).copied().unwrap_or(0)))
                .collect();
            rows.sort();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (label, count) in rows {
                    println!("{:<28} {}", label, count);
                }
            }
        }
        Commands::Config { .. } => {}
    }

    if dirty {
        save_fixture(&cli.fixture, &repo.export(&fixture))?;
    }
    Ok(())
}

fn config_command(path: Option<&Path>, show: bool, print_path: bool, init: bool) -> Result<()> {
    if print_path {
        match path {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", config::config_path()?.display()),
        }
    } else if init {
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => config::config_path()?,
        };
        Config::default().save_to(&target)?;
        println!("Wrote default configuration to {}", target.display());
    } else if show {
        let config = load_config(path)?;
        print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
    } else {
        print!("{}", config::default_config_toml());
    }
    Ok(())
}
