//! Collection Engine
//!
//! Collection membership and aggregation for a learning-content platform:
//! - Alias resolution for system collections (favorites, research, ...)
//! - Optimistic membership store with commit/rollback per key
//! - Aggregation of authoritative and self-tagging sources into one list
//! - Course catalog filtering
//! - Typed refresh bus and stale-fetch detection for views
//!
//! # Example
//!
//! ```ignore
//! use collection_engine::{CollectionEngine, Config, InMemoryRepository, Session};
//! use collection_engine::types::ItemKind;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repo = Arc::new(InMemoryRepository::new());
//!     let engine = CollectionEngine::new(&Config::default(), repo, Vec::new(), Session::user("u1"))?;
//!     engine.bootstrap().await?;
//!     engine.add("course-1", ItemKind::Course, "favorites").await?;
//!     assert!(engine.is_saved(ItemKind::Course, "course-1"));
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod repository;
pub mod collections;
pub mod catalog;
pub mod engine;
pub mod cli;

pub use catalog::{Course, FilterEngine, FilterState};

pub use collections::{
    AggregationResolver,
    AliasResolver,
    CollectionStore,
    CollectionView,
    MutationCoordinator,
    RefreshBus,
    RefreshEvent,
    RefreshKind,
    Session,
    TaggedSource,
};

pub use config::Config;
pub use engine::{BootstrapReport, CollectionEngine};
pub use error::{EngineError, EngineResult};

pub use repository::{
    InMemoryConversationLog,
    InMemoryRepository,
    RemoteRepository,
    RepositoryError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
