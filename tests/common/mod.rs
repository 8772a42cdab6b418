//! Shared fixtures for integration tests

#![allow(dead_code)]

use collection_engine::collections::{Session, TaggedSource};
use collection_engine::types::{Collection, Owner};
use collection_engine::{CollectionEngine, Config, InMemoryConversationLog, InMemoryRepository};
use std::sync::Arc;

pub const USER: &str = "u1";

pub fn system(id: &str, label: &str) -> Collection {
    Collection {
        id: id.to_string(),
        label: label.to_string(),
        color: None,
        is_system_defined: true,
        owner: Owner::User(USER.to_string()),
    }
}

pub fn custom(id: &str, label: &str) -> Collection {
    Collection {
        is_system_defined: false,
        ..system(id, label)
    }
}

/// Every alias-backed system collection plus one custom collection
pub fn account_collections() -> Vec<Collection> {
    vec![
        system("sys-fav", "Favorites"),
        system("sys-work", "Workspace"),
        system("sys-watch", "Watchlist"),
        system("sys-ctx", "Personal Context"),
        custom("custom-1", "Reading List"),
    ]
}

pub fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = InMemoryRepository::new();
    for collection in account_collections() {
        repo.insert_collection(collection);
    }
    Arc::new(repo)
}

pub fn engine(repo: Arc<InMemoryRepository>, log: Option<Arc<InMemoryConversationLog>>) -> CollectionEngine {
    let sources: Vec<Arc<dyn TaggedSource>> = match log {
        Some(log) => vec![log as Arc<dyn TaggedSource>],
        None => Vec::new(),
    };
    CollectionEngine::new(&Config::default(), repo, sources, Session::user(USER)).unwrap()
}

pub async fn bootstrapped(
    repo: Arc<InMemoryRepository>,
    log: Option<Arc<InMemoryConversationLog>>,
) -> CollectionEngine {
    let engine = engine(repo, log);
    engine.bootstrap().await.unwrap();
    engine
}
