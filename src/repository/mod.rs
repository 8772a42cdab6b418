//! Remote persistence boundary
//!
//! The engine never talks to a database directly. Everything goes through
//! `RemoteRepository`, which is injected so tests can swap in a mock or the
//! in-memory implementation.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Collection, CollectionId, ContentItem, ItemKind, Membership, Owner};

pub use memory::{InMemoryConversationLog, InMemoryRepository, RepoOp};

/// Errors reported by a remote repository
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backing table has not been provisioned yet
    #[error("table not found: {0}")]
    TableMissing(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// `{success, error?}` acknowledgement returned by string-shaped backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationAck {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// Classify the acknowledgement into a typed result
    pub fn into_result(self) -> RepoResult<()> {
        if self.success {
            return Ok(());
        }
        let message = self.error.unwrap_or_else(|| "unknown error".to_string());
        let lower = message.to_lowercase();
        let err = if lower.contains("not authenticated") || lower.contains("unauthenticated") {
            RepositoryError::Unauthenticated
        } else if lower.contains("permission") || lower.contains("forbidden") {
            RepositoryError::Forbidden(message)
        } else if lower.contains("relation") && lower.contains("does not exist") {
            RepositoryError::TableMissing(message)
        } else if lower.contains("not found") {
            RepositoryError::NotFound(message)
        } else {
            RepositoryError::Transport(message)
        };
        Err(err)
    }
}

/// Response of `fetch_collection_items`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionItems {
    pub items: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

/// Request to create a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    pub label: String,
    pub color: Option<String>,
    pub is_system_defined: bool,
    pub owner: Owner,
}

/// Asynchronous remote store. Every call is a suspension point and may fail.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    async fn add_membership(
        &self,
        item_id: &str,
        item_kind: ItemKind,
        collection_id: &str,
    ) -> RepoResult<()>;

    async fn remove_membership(&self, item_id: &str, collection_id: &str) -> RepoResult<()>;

    /// Items joined to the collection. Implementations should return an empty
    /// list when the backing table is missing; `TableMissing` is tolerated too.
    async fn fetch_collection_items(&self, collection_id: &str) -> RepoResult<CollectionItems>;

    async fn fetch_membership_counts(
        &self,
        owner_id: &str,
    ) -> RepoResult<HashMap<CollectionId, usize>>;

    async fn rename_collection(&self, collection_id: &str, label: &str) -> RepoResult<()>;

    /// Deletes the collection and cascades its membership rows
    async fn delete_collection(&self, collection_id: &str) -> RepoResult<()>;

    async fn fetch_collections(&self, owner_id: &str) -> RepoResult<Vec<Collection>>;

    async fn fetch_memberships(&self, owner_id: &str) -> RepoResult<Vec<Membership>>;

    async fn create_collection(&self, draft: &NewCollection) -> RepoResult<Collection>;

    async fn delete_note(&self, note_id: &str) -> RepoResult<()>;
}
