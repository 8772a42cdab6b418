//! In-memory repository
//!
//! Backs the CLI and the test-suite. Supports per-operation failure
//! injection, artificial latency and "table not provisioned" collections so
//! the engine's degradation paths can be exercised without a real backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{
    CollectionItems, MutationAck, NewCollection, RemoteRepository, RepoResult, RepositoryError,
};
use crate::collections::aggregate::TaggedSource;
use crate::error::EngineResult;
use crate::types::{Collection, CollectionId, ContentItem, ItemKind, ItemRef, Membership, Owner};

/// Remote operations, used to target failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    AddMembership,
    RemoveMembership,
    FetchItems,
    FetchCounts,
    RenameCollection,
    DeleteCollection,
    FetchCollections,
    FetchMemberships,
    CreateCollection,
    DeleteNote,
}

/// Seed data for an in-memory account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub user_id: String,
    #[serde(default)]
    pub org_ids: Vec<String>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub conversations: Vec<ContentItem>,
    #[serde(default)]
    pub courses: Vec<crate::catalog::Course>,
    /// Collections whose backing table has not been provisioned
    #[serde(default)]
    pub missing_tables: Vec<CollectionId>,
}

#[derive(Default)]
struct RepoState {
    collections: BTreeMap<CollectionId, Collection>,
    memberships: Vec<Membership>,
    items: HashMap<ItemRef, ContentItem>,
    missing_tables: HashSet<CollectionId>,
    failures: HashMap<RepoOp, VecDeque<RepositoryError>>,
    calls: HashMap<RepoOp, usize>,
}

fn owned_by(collection: &Collection, owner_id: &str) -> bool {
    match &collection.owner {
        Owner::User(id) | Owner::Org(id) => id == owner_id,
    }
}

/// Remote repository held entirely in memory
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<RepoState>,
    latency: Option<Duration>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository seeded from a fixture
    pub fn from_fixture(fixture: &Fixture) -> Self {
        let repo = Self::new();
        {
            let mut state = repo.lock();
            for collection in &fixture.collections {
                state.collections.insert(collection.id.clone(), collection.clone());
            }
            for item in &fixture.items {
                state.items.insert(item.item_ref(), item.clone());
            }
            for membership in &fixture.memberships {
                if !state.memberships.contains(membership) {
                    state.memberships.push(membership.clone());
                }
            }
            state.missing_tables.extend(fixture.missing_tables.iter().cloned());
        }
        repo
    }

    /// Delay every call by `latency` before it resolves
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_collection(&self, collection: Collection) {
        self.lock().collections.insert(collection.id.clone(), collection);
    }

    pub fn insert_item(&self, item: ContentItem) {
        self.lock().items.insert(item.item_ref(), item);
    }

    pub fn insert_membership(&self, item_id: &str, item_kind: ItemKind, collection_id: &str) {
        let membership = Membership {
            item_id: item_id.to_string(),
            item_kind,
            collection_id: collection_id.to_string(),
        };
        let mut state = self.lock();
        if !state.memberships.contains(&membership) {
            state.memberships.push(membership);
        }
    }

    /// Mark a collection's backing table as not provisioned
    pub fn drop_table(&self, collection_id: &str) {
        self.lock().missing_tables.insert(collection_id.to_string());
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: RepoOp, err: RepositoryError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Make the next call of `op` fail with a string-shaped acknowledgement
    pub fn fail_next_with_ack(&self, op: RepoOp, ack: MutationAck) {
        if let Err(err) = ack.into_result() {
            self.fail_next(op, err);
        }
    }

    /// Number of times `op` has been called
    pub fn calls(&self, op: RepoOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn membership_rows(&self) -> Vec<Membership> {
        self.lock().memberships.clone()
    }

    pub fn collection(&self, id: &str) -> Option<Collection> {
        self.lock().collections.get(id).cloned()
    }

    /// Current state written back over `base`, keeping the parts this
    /// repository does not own (conversations, courses, user)
    pub fn export(&self, base: &Fixture) -> Fixture {
        let state = self.lock();
        let mut items: Vec<ContentItem> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.item_ref().cmp(&b.item_ref()));
        let mut missing_tables: Vec<CollectionId> = state.missing_tables.iter().cloned().collect();
        missing_tables.sort();
        Fixture {
            collections: state.collections.values().cloned().collect(),
            memberships: state.memberships.clone(),
            items,
            missing_tables,
            ..base.clone()
        }
    }

    async fn enter(&self, op: RepoOp) -> RepoResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            debug!("Injected failure for {:?}: {}", op, err);
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteRepository for InMemoryRepository {
    async fn add_membership(
        &self,
        item_id: &str,
        item_kind: ItemKind,
        collection_id: &str,
    ) -> RepoResult<()> {
        self.enter(RepoOp::AddMembership).await?;
        let mut state = self.lock();
        if !state.collections.contains_key(collection_id) {
            return Err(RepositoryError::NotFound(format!("collection {}", collection_id)));
        }
        let row = Membership {
            item_id: item_id.to_string(),
            item_kind,
            collection_id: collection_id.to_string(),
        };
        if !state.memberships.contains(&row) {
            state.memberships.push(row);
        }
        Ok(())
    }

    async fn remove_membership(&self, item_id: &str, collection_id: &str) -> RepoResult<()> {
        self.enter(RepoOp::RemoveMembership).await?;
        self.lock()
            .memberships
            .retain(|m| !(m.item_id == item_id && m.collection_id == collection_id));
        Ok(())
    }

    async fn fetch_collection_items(&self, collection_id: &str) -> RepoResult<CollectionItems> {
        self.enter(RepoOp::FetchItems).await?;
        let state = self.lock();
        if state.missing_tables.contains(collection_id) {
            return Ok(CollectionItems {
                items: Vec::new(),
                debug: Some(serde_json::json!({ "tableMissing": true })),
            });
        }

        let mut items = Vec::new();
        let mut orphans = 0usize;
        for row in state.memberships.iter().filter(|m| m.collection_id == collection_id) {
            match state.items.get(&ItemRef::new(row.item_kind, row.item_id.clone())) {
                Some(item) => items.push(item.clone()),
                None => orphans += 1,
            }
        }
        Ok(CollectionItems {
            items,
            debug: (orphans > 0).then(|| serde_json::json!({ "orphanedRows": orphans })),
        })
    }

    async fn fetch_membership_counts(
        &self,
        owner_id: &str,
    ) -> RepoResult<HashMap<CollectionId, usize>> {
        self.enter(RepoOp::FetchCounts).await?;
        let state = self.lock();
        let mut counts: HashMap<CollectionId, usize> = state
            .collections
            .values()
            .filter(|c| owned_by(c, owner_id))
            .map(|c| (c.id.clone(), 0))
            .collect();
        for row in &state.memberships {
            if let Some(count) = counts.get_mut(&row.collection_id) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn rename_collection(&self, collection_id: &str, label: &str) -> RepoResult<()> {
        self.enter(RepoOp::RenameCollection).await?;
        let mut state = self.lock();
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("collection {}", collection_id)))?;
        collection.label = label.to_string();
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> RepoResult<()> {
        self.enter(RepoOp::DeleteCollection).await?;
        let mut state = self.lock();
        if state.collections.remove(collection_id).is_none() {
            return Err(RepositoryError::NotFound(format!("collection {}", collection_id)));
        }
        state.memberships.retain(|m| m.collection_id != collection_id);
        Ok(())
    }

    async fn fetch_collections(&self, owner_id: &str) -> RepoResult<Vec<Collection>> {
        self.enter(RepoOp::FetchCollections).await?;
        Ok(self
            .lock()
            .collections
            .values()
            .filter(|c| owned_by(c, owner_id))
            .cloned()
            .collect())
    }

    async fn fetch_memberships(&self, owner_id: &str) -> RepoResult<Vec<Membership>> {
        self.enter(RepoOp::FetchMemberships).await?;
        let state = self.lock();
        Ok(state
            .memberships
            .iter()
            .filter(|m| {
                state
                    .collections
                    .get(&m.collection_id)
                    .map(|c| owned_by(c, owner_id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn create_collection(&self, draft: &NewCollection) -> RepoResult<Collection> {
        self.enter(RepoOp::CreateCollection).await?;
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            label: draft.label.clone(),
            color: draft.color.clone(),
            is_system_defined: draft.is_system_defined,
            owner: draft.owner.clone(),
        };
        self.lock()
            .collections
            .insert(collection.id.clone(), collection.clone());
        Ok(collection)
    }

    async fn delete_note(&self, note_id: &str) -> RepoResult<()> {
        self.enter(RepoOp::DeleteNote).await?;
        let mut state = self.lock();
        let key = ItemRef::new(ItemKind::Note, note_id);
        if state.items.remove(&key).is_none() {
            return Err(RepositoryError::NotFound(format!("note {}", note_id)));
        }
        state
            .memberships
            .retain(|m| !(m.item_kind == ItemKind::Note && m.item_id == note_id));
        Ok(())
    }
}

/// Conversation log whose entries carry their own collection ids
#[derive(Default)]
pub struct InMemoryConversationLog {
    conversations: RwLock<Vec<ContentItem>>,
}

impl InMemoryConversationLog {
    pub fn new(conversations: Vec<ContentItem>) -> Self {
        Self {
            conversations: RwLock::new(conversations),
        }
    }

    pub fn push(&self, conversation: ContentItem) {
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conversation);
    }
}

#[async_trait]
impl TaggedSource for InMemoryConversationLog {
    fn name(&self) -> &str {
        "conversations"
    }

    async fn tagged_items(&self, collection_id: &str) -> EngineResult<Vec<ContentItem>> {
        let conversations = self.conversations.read().unwrap_or_else(PoisonError::into_inner);
        Ok(conversations
            .iter()
            .filter(|c| c.collection_ids.iter().any(|id| id == collection_id))
            .cloned()
            .collect())
    }

    async fn all_items(&self) -> EngineResult<Vec<ContentItem>> {
        Ok(self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
