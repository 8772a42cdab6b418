//! Mutation coordinator
//!
//! Single entry point for every write. Each operation checks the session,
//! applies its change to the store before the first suspension point,
//! calls the remote repository and then commits or rolls back. Successful
//! mutations publish on the refresh bus.
//!
//! Calls for the same membership key run one at a time behind a per-key
//! lock; the store's last-writer-wins ledger decides what each result means
//! for local state. Renames of one collection are serialized the same way.

use futures::future::join_all;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::alias::{AliasLookup, AliasResolver};
use super::bus::{MembershipChange, RefreshBus, RefreshKind};
use super::scope::{ScopeTracker, SuppressToken};
use super::store::{MembershipOp, MutationTicket, Resolution};
use super::{lookup_alias, read_store, resolve_alias, write_store, SharedStore};
use crate::config::AliasEntry;
use crate::error::{EngineError, EngineResult};
use crate::repository::{NewCollection, RemoteRepository};
use crate::types::{Collection, CollectionId, ItemKind, ItemRef, MembershipKey, Owner};

/// Who is calling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub org_ids: Vec<String>,
}

impl Session {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            org_ids: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_orgs(mut self, org_ids: Vec<String>) -> Self {
        self.org_ids = org_ids;
        self
    }

    pub fn require_user(&self) -> EngineResult<&str> {
        self.user_id.as_deref().ok_or(EngineError::Auth)
    }

    /// Whether the session may modify a collection with this owner
    pub fn owns(&self, owner: &Owner) -> bool {
        match owner {
            Owner::User(id) => self.user_id.as_deref() == Some(id.as_str()),
            Owner::Org(id) => self.org_ids.iter().any(|org| org == id),
        }
    }
}

type KeyLock = Arc<AsyncMutex<()>>;

/// Async locks created on demand per key and dropped once nobody waits
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, KeyLock>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &K, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is queued on this key
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct MutationCoordinator {
    repo: Arc<dyn RemoteRepository>,
    store: SharedStore,
    aliases: Arc<AliasResolver>,
    scopes: Arc<ScopeTracker>,
    bus: RefreshBus,
    session: Session,
    default_scope: String,
    key_locks: KeyedLocks<MembershipKey>,
    rename_locks: KeyedLocks<CollectionId>,
}

impl MutationCoordinator {
    pub fn new(
        repo: Arc<dyn RemoteRepository>,
        store: SharedStore,
        aliases: Arc<AliasResolver>,
        scopes: Arc<ScopeTracker>,
        bus: RefreshBus,
        session: Session,
    ) -> Self {
        Self {
            repo,
            store,
            aliases,
            scopes,
            bus,
            session,
            default_scope: crate::types::ALL_COURSES_SCOPE.to_string(),
            key_locks: KeyedLocks::new(),
            rename_locks: KeyedLocks::new(),
        }
    }

    /// Scope views are moved to when their collection is deleted
    pub fn with_default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scope = scope.into();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve a mutation target, requiring an existing collection the
    /// session may modify
    fn target(&self, name: &str) -> EngineResult<Collection> {
        let store = read_store(&self.store);
        let id = match lookup_alias(&self.aliases, &store, name) {
            AliasLookup::Resolved(id) => id,
            AliasLookup::NotAlias => name.to_string(),
            AliasLookup::Unresolved => {
                return Err(EngineError::NotFound(format!(
                    "alias '{}' has no collection yet",
                    name
                )))
            }
        };
        let collection = store
            .collection(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("collection {}", id)))?;
        if !self.session.owns(&collection.owner) {
            return Err(EngineError::Permission(format!(
                "collection {} belongs to another owner",
                collection.id
            )));
        }
        Ok(collection)
    }

    /// Keys and collections with a lock currently allocated
    pub fn locks_held(&self) -> usize {
        self.key_locks.len() + self.rename_locks.len()
    }

    /// Add an item to a collection (id or alias)
    pub async fn add(&self, item_id: &str, item_kind: ItemKind, collection: &str) -> EngineResult<()> {
        self.mutate(MembershipOp::Add, ItemRef::new(item_kind, item_id), collection)
            .await
    }

    /// Remove an item from a collection (id or alias)
    pub async fn remove(
        &self,
        item_id: &str,
        item_kind: ItemKind,
        collection: &str,
    ) -> EngineResult<()> {
        self.mutate(MembershipOp::Remove, ItemRef::new(item_kind, item_id), collection)
            .await
    }

    async fn mutate(&self, op: MembershipOp, item: ItemRef, collection: &str) -> EngineResult<()> {
        self.session.require_user()?;
        let collection = self.target(collection)?;
        let key = MembershipKey::new(item, collection.id);

        let ticket = {
            let mut store = write_store(&self.store);
            let desired = op == MembershipOp::Add;
            if store.is_member(&key) == desired && !store.has_pending(&key) {
                debug!("{:?} on {} already in effect", op, key);
                return Ok(());
            }
            store.apply_optimistic(op, key.clone())
        };
        self.scopes.bump(&key.collection_id);

        let lock = self.key_locks.get(&key);
        let guard = lock.clone().lock_owned().await;
        let result = match op {
            MembershipOp::Add => {
                self.repo
                    .add_membership(&key.item.id, key.item.kind, &key.collection_id)
                    .await
            }
            MembershipOp::Remove => {
                self.repo
                    .remove_membership(&key.item.id, &key.collection_id)
                    .await
            }
        };
        let result = self.settle(&ticket, result.map_err(EngineError::from));
        drop(guard);
        self.key_locks.release(&key, lock);
        result?;

        let change = match op {
            MembershipOp::Add => MembershipChange::Added,
            MembershipOp::Remove => MembershipChange::Removed,
        };
        self.bus.publish(RefreshKind::MembershipChanged {
            collection_id: key.collection_id.clone(),
            item: key.item.clone(),
            change,
        });
        info!("{:?} {} committed", op, key);
        Ok(())
    }

    /// Commit or roll back a ticket according to the remote outcome
    fn settle(&self, ticket: &MutationTicket, result: EngineResult<()>) -> EngineResult<()> {
        let resolution = {
            let mut store = write_store(&self.store);
            match &result {
                Ok(()) => store.commit(ticket),
                Err(_) => store.rollback(ticket),
            }
        };
        self.scopes.bump(&ticket.key.collection_id);

        match (&result, resolution) {
            (Ok(()), Resolution::Superseded) => {
                debug!("{} committed under a newer intent", ticket.key)
            }
            (Err(e), Resolution::Applied) => warn!("{:?} {} rolled back: {}", ticket.op, ticket.key, e),
            (Err(e), Resolution::Superseded) => {
                warn!("{:?} {} failed, newer intent kept: {}", ticket.op, ticket.key, e)
            }
            (_, Resolution::Unknown) => {
                warn!("Ledger entry for {} vanished before resolution", ticket.key)
            }
            (Ok(()), Resolution::Applied) => {}
        }
        result
    }

    /// Mark the next refresh of a collection as a no-op. Use after stripping
    /// a removed item locally so the pending fetch cannot bring it back.
    pub fn suppress_next_refresh(&self, collection: &str) -> SuppressToken {
        let collection_id = {
            let store = read_store(&self.store);
            resolve_alias(&self.aliases, &store, collection)
        };
        self.scopes.suppress_next_refresh(&collection_id)
    }

    pub async fn rename_collection(&self, collection: &str, label: &str) -> EngineResult<()> {
        self.session.require_user()?;
        let label = label.trim();
        if label.is_empty() {
            return Err(EngineError::Validation(
                "collection label cannot be empty".to_string(),
            ));
        }
        let target = self.target(collection)?;

        let lock = self.rename_locks.get(&target.id);
        let guard = lock.clone().lock_owned().await;
        let result = self.rename_locked(&target.id, label).await;
        drop(guard);
        self.rename_locks.release(&target.id, lock);
        result
    }

    /// Rename with the collection's rename lock held, so the label read
    /// here is the one the previous rename settled on
    async fn rename_locked(&self, collection_id: &str, label: &str) -> EngineResult<()> {
        let (current, own_label) = {
            let store = read_store(&self.store);
            let current = store
                .collection(collection_id)
                .map(|c| c.label.clone())
                .ok_or_else(|| EngineError::NotFound(format!("collection {}", collection_id)))?;
            let own_label = store
                .alias_of(collection_id)
                .and_then(|alias| self.aliases.label_for(alias))
                .map(str::to_string);
            (current, own_label)
        };
        let keeps_own_label = own_label
            .map(|own| own.eq_ignore_ascii_case(label))
            .unwrap_or(false);
        if self.aliases.is_reserved_label(label) && !keeps_own_label {
            return Err(EngineError::Validation(format!(
                "'{}' is reserved for a system collection",
                label
            )));
        }
        if current == label {
            return Ok(());
        }

        write_store(&self.store).set_label(collection_id, label);
        self.scopes.bump(collection_id);

        if let Err(e) = self.repo.rename_collection(collection_id, label).await {
            write_store(&self.store).set_label(collection_id, &current);
            self.scopes.bump(collection_id);
            warn!("Rename of {} rolled back: {}", collection_id, e);
            return Err(e.into());
        }

        self.bus.publish(RefreshKind::CollectionRenamed {
            collection_id: collection_id.to_string(),
            label: label.to_string(),
        });
        info!("Renamed collection {} to '{}'", collection_id, label);
        Ok(())
    }

    /// Delete a custom or org collection, cascading its memberships and
    /// moving any view scoped to it to the default scope
    pub async fn delete_collection(&self, collection: &str) -> EngineResult<()> {
        self.session.require_user()?;
        let target = self.target(collection)?;
        if target.is_system_defined {
            return Err(EngineError::Permission(format!(
                "system collection '{}' cannot be deleted",
                target.label
            )));
        }

        self.repo.delete_collection(&target.id).await?;

        write_store(&self.store).remove_collection(&target.id);
        self.scopes.bump(&target.id);
        let mut moved = self.scopes.redirect(&target.id, &self.default_scope);
        if collection != target.id {
            moved.extend(self.scopes.redirect(collection, &self.default_scope));
        }

        self.bus.publish(RefreshKind::CollectionDeleted {
            collection_id: target.id.clone(),
            redirected_to: self.default_scope.clone(),
        });
        info!(
            "Deleted collection {} ('{}'), {} view(s) redirected",
            target.id,
            target.label,
            moved.len()
        );
        Ok(())
    }

    /// Create a custom collection owned by the session user
    pub async fn create_collection(
        &self,
        label: &str,
        color: Option<String>,
    ) -> EngineResult<Collection> {
        let user_id = self.session.require_user()?.to_string();
        let label = label.trim();
        if label.is_empty() {
            return Err(EngineError::Validation(
                "collection label cannot be empty".to_string(),
            ));
        }
        if self.aliases.is_reserved_label(label) {
            return Err(EngineError::Validation(format!(
                "'{}' is reserved for a system collection",
                label
            )));
        }

        let created = self
            .insert_collection(NewCollection {
                label: label.to_string(),
                color,
                is_system_defined: false,
                owner: Owner::User(user_id),
            })
            .await?;
        info!("Created collection {} ('{}')", created.id, created.label);
        Ok(created)
    }

    /// Create the system collection backing an alias and pin the alias to it
    pub(crate) async fn seed_system_collection(&self, entry: &AliasEntry) -> EngineResult<Collection> {
        let user_id = self.session.require_user()?.to_string();
        let created = self
            .insert_collection(NewCollection {
                label: entry.label.clone(),
                color: None,
                is_system_defined: true,
                owner: Owner::User(user_id),
            })
            .await?;
        write_store(&self.store).bind_alias(&entry.alias, &created.id);
        info!("Seeded system collection '{}' for alias {}", created.label, entry.alias);
        Ok(created)
    }

    async fn insert_collection(&self, draft: NewCollection) -> EngineResult<Collection> {
        let created = self.repo.create_collection(&draft).await?;
        if created.id.is_empty() {
            error!("Repository created collection '{}' without an id", draft.label);
            return Err(EngineError::Internal(
                "created collection has no id".to_string(),
            ));
        }
        write_store(&self.store).upsert_collection(created.clone());
        self.scopes.bump(&created.id);
        self.bus.publish(RefreshKind::CollectionCreated {
            collection_id: created.id.clone(),
        });
        Ok(created)
    }

    /// Delete a note outright, as opposed to removing it from one collection
    pub async fn delete_note(&self, note_id: &str) -> EngineResult<()> {
        self.session.require_user()?;
        let item = ItemRef::new(ItemKind::Note, note_id);

        let tickets: Vec<MutationTicket> = {
            let mut store = write_store(&self.store);
            let collection_ids = store.collections_of(&item);
            collection_ids
                .into_iter()
                .map(|id| store.apply_optimistic(MembershipOp::Remove, MembershipKey::new(item.clone(), id)))
                .collect()
        };
        for ticket in &tickets {
            self.scopes.bump(&ticket.key.collection_id);
        }

        // Queue on every key at once so calls already in flight settle first
        let locks: Vec<KeyLock> = tickets.iter().map(|t| self.key_locks.get(&t.key)).collect();
        let guards: Vec<OwnedMutexGuard<()>> =
            join_all(locks.iter().map(|lock| lock.clone().lock_owned())).await;

        let result = self.repo.delete_note(note_id).await.map_err(EngineError::from);
        for ticket in &tickets {
            // Errors are already logged per ticket; the first one is returned below
            let _ = self.settle(ticket, result.clone());
        }
        drop(guards);
        for (ticket, lock) in tickets.iter().zip(locks) {
            self.key_locks.release(&ticket.key, lock);
        }
        result?;

        let collection_ids = tickets.into_iter().map(|t| t.key.collection_id).collect();
        self.bus.publish(RefreshKind::NoteDeleted {
            note_id: note_id.to_string(),
            collection_ids,
        });
        info!("Deleted note {}", note_id);
        Ok(())
    }
}
