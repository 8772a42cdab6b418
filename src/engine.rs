//! Collection engine facade
//!
//! Wires the store, alias table, aggregation resolver, filter and mutation
//! coordinator together and exposes the query and mutation surface consumers
//! use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{Course, FilterEngine, FilterState};
use crate::collections::{
    read_store, resolve_alias, shared_store, write_store, AggregationResolver, AliasLookup,
    AliasResolver, CollectionStore, CollectionView, MutationCoordinator, MutationStatus,
    RefreshBus, RefreshSubscription, ScopeTracker, Session, SharedStore, SuppressToken,
    TaggedSource,
};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::repository::{RemoteRepository, RepositoryError};
use crate::types::{
    Collection, CollectionId, ContentItem, ItemKind, ItemRef, Membership, MembershipKey,
};

/// What `bootstrap` loaded and created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub collections: usize,
    pub memberships: usize,
    /// Aliases whose system collection had to be created
    pub seeded: Vec<String>,
}

pub struct CollectionEngine {
    repo: Arc<dyn RemoteRepository>,
    store: SharedStore,
    aliases: Arc<AliasResolver>,
    scopes: Arc<ScopeTracker>,
    bus: RefreshBus,
    resolver: Arc<AggregationResolver>,
    coordinator: MutationCoordinator,
    filter: FilterEngine,
    session: Session,
}

impl CollectionEngine {
    /// Build an engine. Fails if the configured alias table is malformed.
    pub fn new(
        config: &Config,
        repo: Arc<dyn RemoteRepository>,
        sources: Vec<Arc<dyn TaggedSource>>,
        session: Session,
    ) -> EngineResult<Self> {
        let aliases = Arc::new(AliasResolver::new(config.aliases.clone())?);
        let store = shared_store(CollectionStore::new());
        let scopes = Arc::new(ScopeTracker::new());
        let bus = RefreshBus::new();
        let resolver = Arc::new(AggregationResolver::new(
            repo.clone(),
            sources,
            aliases.clone(),
            store.clone(),
        ));
        let coordinator = MutationCoordinator::new(
            repo.clone(),
            store.clone(),
            aliases.clone(),
            scopes.clone(),
            bus.clone(),
            session.clone(),
        )
        .with_default_scope(config.views.default_scope.clone());

        Ok(Self {
            repo,
            store,
            aliases,
            scopes,
            bus,
            resolver,
            coordinator,
            filter: FilterEngine::new(&config.filters),
            session,
        })
    }

    /// Load collections and memberships for the session's user and orgs,
    /// seed missing system collections and validate the alias table
    pub async fn bootstrap(&self) -> EngineResult<BootstrapReport> {
        let user_id = self.session.require_user()?.to_string();
        let mut owners = vec![user_id];
        owners.extend(self.session.org_ids.iter().cloned());

        let mut collections: Vec<Collection> = Vec::new();
        let mut memberships: Vec<Membership> = Vec::new();
        for owner in &owners {
            collections.extend(self.repo.fetch_collections(owner).await?);
            memberships.extend(tolerate_missing(
                self.repo.fetch_memberships(owner).await,
                "memberships",
            )?);
        }

        let mut report = BootstrapReport {
            collections: collections.len(),
            memberships: memberships.len(),
            seeded: Vec::new(),
        };
        {
            let mut store = write_store(&self.store);
            store.load_collections(collections);
            store.load_memberships(memberships);
        }

        let missing: Vec<_> = {
            let store = read_store(&self.store);
            self.aliases
                .missing(store.collections())
                .into_iter()
                .cloned()
                .collect()
        };
        for entry in &missing {
            self.coordinator.seed_system_collection(entry).await?;
            report.seeded.push(entry.alias.clone());
        }

        let mut store = write_store(&self.store);
        if let Err(e) = self.aliases.validate(store.collections()) {
            warn!("Alias table does not match stored collections: {}", e);
            return Err(e);
        }
        for entry in self.aliases.entries() {
            if let AliasLookup::Resolved(id) = self.aliases.lookup(&entry.alias, store.collections()) {
                store.bind_alias(&entry.alias, &id);
            }
        }
        info!(
            "Bootstrapped {} collection(s), {} membership(s), seeded {:?}",
            report.collections, report.memberships, report.seeded
        );
        Ok(report)
    }

    // ----- queries -----

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_saved(&self, item_kind: ItemKind, item_id: &str) -> bool {
        read_store(&self.store).is_saved(&ItemRef::new(item_kind, item_id))
    }

    /// Collections an item currently belongs to, from local state
    pub fn collections_of(&self, item_kind: ItemKind, item_id: &str) -> Vec<CollectionId> {
        read_store(&self.store).collections_of(&ItemRef::new(item_kind, item_id))
    }

    /// De-duplicated items of a collection, alias or id
    pub async fn list_items(&self, collection: &str) -> EngineResult<Vec<ContentItem>> {
        self.resolver.list_items(collection).await
    }

    /// Filter catalog courses for a scope (alias, id or an all-courses value),
    /// with saved flags stamped from current membership
    pub fn apply_filters(&self, filters: &FilterState, courses: &[Course], scope: &str) -> Vec<Course> {
        let scope = self.resolve(scope);
        let annotated = self.annotate_saved(courses);
        self.filter.apply(filters, &annotated, &scope)
    }

    /// Copy of `courses` with `saved` reflecting current membership
    pub fn annotate_saved(&self, courses: &[Course]) -> Vec<Course> {
        let index = self.saved_index();
        courses
            .iter()
            .map(|course| {
                let mut course = course.clone();
                course.saved = index.contains(&course.item_ref());
                course
            })
            .collect()
    }

    /// Items that belong to at least one collection
    pub fn saved_index(&self) -> HashSet<ItemRef> {
        read_store(&self.store).saved_index()
    }

    /// Membership counts from the remote store
    pub async fn fetch_counts(&self) -> EngineResult<HashMap<CollectionId, usize>> {
        let user_id = self.session.require_user()?;
        tolerate_missing(self.repo.fetch_membership_counts(user_id).await, "membership counts")
    }

    /// Membership counts derived from local (optimistic) state
    pub fn local_counts(&self) -> HashMap<CollectionId, usize> {
        read_store(&self.store).local_counts()
    }

    pub fn collections(&self) -> Vec<Collection> {
        read_store(&self.store).collections().cloned().collect()
    }

    pub fn resolve(&self, name: &str) -> CollectionId {
        let store = read_store(&self.store);
        resolve_alias(&self.aliases, &store, name)
    }

    pub fn mutation_status(&self, item_kind: ItemKind, item_id: &str, collection: &str) -> Option<MutationStatus> {
        let key = MembershipKey::new(ItemRef::new(item_kind, item_id), self.resolve(collection));
        read_store(&self.store).status(&key)
    }

    /// Keys with a mutation still awaiting its remote call
    pub fn pending_mutations(&self) -> usize {
        read_store(&self.store).pending_count()
    }

    // ----- subscriptions and views -----

    pub fn subscribe(&self) -> RefreshSubscription {
        self.bus.subscribe()
    }

    pub fn open_view(&self, scope: &str) -> CollectionView {
        CollectionView::new(scope, self.scopes.clone(), self.resolver.clone())
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    // ----- mutations -----

    pub async fn add(&self, item_id: &str, item_kind: ItemKind, collection: &str) -> EngineResult<()> {
        self.coordinator.add(item_id, item_kind, collection).await
    }

    pub async fn remove(&self, item_id: &str, item_kind: ItemKind, collection: &str) -> EngineResult<()> {
        self.coordinator.remove(item_id, item_kind, collection).await
    }

    pub fn suppress_next_refresh(&self, collection: &str) -> SuppressToken {
        self.coordinator.suppress_next_refresh(collection)
    }

    pub async fn rename_collection(&self, collection: &str, label: &str) -> EngineResult<()> {
        self.coordinator.rename_collection(collection, label).await
    }

    pub async fn delete_collection(&self, collection: &str) -> EngineResult<()> {
        self.coordinator.delete_collection(collection).await
    }

    pub async fn create_collection(&self, label: &str, color: Option<String>) -> EngineResult<Collection> {
        self.coordinator.create_collection(label, color).await
    }

    pub async fn delete_note(&self, note_id: &str) -> EngineResult<()> {
        self.coordinator.delete_note(note_id).await
    }
}

/// Read paths treat an unprovisioned table as empty
fn tolerate_missing<T: Default>(result: Result<T, RepositoryError>, what: &str) -> EngineResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(RepositoryError::TableMissing(table)) => {
            warn!("Table {} missing while reading {}, using empty result", table, what);
            Ok(T::default())
        }
        Err(e) => Err(EngineError::from(e)),
    }
}
