//! Collection membership and aggregation
//!
//! `store` holds the optimistic membership table, `coordinator` is the only
//! writer, `aggregate` and `view` are read-only consumers kept consistent by
//! the refresh `bus` and the version counters in `scope`.

pub mod aggregate;
pub mod alias;
pub mod bus;
pub mod coordinator;
pub mod scope;
pub mod store;
pub mod view;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use aggregate::{AggregationResolver, TaggedSource};
pub use alias::{AliasLookup, AliasResolver};
pub use bus::{MembershipChange, RefreshBus, RefreshEvent, RefreshKind, RefreshSubscription};
pub use coordinator::{MutationCoordinator, Session};
pub use scope::{FetchTicket, FetchVerdict, ScopeTracker, SuppressToken, ViewId};
pub use store::{CollectionStore, MembershipOp, MutationStatus, MutationTicket, Resolution};
pub use view::{CollectionView, RefreshOutcome};

use crate::types::CollectionId;

/// Store handle shared between the coordinator and its readers
pub type SharedStore = Arc<RwLock<CollectionStore>>;

pub fn shared_store(store: CollectionStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

pub(crate) fn read_store(store: &SharedStore) -> RwLockReadGuard<'_, CollectionStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_store(store: &SharedStore) -> RwLockWriteGuard<'_, CollectionStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

/// Look a name up, preferring the binding pinned at bootstrap over a label match
pub(crate) fn lookup_alias(
    aliases: &AliasResolver,
    store: &CollectionStore,
    name: &str,
) -> AliasLookup {
    if aliases.is_alias(name) {
        if let Some(id) = store.alias_binding(name) {
            return AliasLookup::Resolved(id.clone());
        }
    }
    aliases.lookup(name, store.collections())
}

/// Resolve a name to the collection id reads and writes run against
pub(crate) fn resolve_alias(
    aliases: &AliasResolver,
    store: &CollectionStore,
    name: &str,
) -> CollectionId {
    match lookup_alias(aliases, store, name) {
        AliasLookup::Resolved(id) => id,
        AliasLookup::NotAlias | AliasLookup::Unresolved => name.to_string(),
    }
}
