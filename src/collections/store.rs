//! Collection store
//!
//! Authoritative-plus-optimistic membership table. Reads always see the most
//! recent local intent; a ledger per (item, collection) key remembers what
//! the remote store last confirmed so a failed call can be undone exactly.
//! Ledger entries live only while a mutation is pending; the outcome of the
//! most recent settled keys is kept in a short history.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::types::{Collection, CollectionId, ItemRef, Membership, MembershipKey};

/// Membership mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOp {
    Add,
    Remove,
}

impl MembershipOp {
    fn desired(self) -> bool {
        matches!(self, MembershipOp::Add)
    }
}

/// Ledger status for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

/// Handle for one optimistic mutation, redeemed by `commit` or `rollback`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTicket {
    pub key: MembershipKey,
    pub op: MembershipOp,
    seq: u64,
}

/// What `commit`/`rollback` did with a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Ticket was the latest intent for its key and has been resolved
    Applied,
    /// A newer intent for the same key owns the local state
    Superseded,
    /// No ledger entry for the key
    Unknown,
}

/// Number of settled keys whose final status is remembered
pub const SETTLED_HISTORY: usize = 256;

/// Pending mutation state for one key
#[derive(Debug, Clone)]
struct LedgerEntry {
    op: MembershipOp,
    /// Membership as last confirmed remotely
    baseline: bool,
    latest_seq: u64,
}

/// In-memory membership table plus collection directory
#[derive(Debug, Default)]
pub struct CollectionStore {
    collections: BTreeMap<CollectionId, Collection>,
    memberships: HashMap<ItemRef, BTreeSet<CollectionId>>,
    ledger: HashMap<MembershipKey, LedgerEntry>,
    settled: VecDeque<(MembershipKey, MutationStatus)>,
    /// Alias -> collection pinned at bootstrap, survives renames
    alias_bindings: HashMap<String, CollectionId>,
    next_seq: u64,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- collections -----

    /// Replace the collection directory
    pub fn load_collections(&mut self, collections: Vec<Collection>) {
        self.collections = collections.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    pub fn upsert_collection(&mut self, collection: Collection) {
        self.collections.insert(collection.id.clone(), collection);
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.get(id)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> + Clone {
        self.collections.values()
    }

    /// Set a collection's label, returning the previous one
    pub fn set_label(&mut self, id: &str, label: &str) -> Option<String> {
        self.collections
            .get_mut(id)
            .map(|c| std::mem::replace(&mut c.label, label.to_string()))
    }

    /// Drop a collection and every membership row referencing it
    pub fn remove_collection(&mut self, id: &str) -> Option<Collection> {
        let removed = self.collections.remove(id)?;
        self.memberships.retain(|_, set| {
            set.remove(id);
            !set.is_empty()
        });
        self.ledger.retain(|key, _| key.collection_id != id);
        self.settled.retain(|(key, _)| key.collection_id != id);
        self.alias_bindings.retain(|_, bound| bound != id);
        Some(removed)
    }

    /// Pin an alias to a collection id
    pub fn bind_alias(&mut self, alias: &str, collection_id: &str) {
        self.alias_bindings
            .insert(alias.to_string(), collection_id.to_string());
    }

    /// Collection an alias is pinned to, if it still exists
    pub fn alias_binding(&self, alias: &str) -> Option<&CollectionId> {
        self.alias_bindings
            .get(alias)
            .filter(|id| self.collections.contains_key(id.as_str()))
    }

    /// Alias pinned to a collection, if any
    pub fn alias_of(&self, collection_id: &str) -> Option<&str> {
        self.alias_bindings
            .iter()
            .find(|(_, id)| id.as_str() == collection_id)
            .map(|(alias, _)| alias.as_str())
    }

    // ----- membership reads -----

    /// Replace committed membership state, keeping pending local intents on top
    pub fn load_memberships(&mut self, rows: Vec<Membership>) {
        self.memberships.clear();
        for row in rows {
            let key = row.key();
            self.set_member(&key, true);
        }
        let pending: Vec<(MembershipKey, bool)> = self
            .ledger
            .iter()
            .map(|(key, entry)| (key.clone(), entry.op.desired()))
            .collect();
        for (key, desired) in pending {
            self.set_member(&key, desired);
        }
    }

    /// True iff the item belongs to at least one collection
    pub fn is_saved(&self, item: &ItemRef) -> bool {
        self.memberships.get(item).map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn is_member(&self, key: &MembershipKey) -> bool {
        self.memberships
            .get(&key.item)
            .map(|s| s.contains(&key.collection_id))
            .unwrap_or(false)
    }

    /// Collections the item currently belongs to
    pub fn collections_of(&self, item: &ItemRef) -> Vec<CollectionId> {
        self.memberships
            .get(item)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Items currently in a collection
    pub fn items_in(&self, collection_id: &str) -> Vec<ItemRef> {
        let mut items: Vec<ItemRef> = self
            .memberships
            .iter()
            .filter(|(_, set)| set.contains(collection_id))
            .map(|(item, _)| item.clone())
            .collect();
        items.sort();
        items
    }

    /// Derived set of items that belong to any collection
    pub fn saved_index(&self) -> HashSet<ItemRef> {
        self.memberships
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(item, _)| item.clone())
            .collect()
    }

    /// Membership count per known collection, from local state
    pub fn local_counts(&self) -> HashMap<CollectionId, usize> {
        let mut counts: HashMap<CollectionId, usize> =
            self.collections.keys().map(|id| (id.clone(), 0)).collect();
        for set in self.memberships.values() {
            for id in set {
                *counts.entry(id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    // ----- optimistic mutations -----

    fn set_member(&mut self, key: &MembershipKey, member: bool) {
        if member {
            self.memberships
                .entry(key.item.clone())
                .or_default()
                .insert(key.collection_id.clone());
        } else if let Some(set) = self.memberships.get_mut(&key.item) {
            set.remove(&key.collection_id);
            if set.is_empty() {
                self.memberships.remove(&key.item);
            }
        }
    }

    /// Apply a mutation locally and mark the key pending. Visible to the
    /// very next read.
    pub fn apply_optimistic(&mut self, op: MembershipOp, key: MembershipKey) -> MutationTicket {
        self.next_seq += 1;
        let seq = self.next_seq;
        let current = self.is_member(&key);

        let entry = self.ledger.entry(key.clone()).or_insert(LedgerEntry {
            op,
            baseline: current,
            latest_seq: 0,
        });
        entry.op = op;
        entry.latest_seq = seq;

        self.set_member(&key, op.desired());
        debug!("Optimistic {:?} on {} (seq {})", op, key, seq);

        MutationTicket { key, op, seq }
    }

    /// Record that the remote store accepted the ticket's mutation
    pub fn commit(&mut self, ticket: &MutationTicket) -> Resolution {
        let Some(entry) = self.ledger.get_mut(&ticket.key) else {
            return Resolution::Unknown;
        };
        entry.baseline = ticket.op.desired();
        if entry.latest_seq != ticket.seq {
            debug!("Commit of {} seq {} superseded by seq {}", ticket.key, ticket.seq, entry.latest_seq);
            return Resolution::Superseded;
        }
        self.settle(&ticket.key, MutationStatus::Committed);
        Resolution::Applied
    }

    /// Undo the ticket's mutation, restoring the last confirmed membership
    pub fn rollback(&mut self, ticket: &MutationTicket) -> Resolution {
        let Some(entry) = self.ledger.get(&ticket.key) else {
            return Resolution::Unknown;
        };
        if entry.latest_seq != ticket.seq {
            debug!("Rollback of {} seq {} left to newer intent", ticket.key, ticket.seq);
            return Resolution::Superseded;
        }
        let baseline = entry.baseline;
        self.set_member(&ticket.key, baseline);
        self.settle(&ticket.key, MutationStatus::RolledBack);
        Resolution::Applied
    }

    /// Drop the key's ledger entry and remember how it ended
    fn settle(&mut self, key: &MembershipKey, status: MutationStatus) {
        self.ledger.remove(key);
        self.settled.retain(|(k, _)| k != key);
        self.settled.push_back((key.clone(), status));
        if self.settled.len() > SETTLED_HISTORY {
            self.settled.pop_front();
        }
    }

    /// Pending for keys in flight, otherwise the outcome of a recently
    /// settled key
    pub fn status(&self, key: &MembershipKey) -> Option<MutationStatus> {
        if self.ledger.contains_key(key) {
            return Some(MutationStatus::Pending);
        }
        self.settled
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, status)| *status)
    }

    pub fn has_pending(&self, key: &MembershipKey) -> bool {
        self.ledger.contains_key(key)
    }

    /// Number of keys with a mutation in flight
    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind;

    fn key(item: &str, collection: &str) -> MembershipKey {
        MembershipKey::new(ItemRef::new(ItemKind::Course, item), collection)
    }

    #[test]
    fn test_optimistic_add_is_visible_immediately() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        assert!(!store.is_saved(&k.item));
        let _ticket = store.apply_optimistic(MembershipOp::Add, k.clone());
        assert!(store.is_saved(&k.item));
        assert!(store.has_pending(&k));
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        store.load_memberships(vec![Membership {
            item_id: "c1".into(),
            item_kind: ItemKind::Course,
            collection_id: "other".into(),
        }]);
        let before = store.collections_of(&k.item);

        let ticket = store.apply_optimistic(MembershipOp::Add, k.clone());
        assert_eq!(store.rollback(&ticket), Resolution::Applied);
        assert_eq!(store.collections_of(&k.item), before);
        assert_eq!(store.status(&k), Some(MutationStatus::RolledBack));
    }

    #[test]
    fn test_last_writer_wins_before_commit() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        let add = store.apply_optimistic(MembershipOp::Add, k.clone());
        let remove = store.apply_optimistic(MembershipOp::Remove, k.clone());
        assert!(!store.is_member(&k));

        assert_eq!(store.commit(&add), Resolution::Superseded);
        assert!(!store.is_member(&k));
        assert!(store.has_pending(&k));

        assert_eq!(store.commit(&remove), Resolution::Applied);
        assert!(!store.is_member(&k));
        assert_eq!(store.status(&k), Some(MutationStatus::Committed));
    }

    #[test]
    fn test_rollback_of_latest_after_superseded_commit() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        let add = store.apply_optimistic(MembershipOp::Add, k.clone());
        let remove = store.apply_optimistic(MembershipOp::Remove, k.clone());

        // add reached the remote store, remove did not
        store.commit(&add);
        assert_eq!(store.rollback(&remove), Resolution::Applied);
        assert!(store.is_member(&k));
    }

    #[test]
    fn test_rollback_of_superseded_ticket_keeps_newer_intent() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        let add = store.apply_optimistic(MembershipOp::Add, k.clone());
        let _remove = store.apply_optimistic(MembershipOp::Remove, k.clone());
        let add_again = store.apply_optimistic(MembershipOp::Add, k.clone());

        assert_eq!(store.rollback(&add), Resolution::Superseded);
        assert!(store.is_member(&k));
        assert_eq!(store.commit(&add_again), Resolution::Applied);
    }

    #[test]
    fn test_saved_index_tracks_membership_projection() {
        let mut store = CollectionStore::new();
        let a = key("a", "x");
        let b = key("b", "x");
        store.apply_optimistic(MembershipOp::Add, a.clone());
        store.apply_optimistic(MembershipOp::Add, b.clone());
        store.apply_optimistic(MembershipOp::Remove, b.clone());

        let index = store.saved_index();
        assert_eq!(index.len(), 1);
        assert!(index.contains(&a.item));
    }

    #[test]
    fn test_remove_collection_cascades() {
        let mut store = CollectionStore::new();
        store.upsert_collection(Collection {
            id: "x".into(),
            label: "Reading".into(),
            color: None,
            is_system_defined: false,
            owner: crate::types::Owner::User("u".into()),
        });
        store.apply_optimistic(MembershipOp::Add, key("a", "x"));
        store.apply_optimistic(MembershipOp::Add, key("a", "y"));
        assert!(store.remove_collection("x").is_some());
        assert_eq!(store.collections_of(&ItemRef::new(ItemKind::Course, "a")), vec!["y"]);
        assert!(store.status(&key("a", "x")).is_none());
    }

    #[test]
    fn test_alias_binding_dropped_with_collection() {
        let mut store = CollectionStore::new();
        store.upsert_collection(Collection {
            id: "f1".into(),
            label: "Favorites".into(),
            color: None,
            is_system_defined: true,
            owner: crate::types::Owner::User("u".into()),
        });
        store.bind_alias("favorites", "f1");
        store.set_label("f1", "Starred");
        assert_eq!(store.alias_binding("favorites").map(String::as_str), Some("f1"));
        assert_eq!(store.alias_of("f1"), Some("favorites"));
        store.remove_collection("f1");
        assert!(store.alias_binding("favorites").is_none());
    }

    #[test]
    fn test_settled_keys_leave_the_ledger() {
        let mut store = CollectionStore::new();
        for i in 0..100 {
            let k = key(&format!("c{}", i), "fav");
            let add = store.apply_optimistic(MembershipOp::Add, k.clone());
            assert_eq!(store.commit(&add), Resolution::Applied);
            let remove = store.apply_optimistic(MembershipOp::Remove, k);
            assert_eq!(store.rollback(&remove), Resolution::Applied);
        }
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.status(&key("c99", "fav")), Some(MutationStatus::RolledBack));
    }

    #[test]
    fn test_settled_history_is_bounded() {
        let mut store = CollectionStore::new();
        for i in 0..SETTLED_HISTORY + 10 {
            let ticket = store.apply_optimistic(MembershipOp::Add, key(&format!("c{}", i), "fav"));
            store.commit(&ticket);
        }
        assert!(store.status(&key("c0", "fav")).is_none());
        let last = key(&format!("c{}", SETTLED_HISTORY + 9), "fav");
        assert_eq!(store.status(&last), Some(MutationStatus::Committed));
        assert!(store.is_member(&key("c0", "fav")));
    }

    #[test]
    fn test_superseded_commit_keeps_entry_pending() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        let add = store.apply_optimistic(MembershipOp::Add, k.clone());
        let _remove = store.apply_optimistic(MembershipOp::Remove, k.clone());
        store.commit(&add);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.status(&k), Some(MutationStatus::Pending));
    }

    #[test]
    fn test_load_memberships_keeps_pending_intent() {
        let mut store = CollectionStore::new();
        let k = key("c1", "fav");
        let _t = store.apply_optimistic(MembershipOp::Add, k.clone());
        store.load_memberships(Vec::new());
        assert!(store.is_member(&k));
    }
}
