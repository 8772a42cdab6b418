//! Scope versioning
//!
//! Each collection has a monotonic version counter bumped by every mutation
//! that touches it. A fetch captures the counter (and the scope of the view
//! that issued it) when it starts; on completion it is only trusted if
//! neither has moved since.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::types::CollectionId;

/// Identity of a registered view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

/// Captured state of an in-flight fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub view: ViewId,
    /// Scope the view asked for (may be an alias)
    pub scope: String,
    /// Resolved collection the fetch runs against
    pub collection_id: CollectionId,
    pub version: u64,
    pub issued_at: DateTime<Utc>,
}

/// Whether a completed fetch may be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchVerdict {
    Current,
    /// The view moved to another scope (or was closed) while the fetch ran
    ScopeChanged,
    /// A mutation for the collection happened after the fetch was issued
    Outdated,
}

/// Marks the next refresh of a collection as a no-op
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressToken {
    collection_id: CollectionId,
}

impl SuppressToken {
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    versions: HashMap<CollectionId, u64>,
    views: HashMap<ViewId, String>,
    suppressed: HashSet<CollectionId>,
    next_view: u64,
}

/// Shared registry of view scopes and collection versions
#[derive(Debug, Default)]
pub struct ScopeTracker {
    inner: Mutex<ScopeState>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_view(&self, scope: &str) -> ViewId {
        let mut state = self.lock();
        state.next_view += 1;
        let id = ViewId(state.next_view);
        state.views.insert(id, scope.to_string());
        id
    }

    pub fn unregister_view(&self, view: ViewId) {
        self.lock().views.remove(&view);
    }

    pub fn scope_of(&self, view: ViewId) -> Option<String> {
        self.lock().views.get(&view).cloned()
    }

    pub fn set_scope(&self, view: ViewId, scope: &str) {
        if let Some(current) = self.lock().views.get_mut(&view) {
            *current = scope.to_string();
        }
    }

    /// Move every view scoped to `from` over to `to`
    pub fn redirect(&self, from: &str, to: &str) -> Vec<ViewId> {
        let mut state = self.lock();
        let mut moved: Vec<ViewId> = state
            .views
            .iter_mut()
            .filter(|(_, scope)| scope.as_str() == from)
            .map(|(id, scope)| {
                *scope = to.to_string();
                *id
            })
            .collect();
        moved.sort();
        if !moved.is_empty() {
            debug!("Redirected {} view(s) from {} to {}", moved.len(), from, to);
        }
        moved
    }

    pub fn version(&self, collection_id: &str) -> u64 {
        self.lock().versions.get(collection_id).copied().unwrap_or(0)
    }

    /// Record a mutation against a collection
    pub fn bump(&self, collection_id: &str) -> u64 {
        let mut state = self.lock();
        let version = state.versions.entry(collection_id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    pub fn suppress_next_refresh(&self, collection_id: &str) -> SuppressToken {
        self.lock().suppressed.insert(collection_id.to_string());
        SuppressToken {
            collection_id: collection_id.to_string(),
        }
    }

    /// Withdraw a suppression that has not been consumed yet
    pub fn lift(&self, token: &SuppressToken) -> bool {
        self.lock().suppressed.remove(&token.collection_id)
    }

    /// Start a fetch for `view`. Returns `None` when the refresh is suppressed,
    /// consuming the suppression.
    pub fn issue(&self, view: ViewId, collection_id: &str) -> Option<FetchTicket> {
        let mut state = self.lock();
        if state.suppressed.remove(collection_id) {
            debug!("Refresh of {} suppressed", collection_id);
            return None;
        }
        let scope = state.views.get(&view).cloned()?;
        let version = state.versions.get(collection_id).copied().unwrap_or(0);
        Some(FetchTicket {
            view,
            scope,
            collection_id: collection_id.to_string(),
            version,
            issued_at: Utc::now(),
        })
    }

    pub fn verdict(&self, ticket: &FetchTicket) -> FetchVerdict {
        let state = self.lock();
        match state.views.get(&ticket.view) {
            Some(scope) if *scope == ticket.scope => {}
            _ => return FetchVerdict::ScopeChanged,
        }
        let current = state.versions.get(&ticket.collection_id).copied().unwrap_or(0);
        if current != ticket.version {
            FetchVerdict::Outdated
        } else {
            FetchVerdict::Current
        }
    }
}
