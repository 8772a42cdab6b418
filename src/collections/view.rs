//! Collection views
//!
//! A view shows one scope at a time. Refreshing is two-phase so a response
//! that arrives after the user moved on, or after a newer mutation, is
//! dropped instead of overwriting what is on screen.

use std::sync::Arc;
use tracing::debug;

use super::aggregate::AggregationResolver;
use super::bus::{RefreshEvent, RefreshKind};
use super::scope::{FetchTicket, FetchVerdict, ScopeTracker, ViewId};
use crate::error::EngineResult;
use crate::types::ContentItem;

/// What happened to a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Items replaced; carries the new item count
    Applied(usize),
    /// A suppress-next-refresh token consumed this refresh
    Suppressed,
    /// Result arrived too late and was thrown away
    Discarded(FetchVerdict),
}

/// A consumer view over one collection scope
pub struct CollectionView {
    id: ViewId,
    scopes: Arc<ScopeTracker>,
    resolver: Arc<AggregationResolver>,
    items: Vec<ContentItem>,
    /// Scope the current items were fetched for
    items_scope: Option<String>,
}

impl CollectionView {
    pub fn new(scope: &str, scopes: Arc<ScopeTracker>, resolver: Arc<AggregationResolver>) -> Self {
        let id = scopes.register_view(scope);
        Self {
            id,
            scopes,
            resolver,
            items: Vec::new(),
            items_scope: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn scope(&self) -> String {
        self.scopes.scope_of(self.id).unwrap_or_default()
    }

    /// Switch scope. In-flight fetches for the old scope become stale.
    pub fn set_scope(&mut self, scope: &str) {
        self.scopes.set_scope(self.id, scope);
    }

    /// Items for the current scope; empty until the scope has been fetched
    pub fn items(&self) -> &[ContentItem] {
        match &self.items_scope {
            Some(scope) if *scope == self.scope() => &self.items,
            _ => &[],
        }
    }

    /// Issue a fetch ticket for the current scope, or `None` if suppressed
    pub fn begin_refresh(&self) -> Option<FetchTicket> {
        let scope = self.scope();
        let collection_id = self.resolver.resolve(&scope);
        self.scopes.issue(self.id, &collection_id)
    }

    /// Apply a fetch result if its ticket is still current
    pub fn complete_refresh(&mut self, ticket: &FetchTicket, items: Vec<ContentItem>) -> RefreshOutcome {
        match self.scopes.verdict(ticket) {
            FetchVerdict::Current => {
                let count = items.len();
                self.items = items;
                self.items_scope = Some(ticket.scope.clone());
                RefreshOutcome::Applied(count)
            }
            verdict => {
                debug!(
                    "Discarding fetch for {} issued at {}: {:?}",
                    ticket.scope, ticket.issued_at, verdict
                );
                RefreshOutcome::Discarded(verdict)
            }
        }
    }

    /// Fetch and apply in one go
    pub async fn refresh(&mut self) -> EngineResult<RefreshOutcome> {
        let Some(ticket) = self.begin_refresh() else {
            return Ok(RefreshOutcome::Suppressed);
        };
        let items = self.resolver.list_items(&ticket.scope).await?;
        Ok(self.complete_refresh(&ticket, items))
    }

    /// Whether a refresh event concerns this view
    pub fn is_affected_by(&self, event: &RefreshEvent) -> bool {
        let scope = self.scope();
        if let RefreshKind::CollectionDeleted { redirected_to, .. } = &event.kind {
            if *redirected_to == scope {
                return true;
            }
        }
        event.touches(&self.resolver.resolve(&scope))
    }
}

impl Drop for CollectionView {
    fn drop(&mut self) {
        self.scopes.unregister_view(self.id);
    }
}
