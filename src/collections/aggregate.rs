//! Aggregation resolver
//!
//! Builds the item list of one collection from structurally different
//! sources: the authoritative membership join plus "self-tagging" sources
//! whose items carry their own collection ids. The authoritative copy of an
//! item always wins over a tagged duplicate.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::alias::{AliasLookup, AliasResolver};
use super::{lookup_alias, read_store, resolve_alias, SharedStore};
use crate::error::EngineResult;
use crate::repository::{RemoteRepository, RepositoryError};
use crate::types::{CollectionId, ContentItem, ItemKind, ItemRef, CONVERSATIONS_SCOPE};

/// Alias of the collection holding context entries and the profile
pub const PERSONAL_CONTEXT_ALIAS: &str = "personal-context";

/// Id given to the synthesized profile placeholder
pub const PLACEHOLDER_PROFILE_ID: &str = "profile-placeholder";

/// A source whose items carry their own list of collection ids
#[async_trait]
pub trait TaggedSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Items tagged with `collection_id`
    async fn tagged_items(&self, collection_id: &str) -> EngineResult<Vec<ContentItem>>;

    /// Every item of the source, regardless of tags
    async fn all_items(&self) -> EngineResult<Vec<ContentItem>>;
}

/// Merge authoritative items with tagged ones, dropping tagged duplicates
/// and repeated entries within a source. Order: authoritative first, then
/// each tagged source in turn.
pub fn merge_sources(
    authoritative: Vec<ContentItem>,
    tagged: Vec<Vec<ContentItem>>,
) -> Vec<ContentItem> {
    let mut seen: HashSet<ItemRef> = HashSet::new();
    let mut merged = Vec::with_capacity(authoritative.len());

    for item in authoritative {
        if seen.insert(item.item_ref()) {
            merged.push(item);
        }
    }
    for source in tagged {
        for item in source {
            if seen.insert(item.item_ref()) {
                merged.push(item);
            } else {
                debug!("Dropping tagged duplicate {}", item.item_ref());
            }
        }
    }
    merged
}

/// Enforce the one-profile-per-user rule: keep the earliest-created profile
/// (ties broken by id), drop the rest. With `synthesize`, a virtual
/// placeholder is prepended when no profile exists.
pub fn collapse_profiles(items: Vec<ContentItem>, synthesize: bool) -> Vec<ContentItem> {
    let keeper = items
        .iter()
        .filter(|i| i.kind == ItemKind::ContextProfile)
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .map(|p| p.id.clone());

    match keeper {
        Some(id) => {
            let before = items.len();
            let kept: Vec<ContentItem> = items
                .into_iter()
                .filter(|i| i.kind != ItemKind::ContextProfile || i.id == id)
                .collect();
            if kept.len() < before {
                warn!("Discarded {} duplicate profile(s), kept {}", before - kept.len(), id);
            }
            kept
        }
        None if synthesize => {
            let mut placeholder =
                ContentItem::new(ItemKind::ContextProfile, PLACEHOLDER_PROFILE_ID, "Profile");
            placeholder.is_virtual = true;
            let mut with_placeholder = Vec::with_capacity(items.len() + 1);
            with_placeholder.push(placeholder);
            with_placeholder.extend(items);
            with_placeholder
        }
        None => items,
    }
}

/// Read-only resolver over the repository and tagged sources
pub struct AggregationResolver {
    repo: Arc<dyn RemoteRepository>,
    sources: Vec<Arc<dyn TaggedSource>>,
    aliases: Arc<AliasResolver>,
    store: SharedStore,
}

impl AggregationResolver {
    pub fn new(
        repo: Arc<dyn RemoteRepository>,
        sources: Vec<Arc<dyn TaggedSource>>,
        aliases: Arc<AliasResolver>,
        store: SharedStore,
    ) -> Self {
        Self {
            repo,
            sources,
            aliases,
            store,
        }
    }

    /// Resolve an alias or id to the collection id fetches run against
    pub fn resolve(&self, name: &str) -> CollectionId {
        let store = read_store(&self.store);
        resolve_alias(&self.aliases, &store, name)
    }

    /// De-duplicated items of a collection (alias or id)
    pub async fn list_items(&self, name: &str) -> EngineResult<Vec<ContentItem>> {
        if name == CONVERSATIONS_SCOPE {
            return self.all_tagged().await;
        }

        let (lookup, collection_id, is_personal_context) = {
            let store = read_store(&self.store);
            let lookup = lookup_alias(&self.aliases, &store, name);
            let collection_id = resolve_alias(&self.aliases, &store, name);
            let personal = match lookup_alias(&self.aliases, &store, PERSONAL_CONTEXT_ALIAS) {
                AliasLookup::Resolved(id) => id == collection_id,
                _ => false,
            };
            (lookup, collection_id, personal)
        };

        if lookup == AliasLookup::Unresolved {
            debug!("Alias '{}' not bootstrapped, listing nothing", name);
            return Ok(Vec::new());
        }

        let authoritative = self.authoritative(&collection_id).await?;
        let tagged = self.tagged(&collection_id).await;
        let merged = merge_sources(authoritative, tagged);

        if is_personal_context {
            Ok(collapse_profiles(merged, true))
        } else {
            Ok(merged)
        }
    }

    async fn authoritative(&self, collection_id: &str) -> EngineResult<Vec<ContentItem>> {
        match self.repo.fetch_collection_items(collection_id).await {
            Ok(result) => {
                if let Some(details) = &result.debug {
                    debug!("fetch_collection_items({}) debug: {}", collection_id, details);
                }
                Ok(result.items)
            }
            Err(RepositoryError::TableMissing(table)) => {
                warn!("Membership table {} missing, treating {} as empty", table, collection_id);
                Ok(Vec::new())
            }
            Err(RepositoryError::NotFound(what)) => {
                debug!("{} not found, treating {} as empty", what, collection_id);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn tagged(&self, collection_id: &str) -> Vec<Vec<ContentItem>> {
        let results = join_all(self.sources.iter().map(|s| s.tagged_items(collection_id))).await;
        results
            .into_iter()
            .zip(&self.sources)
            .filter_map(|(result, source)| match result {
                Ok(items) => Some(items),
                Err(e) => {
                    warn!("Tagged source {} failed for {}: {}", source.name(), collection_id, e);
                    None
                }
            })
            .collect()
    }

    async fn all_tagged(&self) -> EngineResult<Vec<ContentItem>> {
        let results = join_all(self.sources.iter().map(|s| s.all_items())).await;
        let mut sources = Vec::with_capacity(results.len());
        for result in results {
            sources.push(result?);
        }
        Ok(merge_sources(Vec::new(), sources))
    }
}
