//! Shared types used across modules
//!
//! Items, collections and membership rows. Everything here is plain data;
//! behaviour lives in `collections` and `catalog`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Storage identifier of a collection (or an unresolved alias name)
pub type CollectionId = String;

/// Scope value meaning "every course in the catalog"
pub const ALL_COURSES_SCOPE: &str = "academy";

/// Scope value used by the dashboard, which also shows the whole catalog
pub const DASHBOARD_SCOPE: &str = "dashboard";

/// Pseudo-collection holding every conversation; not backed by membership rows
pub const CONVERSATIONS_SCOPE: &str = "conversations";

/// Kind of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Course,
    Lesson,
    Module,
    Resource,
    Conversation,
    ToolConversation,
    Note,
    ContextProfile,
    ContextInsight,
    ContextCustom,
    ContextFile,
}

impl ItemKind {
    /// All kinds, in declaration order
    pub const ALL: [ItemKind; 11] = [
        ItemKind::Course,
        ItemKind::Lesson,
        ItemKind::Module,
        ItemKind::Resource,
        ItemKind::Conversation,
        ItemKind::ToolConversation,
        ItemKind::Note,
        ItemKind::ContextProfile,
        ItemKind::ContextInsight,
        ItemKind::ContextCustom,
        ItemKind::ContextFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Course => "COURSE",
            ItemKind::Lesson => "LESSON",
            ItemKind::Module => "MODULE",
            ItemKind::Resource => "RESOURCE",
            ItemKind::Conversation => "CONVERSATION",
            ItemKind::ToolConversation => "TOOL_CONVERSATION",
            ItemKind::Note => "NOTE",
            ItemKind::ContextProfile => "CONTEXT_PROFILE",
            ItemKind::ContextInsight => "CONTEXT_INSIGHT",
            ItemKind::ContextCustom => "CONTEXT_CUSTOM",
            ItemKind::ContextFile => "CONTEXT_FILE",
        }
    }

    /// Kinds that live in the personal-context collection
    pub fn is_context(&self) -> bool {
        matches!(
            self,
            ItemKind::ContextProfile
                | ItemKind::ContextInsight
                | ItemKind::ContextCustom
                | ItemKind::ContextFile
        )
    }

    /// Kinds that carry their own collection-id list
    pub fn is_conversation(&self) -> bool {
        matches!(self, ItemKind::Conversation | ItemKind::ToolConversation)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        ItemKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown item kind '{}'", s))
    }
}

/// Identity of an item. Ids are only unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemRef {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A unit of platform content as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub kind: ItemKind,
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Collection ids carried by self-tagging kinds (conversations)
    #[serde(default)]
    pub collection_ids: Vec<CollectionId>,
    /// Synthesized locally, not persisted until edited
    #[serde(default)]
    pub is_virtual: bool,
}

impl ContentItem {
    pub fn new(kind: ItemKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind,
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            collection_ids: Vec::new(),
            is_virtual: false,
        }
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn tagged(mut self, collection_ids: &[&str]) -> Self {
        self.collection_ids = collection_ids.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.kind, self.id.clone())
    }
}

/// Owner of a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Owner {
    User(String),
    Org(String),
}

/// A named grouping of content items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub label: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_system_defined: bool,
    pub owner: Owner,
}

/// Association of one item with one collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub item_id: String,
    pub item_kind: ItemKind,
    pub collection_id: CollectionId,
}

impl Membership {
    pub fn key(&self) -> MembershipKey {
        MembershipKey::new(
            ItemRef::new(self.item_kind, self.item_id.clone()),
            self.collection_id.clone(),
        )
    }
}

/// Ledger key for a single membership mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MembershipKey {
    pub item: ItemRef,
    pub collection_id: CollectionId,
}

impl MembershipKey {
    pub fn new(item: ItemRef, collection_id: impl Into<CollectionId>) -> Self {
        Self {
            item,
            collection_id: collection_id.into(),
        }
    }
}

impl std::fmt::Display for MembershipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.item, self.collection_id)
    }
}
