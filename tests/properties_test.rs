//! Membership, aggregation and filter properties

mod common;

use chrono::{Duration, TimeZone, Utc};
use collection_engine::catalog::{DateFilter, FilterEngine, FilterState, RatingFilter};
use collection_engine::repository::RepoOp;
use collection_engine::types::{ContentItem, ItemKind};
use collection_engine::{Course, InMemoryConversationLog, RepositoryError};
use common::{bootstrapped, engine, seeded_repo};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_double_add_keeps_one_row() {
    let repo = seeded_repo();
    let engine = bootstrapped(repo.clone(), None).await;

    assert_ok!(engine.add("c1", ItemKind::Course, "favorites").await);
    assert!(engine.is_saved(ItemKind::Course, "c1"));
    assert_ok!(engine.add("c1", ItemKind::Course, "favorites").await);
    assert!(engine.is_saved(ItemKind::Course, "c1"));

    let rows: Vec<_> = repo
        .membership_rows()
        .into_iter()
        .filter(|m| m.item_id == "c1" && m.collection_id == "sys-fav")
        .collect();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_add_then_remove_restores_membership_set() {
    let repo = seeded_repo();
    repo.insert_membership("c1", ItemKind::Course, "sys-work");
    let engine = bootstrapped(repo.clone(), None).await;
    let before = engine.collections_of(ItemKind::Course, "c1");

    assert_ok!(engine.add("c1", ItemKind::Course, "favorites").await);
    assert_ne!(engine.collections_of(ItemKind::Course, "c1"), before);
    assert_ok!(engine.remove("c1", ItemKind::Course, "favorites").await);

    assert_eq!(engine.collections_of(ItemKind::Course, "c1"), before);
    assert_eq!(repo.membership_rows().len(), 1);
}

#[tokio::test]
async fn test_failed_add_leaves_membership_untouched() {
    let repo = seeded_repo();
    repo.insert_membership("c1", ItemKind::Course, "custom-1");
    let engine = bootstrapped(repo.clone(), None).await;
    let before = engine.collections_of(ItemKind::Course, "c1");
    let counts_before = engine.local_counts();

    repo.fail_next(RepoOp::AddMembership, RepositoryError::Transport("503".into()));
    let err = assert_err!(engine.add("c1", ItemKind::Course, "favorites").await);

    assert!(err.is_retryable());
    assert_eq!(engine.collections_of(ItemKind::Course, "c1"), before);
    assert_eq!(engine.local_counts(), counts_before);
}

#[tokio::test]
async fn test_local_removal_is_scoped_by_kind() {
    let repo = seeded_repo();
    let engine = bootstrapped(repo, None).await;

    assert_ok!(engine.add("42", ItemKind::Course, "favorites").await);
    assert_ok!(engine.add("42", ItemKind::Note, "favorites").await);
    assert_ok!(engine.remove("42", ItemKind::Note, "favorites").await);

    assert!(engine.is_saved(ItemKind::Course, "42"));
    assert!(!engine.is_saved(ItemKind::Note, "42"));
}

#[tokio::test]
async fn test_saved_index_matches_membership_projection() {
    let repo = seeded_repo();
    let engine = bootstrapped(repo, None).await;
    assert_ok!(engine.add("a", ItemKind::Course, "favorites").await);
    assert_ok!(engine.add("a", ItemKind::Course, "research").await);
    assert_ok!(engine.add("b", ItemKind::Lesson, "to_learn").await);
    assert_ok!(engine.remove("a", ItemKind::Course, "favorites").await);

    let index = engine.saved_index();
    assert_eq!(index.len(), 2);
    for item in &index {
        assert!(!engine.collections_of(item.kind, &item.id).is_empty());
    }
}

#[tokio::test]
async fn test_remote_and_local_counts_agree() {
    let repo = seeded_repo();
    let engine = bootstrapped(repo, None).await;
    assert_ok!(engine.add("a", ItemKind::Course, "favorites").await);
    assert_ok!(engine.add("b", ItemKind::Course, "favorites").await);
    assert_ok!(engine.add("a", ItemKind::Course, "custom-1").await);

    let remote = assert_ok!(engine.fetch_counts().await);
    let local = engine.local_counts();
    assert_eq!(remote.get("sys-fav"), Some(&2));
    assert_eq!(remote.get("custom-1"), Some(&1));
    assert_eq!(remote, local);
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_authoritative_and_tagged_sources_are_deduplicated() {
    let repo = seeded_repo();
    repo.insert_item(ContentItem::new(ItemKind::Course, "A", "Course A"));
    repo.insert_item(ContentItem::new(ItemKind::Conversation, "B", "Chat B"));
    repo.insert_membership("A", ItemKind::Course, "sys-fav");
    repo.insert_membership("B", ItemKind::Conversation, "sys-fav");

    let log = Arc::new(InMemoryConversationLog::new(vec![
        ContentItem::new(ItemKind::Conversation, "B", "Chat B (tagged)").tagged(&["sys-fav"]),
        ContentItem::new(ItemKind::Conversation, "C", "Chat C").tagged(&["sys-fav"]),
        ContentItem::new(ItemKind::Conversation, "D", "Chat D").tagged(&["sys-work"]),
    ]));
    let engine = bootstrapped(repo, Some(log)).await;

    let items = assert_ok!(engine.list_items("favorites").await);
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(items[1].title, "Chat B");
}

#[tokio::test]
async fn test_conversations_scope_lists_every_conversation() {
    let repo = seeded_repo();
    let log = Arc::new(InMemoryConversationLog::new(vec![
        ContentItem::new(ItemKind::Conversation, "a", "A").tagged(&["sys-fav"]),
        ContentItem::new(ItemKind::ToolConversation, "b", "B"),
    ]));
    let engine = bootstrapped(repo.clone(), Some(log)).await;
    let fetches_before = repo.calls(RepoOp::FetchItems);

    let items = assert_ok!(engine.list_items("conversations").await);
    assert_eq!(items.len(), 2);
    assert_eq!(repo.calls(RepoOp::FetchItems), fetches_before);
}

#[tokio::test]
async fn test_unprovisioned_favorites_is_empty() {
    let repo = seeded_repo();
    repo.drop_table("sys-fav");
    let engine = bootstrapped(repo, None).await;

    let items = assert_ok!(engine.list_items("favorites").await);
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_missing_table_still_returns_tagged_items() {
    let repo = seeded_repo();
    repo.drop_table("sys-work");
    let log = Arc::new(InMemoryConversationLog::new(vec![
        ContentItem::new(ItemKind::Conversation, "c", "Chat").tagged(&["sys-work"]),
    ]));
    let engine = bootstrapped(repo, Some(log)).await;

    let items = assert_ok!(engine.list_items("research").await);
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_duplicate_profiles_collapse_to_earliest() {
    let t1 = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
    let t2 = t1 + Duration::days(90);
    let repo = seeded_repo();
    repo.insert_item(ContentItem::new(ItemKind::ContextProfile, "p-late", "Profile").created(t2));
    repo.insert_item(ContentItem::new(ItemKind::ContextProfile, "p-early", "Profile").created(t1));
    repo.insert_item(ContentItem::new(ItemKind::ContextInsight, "i1", "Prefers video"));
    for (id, kind) in [
        ("p-late", ItemKind::ContextProfile),
        ("p-early", ItemKind::ContextProfile),
        ("i1", ItemKind::ContextInsight),
    ] {
        repo.insert_membership(id, kind, "sys-ctx");
    }
    let engine = bootstrapped(repo, None).await;

    let items = assert_ok!(engine.list_items("personal-context").await);
    let profiles: Vec<_> = items
        .iter()
        .filter(|i| i.kind == ItemKind::ContextProfile)
        .collect();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].id, "p-early");
    assert_eq!(profiles[0].created_at, t1);
}

#[tokio::test]
async fn test_missing_profile_gets_placeholder() {
    let engine = bootstrapped(seeded_repo(), None).await;
    let items = assert_ok!(engine.list_items("personal-context").await);
    assert_eq!(items.len(), 1);
    assert!(items[0].is_virtual);
    assert_eq!(items[0].kind, ItemKind::ContextProfile);
}

#[tokio::test]
async fn test_unbootstrapped_alias_falls_back_to_name() {
    let engine = engine(seeded_repo(), None);
    let resolved = engine.resolve("personal-context");
    assert_eq!(resolved, "personal-context");

    let items = assert_ok!(engine.list_items(&resolved).await);
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_renamed_system_collection_keeps_alias() {
    let repo = seeded_repo();
    repo.insert_item(ContentItem::new(ItemKind::Course, "c1", "Course"));
    repo.insert_membership("c1", ItemKind::Course, "sys-fav");
    let engine = bootstrapped(repo, None).await;

    assert_ok!(engine.rename_collection("favorites", "Starred").await);
    assert_eq!(engine.resolve("favorites"), "sys-fav");
    let items = assert_ok!(engine.list_items("favorites").await);
    assert_eq!(items.len(), 1);
}

// ============================================================================
// Filters
// ============================================================================

fn catalog() -> Vec<Course> {
    vec![
        Course::new("c3", "Three").rated(3.0),
        Course::new("c4", "Four").rated(4.0),
        Course::new("c5", "Five").rated(5.0),
    ]
}

#[test]
fn test_initial_filters_are_identity() {
    let courses = catalog();
    let out = FilterEngine::default().apply(&FilterState::initial(), &courses, "academy");
    assert_eq!(out, courses);
}

#[test]
fn test_four_plus_rating() {
    let mut filters = FilterState::initial();
    filters.rating_filter = RatingFilter::AtLeast(4);
    let out = FilterEngine::default().apply(&filters, &catalog(), "academy");
    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c4", "c5"]);
}

#[test]
fn test_last_seven_days() {
    let now = Utc::now();
    let courses = vec![
        Course::new("today", "Today").dated(now),
        Course::new("five", "Five days").dated(now - Duration::days(5)),
        Course::new("ten", "Ten days").dated(now - Duration::days(10)),
    ];
    let mut filters = FilterState::initial();
    filters.date_filter_type = DateFilter::LastXDays;
    filters.custom_days = "7".into();

    let out = FilterEngine::default().apply_at(&filters, &courses, "academy", now);
    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["today", "five"]);
}

#[tokio::test]
async fn test_filter_scope_accepts_alias() {
    let engine = bootstrapped(seeded_repo(), None).await;
    let courses = vec![
        Course::new("a", "In favorites").in_collections(&["sys-fav"]),
        Course::new("b", "Elsewhere").in_collections(&["custom-1"]),
    ];
    let out = engine.apply_filters(&FilterState::initial(), &courses, "favorites");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "a");
}
