//! Refresh bus
//!
//! Publish/subscribe channel for the `collection:refresh` signal. Any number
//! of subscribers (count badges, open views) may listen; publishing never
//! waits for them and never fails when nobody is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{CollectionId, ItemRef};

/// Topic name of the refresh signal
pub const REFRESH_TOPIC: &str = "collection:refresh";

const DEFAULT_CAPACITY: usize = 256;

/// Direction of a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    Added,
    Removed,
}

/// What changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshKind {
    MembershipChanged {
        collection_id: CollectionId,
        item: ItemRef,
        change: MembershipChange,
    },
    CollectionCreated {
        collection_id: CollectionId,
    },
    CollectionRenamed {
        collection_id: CollectionId,
        label: String,
    },
    CollectionDeleted {
        collection_id: CollectionId,
        redirected_to: String,
    },
    NoteDeleted {
        note_id: String,
        collection_ids: Vec<CollectionId>,
    },
}

/// A refresh signal, emitted after a successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEvent {
    pub kind: RefreshKind,
    pub at: DateTime<Utc>,
}

impl RefreshEvent {
    pub fn new(kind: RefreshKind) -> Self {
        Self { kind, at: Utc::now() }
    }

    pub fn topic(&self) -> &'static str {
        REFRESH_TOPIC
    }

    /// Whether a view scoped to `collection_id` should refetch
    pub fn touches(&self, collection_id: &str) -> bool {
        match &self.kind {
            RefreshKind::MembershipChanged { collection_id: c, .. }
            | RefreshKind::CollectionCreated { collection_id: c }
            | RefreshKind::CollectionRenamed { collection_id: c, .. }
            | RefreshKind::CollectionDeleted { collection_id: c, .. } => c == collection_id,
            RefreshKind::NoteDeleted { collection_ids, .. } => {
                collection_ids.iter().any(|c| c == collection_id)
            }
        }
    }
}

/// Receiving end of a subscription
pub struct RefreshSubscription {
    pub id: u64,
    rx: broadcast::Receiver<RefreshEvent>,
}

impl RefreshSubscription {
    /// Wait for the next event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<RefreshEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, skipped {} refresh events", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event without waiting
    pub fn try_recv(&mut self) -> Option<RefreshEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, skipped {} refresh events", self.id, skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every event currently queued
    pub fn drain(&mut self) -> Vec<RefreshEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Broadcast channel owned by the engine
#[derive(Clone)]
pub struct RefreshBus {
    tx: broadcast::Sender<RefreshEvent>,
    next_id: Arc<AtomicU64>,
}

impl RefreshBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> RefreshSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("New {} subscriber {}", REFRESH_TOPIC, id);
        RefreshSubscription {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Fire-and-forget publish; returns how many subscribers will see it
    pub fn publish(&self, kind: RefreshKind) -> usize {
        let event = RefreshEvent::new(kind);
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}
