//! # Entity Store Trait
//!
//! This is the contract between the query layer and whatever collector
//! populates the inventory. The query layer only reads: get, list, and
//! subscribe for change events.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory for testing/embedding |

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::*;
use crate::predicate::Predicate;
use crate::Result;

pub use memory::MemoryStore;

// ============================================================================
// Change events
// ============================================================================

/// Mutation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One mutation as seen by a subscriber.
///
/// For `Deleted`, `entity` is the last state before removal.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub entity: Entity,
    /// Store-wide sequence marker; equals `entity.revision`.
    pub sequence: u64,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Opaque subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a store stopped feeding a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The subscriber's buffer was full when an event had to be delivered.
    Lagged,
    /// The store shut down.
    StoreClosed,
}

/// Shared slot a store fills in before dropping a subscriber's sender.
pub type DropSlot = Arc<Mutex<Option<DropReason>>>;

/// Options for `EntityStore::subscribe`.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Capture the currently matching entities atomically with registration.
    pub snapshot: bool,
    /// Events buffered before the subscriber is considered lagging.
    pub buffer: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self { snapshot: false, buffer: 256 }
    }
}

/// Receiving end of a store subscription.
///
/// The stream ends (`recv` returns `None`) when the store drops the
/// subscriber. `drop_reason` then tells a lagging subscriber apart from a
/// store shutdown.
pub struct Subscription {
    id: SubscriptionId,
    snapshot: Vec<Entity>,
    events: mpsc::Receiver<ChangeEvent>,
    drop_reason: DropSlot,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        snapshot: Vec<Entity>,
        events: mpsc::Receiver<ChangeEvent>,
        drop_reason: DropSlot,
    ) -> Self {
        Self { id, snapshot, events, drop_reason }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Entities matching at registration time (empty unless requested).
    pub fn take_snapshot(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.snapshot)
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        *self.drop_reason.lock()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EntityStore Trait
// ============================================================================

/// The read contract the query layer needs from the inventory.
///
/// Mutation is the collector's business and deliberately absent here.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// Get an entity by collection and ID. Returns None if not found.
    async fn get(&self, kind: &str, id: &EntityId) -> Result<Option<Entity>>;

    /// All entities in a collection satisfying the predicate.
    async fn list(&self, kind: &str, predicate: &Predicate) -> Result<Vec<Entity>>;

    /// Subscribe to change events in a collection.
    ///
    /// Events for a given entity arrive in mutation order. No ordering is
    /// promised across entities.
    async fn subscribe(
        &self,
        kind: &str,
        predicate: &Predicate,
        options: SubscribeOptions,
    ) -> Result<Subscription>;

    /// Release a subscription. Unknown or already released IDs are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Follow a reference.
    ///
    /// Default: `get` on the referenced collection.
    async fn resolve(&self, r: &Ref) -> Result<Option<Entity>> {
        self.get(&r.kind, &r.id).await
    }
}
