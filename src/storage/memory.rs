//! In-memory entity store.
//!
//! This is the reference implementation of `EntityStore`.
//! It uses hash maps protected by a `RwLock`, plus a registry of bounded
//! subscriber channels.
//!
//! ## Ordering
//!
//! Mutations assign a store-wide sequence number and publish their change
//! event while still holding the write lock, so every subscriber sees a
//! given entity's events in mutation order.
//!
//! ## Limitations
//!
//! - **No persistence**: contents vanish with the process.
//! - **No indexes**: `list` scans the whole collection.
//! - **Lagging subscribers are cut off**: a subscriber whose buffer is full
//!   is removed with `DropReason::Lagged` rather than stalling writers.
//!
//! Use this store for:
//! - Testing the handler and watch bridge
//! - Embedding where a collector writes directly into process memory

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::model::*;
use crate::predicate::Predicate;
use crate::{Error, Result};
use super::{
    ChangeEvent, ChangeKind, DropReason, DropSlot, EntityStore, SubscribeOptions, Subscription,
    SubscriptionId,
};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory inventory storage. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    /// kind → id → entity
    collections: RwLock<HashMap<String, HashMap<EntityId, Entity>>>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_sequence: AtomicU64,
    next_subscription: AtomicU64,
    closed: AtomicBool,
}

struct Subscriber {
    kind: String,
    predicate: Predicate,
    sender: mpsc::Sender<ChangeEvent>,
    drop_reason: DropSlot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                collections: RwLock::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                next_sequence: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create or replace an entity. Assigns its revision and publishes
    /// `Created` or `Updated`.
    pub fn put(&self, mut entity: Entity) -> Result<ChangeEvent> {
        let mut collections = self.inner.collections.write();
        self.ensure_open()?;

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        entity.revision = sequence;
        let prior = collections
            .entry(entity.kind.clone())
            .or_default()
            .insert(entity.id.clone(), entity.clone());

        let event = ChangeEvent {
            kind: if prior.is_some() { ChangeKind::Updated } else { ChangeKind::Created },
            entity,
            sequence,
            at: Utc::now(),
        };
        self.publish(&event, prior.as_ref());
        Ok(event)
    }

    /// Remove an entity. Publishes `Deleted` carrying its last state.
    /// Returns None if it did not exist.
    pub fn delete(&self, kind: &str, id: &EntityId) -> Result<Option<ChangeEvent>> {
        let mut collections = self.inner.collections.write();
        self.ensure_open()?;

        let Some(mut entity) = collections.get_mut(kind).and_then(|c| c.remove(id)) else {
            return Ok(None);
        };
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        entity.revision = sequence;

        let event = ChangeEvent { kind: ChangeKind::Deleted, entity, sequence, at: Utc::now() };
        self.publish(&event, None);
        Ok(Some(event))
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Stop accepting mutations and end every subscription with
    /// `DropReason::StoreClosed`.
    pub fn shutdown(&self) {
        // Writers and subscribers check `closed` under the collections lock.
        let _collections = self.inner.collections.write();
        self.inner.closed.store(true, Ordering::Release);
        let mut subscribers = self.inner.subscribers.lock();
        for subscriber in subscribers.values() {
            *subscriber.drop_reason.lock() = Some(DropReason::StoreClosed);
        }
        subscribers.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::StoreError("store is shut down".into()));
        }
        Ok(())
    }

    /// Deliver to every subscriber whose predicate matched the entity before
    /// or after the mutation. Caller holds the collections write lock.
    fn publish(&self, event: &ChangeEvent, prior: Option<&Entity>) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|id, sub| {
            if sub.sender.is_closed() {
                return false;
            }
            if sub.kind != event.entity.kind {
                return true;
            }
            let relevant = sub.predicate.matches(&event.entity)
                || prior.is_some_and(|p| sub.predicate.matches(p));
            if !relevant {
                return true;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    *sub.drop_reason.lock() = Some(DropReason::Lagged);
                    warn!(subscription = %id, kind = %sub.kind, "subscriber lagged, dropping");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// EntityStore impl
// ============================================================================

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: &str, id: &EntityId) -> Result<Option<Entity>> {
        self.ensure_open()?;
        Ok(self.inner.collections.read().get(kind).and_then(|c| c.get(id)).cloned())
    }

    async fn list(&self, kind: &str, predicate: &Predicate) -> Result<Vec<Entity>> {
        self.ensure_open()?;
        let mut list: Vec<Entity> = {
            let collections = self.inner.collections.read();
            collections
                .get(kind)
                .map(|c| c.values().filter(|e| predicate.matches(e)).cloned().collect())
                .unwrap_or_default()
        };
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn subscribe(
        &self,
        kind: &str,
        predicate: &Predicate,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        self.ensure_open()?;
        if options.buffer == 0 {
            return Err(Error::Config("subscription buffer must be > 0".into()));
        }

        let (sender, receiver) = mpsc::channel(options.buffer);
        let drop_reason = DropSlot::default();
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));

        // Holding the read lock keeps writers and `shutdown` out until the
        // subscriber is registered, so nothing falls between snapshot and
        // stream and no subscriber outlives a shutdown.
        let mut snapshot = {
            let collections = self.inner.collections.read();
            self.ensure_open()?;
            let snapshot: Vec<Entity> = if options.snapshot {
                collections
                    .get(kind)
                    .map(|c| c.values().filter(|e| predicate.matches(e)).cloned().collect())
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            self.inner.subscribers.lock().insert(
                id,
                Subscriber {
                    kind: kind.to_owned(),
                    predicate: predicate.clone(),
                    sender,
                    drop_reason: Arc::clone(&drop_reason),
                },
            );
            snapshot
        };
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(subscription = %id, kind, %predicate, snapshot = snapshot.len(), "subscribed");
        Ok(Subscription::new(id, snapshot, receiver, drop_reason))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.inner.subscribers.lock().remove(&id).is_some() {
            debug!(subscription = %id, "unsubscribed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
