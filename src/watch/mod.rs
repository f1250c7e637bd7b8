//! # Watch Bridge
//!
//! Turns a list request into a live stream. The bridge upgrades the
//! connection, subscribes to the collection, and then forwards every change
//! event that still satisfies the list predicate as a full-detail
//! representation.
//!
//! ```text
//! Idle ──start──▶ Upgrading ──upgraded + subscribed──▶ Streaming ──▶ Closed
//!                    │                                               ▲
//!                    └────────── upgrade/subscribe failed ───────────┘
//! ```
//!
//! `Closed` is terminal and always releases the store subscription,
//! whichever side ended the stream.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::Entity;
use crate::predicate::Predicate;
use crate::resolver::{DEFAULT_MAX_DEPTH, PathBuilder};
use crate::resource::{Detail, Projector, Representation};
use crate::storage::{
    ChangeKind, DropReason, EntityStore, SubscribeOptions, Subscription, SubscriptionId,
};
use crate::transport::{Exchange, PushChannel};
use crate::{Error, Result};

// ============================================================================
// States and messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchState {
    Idle,
    Upgrading,
    Streaming,
    Closed,
}

/// What a pushed message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchAction {
    Created,
    Updated,
    Deleted,
    /// End of the initial snapshot; live events follow.
    Parity,
}

impl From<ChangeKind> for WatchAction {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => WatchAction::Created,
            ChangeKind::Updated => WatchAction::Updated,
            ChangeKind::Deleted => WatchAction::Deleted,
        }
    }
}

/// One message on the push channel.
#[derive(Debug, Clone, Serialize)]
pub struct WatchMessage {
    pub action: WatchAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Representation>,
}

impl WatchMessage {
    pub fn parity() -> Self {
        Self { action: WatchAction::Parity, sequence: None, resource: None }
    }
}

/// How a stream ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed from the server side via `WatchHandle::close`.
    Cancelled,
    /// The client disconnected or unsubscribed.
    Disconnected,
}

/// Counters reported when a stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub subscription: SubscriptionId,
    /// Messages pushed, parity included.
    pub delivered: u64,
    /// Events suppressed by the event-time predicate check.
    pub dropped: u64,
    pub reason: CloseReason,
}

impl WatchSummary {
    fn new(subscription: SubscriptionId) -> Self {
        Self { subscription, delivered: 0, dropped: 0, reason: CloseReason::Cancelled }
    }

    fn closed(mut self, reason: CloseReason) -> Self {
        self.reason = reason;
        self
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// One watch: a store subscription bridged onto one push channel.
///
/// Bridges share nothing with each other or with concurrent list requests.
pub struct WatchBridge<S: EntityStore> {
    store: Arc<S>,
    kind: String,
    predicate: Predicate,
    projector: Projector,
    options: SubscribeOptions,
    max_path_depth: usize,
    state: watch::Sender<WatchState>,
    cancel: CancellationToken,
}

impl<S: EntityStore> WatchBridge<S> {
    pub fn new(
        store: Arc<S>,
        kind: impl Into<String>,
        predicate: Predicate,
        projector: Projector,
    ) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            store,
            kind: kind.into(),
            predicate,
            projector,
            options: SubscribeOptions::default(),
            max_path_depth: DEFAULT_MAX_DEPTH,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: SubscribeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_path_depth(mut self, max_path_depth: usize) -> Self {
        self.max_path_depth = max_path_depth;
        self
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Upgrade the exchange, subscribe, and hand streaming to a background
    /// task.
    ///
    /// Failures before streaming starts are returned here and leave the
    /// bridge `Closed` with nothing held in the store.
    pub async fn start<E: Exchange>(self, exchange: E) -> Result<WatchHandle> {
        self.transition(WatchState::Upgrading);

        let mut channel = match exchange.upgrade().await {
            Ok(channel) => channel,
            Err(err) => {
                self.transition(WatchState::Closed);
                return Err(match err {
                    Error::UpgradeFailed(_) => err,
                    other => Error::UpgradeFailed(other.to_string()),
                });
            }
        };

        let subscription = match self.store.subscribe(&self.kind, &self.predicate, self.options).await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                channel.close().await;
                self.transition(WatchState::Closed);
                return Err(err);
            }
        };

        let id = subscription.id();
        info!(kind = %self.kind, subscription = %id, snapshot = self.options.snapshot, "watch started");
        self.transition(WatchState::Streaming);

        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run(channel, subscription));

        Ok(WatchHandle { subscription: id, cancel, state, task })
    }

    async fn run<C: PushChannel>(self, mut channel: C, mut subscription: Subscription) -> Result<WatchSummary> {
        let result = self.stream(&mut channel, &mut subscription).await;

        self.store.unsubscribe(subscription.id());
        channel.close().await;
        self.transition(WatchState::Closed);

        match &result {
            Ok(summary) => info!(
                subscription = %summary.subscription,
                delivered = summary.delivered,
                dropped = summary.dropped,
                reason = ?summary.reason,
                "watch closed"
            ),
            Err(err) => warn!(subscription = %subscription.id(), error = %err, "watch failed"),
        }
        result
    }

    async fn stream<C: PushChannel>(
        &self,
        channel: &mut C,
        subscription: &mut Subscription,
    ) -> Result<WatchSummary> {
        let mut summary = WatchSummary::new(subscription.id());

        if self.options.snapshot {
            for entity in subscription.take_snapshot() {
                let message = self.message(WatchAction::Created, Some(entity.revision), &entity).await?;
                if let Some(reason) = self.push(channel, message).await? {
                    return Ok(summary.closed(reason));
                }
                summary.delivered += 1;
            }
            let parity = serde_json::to_string(&WatchMessage::parity())?;
            if let Some(reason) = self.push(channel, parity).await? {
                return Ok(summary.closed(reason));
            }
            summary.delivered += 1;
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(summary.closed(CloseReason::Cancelled)),
                _ = channel.closed() => return Ok(summary.closed(CloseReason::Disconnected)),
                event = subscription.recv() => event,
            };

            let Some(event) = event else {
                return Err(match subscription.drop_reason() {
                    Some(DropReason::Lagged) => Error::SubscriberLagged { subscription: subscription.id() },
                    Some(DropReason::StoreClosed) | None => {
                        Error::StoreError("store ended the subscription".into())
                    }
                });
            };

            if !self.predicate.matches(&event.entity) {
                debug!(id = %event.entity.id, kind = ?event.kind, "event no longer matches, dropped");
                summary.dropped += 1;
                continue;
            }

            let message = self.message(event.kind.into(), Some(event.sequence), &event.entity).await?;
            if let Some(reason) = self.push(channel, message).await? {
                return Ok(summary.closed(reason));
            }
            summary.delivered += 1;
        }
    }

    /// Push unless the bridge is closed first. A push error ends the stream.
    async fn push<C: PushChannel>(&self, channel: &mut C, message: String) -> Result<Option<CloseReason>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(Some(CloseReason::Cancelled)),
            pushed = channel.push(message) => pushed.map(|()| None),
        }
    }

    /// Full-detail message for an entity. The path is best effort here: a
    /// deleted entity's ancestors may already be gone.
    async fn message(&self, action: WatchAction, sequence: Option<u64>, entity: &Entity) -> Result<String> {
        let path = PathBuilder::new(&*self.store)
            .with_max_depth(self.max_path_depth)
            .try_path(entity)
            .await;
        let resource = self.projector.project(entity, path, Detail::Full);
        let message = WatchMessage { action, sequence, resource: Some(resource) };
        Ok(serde_json::to_string(&message)?)
    }

    fn transition(&self, next: WatchState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(kind = %self.kind, from = ?prev, to = ?next, "watch transition");
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Control over a running watch.
///
/// Dropping the handle leaves the stream running until the client leaves.
#[derive(Debug)]
pub struct WatchHandle {
    subscription: SubscriptionId,
    cancel: CancellationToken,
    state: watch::Receiver<WatchState>,
    task: JoinHandle<Result<WatchSummary>>,
}

impl WatchHandle {
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Ask the stream to end. Idempotent; the subscription is released
    /// before the state reaches `Closed`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the bridge reaches `Closed`.
    pub async fn closed(&mut self) {
        let _ = self.state.wait_for(|state| *state == WatchState::Closed).await;
    }

    /// Wait for the stream task and return how it ended.
    pub async fn join(self) -> Result<WatchSummary> {
        self.task
            .await
            .map_err(|err| Error::Internal(format!("watch task: {err}")))?
    }
}
