//! # inventory-rs: Inventory Query and Change-Notification Layer
//!
//! Serves point-in-time snapshots of inventory entities and, on request,
//! upgrades the same query into a live stream of change events.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `EntityStore` is the contract with whatever collector fills the inventory
//! 2. **Read-only core**: the layer lists, gets and subscribes; it never mutates
//! 3. **Two branches, no shared state**: a list either answers with a snapshot
//!    or hands the connection to an independent `WatchBridge`
//! 4. **Injected everything**: store and transport are passed in, never global
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inventory_rs::{Inventory, Entity, Ref, Route, Provider, LocalExchange, Prepared};
//!
//! # async fn example() -> inventory_rs::Result<()> {
//! let inventory = Inventory::open_memory();
//! inventory.store().put(Entity::new("datacenters", "d1", "dc1"))?;
//! inventory.store().put(
//!     Entity::new("clusters", "c1", "prod").with_parent(Ref::new("datacenters", "d1")),
//! )?;
//!
//! let clusters = inventory.collection(Route::new("vsphere", "clusters", "cluster"));
//! let request = LocalExchange::new(Prepared::Ready(Provider::new("uid-1", "vsphere")))
//!     .with_query("name", "dc1/prod");
//! let reply = clusters.list(request).await;
//! println!("{}", reply.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | `storage` | `EntityStore` trait, change events, `MemoryStore` |
//! | `resolver` | Fully-qualified paths from parent references |
//! | `filter` | Store predicates and path disambiguation |
//! | `resource` | Detail-level projections and self links |
//! | `handler` | One-shot list/get |
//! | `watch` | Upgrade-to-stream state machine |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod predicate;
pub mod storage;
pub mod resolver;
pub mod query;
pub mod filter;
pub mod resource;
pub mod transport;
pub mod handler;
pub mod watch;
pub mod config;

use std::sync::Arc;

use http::StatusCode;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Entity, EntityId, Ref, Value, FieldMap, InventoryPath, PathFragment,
};
pub use predicate::Predicate;

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{
    EntityStore, MemoryStore, ChangeEvent, ChangeKind, Subscription, SubscriptionId,
    SubscribeOptions, DropReason,
};

// ============================================================================
// Re-exports: Query surface
// ============================================================================

pub use query::ListQuery;
pub use resource::{Detail, Provider, Route, Projector, Representation};
pub use transport::{Exchange, PushChannel, Prepared, LocalExchange, LocalChannel, WatchClient};
pub use handler::{CollectionHandler, Reply};
pub use watch::{WatchBridge, WatchHandle, WatchState, WatchMessage};
pub use config::Config;

// ============================================================================
// Top-level Inventory handle
// ============================================================================

/// The primary entry point. An `Inventory` holds the store and settings
/// shared by every collection handler.
pub struct Inventory<S: EntityStore> {
    store: Arc<S>,
    config: Config,
}

impl<S: EntityStore> Inventory<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self { store, config: Config::default() }
    }

    /// Replace the configuration after validating it.
    pub fn with_config(mut self, config: Config) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Handler for one entity collection.
    pub fn collection(&self, route: Route) -> CollectionHandler<S> {
        CollectionHandler::new(Arc::clone(&self.store), route, self.config.clone())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// In-memory inventory for testing and embedding.
impl Inventory<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Precondition failed: {status}")]
    PreconditionFailed { status: StatusCode },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Structural filter failed on {id}: {reason}")]
    FilterFailed { id: String, reason: String },

    #[error("Path of {id} exceeds {max_depth} ancestors")]
    CycleOrDepthExceeded { id: String, max_depth: usize },

    #[error("Upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("Push failed: {0}")]
    PushFailed(String),

    #[error("Subscriber {subscription} lagged and was dropped")]
    SubscriberLagged { subscription: SubscriptionId },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Status the transport should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::PreconditionFailed { status } => *status,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
