//! # Collection Handler
//!
//! One-shot list and get for an entity collection. A list carrying the
//! watch header is handed to a `WatchBridge` instead of being answered.
//!
//! ## List Pipeline
//!
//! ```text
//! prepare → ListQuery → Predicate → store.list → structural filter
//!         → path per entity → projection → 200 + JSON array
//! ```
//!
//! The handler holds no per-request state; every call builds its own
//! `PathBuilder`, so concurrent requests do not interact.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::filter::{build_predicate, structural_filter};
use crate::model::EntityId;
use crate::query::{ListQuery, WATCH_HEADER, WatchIntent, watch_intent};
use crate::resolver::PathBuilder;
use crate::resource::{Detail, Projector, Provider, Representation, Route};
use crate::storage::{EntityStore, SubscribeOptions};
use crate::transport::{Exchange, Prepared};
use crate::watch::{WatchBridge, WatchHandle};
use crate::{Error, Result};

/// What the transport should send back.
#[derive(Debug)]
pub enum Reply {
    Json { status: StatusCode, body: serde_json::Value },
    /// Status only, no body.
    Status(StatusCode),
    /// The connection was upgraded; the stream runs in the background.
    Watching(WatchHandle),
}

impl Reply {
    fn ok<T: Serialize>(body: &T) -> Reply {
        match serde_json::to_value(body) {
            Ok(body) => Reply::Json { status: StatusCode::OK, body },
            Err(err) => Reply::Status(Error::from(err).status()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Json { status, .. } => *status,
            Reply::Status(status) => *status,
            Reply::Watching(_) => StatusCode::SWITCHING_PROTOCOLS,
        }
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        match self {
            Reply::Json { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn into_watch(self) -> Option<WatchHandle> {
        match self {
            Reply::Watching(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Serves list, get, and watch for one collection.
pub struct CollectionHandler<S: EntityStore> {
    store: Arc<S>,
    route: Route,
    config: Config,
}

impl<S: EntityStore> CollectionHandler<S> {
    pub fn new(store: Arc<S>, route: Route, config: Config) -> Self {
        Self { store, route, config }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// List the collection, or start a watch when the request carries the
    /// watch header.
    pub async fn list<E: Exchange>(&self, exchange: E) -> Reply {
        let provider = match self.prepare(&exchange) {
            Ok(provider) => provider,
            Err(err) => return self.fail("list", err),
        };
        let query = ListQuery::from_params(exchange.query_pairs());

        if let Some(intent) = watch_intent(exchange.header(WATCH_HEADER).as_deref()) {
            return match self.watch(&provider, &query, intent, exchange).await {
                Ok(handle) => Reply::Watching(handle),
                Err(err) => self.fail("watch", err),
            };
        }

        match self.list_resources(&provider, &query).await {
            Ok(content) => Reply::ok(&content),
            Err(err) => self.fail("list", err),
        }
    }

    /// Get one entity by the route's ID parameter, at full detail.
    pub async fn get<E: Exchange>(&self, exchange: E) -> Reply {
        let provider = match self.prepare(&exchange) {
            Ok(provider) => provider,
            Err(err) => return self.fail("get", err),
        };
        let Some(id) = exchange.path_param(&self.route.param) else {
            let err = Error::NotFound(format!("missing :{} parameter", self.route.param));
            return self.fail("get", err);
        };

        match self.get_resource(&provider, &EntityId::from(id)).await {
            Ok(resource) => Reply::ok(&resource),
            Err(err) => self.fail("get", err),
        }
    }

    /// The list pipeline without the transport.
    pub async fn list_resources(
        &self,
        provider: &Provider,
        query: &ListQuery,
    ) -> Result<Vec<Representation>> {
        let predicate = build_predicate(query);
        let list = self.store.list(&self.route.collection, &predicate).await?;

        let mut pb = self.path_builder();
        let list = structural_filter(&mut pb, list, query.name.as_deref()).await?;

        let projector = self.projector(provider);
        let mut content = Vec::with_capacity(list.len());
        for entity in &list {
            let path = pb.try_path(entity).await;
            content.push(projector.project(entity, path, query.detail));
        }
        debug!(route = %self.route, count = content.len(), detail = ?query.detail, "listed");
        Ok(content)
    }

    /// The get pipeline without the transport.
    pub async fn get_resource(&self, provider: &Provider, id: &EntityId) -> Result<Representation> {
        let entity = self
            .store
            .get(&self.route.collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {id}", self.route.collection)))?;

        let path = self.path_builder().try_path(&entity).await;
        Ok(self.projector(provider).project(&entity, path, Detail::Full))
    }

    async fn watch<E: Exchange>(
        &self,
        provider: &Provider,
        query: &ListQuery,
        intent: WatchIntent,
        exchange: E,
    ) -> Result<WatchHandle> {
        let options = SubscribeOptions {
            snapshot: intent.snapshot || self.config.watch.snapshot,
            buffer: self.config.watch.subscriber_buffer,
        };
        WatchBridge::new(
            Arc::clone(&self.store),
            self.route.collection.clone(),
            build_predicate(query),
            self.projector(provider),
        )
        .with_options(options)
        .with_max_path_depth(self.config.max_path_depth)
        .start(exchange)
        .await
    }

    /// Runs before anything touches the store.
    fn prepare<E: Exchange>(&self, exchange: &E) -> Result<Provider> {
        match exchange.prepare() {
            Prepared::Ready(provider) => Ok(provider),
            Prepared::Rejected(status) => Err(Error::PreconditionFailed { status }),
        }
    }

    fn path_builder(&self) -> PathBuilder<'_, S> {
        PathBuilder::new(&*self.store).with_max_depth(self.config.max_path_depth)
    }

    fn projector(&self, provider: &Provider) -> Projector {
        Projector::new(self.route.clone(), provider.clone())
    }

    fn fail(&self, op: &str, err: Error) -> Reply {
        let status = err.status();
        if status.is_server_error() {
            warn!(op, route = %self.route, error = %err, "request failed");
        } else {
            debug!(op, route = %self.route, %status, error = %err, "request rejected");
        }
        Reply::Status(status)
    }
}
