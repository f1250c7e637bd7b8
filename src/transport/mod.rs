//! # Transport Traits
//!
//! What the query layer needs from whatever routes requests to it: a
//! prepared request context, headers and parameters, and a way to upgrade
//! the connection to a push channel. Responses are returned as a
//! `handler::Reply` for the transport to write.
//!
//! ## Implementations
//!
//! | Transport | Module | Description |
//! |-----------|--------|-------------|
//! | `LocalExchange` | `local` | In-process channels for testing/embedding |

pub mod local;

use async_trait::async_trait;
use http::StatusCode;

use crate::resource::Provider;
use crate::Result;

pub use local::{LocalChannel, LocalExchange, WatchClient};

/// Outcome of the transport's request preparation (provider lookup,
/// session, readiness). Authorization is resolved before the query layer
/// sees the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Ready(Provider),
    /// The status the transport wants returned as-is.
    Rejected(StatusCode),
}

/// One inbound request.
#[async_trait]
pub trait Exchange: Send + 'static {
    type Channel: PushChannel;

    fn prepare(&self) -> Prepared;

    /// A route parameter such as the entity ID.
    fn path_param(&self, name: &str) -> Option<String>;

    /// Decoded query-string pairs in request order.
    fn query_pairs(&self) -> Vec<(String, String)>;

    fn header(&self, name: &str) -> Option<String>;

    /// Negotiate the upgrade to a bidirectional push channel.
    async fn upgrade(self) -> Result<Self::Channel>;
}

/// Server side of an upgraded connection.
#[async_trait]
pub trait PushChannel: Send + 'static {
    /// Deliver one message. May wait while the client catches up; an error
    /// is fatal to the channel.
    async fn push(&mut self, message: String) -> Result<()>;

    /// Completes once the client has disconnected or unsubscribed.
    async fn closed(&mut self);

    /// Close from the server side. Idempotent.
    async fn close(&mut self);
}
