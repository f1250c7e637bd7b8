//! In-process transport.
//!
//! `LocalExchange` stands in for an HTTP request; opening it for watching
//! hands back a `WatchClient` that receives what the server pushes over a
//! bounded channel. When the client stops reading, the server's `push`
//! waits, which in turn lets the store subscription fill up.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::mpsc;

use crate::query::WATCH_HEADER;
use crate::{Error, Result};
use super::{Exchange, Prepared, PushChannel};

/// An in-process request.
#[derive(Debug)]
pub struct LocalExchange {
    prepared: Prepared,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: HashMap<String, String>,
    upgrade_to: Option<mpsc::Sender<String>>,
}

impl LocalExchange {
    pub fn new(prepared: Prepared) -> Self {
        Self {
            prepared,
            path_params: HashMap::new(),
            query: Vec::new(),
            headers: HashMap::new(),
            upgrade_to: None,
        }
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Header names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Mark the request as a watch (`X-Watch: <options>`) and attach the
    /// client end of the push channel. `capacity` bounds undelivered
    /// messages and must be > 0.
    pub fn watch(self, options: &str, capacity: usize) -> (Self, WatchClient) {
        let (sender, receiver) = mpsc::channel(capacity);
        let mut exchange = self.with_header(WATCH_HEADER, options);
        exchange.upgrade_to = Some(sender);
        (exchange, WatchClient { receiver })
    }
}

#[async_trait]
impl Exchange for LocalExchange {
    type Channel = LocalChannel;

    fn prepare(&self) -> Prepared {
        self.prepared.clone()
    }

    fn path_param(&self, name: &str) -> Option<String> {
        self.path_params.get(name).cloned()
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        self.query.clone()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    async fn upgrade(self) -> Result<LocalChannel> {
        match self.upgrade_to {
            Some(sender) if !sender.is_closed() => Ok(LocalChannel { sender: Some(sender) }),
            Some(_) => Err(Error::UpgradeFailed("client went away before upgrade".into())),
            None => Err(Error::UpgradeFailed("connection does not support upgrade".into())),
        }
    }
}

/// Server end of an in-process push channel.
#[derive(Debug)]
pub struct LocalChannel {
    sender: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl PushChannel for LocalChannel {
    async fn push(&mut self, message: String) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::PushFailed("channel closed".into()))?;
        sender
            .send(message)
            .await
            .map_err(|_| Error::PushFailed("client disconnected".into()))
    }

    async fn closed(&mut self) {
        if let Some(sender) = &self.sender {
            sender.closed().await;
        }
    }

    async fn close(&mut self) {
        self.sender = None;
    }
}

/// Client end of an in-process push channel.
#[derive(Debug)]
pub struct WatchClient {
    receiver: mpsc::Receiver<String>,
}

impl WatchClient {
    /// Next pushed message, parsed. `None` once the server has closed and
    /// everything buffered has been read.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        loop {
            let raw = self.receiver.recv().await?;
            match serde_json::from_str(&raw) {
                Ok(v) => return Some(v),
                Err(err) => tracing::warn!(%err, "unparseable watch message"),
            }
        }
    }

    /// Stop receiving. The server observes the disconnect; already
    /// buffered messages can still be drained.
    pub fn unsubscribe(&mut self) {
        self.receiver.close();
    }
}
