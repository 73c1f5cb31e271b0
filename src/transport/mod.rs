//! Transport layer for the sync server.
//!
//! Only HTTP is provided; the request envelope and routes live in [`http`].

pub mod http;

pub use http::{API_PREFIX, AppState, HttpTransport, router};

use crate::error::SyncOutcome;
use std::future::Future;

/// A way of exposing the sync operations to clients.
pub trait Transport: Send + Sync {
    /// Start the transport and serve until shutdown.
    fn run(&self) -> impl Future<Output = SyncOutcome<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
