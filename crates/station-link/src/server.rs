//! [`RequestServer`] – contract for the inbound request listener.
//!
//! A server owns the transport and nothing else: every request payload goes
//! to the single registered [`RequestHandler`] untouched, and whatever the
//! handler returns goes back to the connection the request came from.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::LinkError;
use crate::signal::ShutdownSignal;

/// The callback a [`RequestServer`] invokes for every request.
///
/// Handlers never fail: malformed input gets an error *reply*, so one bad
/// client cannot take the listener down.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &[u8]) -> Vec<u8>;
}

/// An inbound listener.
#[async_trait]
pub trait RequestServer: Send + Sync {
    /// Accept and answer requests until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Only unrecoverable listener failures are returned; per-connection
    /// errors are logged and the connection dropped.
    async fn serve(
        &self,
        handler: Arc<dyn RequestHandler>,
        shutdown: ShutdownSignal,
    ) -> Result<(), LinkError>;
}
