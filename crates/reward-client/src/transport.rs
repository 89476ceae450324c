//! Transport seam for the reward service connection.
//!
//! The authenticated duplex channel is an externally supplied capability:
//! a [`Connector`] performs whatever dialing and handshake the deployment
//! requires and hands back the two directions of an established channel.

use async_trait::async_trait;

use crate::{errors::ClientError, wire::Envelope};

/// Outbound half of an established channel.
#[async_trait]
pub trait DuplexSink: Send {
    async fn send(&mut self, envelope: Envelope) -> Result<(), ClientError>;
}

/// Inbound half of an established channel.
#[async_trait]
pub trait DuplexStream: Send {
    /// Next inbound envelope; `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<Envelope, ClientError>>;
}

pub type BoxedSink = Box<dyn DuplexSink>;
pub type BoxedStream = Box<dyn DuplexStream>;

/// Dials and authenticates a connection to the reward service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<(BoxedSink, BoxedStream), ClientError>;
}
