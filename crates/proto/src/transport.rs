//! The byte-oriented plugin messaging transport that channels are built on.

use crate::error::{ChannelError, TransportError};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Maximum plugin message size accepted by the proxy tier.
pub const PROXY_MAX_MESSAGE_SIZE: usize = 32_766;

/// Maximum plugin message size accepted by the backend-server tier.
pub const BACKEND_MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Identifies a listener registration on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Receives every message delivered by a transport.
///
/// Several listeners share one transport, so implementations must ignore
/// messages tagged with channel names they do not own.
pub trait MessageListener<E>: Send + Sync {
    /// Handles an incoming message.
    ///
    /// Returning an error signals a protocol violation by the sender. Recoverable
    /// per-message problems such as malformed payloads are handled internally.
    fn on_message(&self, channel: &str, sender: &E, payload: &[u8]) -> Result<(), ChannelError>;
}

/// A transport that only understands `(channel name, bytes)` pairs.
pub trait MessageTransport: Send + Sync + 'static {
    /// Handle of a connected endpoint that can send or receive messages.
    type Endpoint: Clone + fmt::Debug + Send + Sync + 'static;

    /// Largest payload, in bytes, that [`send`](Self::send) accepts.
    fn max_message_size(&self) -> usize;

    /// Reserves `channel` for outgoing messages. Reserving twice is harmless.
    fn register_channel(&self, channel: &str);

    /// Adds a listener for incoming messages.
    fn register_listener(
        &self,
        channel: &str,
        listener: Arc<dyn MessageListener<Self::Endpoint>>,
    ) -> ListenerId;

    /// Removes a single listener registration, leaving the channel reservation in place.
    fn unregister_listener(&self, id: ListenerId);

    /// The first currently reachable endpoint, if any.
    fn first_endpoint(&self) -> Option<Self::Endpoint>;

    /// Transmits `payload` to `recipient`.
    fn send(
        &self,
        recipient: &Self::Endpoint,
        channel: &str,
        payload: Bytes,
    ) -> Result<(), TransportError>;
}
