//! An in-process transport that records outgoing messages and lets callers
//! inject incoming ones.
//!
//! Useful for running plugins outside of a host and for tests.

use crate::error::{ChannelError, TransportError};
use crate::transport::{ListenerId, MessageListener, MessageTransport};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A message handed to [`LoopbackTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage<E> {
    pub recipient: E,
    pub channel: String,
    pub payload: Bytes,
}

struct Registration<E> {
    id: ListenerId,
    channel: String,
    listener: Arc<dyn MessageListener<E>>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            channel: self.channel.clone(),
            listener: Arc::clone(&self.listener),
        }
    }
}

/// In-process [`MessageTransport`].
pub struct LoopbackTransport<E = String> {
    max_message_size: usize,
    channels: RwLock<BTreeSet<String>>,
    listeners: RwLock<Vec<Registration<E>>>,
    endpoints: RwLock<Vec<E>>,
    sent: Mutex<Vec<SentMessage<E>>>,
    next_listener: AtomicU64,
}

impl<E> LoopbackTransport<E>
where
    E: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            channels: RwLock::new(BTreeSet::new()),
            listeners: RwLock::new(Vec::new()),
            endpoints: RwLock::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Marks an endpoint as reachable.
    pub fn connect(&self, endpoint: E) {
        let mut endpoints = self.endpoints.write();
        if !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
    }

    /// Marks an endpoint as unreachable.
    pub fn disconnect(&self, endpoint: &E) {
        self.endpoints.write().retain(|e| e != endpoint);
    }

    pub fn is_channel_registered(&self, channel: &str) -> bool {
        self.channels.read().contains(channel)
    }

    /// Number of listeners registered for `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|r| r.channel == channel)
            .count()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage<E>> {
        self.sent.lock().clone()
    }

    /// Drains the sent messages.
    pub fn take_sent(&self) -> Vec<SentMessage<E>> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Delivers an incoming message to every registered listener.
    ///
    /// All listeners see the message even if one of them fails; the first
    /// error is returned afterwards.
    pub fn deliver(&self, channel: &str, sender: &E, payload: &[u8]) -> Result<(), ChannelError> {
        // Listeners may unregister themselves while handling a message.
        let listeners: Vec<Registration<E>> = self.listeners.read().clone();

        let mut first_error = None;
        for registration in &listeners {
            if let Err(err) = registration.listener.on_message(channel, sender, payload) {
                tracing::debug!(channel, listener = registration.id.get(), "Listener rejected message: {err}");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<E> MessageTransport for LoopbackTransport<E>
where
    E: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    type Endpoint = E;

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn register_channel(&self, channel: &str) {
        self.channels.write().insert(channel.to_owned());
    }

    fn register_listener(&self, channel: &str, listener: Arc<dyn MessageListener<E>>) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration {
            id,
            channel: channel.to_owned(),
            listener,
        });
        id
    }

    fn unregister_listener(&self, id: ListenerId) {
        self.listeners.write().retain(|r| r.id != id);
    }

    fn first_endpoint(&self) -> Option<E> {
        self.endpoints.read().first().cloned()
    }

    fn send(&self, recipient: &E, channel: &str, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_channel_registered(channel) {
            return Err(TransportError::UnregisteredChannel(channel.to_owned()));
        }
        if !self.endpoints.read().contains(recipient) {
            return Err(TransportError::Unreachable(format!("{recipient:?}")));
        }

        self.sent.lock().push(SentMessage {
            recipient: recipient.clone(),
            channel: channel.to_owned(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<String>>);

    impl MessageListener<String> for Recorder {
        fn on_message(&self, channel: &str, _sender: &String, _payload: &[u8]) -> Result<(), ChannelError> {
            self.0.lock().push(channel.to_owned());
            Ok(())
        }
    }

    #[test]
    fn test_send_requires_registration_and_endpoint() {
        let transport = LoopbackTransport::<String>::new(16);
        let lobby = "lobby".to_owned();

        let err = transport.send(&lobby, "mv:test", Bytes::new()).unwrap_err();
        assert!(matches!(err, TransportError::UnregisteredChannel(_)));

        transport.register_channel("mv:test");
        let err = transport.send(&lobby, "mv:test", Bytes::new()).unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));

        transport.connect(lobby.clone());
        transport.send(&lobby, "mv:test", Bytes::from_static(b"{}")).unwrap();
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.take_sent()[0].payload, Bytes::from_static(b"{}"));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_unregister_only_removes_listener() {
        let transport = LoopbackTransport::<String>::new(16);
        transport.register_channel("mv:test");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let id = transport.register_listener("mv:test", Arc::clone(&recorder) as Arc<dyn MessageListener<String>>);

        transport.deliver("mv:test", &"lobby".to_owned(), b"1").unwrap();
        transport.unregister_listener(id);
        transport.deliver("mv:test", &"lobby".to_owned(), b"2").unwrap();

        assert_eq!(recorder.0.lock().len(), 1);
        assert_eq!(transport.listener_count("mv:test"), 0);
        assert!(transport.is_channel_registered("mv:test"));
    }

    #[test]
    fn test_first_endpoint_follows_connections() {
        let transport = LoopbackTransport::<String>::new(16);
        assert_eq!(transport.first_endpoint(), None);

        transport.connect("a".to_owned());
        transport.connect("b".to_owned());
        transport.connect("a".to_owned());
        assert_eq!(transport.first_endpoint().as_deref(), Some("a"));

        transport.disconnect(&"a".to_owned());
        assert_eq!(transport.first_endpoint().as_deref(), Some("b"));
    }
}
