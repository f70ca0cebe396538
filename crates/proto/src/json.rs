//! A packet channel which transmits its packets as JSON.
//!
//! Wire format: an empty payload is the null packet, anything else is the
//! UTF-8 JSON encoding of the packet.

use crate::channel::{ChannelRegistration, PacketChannel};
use crate::error::ChannelError;
use crate::handler::PacketHandler;
use crate::transport::{ListenerId, MessageListener, MessageTransport};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Encodes an optional packet into its wire form.
pub fn encode_packet<P: Serialize>(channel: &str, packet: Option<&P>) -> Result<Bytes, ChannelError> {
    match packet {
        None => Ok(Bytes::new()),
        Some(packet) => serde_json::to_vec(packet)
            .map(Bytes::from)
            .map_err(|source| ChannelError::Serialize {
                channel: channel.to_owned(),
                source,
            }),
    }
}

struct JsonReceiver<P, E> {
    channel: String,
    permit_nulls: bool,
    handler: Arc<dyn PacketHandler<P, E>>,
}

impl<P, E> MessageListener<E> for JsonReceiver<P, E>
where
    P: DeserializeOwned,
{
    fn on_message(&self, channel: &str, sender: &E, payload: &[u8]) -> Result<(), ChannelError> {
        if channel != self.channel {
            return Ok(());
        }

        if payload.is_empty() {
            if !self.permit_nulls {
                return Err(ChannelError::null_not_permitted(channel));
            }
            self.handler.packet_received(None, sender, channel);
            return Ok(());
        }

        let packet: P = match serde_json::from_slice(payload) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(
                    channel,
                    payload = %String::from_utf8_lossy(payload),
                    "Received malformed packet on plugin messaging channel: {err}"
                );
                return Ok(());
            }
        };

        self.handler.packet_received(Some(packet), sender, channel);
        Ok(())
    }
}

/// A [`PacketChannel`] serializing its packets as JSON.
///
/// The channel reserves its name and registers its incoming listener with
/// the transport as soon as it is constructed.
pub struct JsonPacketChannel<P, T: MessageTransport> {
    transport: Arc<T>,
    receiver: Arc<JsonReceiver<P, T::Endpoint>>,
    registration: Mutex<Option<ListenerId>>,
}

impl<P, T> JsonPacketChannel<P, T>
where
    P: Serialize + DeserializeOwned + 'static,
    T: MessageTransport,
{
    /// Creates a channel which rejects null packets.
    pub fn new<H>(transport: Arc<T>, channel: impl Into<String>, handler: H) -> Self
    where
        H: PacketHandler<P, T::Endpoint> + 'static,
    {
        Self::with_nulls(transport, channel, handler, false)
    }

    /// Creates a channel with an explicit null policy.
    pub fn with_nulls<H>(transport: Arc<T>, channel: impl Into<String>, handler: H, permit_nulls: bool) -> Self
    where
        H: PacketHandler<P, T::Endpoint> + 'static,
    {
        let channel = channel.into();
        let receiver = Arc::new(JsonReceiver {
            channel: channel.clone(),
            permit_nulls,
            handler: Arc::new(handler) as Arc<dyn PacketHandler<P, T::Endpoint>>,
        });

        transport.register_channel(&channel);
        let id = transport.register_listener(
            &channel,
            Arc::clone(&receiver) as Arc<dyn MessageListener<T::Endpoint>>,
        );
        tracing::debug!(channel = %channel, packet = std::any::type_name::<P>(), "Registered packet channel");

        Self {
            transport,
            receiver,
            registration: Mutex::new(Some(id)),
        }
    }

    /// Whether the incoming listener is still registered.
    pub fn is_listening(&self) -> bool {
        self.registration.lock().is_some()
    }
}

impl<P, T> ChannelRegistration for JsonPacketChannel<P, T>
where
    P: Serialize + DeserializeOwned + 'static,
    T: MessageTransport,
{
    fn name(&self) -> &str {
        &self.receiver.channel
    }

    fn unregister_incoming(&self) {
        if let Some(id) = self.registration.lock().take() {
            self.transport.unregister_listener(id);
            tracing::debug!(channel = %self.receiver.channel, "Unregistered packet channel listener");
        }
    }
}

impl<P, T> PacketChannel for JsonPacketChannel<P, T>
where
    P: Serialize + DeserializeOwned + 'static,
    T: MessageTransport,
{
    type Packet = P;
    type Endpoint = T::Endpoint;

    fn packet_type(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    fn permits_nulls(&self) -> bool {
        self.receiver.permit_nulls
    }

    fn send_packet_to(&self, recipient: Option<&T::Endpoint>, packet: Option<P>) -> Result<bool, ChannelError> {
        let channel = self.name();
        if packet.is_none() && !self.permits_nulls() {
            return Err(ChannelError::null_not_permitted(channel));
        }

        let recipient = match recipient.cloned().or_else(|| self.transport.first_endpoint()) {
            Some(recipient) => recipient,
            None => {
                tracing::trace!(channel, "No reachable endpoint, packet not sent");
                return Ok(false);
            }
        };

        let packet = self.receiver.handler.packet_pre_send(packet, &recipient);
        if packet.is_none() && !self.permits_nulls() {
            return Err(ChannelError::null_not_permitted(channel));
        }

        let payload = encode_packet(channel, packet.as_ref())?;
        let max = self.transport.max_message_size();
        if payload.len() > max {
            return Err(ChannelError::MessageTooLarge {
                channel: channel.to_owned(),
                size: payload.len(),
                max,
            });
        }

        self.transport.send(&recipient, channel, payload)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use crate::loopback::LoopbackTransport;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Ping {
        id: u32,
    }

    fn transport() -> Arc<LoopbackTransport<String>> {
        Arc::new(LoopbackTransport::new(64))
    }

    #[test]
    fn test_construction_registers_once() {
        let transport = transport();
        let channel: JsonPacketChannel<Ping, _> =
            JsonPacketChannel::new(Arc::clone(&transport), "mv:ping", handler::recv(|_: Option<Ping>, _: &String, _: &str| {}));

        assert!(transport.is_channel_registered("mv:ping"));
        assert_eq!(transport.listener_count("mv:ping"), 1);
        assert_eq!(channel.packet_type(), std::any::type_name::<Ping>());
        assert!(!channel.permits_nulls());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let transport = transport();
        let channel: JsonPacketChannel<Ping, _> =
            JsonPacketChannel::new(Arc::clone(&transport), "mv:ping", handler::recv(|_: Option<Ping>, _: &String, _: &str| {}));

        channel.unregister_incoming();
        channel.unregister_incoming();

        assert!(!channel.is_listening());
        assert_eq!(transport.listener_count("mv:ping"), 0);
        assert!(transport.is_channel_registered("mv:ping"));
    }

    #[test]
    fn test_encode_null_is_empty() {
        let bytes = encode_packet::<Ping>("mv:ping", None).unwrap();
        assert!(bytes.is_empty());
        let bytes = encode_packet("mv:ping", Some(&Ping { id: 3 })).unwrap();
        assert_eq!(&bytes[..], br#"{"id":3}"#);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let transport = Arc::new(LoopbackTransport::<String>::new(8));
        transport.connect("lobby".to_owned());
        let channel: JsonPacketChannel<String, _> =
            JsonPacketChannel::new(Arc::clone(&transport), "mv:text", handler::recv(|_: Option<String>, _: &String, _: &str| {}));

        let err = channel.send_packet(Some("much too long".to_owned())).unwrap_err();
        assert!(matches!(err, ChannelError::MessageTooLarge { size: 15, max: 8, .. }));
        assert!(transport.sent().is_empty());

        assert!(channel.send_packet(Some("ok".to_owned())).unwrap());
        assert_eq!(transport.sent().len(), 1);
    }
}
