//! Typed packet channel contracts.

use crate::error::ChannelError;

/// The part of a channel its owner needs for teardown.
///
/// Object safe, so plugins can track channels of different packet types
/// in one list.
pub trait ChannelRegistration: Send + Sync {
    /// The channel name on the transport.
    fn name(&self) -> &str;

    /// Removes this channel's incoming listener. Calling it again is a no-op.
    ///
    /// The transport-level channel reservation is left alone since other
    /// channel instances may still use the same name.
    fn unregister_incoming(&self);
}

/// A named channel carrying packets of one type over a shared transport.
pub trait PacketChannel: ChannelRegistration {
    type Packet;
    type Endpoint;

    /// Name of the packet type flowing through this channel.
    fn packet_type(&self) -> &'static str;

    /// Whether `None` packets may be sent and received.
    fn permits_nulls(&self) -> bool;

    /// Sends a packet to `recipient`, or to the first reachable endpoint when `None`.
    ///
    /// Returns `Ok(false)` without transmitting anything when no endpoint is reachable.
    fn send_packet_to(
        &self,
        recipient: Option<&Self::Endpoint>,
        packet: Option<Self::Packet>,
    ) -> Result<bool, ChannelError>;

    /// Sends a packet to the first reachable endpoint.
    fn send_packet(&self, packet: Option<Self::Packet>) -> Result<bool, ChannelError> {
        self.send_packet_to(None, packet)
    }
}
