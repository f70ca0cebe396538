//! Packet handlers attached to channels.

/// Callbacks invoked by a packet channel.
///
/// `P` is the packet type and `E` the transport endpoint type.
pub trait PacketHandler<P, E>: Send + Sync {
    /// Handles a received packet.
    ///
    /// `packet` is only `None` on channels that permit nulls.
    fn packet_received(&self, packet: Option<P>, sender: &E, channel: &str);

    /// Transforms a packet right before it is sent to `recipient`.
    ///
    /// The result is checked against the channel's null policy again.
    fn packet_pre_send(&self, packet: Option<P>, _recipient: &E) -> Option<P> {
        packet
    }
}

/// Handler which only reacts to received packets.
pub struct RecvHandler<F>(F);

impl<P, E, F> PacketHandler<P, E> for RecvHandler<F>
where
    F: Fn(Option<P>, &E, &str) + Send + Sync,
{
    fn packet_received(&self, packet: Option<P>, sender: &E, channel: &str) {
        (self.0)(packet, sender, channel)
    }
}

/// Handler which only transforms outgoing packets and ignores received ones.
pub struct PreSendHandler<F>(F);

impl<P, E, F> PacketHandler<P, E> for PreSendHandler<F>
where
    F: Fn(Option<P>, &E) -> Option<P> + Send + Sync,
{
    fn packet_received(&self, _packet: Option<P>, _sender: &E, _channel: &str) {}

    fn packet_pre_send(&self, packet: Option<P>, recipient: &E) -> Option<P> {
        (self.0)(packet, recipient)
    }
}

/// Builds a handler from a receive callback; outgoing packets pass through unchanged.
pub fn recv<F>(callback: F) -> RecvHandler<F> {
    RecvHandler(callback)
}

/// Builds a handler from a pre-send transform; received packets are ignored.
pub fn pre_send<F>(transform: F) -> PreSendHandler<F> {
    PreSendHandler(transform)
}
