//! Errors raised by packet channels and transports.

/// Failure of a transport to deliver a payload.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel '{0}' is not registered with the transport")]
    UnregisteredChannel(String),

    #[error("endpoint {0} is not reachable")]
    Unreachable(String),

    #[error("transport failure: {0}")]
    Other(String),
}

/// Errors produced while sending or dispatching packets on a channel.
///
/// Every variant except [`ChannelError::Transport`] indicates misuse of the
/// channel by its owner rather than a transient condition.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel '{channel}' does not permit nulls but attempted null packet")]
    NullNotPermitted { channel: String },

    #[error("payload of {size} bytes on channel '{channel}' exceeds the maximum message size of {max} bytes")]
    MessageTooLarge {
        channel: String,
        size: usize,
        max: usize,
    },

    #[error("failed to serialize packet for channel '{channel}'")]
    Serialize {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChannelError {
    pub(crate) fn null_not_permitted(channel: &str) -> Self {
        Self::NullNotPermitted {
            channel: channel.to_owned(),
        }
    }
}
