//! Typed packet channels over the plugin messaging transport.
//!
//! A transport only moves `(channel name, bytes)` pairs between endpoints.
//! [`PacketChannel`]s layer typed packets on top of it, with an empty payload
//! standing for the null packet.

#![warn(
    // missing_docs,
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::if_then_some_else_none,
    clippy::let_underscore_untyped,
    clippy::missing_assert_message,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::str_to_string,
    clippy::clone_on_ref_ptr,
    clippy::default_trait_access,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::manual_let_else,
    clippy::missing_fields_in_debug,
    clippy::redundant_closure_for_method_calls,
    clippy::single_match_else,
    clippy::trivially_copy_pass_by_ref,
    clippy::unused_self
)]

pub mod channel;
pub mod error;
pub mod handler;
pub mod json;
pub mod loopback;
pub mod transport;

pub use bytes;

pub use channel::{ChannelRegistration, PacketChannel};
pub use error::{ChannelError, TransportError};
pub use handler::PacketHandler;
pub use json::JsonPacketChannel;
pub use loopback::{LoopbackTransport, SentMessage};
pub use transport::{
    ListenerId, MessageListener, MessageTransport, BACKEND_MAX_MESSAGE_SIZE, PROXY_MAX_MESSAGE_SIZE,
};
