//! Plugin lifecycle, packet channels and shared services for Minecraft
//! proxy and backend plugins.
//!
//! A host integration implements [`Platform`], starts the process-wide
//! [`MvUtil`] services and drives its plugins through a [`PluginRegistry`].

#![warn(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::let_underscore_untyped,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::clone_on_ref_ptr,
    clippy::default_trait_access,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::manual_let_else,
    clippy::redundant_closure_for_method_calls,
    clippy::trivially_copy_pass_by_ref,
    clippy::unused_self
)]

pub mod config;
pub mod cooldown;
pub mod database;
pub mod logging;
pub mod megachunk;
pub mod platform;
pub mod plugin;
pub mod runner;
pub mod services;

pub use proto;
pub use util;

pub use config::{ConfigError, MvUtilConfig, TomlConfig};
pub use cooldown::{Cooldown, CooldownStatus};
pub use database::{Database, DatabaseError, SqlValue, SqliteDatabase};
pub use megachunk::{MegaChunk, MegaChunkSettings};
pub use platform::{CommandManager, EventBus, HostKind, Platform};
pub use plugin::{
    MvPlugin, PhaseOutcome, PluginContext, PluginDescription, PluginErrorState, PluginHandle, PluginRegistry,
    PluginState,
};
pub use runner::{AsyncRunner, AsyncTask, TaskHandle};
pub use services::MvUtil;

/// Version of this library.
pub const MV_UTIL_VERSION: &str = env!("CARGO_PKG_VERSION");
