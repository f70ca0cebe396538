//! Host platform abstraction.
//!
//! Everything MV-Util needs from the proxy or backend host is expressed as a
//! collaborator trait here. A host integration implements [`Platform`] once
//! and hands it to [`MvUtil::start`](crate::MvUtil::start).

use crate::config::SqlConfig;
use crate::database::Database;
use crate::plugin::PluginDescription;
use proto::{MessageTransport, BACKEND_MAX_MESSAGE_SIZE, PROXY_MAX_MESSAGE_SIZE};
use std::sync::Arc;

/// Which tier of the network the host process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// The proxy that routes players between backend servers.
    Proxy,
    /// A backend game server.
    Backend,
}

impl HostKind {
    /// Maximum plugin message size of this tier's transport.
    pub const fn max_message_size(self) -> usize {
        match self {
            Self::Proxy => PROXY_MAX_MESSAGE_SIZE,
            Self::Backend => BACKEND_MAX_MESSAGE_SIZE,
        }
    }
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proxy => write!(f, "proxy"),
            Self::Backend => write!(f, "backend"),
        }
    }
}

/// A command framework instance bound to one plugin.
pub trait CommandManager: Send + Sync + 'static {
    type Command: Send + 'static;

    /// Registers a command. With `force` set, existing commands of the same name are replaced.
    fn register_command(&self, command: Self::Command, force: bool) -> anyhow::Result<()>;

    /// Unregisters every command registered through this manager.
    fn unregister_commands(&self);
}

/// The host's event bus.
pub trait EventBus: Send + Sync + 'static {
    type Listener: Send + 'static;

    /// Registers a listener owned by the plugin called `owner`.
    fn register_listener(&self, owner: &str, listener: Self::Listener);

    /// Removes every listener owned by `owner`.
    fn unregister_listeners(&self, owner: &str);
}

/// Cross-platform primitives supplied by the host integration.
pub trait Platform: Send + Sync + 'static {
    type CommandManager: CommandManager;
    type Database: Database;
    type EventBus: EventBus;
    type Transport: MessageTransport;
    /// The process-wide pub/sub client.
    type PubSub: Send + Sync + 'static;

    fn kind(&self) -> HostKind;

    fn event_bus(&self) -> &Self::EventBus;

    fn transport(&self) -> &Arc<Self::Transport>;

    fn pub_sub(&self) -> &Self::PubSub;

    /// Creates and configures (formats, locales) a command manager for `plugin`.
    fn prepare_command_manager(&self, plugin: &PluginDescription) -> anyhow::Result<Self::CommandManager>;

    /// Opens the database called `database_name` on behalf of `plugin`.
    fn prepare_database(
        &self,
        database_name: &str,
        plugin: &PluginDescription,
        sql: &SqlConfig,
    ) -> anyhow::Result<Self::Database>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_message_sizes() {
        assert_eq!(HostKind::Proxy.max_message_size(), 32_766);
        assert!(HostKind::Backend.max_message_size() > HostKind::Proxy.max_message_size());
        assert_eq!(HostKind::Proxy.to_string(), "proxy");
    }
}
