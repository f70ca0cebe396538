//! Per-plugin resources and registration points.

use super::{default_database_name, PluginDescription};
use crate::config::{TomlConfig, CONFIG_FILE_NAME};
use crate::cooldown::{self, Cooldown};
use crate::database::Database;
use crate::platform::{CommandManager, EventBus, Platform};
use crate::runner::{AsyncTask, TaskHandle};
use crate::services::MvUtil;
use parking_lot::{Mutex, RwLock};
use proto::handler::PacketHandler;
use proto::{ChannelRegistration, JsonPacketChannel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;
use util::LazyValue;

/// Everything a plugin registers or builds while it runs.
///
/// The context tracks these resources so that [`teardown`](Self::teardown)
/// can release them in a fixed order, whatever made the plugin stop.
/// The command manager, database and configuration are only built on first use.
pub struct PluginContext<P: Platform> {
    description: PluginDescription,
    mv_util: Arc<MvUtil<P>>,
    database_name: Arc<RwLock<String>>,
    command_manager: LazyValue<P::CommandManager>,
    database: LazyValue<Arc<P::Database>>,
    config: LazyValue<RwLock<TomlConfig>>,
    tasks: Mutex<Vec<Box<dyn TaskHandle>>>,
    channels: Mutex<Vec<Arc<dyn ChannelRegistration>>>,
    torn_down: Arc<AtomicBool>,
}

impl<P: Platform> PluginContext<P> {
    pub fn new(description: PluginDescription, mv_util: Arc<MvUtil<P>>) -> Self {
        let database_name = Arc::new(RwLock::new(description.default_database_name()));
        let torn_down = Arc::new(AtomicBool::new(false));

        let command_manager = {
            let mv_util = Arc::clone(&mv_util);
            let description = description.clone();
            let torn_down = Arc::clone(&torn_down);
            LazyValue::new(move || {
                if torn_down.load(Ordering::Acquire) {
                    anyhow::bail!("{} has been disabled, not creating a command manager", description.name);
                }
                mv_util.platform().prepare_command_manager(&description)
            })
        };

        let database = {
            let mv_util = Arc::clone(&mv_util);
            let description = description.clone();
            let database_name = Arc::clone(&database_name);
            let torn_down = Arc::clone(&torn_down);
            LazyValue::new(move || {
                if torn_down.load(Ordering::Acquire) {
                    anyhow::bail!("{} has been disabled, not opening a database", description.name);
                }
                let name = database_name.read().clone();
                mv_util.open_database(&name, &description)
            })
        };

        let config = {
            let path = description.data_folder.join(CONFIG_FILE_NAME);
            let defaults = description.default_config;
            LazyValue::new(move || Ok(RwLock::new(TomlConfig::open(&path, defaults)?)))
        };

        Self {
            description,
            mv_util,
            database_name,
            command_manager,
            database,
            config,
            tasks: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            torn_down,
        }
    }

    pub fn description(&self) -> &PluginDescription {
        &self.description
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn mv_util(&self) -> &Arc<MvUtil<P>> {
        &self.mv_util
    }

    pub fn platform(&self) -> &P {
        self.mv_util.platform()
    }

    pub fn database_name(&self) -> String {
        self.database_name.read().clone()
    }

    /// Changes the name of the database opened by [`database`](Self::database).
    ///
    /// Has no effect once the database was opened.
    pub fn set_database_name(&self, name: impl Into<String>) {
        if self.database.is_initialised() {
            tracing::warn!(plugin = %self.name(), "Database already opened, ignoring new database name");
            return;
        }
        *self.database_name.write() = name.into();
    }

    pub(crate) fn reset_database_name(&self) {
        self.set_database_name(default_database_name(self.name()));
    }

    /// The plugin's command manager, created on first use.
    ///
    /// Fails once the plugin was torn down, unless it was created before.
    pub fn command_manager(&self) -> anyhow::Result<&P::CommandManager> {
        self.command_manager.get_value()
    }

    /// Registers commands, replacing existing ones of the same name.
    pub fn register_commands<I>(&self, commands: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = <P::CommandManager as CommandManager>::Command>,
    {
        self.register_commands_with(true, commands)
    }

    pub fn register_commands_with<I>(&self, force: bool, commands: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = <P::CommandManager as CommandManager>::Command>,
    {
        if self.is_torn_down() {
            anyhow::bail!("{} has been disabled, refusing to register commands", self.name());
        }
        let manager = self.command_manager()?;
        for command in commands {
            manager.register_command(command, force)?;
        }
        Ok(())
    }

    /// Registers event listeners owned by this plugin.
    ///
    /// After teardown the listeners are dropped instead.
    pub fn listeners<I>(&self, listeners: I)
    where
        I: IntoIterator<Item = <P::EventBus as EventBus>::Listener>,
    {
        if self.is_torn_down() {
            tracing::warn!(plugin = %self.name(), "Listeners registered after teardown, dropping them");
            return;
        }
        let bus = self.platform().event_bus();
        for listener in listeners {
            bus.register_listener(self.name(), listener);
        }
    }

    /// Tracks a channel so its incoming listener is removed on teardown.
    pub fn packet_channel<C>(&self, channel: C) -> Arc<C>
    where
        C: ChannelRegistration + 'static,
    {
        let channel = Arc::new(channel);
        if self.is_torn_down() {
            tracing::warn!(plugin = %self.name(), channel = channel.name(), "Channel registered after teardown");
            channel.unregister_incoming();
        } else {
            self.channels
                .lock()
                .push(Arc::clone(&channel) as Arc<dyn ChannelRegistration>);
        }
        channel
    }

    /// Creates and tracks a JSON channel on the platform transport. Null packets are rejected.
    pub fn json_channel<Pk, H>(&self, name: &str, handler: H) -> Arc<JsonPacketChannel<Pk, P::Transport>>
    where
        Pk: Serialize + DeserializeOwned + 'static,
        H: PacketHandler<Pk, <P::Transport as proto::MessageTransport>::Endpoint> + 'static,
    {
        self.json_channel_with_nulls(name, handler, false)
    }

    pub fn json_channel_with_nulls<Pk, H>(
        &self,
        name: &str,
        handler: H,
        permit_nulls: bool,
    ) -> Arc<JsonPacketChannel<Pk, P::Transport>>
    where
        Pk: Serialize + DeserializeOwned + 'static,
        H: PacketHandler<Pk, <P::Transport as proto::MessageTransport>::Endpoint> + 'static,
    {
        let transport = Arc::clone(self.platform().transport());
        self.packet_channel(JsonPacketChannel::with_nulls(transport, name, handler, permit_nulls))
    }

    /// Tracks a task so it is cancelled on teardown.
    pub fn task<T: TaskHandle + 'static>(&self, task: T) {
        if self.is_torn_down() {
            tracing::warn!(plugin = %self.name(), "Task registered after teardown, cancelling it");
            task.cancel();
            return;
        }
        self.tasks.lock().push(Box::new(task));
    }

    /// Spawns a future on the shared runner and tracks it.
    pub fn spawn_task<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.mv_util.runner().spawn(future);
        self.task(handle.clone());
        handle
    }

    /// Runs blocking work off the main thread.
    pub fn run_async<T, F>(&self, f: F) -> AsyncTask<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.mv_util.runner().run_async(f)
    }

    /// The plugin's database, opened on first use. Not opened after teardown.
    pub fn database(&self) -> anyhow::Result<Arc<P::Database>> {
        self.database.get_value().map(Arc::clone)
    }

    /// The plugin's `config.toml`, read on first use.
    pub fn config(&self) -> anyhow::Result<&RwLock<TomlConfig>> {
        self.config.get_value()
    }

    /// Creates the tables of `cooldowns` in the background.
    ///
    /// Failures are logged; the returned task can be awaited to observe them too.
    pub fn setup_cooldowns<I>(&self, cooldowns: I) -> anyhow::Result<AsyncTask<()>>
    where
        I: IntoIterator<Item = Arc<dyn Cooldown>>,
    {
        let database = self.database()?;
        let cooldowns: Vec<_> = cooldowns.into_iter().collect();
        let plugin = self.name().to_owned();

        Ok(self.run_async(move || {
            for cooldown in &cooldowns {
                if let Err(err) = cooldown::setup_table(database.as_ref(), cooldown.as_ref()) {
                    tracing::warn!(plugin = %plugin, cooldown = %cooldown.name(), "{err:#}");
                    return Err(err);
                }
            }
            Ok(())
        }))
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Releases everything the plugin registered.
    ///
    /// Order: tasks are cancelled, event listeners removed, commands
    /// unregistered (only if the command manager was built), channel
    /// listeners removed, then the database closed (only if it was opened).
    /// Runs at most once; returns whether this call did the work.
    pub fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(plugin = %self.name(), "Tearing down plugin resources");

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.cancel();
        }

        self.platform().event_bus().unregister_listeners(self.name());

        if let Some(manager) = self.command_manager.get_if_initialised() {
            manager.unregister_commands();
        }

        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in &channels {
            channel.unregister_incoming();
        }

        if let Some(database) = self.database.get_if_initialised() {
            self.mv_util.release_database(self.name());
            database.close();
        }

        true
    }
}
