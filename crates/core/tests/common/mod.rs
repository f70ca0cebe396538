//! Recording mock platform shared by the integration tests.

#![allow(dead_code)]

use mvutil::config::{MvUtilConfig, SqlConfig};
use mvutil::database::{Database, DatabaseError, Row, SqlValue, SqliteDatabase};
use mvutil::plugin::{MvPlugin, PluginContext, PluginDescription};
use mvutil::proto::{ChannelRegistration, LoopbackTransport, PROXY_MAX_MESSAGE_SIZE};
use mvutil::{CommandManager, EventBus, HostKind, MvUtil, Platform, TaskHandle};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered log of every collaborator call.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    /// Entries recorded after the first occurrence of `marker`.
    pub fn after(&self, marker: &str) -> Vec<String> {
        let entries = self.entries();
        match entries.iter().position(|e| e == marker) {
            Some(index) => entries[index + 1..].to_vec(),
            None => Vec::new(),
        }
    }
}

pub struct MockCommandManager {
    plugin: String,
    journal: Journal,
}

impl CommandManager for MockCommandManager {
    type Command = String;

    fn register_command(&self, command: String, force: bool) -> anyhow::Result<()> {
        if command == "broken" {
            anyhow::bail!("command 'broken' cannot be registered");
        }
        self.journal.record(format!("command:register:{command}:{force}"));
        Ok(())
    }

    fn unregister_commands(&self) {
        self.journal.record(format!("commands:unregister:{}", self.plugin));
    }
}

pub struct MockEventBus {
    journal: Journal,
    listeners: Mutex<Vec<(String, String)>>,
}

impl MockEventBus {
    pub fn listeners_of(&self, owner: &str) -> Vec<String> {
        self.listeners
            .lock()
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, l)| l.clone())
            .collect()
    }
}

impl EventBus for MockEventBus {
    type Listener = String;

    fn register_listener(&self, owner: &str, listener: String) {
        self.journal.record(format!("listener:register:{owner}:{listener}"));
        self.listeners.lock().push((owner.to_owned(), listener));
    }

    fn unregister_listeners(&self, owner: &str) {
        self.journal.record(format!("listeners:unregister:{owner}"));
        self.listeners.lock().retain(|(o, _)| o != owner);
    }
}

/// In-memory SQLite database that records when it is closed.
pub struct MockDatabase {
    name: String,
    inner: SqliteDatabase,
    journal: Journal,
}

impl Database for MockDatabase {
    fn execute_update(&self, sql: &str, params: &[SqlValue]) -> Result<usize, DatabaseError> {
        self.inner.execute_update(sql, params)
    }

    fn first_row(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, DatabaseError> {
        self.inner.first_row(sql, params)
    }

    fn close(&self) {
        self.journal.record(format!("database:close:{}", self.name));
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

pub struct MockPlatform {
    kind: HostKind,
    journal: Journal,
    bus: MockEventBus,
    transport: Arc<LoopbackTransport<String>>,
}

impl MockPlatform {
    pub fn new(kind: HostKind, journal: Journal) -> Self {
        let transport = Arc::new(LoopbackTransport::new(kind.max_message_size()));
        transport.connect("lobby".to_owned());
        Self {
            kind,
            bus: MockEventBus {
                journal: journal.clone(),
                listeners: Mutex::new(Vec::new()),
            },
            journal,
            transport,
        }
    }

    pub fn loopback(&self) -> &Arc<LoopbackTransport<String>> {
        &self.transport
    }

    pub fn bus(&self) -> &MockEventBus {
        &self.bus
    }
}

impl Platform for MockPlatform {
    type CommandManager = MockCommandManager;
    type Database = MockDatabase;
    type EventBus = MockEventBus;
    type Transport = LoopbackTransport<String>;
    type PubSub = ();

    fn kind(&self) -> HostKind {
        self.kind
    }

    fn event_bus(&self) -> &MockEventBus {
        &self.bus
    }

    fn transport(&self) -> &Arc<LoopbackTransport<String>> {
        &self.transport
    }

    fn pub_sub(&self) -> &() {
        &()
    }

    fn prepare_command_manager(&self, plugin: &PluginDescription) -> anyhow::Result<MockCommandManager> {
        self.journal.record(format!("command_manager:prepare:{}", plugin.name));
        Ok(MockCommandManager {
            plugin: plugin.name.clone(),
            journal: self.journal.clone(),
        })
    }

    fn prepare_database(
        &self,
        database_name: &str,
        _plugin: &PluginDescription,
        sql: &SqlConfig,
    ) -> anyhow::Result<MockDatabase> {
        if database_name == "unreachable" {
            anyhow::bail!("database host unreachable");
        }
        self.journal
            .record(format!("database:open:{}{}", sql.db_prefix, database_name));
        Ok(MockDatabase {
            name: database_name.to_owned(),
            inner: SqliteDatabase::in_memory(database_name)?,
            journal: self.journal.clone(),
        })
    }
}

pub struct MockTask {
    pub name: &'static str,
    pub journal: Journal,
}

impl TaskHandle for MockTask {
    fn cancel(&self) {
        self.journal.record(format!("task:cancel:{}", self.name));
    }

    fn is_finished(&self) -> bool {
        false
    }
}

pub struct MockChannel {
    pub name: &'static str,
    pub journal: Journal,
}

impl ChannelRegistration for MockChannel {
    fn name(&self) -> &str {
        self.name
    }

    fn unregister_incoming(&self) {
        self.journal.record(format!("channel:unregister:{}", self.name));
    }
}

pub fn test_config() -> MvUtilConfig {
    let mut config = MvUtilConfig::default();
    config.runner.worker_threads = 1;
    config.runner.shutdown_grace_secs = 1;
    config
}

pub fn start(kind: HostKind) -> (Arc<MvUtil<MockPlatform>>, Journal) {
    let journal = Journal::default();
    let mv_util = MvUtil::start(MockPlatform::new(kind, journal.clone()), test_config()).unwrap();
    (mv_util, journal)
}

/// How a scripted hook ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    ReturnFalse,
    Error,
    Panic,
}

impl Behavior {
    fn run(self, hook: &str) -> anyhow::Result<bool> {
        match self {
            Self::Succeed => Ok(true),
            Self::ReturnFalse => Ok(false),
            Self::Error => anyhow::bail!("{hook} failed"),
            Self::Panic => panic!("{hook} panicked"),
        }
    }
}

pub type Setup = Box<dyn Fn(&Arc<PluginContext<MockPlatform>>) -> anyhow::Result<()> + Send + Sync>;

/// A plugin whose hooks follow a script and log to the journal.
pub struct ScriptedPlugin {
    pub description: PluginDescription,
    pub journal: Journal,
    pub load: Behavior,
    pub enable: Behavior,
    pub disable: Behavior,
    /// Runs at the start of `load`.
    pub on_load: Option<Setup>,
    /// Runs at the start of `enable`.
    pub on_enable: Option<Setup>,
}

impl ScriptedPlugin {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            description: PluginDescription::new(name, semver::Version::new(1, 0, 0)),
            journal: journal.clone(),
            load: Behavior::Succeed,
            enable: Behavior::Succeed,
            disable: Behavior::Succeed,
            on_load: None,
            on_enable: None,
        }
    }

    pub fn on_load(mut self, setup: impl Fn(&Arc<PluginContext<MockPlatform>>) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.on_load = Some(Box::new(setup));
        self
    }

    pub fn on_enable(mut self, setup: impl Fn(&Arc<PluginContext<MockPlatform>>) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.on_enable = Some(Box::new(setup));
        self
    }
}

impl MvPlugin<MockPlatform> for ScriptedPlugin {
    fn description(&self) -> PluginDescription {
        self.description.clone()
    }

    fn load(&mut self, ctx: &Arc<PluginContext<MockPlatform>>) -> anyhow::Result<bool> {
        self.journal.record(format!("hook:load:{}", ctx.name()));
        if let Some(setup) = &self.on_load {
            setup(ctx)?;
        }
        self.load.run("load")
    }

    fn enable(&mut self, ctx: &Arc<PluginContext<MockPlatform>>) -> anyhow::Result<bool> {
        self.journal.record(format!("hook:enable:{}", ctx.name()));
        if let Some(setup) = &self.on_enable {
            setup(ctx)?;
        }
        self.enable.run("enable")
    }

    fn disable(&mut self, ctx: &Arc<PluginContext<MockPlatform>>) -> anyhow::Result<()> {
        self.journal.record(format!("hook:disable:{}", ctx.name()));
        self.disable.run("disable").map(|_| ())
    }
}
