//! Per-player command cooldowns.
//!
//! A cooldown remembers when each player last ran something and reports
//! whether they have to wait. The record lives either in a plugin database
//! table (`cooldowns_<name>`) or in memory.

use crate::database::{Database, SqlValue};
use anyhow::Context;
use dashmap::DashMap;
use std::borrow::Cow;
use std::time::Duration;
use uuid::Uuid;

/// A named cooldown with a per-player duration.
pub trait Cooldown: Send + Sync {
    /// Name of this cooldown, used to derive its table.
    fn name(&self) -> Cow<'_, str>;

    /// How long `player` has to wait between executions.
    fn duration_for(&self, player: &Uuid) -> Duration;

    fn table_name(&self) -> String {
        format!("cooldowns_{}", self.name())
    }
}

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// The player may go ahead.
    Ready,
    /// The player is on cooldown until `expires_at` (unix millis).
    OnCooldown { expires_at: i64 },
}

impl CooldownStatus {
    pub fn is_on_cooldown(&self) -> bool {
        matches!(self, Self::OnCooldown { .. })
    }

    /// Time left relative to `now_millis`, zero when ready.
    pub fn remaining(&self, now_millis: i64) -> Duration {
        match self {
            Self::Ready => Duration::ZERO,
            Self::OnCooldown { expires_at } => {
                Duration::from_millis(u64::try_from(expires_at - now_millis).unwrap_or(0))
            }
        }
    }
}

/// What a check decided, and the timestamp to store, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownDecision {
    pub status: CooldownStatus,
    pub record: Option<i64>,
}

/// Applies the expiry rule to the last execution time.
///
/// A player who never ran the command is recorded and let through. An expired
/// cooldown is refreshed; with `reset_if_not_expired` an active one is too.
pub fn evaluate(
    duration: Duration,
    last_executed: Option<i64>,
    now_millis: i64,
    reset_if_not_expired: bool,
) -> CooldownDecision {
    let Some(last_executed) = last_executed else {
        return CooldownDecision {
            status: CooldownStatus::Ready,
            record: Some(now_millis),
        };
    };

    let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    let expires_at = last_executed.saturating_add(duration_ms);
    let expired = expires_at <= now_millis;

    CooldownDecision {
        status: if expired {
            CooldownStatus::Ready
        } else {
            CooldownStatus::OnCooldown { expires_at }
        },
        record: (expired || reset_if_not_expired).then_some(now_millis),
    }
}

/// Storage for last-execution timestamps.
pub trait CooldownStore {
    fn last_executed(&self, player: &Uuid) -> anyhow::Result<Option<i64>>;

    fn set_last_executed(&self, player: &Uuid, millis: i64) -> anyhow::Result<()>;
}

/// Checks `player` against `cooldown`, updating `store` as needed.
///
/// Blocks on the store; call it off the main thread when the store is a database.
pub fn check_cooldown<S: CooldownStore + ?Sized>(
    store: &S,
    cooldown: &dyn Cooldown,
    player: &Uuid,
    reset_if_not_expired: bool,
) -> anyhow::Result<CooldownStatus> {
    let now = chrono::Utc::now().timestamp_millis();
    check_cooldown_at(store, cooldown.duration_for(player), player, reset_if_not_expired, now)
}

pub fn check_cooldown_at<S: CooldownStore + ?Sized>(
    store: &S,
    duration: Duration,
    player: &Uuid,
    reset_if_not_expired: bool,
    now_millis: i64,
) -> anyhow::Result<CooldownStatus> {
    let last = store.last_executed(player)?;
    let decision = evaluate(duration, last, now_millis, reset_if_not_expired);
    if let Some(millis) = decision.record {
        store.set_last_executed(player, millis)?;
    }
    Ok(decision.status)
}

/// Creates the table backing `cooldown` if it does not exist yet.
pub fn setup_table<D: Database + ?Sized>(database: &D, cooldown: &dyn Cooldown) -> anyhow::Result<()> {
    let table = cooldown.table_name();
    database
        .execute_update(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 player CHAR(36) NOT NULL, \
                 lastExecuted BIGINT NOT NULL DEFAULT 0, \
                 PRIMARY KEY (player))"
            ),
            &[],
        )
        .with_context(|| format!("error setting up cooldowns table {table}"))?;
    Ok(())
}

/// Cooldown records kept in a plugin database.
pub struct DatabaseCooldowns<'a, D: ?Sized> {
    database: &'a D,
    name: String,
    table: String,
}

impl<'a, D: Database + ?Sized> DatabaseCooldowns<'a, D> {
    /// The table must already exist, see [`setup_table`].
    pub fn new(database: &'a D, cooldown: &dyn Cooldown) -> Self {
        Self {
            database,
            name: cooldown.name().into_owned(),
            table: cooldown.table_name(),
        }
    }
}

impl<D: Database + ?Sized> CooldownStore for DatabaseCooldowns<'_, D> {
    fn last_executed(&self, player: &Uuid) -> anyhow::Result<Option<i64>> {
        let row = self
            .database
            .first_row(
                &format!("SELECT lastExecuted FROM {} WHERE player = ?", self.table),
                &[SqlValue::from(player.to_string())],
            )
            .with_context(|| format!("exception while fetching last executed for cooldown {}", self.name))?;
        Ok(row.and_then(|row| row.get_i64("lastExecuted")))
    }

    fn set_last_executed(&self, player: &Uuid, millis: i64) -> anyhow::Result<()> {
        self.database
            .execute_update(
                &format!(
                    "INSERT INTO {} (player, lastExecuted) VALUES (?, ?) \
                     ON CONFLICT (player) DO UPDATE SET lastExecuted = excluded.lastExecuted",
                    self.table
                ),
                &[SqlValue::from(player.to_string()), SqlValue::from(millis)],
            )
            .with_context(|| format!("exception while setting last executed for cooldown {}", self.name))?;
        Ok(())
    }
}

/// Cooldown records kept in memory, lost on restart.
#[derive(Debug, Default)]
pub struct CooldownMap {
    entries: DashMap<Uuid, i64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self, player: &Uuid) {
        self.entries.remove(player);
    }
}

impl CooldownStore for CooldownMap {
    fn last_executed(&self, player: &Uuid) -> anyhow::Result<Option<i64>> {
        Ok(self.entries.get(player).map(|entry| *entry))
    }

    fn set_last_executed(&self, player: &Uuid, millis: i64) -> anyhow::Result<()> {
        self.entries.insert(*player, millis);
        Ok(())
    }
}
