//! Read-only statistics snapshots.
//!
//! Field names serialize in camelCase so collaborators outside Rust see
//! `entityCount`, `lastTickDurationMs`, and so on.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::SystemEntry;

/// Statistics for one registered system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    /// Registration handle.
    pub handle: u64,
    /// System name.
    pub name: String,
    /// Registration priority.
    pub priority: i32,
    /// Wave the system runs in.
    pub wave: Option<usize>,
    /// Successful updates.
    pub updates: u64,
    /// Failed updates.
    pub failures: u64,
    /// Failed updates since the last success.
    pub consecutive_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Wall time of the most recent update in milliseconds.
    pub last_update_ms: f64,
}

impl From<&SystemEntry> for SystemStats {
    fn from(entry: &SystemEntry) -> Self {
        Self {
            handle: entry.handle.0,
            name: entry.name.clone(),
            priority: entry.priority,
            wave: entry.wave,
            updates: entry.counters.updates,
            failures: entry.counters.failures,
            consecutive_failures: entry.counters.consecutive_failures,
            last_error: entry.counters.last_error.clone(),
            last_update_ms: millis(entry.counters.last_update),
        }
    }
}

/// Snapshot of a world, as returned by
/// [`World::get_stats`](crate::World::get_stats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldStats {
    /// Session the world belongs to.
    pub session_id: Uuid,
    /// Live entities.
    pub entity_count: usize,
    /// Component instances across all types.
    pub component_count: usize,
    /// Registered systems.
    pub system_count: usize,
    /// Duration of the most recent tick in milliseconds.
    pub last_tick_duration_ms: f64,
    /// `true` while the tick loop is active, including while paused.
    pub is_running: bool,
    /// `true` while the tick loop is paused.
    pub is_paused: bool,
    /// Number of the most recent tick.
    pub tick: u64,
    /// Waves in the current plan.
    pub wave_count: usize,
    /// Per-system statistics in registration order.
    pub systems: Vec<SystemStats>,
}

/// The part of [`WorldStats`] maintained by the scheduler.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScheduleSnapshot {
    pub tick: u64,
    pub last_tick_duration: Duration,
    pub wave_count: usize,
    pub systems: Vec<SystemStats>,
}

impl ScheduleSnapshot {
    pub fn capture<'a>(
        tick: u64,
        last_tick_duration: Duration,
        wave_count: usize,
        entries: impl IntoIterator<Item = &'a SystemEntry>,
    ) -> Self {
        Self {
            tick,
            last_tick_duration,
            wave_count,
            systems: entries.into_iter().map(SystemStats::from).collect(),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
