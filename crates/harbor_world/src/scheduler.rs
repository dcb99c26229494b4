//! Wave execution for one tick.
//!
//! Each wave of the [`WavePlan`] fans out across the rayon pool, one task per
//! system, and joins before the next wave starts. A system runs against its
//! own [`SystemContext`], so nothing it writes is visible to the rest of its
//! wave. Once the whole wave has returned, the outcomes are committed to the
//! store one system at a time:
//!
//! - `Ok` commits the buffered writes (writes to entities destroyed in the
//!   meantime are skipped) and queues the system's despawns.
//! - `Err` or a panic throws the buffer away, rolls back entities the system
//!   spawned, and bumps its failure counters. The rest of the wave and every
//!   later wave still run.
//!
//! A commit the store rejects counts as a failure too.
//!
//! Cancellation is checked before each wave; an in-flight wave always
//! finishes. Despawns queued by the completed waves, and destructions
//! requested from outside while the tick ran, are applied last.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, error, warn};

use harbor_component::{ComponentStore, Entity, EntityRegistry};
use harbor_system::{PendingChanges, SystemContext};

use crate::registry::SystemEntry;
use crate::resolver::WavePlan;

/// Shared state a tick runs against.
pub struct TickEnv<'a> {
    /// Number of the tick being run.
    pub tick_id: u64,
    /// Seconds since the previous tick.
    pub dt: f64,
    /// Component storage.
    pub store: &'a ComponentStore,
    /// Entity liveness.
    pub entities: &'a EntityRegistry,
    /// Held shared while committing, exclusively while destroying entities.
    pub lifecycle: &'a RwLock<()>,
    /// Set to stop the tick at the next wave boundary.
    pub cancel: &'a AtomicBool,
    /// Dedicated worker pool, or `None` for rayon's global pool.
    pub pool: Option<&'a rayon::ThreadPool>,
    /// Consecutive failures after which a warning is logged (0 = never).
    pub failure_warn_threshold: u64,
    /// Destructions requested from outside the schedule.
    pub deferred: &'a DeferredDestroys,
}

/// How a destroy request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyRequest {
    /// The entity is gone.
    Destroyed,
    /// A tick is running; the entity goes once its last wave has finished.
    Deferred,
    /// The entity was not alive.
    NotAlive,
}

/// Entity destructions requested while a tick may be running.
///
/// Between [`run_tick`] opening and closing the queue, requests are held
/// back so that no system loses an entity halfway through its update.
#[derive(Debug, Default)]
pub struct DeferredDestroys {
    state: Mutex<DeferredState>,
}

#[derive(Debug, Default)]
struct DeferredState {
    in_tick: bool,
    queued: Vec<Entity>,
}

impl DeferredDestroys {
    /// Create a closed queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `entity` if a tick is running, otherwise run `destroy` now.
    ///
    /// The queue stays locked while `destroy` runs, so no tick can start
    /// between the liveness check and the destruction.
    pub fn request(
        &self,
        entity: Entity,
        entities: &EntityRegistry,
        destroy: impl FnOnce() -> bool,
    ) -> DestroyRequest {
        let mut state = self.state.lock();
        if !entities.is_alive(entity) {
            return DestroyRequest::NotAlive;
        }
        if state.in_tick {
            if !state.queued.contains(&entity) {
                state.queued.push(entity);
            }
            return DestroyRequest::Deferred;
        }
        if destroy() {
            DestroyRequest::Destroyed
        } else {
            DestroyRequest::NotAlive
        }
    }

    /// Number of requests waiting for the running tick to end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queued.len()
    }

    fn open(&self) {
        self.state.lock().in_tick = true;
    }

    fn close(&self) -> Vec<Entity> {
        let mut state = self.state.lock();
        state.in_tick = false;
        std::mem::take(&mut state.queued)
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Number of the tick.
    pub tick_id: u64,
    /// Waves that ran to completion.
    pub waves_run: usize,
    /// Systems whose update returned `Ok` and was committed.
    pub systems_succeeded: usize,
    /// Systems whose update failed.
    pub systems_failed: usize,
    /// Component writes committed.
    pub writes_applied: usize,
    /// Component writes dropped because the entity had died.
    pub writes_skipped: usize,
    /// Entities destroyed at the end of the tick, by system despawns or
    /// deferred outside requests.
    pub despawned: usize,
    /// `true` if the tick stopped early.
    pub cancelled: bool,
}

/// Result of one system update, before commit.
struct Outcome {
    elapsed: Duration,
    changes: PendingChanges,
    result: Result<(), String>,
}

/// Run every wave of `plan` over `entries`.
///
/// `plan` must have been computed from `entries` in their current order.
pub fn run_tick(env: &TickEnv<'_>, entries: &mut [SystemEntry], plan: &WavePlan) -> TickReport {
    let mut report = TickReport {
        tick_id: env.tick_id,
        ..TickReport::default()
    };
    let mut despawns: Vec<Entity> = Vec::new();
    env.deferred.open();

    for (wave_idx, wave) in plan.waves.iter().enumerate() {
        if env.cancel.load(Ordering::Acquire) {
            debug!(tick_id = env.tick_id, wave = wave_idx, "tick cancelled");
            report.cancelled = true;
            break;
        }

        let batch: Vec<&mut SystemEntry> = entries
            .iter_mut()
            .enumerate()
            .filter(|(idx, _)| wave.system_indices.contains(idx))
            .map(|(_, entry)| entry)
            .collect();

        debug!(
            tick_id = env.tick_id,
            wave = wave_idx,
            systems = batch.len(),
            "executing wave"
        );

        let results = execute_wave(env, batch);
        for (entry, outcome) in results {
            commit_outcome(env, entry, outcome, &mut report, &mut despawns);
        }
        report.waves_run += 1;
    }

    for entity in env.deferred.close() {
        if !despawns.contains(&entity) {
            despawns.push(entity);
        }
    }
    if !despawns.is_empty() {
        let _guard = env.lifecycle.write();
        for entity in despawns {
            if env.entities.destroy(entity) {
                env.store.remove_all(entity);
                report.despawned += 1;
            }
        }
    }

    report
}

fn execute_wave<'e>(
    env: &TickEnv<'_>,
    mut batch: Vec<&'e mut SystemEntry>,
) -> Vec<(&'e mut SystemEntry, Outcome)> {
    if batch.len() == 1
        && let Some(entry) = batch.pop()
    {
        let outcome = run_system(env, entry);
        return vec![(entry, outcome)];
    }

    let fan_out = move || {
        batch
            .into_par_iter()
            .map(|entry| {
                let outcome = run_system(env, entry);
                (entry, outcome)
            })
            .collect::<Vec<_>>()
    };
    match env.pool {
        Some(pool) => pool.install(fan_out),
        None => fan_out(),
    }
}

fn run_system(env: &TickEnv<'_>, entry: &mut SystemEntry) -> Outcome {
    let started = Instant::now();
    let mut ctx = SystemContext::new(
        &entry.name,
        entry.access,
        env.tick_id,
        env.dt,
        env.store,
        env.entities,
    );
    let system = &mut entry.system;
    let result = match panic::catch_unwind(AssertUnwindSafe(|| system.update(&mut ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    };
    Outcome {
        elapsed: started.elapsed(),
        changes: ctx.into_changes(),
        result,
    }
}

fn commit_outcome(
    env: &TickEnv<'_>,
    entry: &mut SystemEntry,
    outcome: Outcome,
    report: &mut TickReport,
    despawns: &mut Vec<Entity>,
) {
    entry.counters.last_update = outcome.elapsed;

    let Outcome { changes, result, .. } = outcome;
    let spawned = changes.spawned().to_vec();
    let result = match result {
        Ok(()) => {
            let _guard = env.lifecycle.read();
            changes
                .commit(env.store, |entity| env.entities.is_alive(entity))
                .map_err(|e| format!("commit rejected: {e}"))
        }
        Err(message) => Err(message),
    };
    if result.is_err() && !spawned.is_empty() {
        roll_back_spawns(env, &spawned);
    }

    match result {
        Ok(committed) => {
            report.systems_succeeded += 1;
            report.writes_applied += committed.applied;
            report.writes_skipped += committed.skipped;
            for entity in committed.despawned {
                if !despawns.contains(&entity) {
                    despawns.push(entity);
                }
            }
            entry.counters.updates += 1;
            entry.counters.consecutive_failures = 0;
        }
        Err(message) => {
            report.systems_failed += 1;
            entry.counters.failures += 1;
            entry.counters.consecutive_failures += 1;
            error!(
                tick_id = env.tick_id,
                system = %entry.name,
                handle = %entry.handle,
                error = %message,
                "system update failed"
            );
            if env.failure_warn_threshold > 0
                && entry.counters.consecutive_failures == env.failure_warn_threshold
            {
                warn!(
                    tick_id = env.tick_id,
                    system = %entry.name,
                    consecutive_failures = entry.counters.consecutive_failures,
                    "system keeps failing"
                );
            }
            entry.counters.last_error = Some(message);
        }
    }
}

/// Destroy entities a failed system created, with anything attached to them.
fn roll_back_spawns(env: &TickEnv<'_>, spawned: &[Entity]) {
    let _guard = env.lifecycle.write();
    for &entity in spawned {
        if env.entities.destroy(entity) {
            env.store.remove_all(entity);
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
