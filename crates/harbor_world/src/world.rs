//! The [`World`]: composition root of the simulation core.
//!
//! A world owns the entity registry, the component store, the registered
//! systems with their wave plan, and the tick loop. Every method takes
//! `&self`, so a world can be shared with collaborators behind an `Arc`.
//!
//! ## Locking
//!
//! - `schedule` (mutex) is held for a whole tick and for registry changes,
//!   so a plan never changes under a running tick.
//! - `deferred` queues [`World::destroy_entity`] calls made while a tick is
//!   running; they are applied after the tick's last wave, so systems never
//!   see an entity disappear mid-update.
//! - `lifecycle` (rwlock) is taken exclusively to destroy entities and to
//!   read statistics, and shared by anything that creates entities or
//!   changes components. An entity destroyed between a system's update and
//!   its commit therefore never regains components from that commit.
//!
//! Locks are always taken in the order `schedule`, `deferred`, `lifecycle`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use harbor_component::{
    AccessMode, Component, ComponentStore, ComponentTypeId, Entity, EntityRegistry,
};
use harbor_system::{System, SystemConfig};

use crate::config::WorldConfig;
use crate::error::{RegistrationError, WorldError};
use crate::registry::{SystemEntry, SystemHandle, SystemRegistry};
use crate::resolver::{PlanInput, WavePlan, compute_waves};
use crate::scheduler::{self, DeferredDestroys, DestroyRequest, TickEnv, TickReport, panic_message};
use crate::stats::{ScheduleSnapshot, WorldStats, millis};
use crate::tick::{self, RunState, TickTarget};

/// Registered systems, their plan, and the tick counter.
#[derive(Debug, Default)]
struct Schedule {
    registry: SystemRegistry,
    plan: WavePlan,
    tick_id: u64,
}

impl Schedule {
    /// Recompute the plan and record each system's wave.
    fn replan(&mut self) {
        let inputs: Vec<PlanInput> = self
            .registry
            .entries()
            .iter()
            .map(|entry| PlanInput {
                priority: entry.priority,
                access: entry.access,
            })
            .collect();
        self.plan = compute_waves(&inputs);

        let entries = self.registry.entries_mut();
        for entry in entries.iter_mut() {
            entry.wave = None;
        }
        for (wave_idx, wave) in self.plan.waves.iter().enumerate() {
            for &idx in &wave.system_indices {
                if let Some(entry) = entries.get_mut(idx) {
                    entry.wave = Some(wave_idx);
                }
            }
        }
    }
}

/// State shared between the [`World`] handle and its tick driver.
struct WorldShared {
    session_id: Uuid,
    config: WorldConfig,
    entities: EntityRegistry,
    components: ComponentStore,
    lifecycle: RwLock<()>,
    deferred: DeferredDestroys,
    schedule: Mutex<Schedule>,
    pool: Option<rayon::ThreadPool>,
    cancel: AtomicBool,
    running: AtomicBool,
    disposed: AtomicBool,
    stats: RwLock<ScheduleSnapshot>,
}

impl WorldShared {
    fn tick(&self, dt: f64) -> Option<TickReport> {
        let started = Instant::now();
        let mut guard = self.schedule.lock();
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }
        let schedule = &mut *guard;
        schedule.tick_id += 1;
        let tick_id = schedule.tick_id;

        let env = TickEnv {
            tick_id,
            dt,
            store: &self.components,
            entities: &self.entities,
            lifecycle: &self.lifecycle,
            cancel: &self.cancel,
            pool: self.pool.as_ref(),
            failure_warn_threshold: self.config.failure_warn_threshold,
            deferred: &self.deferred,
        };
        let report = scheduler::run_tick(&env, schedule.registry.entries_mut(), &schedule.plan);
        let elapsed = started.elapsed();
        self.publish(schedule, Some(elapsed));

        debug!(
            session = %self.session_id,
            tick_id,
            dt,
            elapsed_ms = millis(elapsed),
            waves = report.waves_run,
            failed = report.systems_failed,
            "tick complete"
        );
        Some(report)
    }

    /// Refresh the statistics snapshot from `schedule`.
    fn publish(&self, schedule: &Schedule, last_tick_duration: Option<Duration>) {
        let mut stats = self.stats.write();
        let duration = last_tick_duration.unwrap_or(stats.last_tick_duration);
        *stats = ScheduleSnapshot::capture(
            schedule.tick_id,
            duration,
            schedule.plan.len(),
            schedule.registry.entries(),
        );
    }

    fn replan(&self, schedule: &mut Schedule) {
        schedule.replan();
        self.publish(schedule, None);
        info!(
            session = %self.session_id,
            waves = schedule.plan.len(),
            systems = schedule.registry.len(),
            "recomputed wave plan"
        );
    }
}

impl TickTarget for WorldShared {
    fn run_tick(&self, dt: f64) -> bool {
        self.tick(dt).is_some_and(|report| !report.cancelled)
    }

    fn loop_finished(&self, ticks: u64) {
        self.cancel.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
        debug!(session = %self.session_id, ticks, "tick driver exited");
    }
}

/// The simulation world.
pub struct World {
    shared: Arc<WorldShared>,
    control: watch::Sender<RunState>,
    driver: Mutex<Option<JoinHandle<u64>>>,
}

impl World {
    /// Create a world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Config`] for an invalid configuration, or
    /// [`WorldError::ThreadPool`] if a dedicated pool cannot be built.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let pool = match config.worker_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|idx| format!("harbor-worker-{idx}"))
                    .build()?,
            ),
            None => None,
        };
        let session_id = Uuid::new_v4();
        info!(
            session = %session_id,
            tick_rate = config.tick_rate,
            max_ticks = config.max_ticks,
            worker_threads = ?config.worker_threads,
            "world created"
        );

        let (control, _) = watch::channel(RunState::Stopped);
        Ok(Self {
            shared: Arc::new(WorldShared {
                session_id,
                config,
                entities: EntityRegistry::new(),
                components: ComponentStore::new(),
                lifecycle: RwLock::new(()),
                deferred: DeferredDestroys::new(),
                schedule: Mutex::new(Schedule::default()),
                pool,
                cancel: AtomicBool::new(false),
                running: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                stats: RwLock::new(ScheduleSnapshot::default()),
            }),
            control,
            driver: Mutex::new(None),
        })
    }

    /// Identifier of this world's session, carried on its log lines.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// The configuration the world was created with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.shared.config
    }

    // --- systems ---

    /// Register a component type ahead of use.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Component`] if the type table is full.
    pub fn register_component<T: Component>(&self) -> Result<ComponentTypeId, WorldError> {
        Ok(self.shared.components.register::<T>()?)
    }

    /// Validate, initialize, and schedule a system.
    ///
    /// The wave plan is recomputed before this returns; the system first
    /// runs on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] if the access declaration is empty and
    /// not commutative, a declared type cannot be registered, `initialize`
    /// fails, or the world is disposed. A rejected system is dropped.
    pub fn register_system<S: System + 'static>(
        &self,
        config: SystemConfig,
        system: S,
    ) -> Result<SystemHandle, RegistrationError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(RegistrationError::Disposed);
        }
        let SystemConfig {
            name,
            access,
            priority,
        } = config;

        if access.mode() == AccessMode::Declared && access.is_empty() {
            return Err(RegistrationError::EmptyAccess { name });
        }
        let mask = match access.resolve(&self.shared.components) {
            Ok(mask) => mask,
            Err(source) => return Err(RegistrationError::Access { name, source }),
        };

        let mut system: Box<dyn System> = Box::new(system);
        match panic::catch_unwind(AssertUnwindSafe(|| system.initialize())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(RegistrationError::Initialize {
                    name,
                    source: e.into(),
                });
            }
            Err(payload) => {
                return Err(RegistrationError::Initialize {
                    name,
                    source: format!("panicked: {}", panic_message(payload.as_ref())).into(),
                });
            }
        }

        let mut schedule = self.shared.schedule.lock();
        let handle = schedule.registry.register(name.clone(), priority, mask, system);
        self.shared.replan(&mut schedule);
        info!(
            session = %self.shared.session_id,
            system = %name,
            %handle,
            priority,
            reads = ?access.read_names(),
            writes = ?access.write_names(),
            mode = ?mask.mode,
            "registered system"
        );
        Ok(handle)
    }

    /// Remove a system, dispose it, and recompute the plan.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownSystem`] if the handle is not registered.
    pub fn unregister_system(&self, handle: SystemHandle) -> Result<(), WorldError> {
        let entry = {
            let mut schedule = self.shared.schedule.lock();
            let entry = schedule
                .registry
                .unregister(handle)
                .ok_or(WorldError::UnknownSystem(handle))?;
            self.shared.replan(&mut schedule);
            entry
        };
        info!(session = %self.shared.session_id, system = %entry.name, %handle, "unregistered system");
        dispose_system(self.shared.session_id, entry);
        Ok(())
    }

    /// The current plan as system names per wave.
    #[must_use]
    pub fn wave_plan(&self) -> Vec<Vec<String>> {
        let schedule = self.shared.schedule.lock();
        let entries = schedule.registry.entries();
        schedule
            .plan
            .waves
            .iter()
            .map(|wave| {
                wave.system_indices
                    .iter()
                    .filter_map(|&idx| entries.get(idx).map(|entry| entry.name.clone()))
                    .collect()
            })
            .collect()
    }

    // --- entities ---

    /// Create an entity.
    #[must_use]
    pub fn create_entity(&self) -> Entity {
        let _guard = self.shared.lifecycle.read();
        self.shared.entities.create()
    }

    /// Destroy an entity together with all of its components. Returns
    /// `false` if it was not alive.
    ///
    /// While a tick is running the entity stays visible to that tick's
    /// systems and is destroyed once its last wave has finished; otherwise
    /// it is gone when this returns.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        let shared = &self.shared;
        let request = shared.deferred.request(entity, &shared.entities, || {
            let _guard = shared.lifecycle.write();
            if !shared.entities.destroy(entity) {
                return false;
            }
            let removed = shared.components.remove_all(entity);
            debug!(session = %shared.session_id, %entity, components = removed, "destroyed entity");
            true
        });
        if request == DestroyRequest::Deferred {
            debug!(session = %shared.session_id, %entity, "destroy deferred to end of tick");
        }
        request != DestroyRequest::NotAlive
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.shared.entities.is_alive(entity)
    }

    /// Snapshot of all live entities, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.shared.entities.all()
    }

    // --- components ---

    /// Attach `value` to `entity`, returning the value it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DeadEntity`] if the entity is not alive, or
    /// [`WorldError::Component`] if `T` cannot be registered.
    pub fn set_component<T: Component>(
        &self,
        entity: Entity,
        value: T,
    ) -> Result<Option<T>, WorldError> {
        let _guard = self.shared.lifecycle.read();
        if !self.shared.entities.is_alive(entity) {
            return Err(WorldError::DeadEntity(entity));
        }
        Ok(self.shared.components.set(entity, value)?)
    }

    /// The entity's `T`, or `None` if it has none or is not alive.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        self.shared.components.get::<T>(entity)
    }

    /// Returns `true` if the entity has a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.shared.components.has::<T>(entity)
    }

    /// Detach and return the entity's `T`.
    pub fn remove_component<T: Component>(&self, entity: Entity) -> Option<T> {
        let _guard = self.shared.lifecycle.read();
        self.shared.components.remove::<T>(entity)
    }

    /// Sorted snapshot of entities that have a `T`.
    #[must_use]
    pub fn query_entities_with<T: Component>(&self) -> Vec<Entity> {
        self.shared.components.entities_with::<T>()
    }

    // --- ticking ---

    /// Run exactly one tick with the given `dt`, on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Disposed`] after [`dispose`](Self::dispose).
    pub fn step(&self, dt: f64) -> Result<TickReport, WorldError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(WorldError::Disposed);
        }
        self.shared.tick(dt).ok_or(WorldError::Disposed)
    }

    /// Start the tick loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::AlreadyRunning`] while a previous loop has not
    /// exited yet (see [`join`](Self::join)), [`WorldError::NoRuntime`]
    /// outside a runtime, or [`WorldError::Disposed`].
    pub fn start(&self) -> Result<(), WorldError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(WorldError::Disposed);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WorldError::NoRuntime)?;

        let mut driver = self.driver.lock();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(WorldError::AlreadyRunning);
        }
        self.shared.cancel.store(false, Ordering::Release);
        self.control.send_replace(RunState::Running);

        let interval = self.shared.config.tick_interval();
        *driver = Some(runtime.spawn(tick::drive(
            Arc::clone(&self.shared),
            self.control.subscribe(),
            interval,
            self.shared.config.max_ticks,
        )));
        info!(session = %self.shared.session_id, "tick loop started");
        Ok(())
    }

    /// Stop the tick loop. A wave already executing finishes; no further
    /// wave or tick starts.
    pub fn stop(&self) {
        if self.shared.running.load(Ordering::Acquire) {
            self.shared.cancel.store(true, Ordering::Release);
        }
        self.control.send_replace(RunState::Stopped);
    }

    /// Suspend ticking without touching any state.
    pub fn pause(&self) {
        if self.is_running() {
            self.control.send_replace(RunState::Paused);
            info!(session = %self.shared.session_id, "tick loop paused");
        }
    }

    /// Continue after [`pause`](Self::pause).
    pub fn resume(&self) {
        if self.is_paused() {
            self.control.send_replace(RunState::Running);
            info!(session = %self.shared.session_id, "tick loop resumed");
        }
    }

    /// Wait for the tick loop to exit. Returns the number of ticks it ran,
    /// or `None` if no loop was started since the last join.
    pub async fn join(&self) -> Option<u64> {
        let handle = self.driver.lock().take()?;
        match handle.await {
            Ok(ticks) => Some(ticks),
            Err(e) => {
                error!(session = %self.shared.session_id, error = %e, "tick driver failed");
                None
            }
        }
    }

    /// Returns `true` while the tick loop is active, including while paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Returns `true` while the tick loop is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.is_running() && *self.control.borrow() == RunState::Paused
    }

    /// Tear the world down: stop the loop, dispose every system, and clear
    /// all entities and components. Later calls do nothing.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop();

        let entries = {
            let mut schedule = self.shared.schedule.lock();
            let entries = schedule.registry.drain();
            schedule.replan();
            self.shared.publish(&schedule, None);
            entries
        };
        let system_count = entries.len();
        for entry in entries {
            dispose_system(self.shared.session_id, entry);
        }

        {
            let _guard = self.shared.lifecycle.write();
            self.shared.components.clear();
            self.shared.entities.clear();
        }
        info!(session = %self.shared.session_id, systems = system_count, "world disposed");
    }

    // --- statistics ---

    /// Consistent snapshot of the world's statistics.
    ///
    /// Taken between ticks with entity and component changes held off, so
    /// the counts and the per-system figures describe the same moment.
    /// Waits for an in-flight tick to finish.
    #[must_use]
    pub fn get_stats(&self) -> WorldStats {
        let _schedule = self.shared.schedule.lock();
        let _lifecycle = self.shared.lifecycle.write();
        let snapshot = self.shared.stats.read().clone();
        let entity_count = self.shared.entities.len();
        let component_count = self.shared.components.component_count();
        WorldStats {
            session_id: self.shared.session_id,
            entity_count,
            component_count,
            system_count: snapshot.systems.len(),
            last_tick_duration_ms: millis(snapshot.last_tick_duration),
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            tick: snapshot.tick,
            wave_count: snapshot.wave_count,
            systems: snapshot.systems,
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("session_id", &self.shared.session_id)
            .field("entities", &self.shared.entities.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn dispose_system(session: Uuid, mut entry: SystemEntry) {
    let system = &mut entry.system;
    match panic::catch_unwind(AssertUnwindSafe(|| system.dispose())) {
        Ok(Ok(())) => debug!(%session, system = %entry.name, "disposed system"),
        Ok(Err(e)) => warn!(
            %session,
            system = %entry.name,
            error = %format!("{e:#}"),
            "system dispose failed"
        ),
        Err(payload) => warn!(
            %session,
            system = %entry.name,
            error = %panic_message(payload.as_ref()),
            "system dispose panicked"
        ),
    }
}
