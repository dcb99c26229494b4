//! Per-tick execution context provided to systems.
//!
//! A [`SystemContext`] is the only door a running system has into the world.
//! Every read and write is checked against the system's declared
//! [`AccessMask`]. Writes are not applied to the store directly: they are
//! buffered as [`PendingChanges`] and committed by the scheduler once the
//! system's `update` has returned `Ok`, so a failing system leaves no trace
//! and no system ever observes a write made by another system of its wave.

use std::any::Any;
use std::collections::BTreeMap;

use harbor_component::{
    AccessMask, Component, ComponentError, ComponentStore, ComponentTypeId, Entity, EntityRegistry,
};

use crate::error::{AccessKind, SystemError};

/// A buffered component change, erased over the component type.
trait PendingWrite: Send {
    /// Apply the change, returning the write that reverts it.
    fn apply(self: Box<Self>, store: &ComponentStore)
    -> Result<Box<dyn PendingWrite>, ComponentError>;
    fn is_removal(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

/// A buffered set (`Some`) or removal (`None`) of one `T`.
struct Pending<T: Component> {
    entity: Entity,
    value: Option<T>,
}

impl<T: Component> PendingWrite for Pending<T> {
    fn apply(
        self: Box<Self>,
        store: &ComponentStore,
    ) -> Result<Box<dyn PendingWrite>, ComponentError> {
        let previous = match self.value {
            Some(value) => store.set(self.entity, value)?,
            None => store.remove::<T>(self.entity),
        };
        Ok(Box::new(Pending {
            entity: self.entity,
            value: previous,
        }))
    }

    fn is_removal(&self) -> bool {
        self.value.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Outcome of committing a system's [`PendingChanges`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Component writes applied to the store.
    pub applied: usize,
    /// Writes dropped because their entity died before the commit.
    pub skipped: usize,
    /// Entities the system asked to destroy at the end of the tick.
    pub despawned: Vec<Entity>,
}

/// Everything a system changed during one `update` call.
#[derive(Default)]
pub struct PendingChanges {
    writes: BTreeMap<(ComponentTypeId, Entity), Box<dyn PendingWrite>>,
    spawned: Vec<Entity>,
    despawned: Vec<Entity>,
}

impl PendingChanges {
    /// Returns `true` if the system changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.spawned.is_empty() && self.despawned.is_empty()
    }

    /// Number of buffered component writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Entities created during the update.
    #[must_use]
    pub fn spawned(&self) -> &[Entity] {
        &self.spawned
    }

    /// Entities the system asked to destroy.
    #[must_use]
    pub fn despawned(&self) -> &[Entity] {
        &self.despawned
    }

    /// Apply the buffered writes to `store`, skipping entities for which
    /// `alive` returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if the store rejects a write. Writes applied
    /// before the failing one are reverted, so the store is left as it was.
    pub fn commit(
        self,
        store: &ComponentStore,
        alive: impl Fn(Entity) -> bool,
    ) -> Result<Committed, ComponentError> {
        let mut committed = Committed {
            despawned: self.despawned,
            ..Committed::default()
        };
        let mut undo: Vec<Box<dyn PendingWrite>> = Vec::with_capacity(self.writes.len());
        for ((_, entity), write) in self.writes {
            if !alive(entity) {
                committed.skipped += 1;
                continue;
            }
            match write.apply(store) {
                Ok(revert) => {
                    undo.push(revert);
                    committed.applied += 1;
                }
                Err(e) => {
                    // Every reverted type was written a moment ago, so it is registered.
                    for revert in undo.into_iter().rev() {
                        let _ = revert.apply(store);
                    }
                    return Err(e);
                }
            }
        }
        Ok(committed)
    }

    /// Throw the changes away, destroying any entity spawned during the
    /// update. Returns the number of entities rolled back.
    pub fn discard(self, entities: &EntityRegistry) -> usize {
        self.spawned
            .into_iter()
            .filter(|&entity| entities.destroy(entity))
            .count()
    }
}

impl std::fmt::Debug for PendingChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingChanges")
            .field("writes", &self.writes.len())
            .field("spawned", &self.spawned)
            .field("despawned", &self.despawned)
            .finish()
    }
}

/// Context provided to a system on each tick.
pub struct SystemContext<'w> {
    system: &'w str,
    access: AccessMask,
    tick_id: u64,
    dt: f64,
    store: &'w ComponentStore,
    entities: &'w EntityRegistry,
    changes: PendingChanges,
}

impl<'w> SystemContext<'w> {
    /// Create a context for one system for one tick.
    #[must_use]
    pub fn new(
        system: &'w str,
        access: AccessMask,
        tick_id: u64,
        dt: f64,
        store: &'w ComponentStore,
        entities: &'w EntityRegistry,
    ) -> Self {
        Self {
            system,
            access,
            tick_id,
            dt,
            store,
            entities,
            changes: PendingChanges::default(),
        }
    }

    /// The current tick number.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Seconds elapsed since the previous tick.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Name of the running system.
    #[must_use]
    pub fn system_name(&self) -> &str {
        self.system
    }

    /// The access the system was registered with.
    #[must_use]
    pub fn access(&self) -> AccessMask {
        self.access
    }

    fn violation<T: Component>(&self, kind: AccessKind) -> SystemError {
        SystemError::AccessViolation {
            system: self.system.to_string(),
            component: T::type_name(),
            kind,
        }
    }

    /// Resolve `T` for reading. `None` means the type is unknown to the
    /// store and the system is allowed to look anyway.
    fn readable<T: Component>(&self) -> Result<Option<ComponentTypeId>, SystemError> {
        match self.store.id_of::<T>() {
            Some(id) if self.access.can_read(id) => Ok(Some(id)),
            None if self.access.is_universal() => Ok(None),
            _ => Err(self.violation::<T>(AccessKind::Read)),
        }
    }

    fn writable<T: Component>(&self) -> Result<ComponentTypeId, SystemError> {
        match self.store.id_of::<T>() {
            Some(id) if self.access.can_write(id) => Ok(id),
            None if self.access.is_universal() => Ok(self.store.register::<T>()?),
            _ => Err(self.violation::<T>(AccessKind::Write)),
        }
    }

    fn pending<T: Component>(&self, id: ComponentTypeId, entity: Entity) -> Option<&Pending<T>> {
        self.changes
            .writes
            .get(&(id, entity))
            .and_then(|write| write.as_any().downcast_ref::<Pending<T>>())
    }

    /// Returns the entity's `T`, including this system's own pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AccessViolation`] if `T` is not declared.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Option<T>, SystemError> {
        let Some(id) = self.readable::<T>()? else {
            return Ok(None);
        };
        if let Some(pending) = self.pending::<T>(id, entity) {
            return Ok(pending.value.clone());
        }
        Ok(self.store.get::<T>(entity))
    }

    /// Returns `true` if the entity has a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AccessViolation`] if `T` is not declared.
    pub fn has<T: Component>(&self, entity: Entity) -> Result<bool, SystemError> {
        let Some(id) = self.readable::<T>()? else {
            return Ok(false);
        };
        if let Some(pending) = self.pending::<T>(id, entity) {
            return Ok(pending.value.is_some());
        }
        Ok(self.store.has::<T>(entity))
    }

    /// Sorted snapshot of entities that have a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AccessViolation`] if `T` is not declared.
    pub fn entities_with<T: Component>(&self) -> Result<Vec<Entity>, SystemError> {
        let Some(id) = self.readable::<T>()? else {
            return Ok(Vec::new());
        };
        let mut entities = self.store.entities_with::<T>();
        let own = self
            .changes
            .writes
            .range((id, Entity::INVALID)..=(id, Entity::from_raw(u64::MAX)));
        let mut added = Vec::new();
        for (&(_, entity), write) in own {
            if write.is_removal() {
                entities.retain(|&e| e != entity);
            } else {
                added.push(entity);
            }
        }
        entities.extend(added);
        entities.sort_unstable();
        entities.dedup();
        Ok(entities)
    }

    /// Attach `value` to `entity` when the tick commits.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AccessViolation`] if `T` is not declared as written.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), SystemError> {
        let id = self.writable::<T>()?;
        self.changes.writes.insert(
            (id, entity),
            Box::new(Pending {
                entity,
                value: Some(value),
            }),
        );
        Ok(())
    }

    /// Detach the entity's `T` when the tick commits. Returns the value the
    /// system currently sees.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AccessViolation`] if `T` is not declared as written.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, SystemError> {
        let id = self.writable::<T>()?;
        let previous = self.get::<T>(entity)?;
        self.changes
            .writes
            .insert((id, entity), Box::new(Pending::<T> { entity, value: None }));
        Ok(previous)
    }

    /// Create an entity. It exists immediately but is destroyed again if the
    /// update fails.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.create();
        self.changes.spawned.push(entity);
        entity
    }

    /// Request destruction of `entity` once every wave of this tick has run.
    pub fn despawn(&mut self, entity: Entity) {
        if !self.changes.despawned.contains(&entity) {
            self.changes.despawned.push(entity);
        }
    }

    /// Returns `true` if the entity is alive. Despawns requested this tick
    /// have not happened yet.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Consume the context, yielding the buffered changes.
    #[must_use]
    pub fn into_changes(self) -> PendingChanges {
        self.changes
    }
}

impl std::fmt::Debug for SystemContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system", &self.system)
            .field("tick_id", &self.tick_id)
            .field("dt", &self.dt)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}
