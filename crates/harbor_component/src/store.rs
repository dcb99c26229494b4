//! Per-type component storage.
//!
//! The [`ComponentStore`] keeps one [`Column`] per component type in a
//! fixed-size array indexed by [`ComponentTypeId`]. Each column owns its own
//! lock, so systems touching different component types never contend, while
//! writes to the same type are serialized by that type's lock alone.
//!
//! ## Structural gate
//!
//! [`ComponentStore::remove_all`] has to look atomic to anyone enumerating
//! entities. A store-wide gate is taken exclusively by `remove_all` and shared
//! by [`ComponentStore::entities_with`] and friends; plain reads and writes of
//! a single component never touch it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::component::{Component, ComponentMask, ComponentTypeId, MAX_COMPONENT_TYPES};
use crate::entity::Entity;
use crate::error::ComponentError;

/// Type-erased view of a column, used for whole-entity operations.
trait ErasedColumn: Send + Sync {
    fn name(&self) -> &'static str;
    fn remove_entity(&self, entity: Entity) -> bool;
    fn contains(&self, entity: Entity) -> bool;
    fn entities(&self) -> Vec<Entity>;
    fn len(&self) -> usize;
    fn clear(&self);
    fn as_any(&self) -> &dyn Any;
}

/// Storage for every instance of a single component type.
#[derive(Debug)]
struct Column<T: Component> {
    rows: RwLock<HashMap<Entity, T>>,
}

impl<T: Component> Column<T> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn name(&self) -> &'static str {
        T::type_name()
    }

    fn remove_entity(&self, entity: Entity) -> bool {
        self.rows.write().remove(&entity).is_some()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.rows.read().contains_key(&entity)
    }

    fn entities(&self) -> Vec<Entity> {
        self.rows.read().keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.rows.read().len()
    }

    fn clear(&self) {
        self.rows.write().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Thread-safe storage for all component instances, keyed by entity.
///
/// Attaching a second value of the same type to an entity overwrites the
/// first; [`ComponentStore::set`] hands back the replaced value.
pub struct ComponentStore {
    /// Maps Rust types to their dense ids.
    ids: DashMap<TypeId, ComponentTypeId>,
    /// One slot per possible component type, filled once at registration.
    columns: Box<[OnceLock<Box<dyn ErasedColumn>>]>,
    /// Number of filled slots.
    type_count: AtomicUsize,
    /// Serializes id assignment.
    registration: Mutex<()>,
    /// Taken exclusively by `remove_all`, shared by entity enumeration.
    gate: RwLock<()>,
}

impl ComponentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            columns: (0..MAX_COMPONENT_TYPES).map(|_| OnceLock::new()).collect(),
            type_count: AtomicUsize::new(0),
            registration: Mutex::new(()),
            gate: RwLock::new(()),
        }
    }

    /// Register a component type, returning its id.
    ///
    /// Registering an already known type returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TooManyTypes`] once [`MAX_COMPONENT_TYPES`]
    /// distinct types have been registered.
    pub fn register<T: Component>(&self) -> Result<ComponentTypeId, ComponentError> {
        if let Some(id) = self.id_of::<T>() {
            return Ok(id);
        }

        let _guard = self.registration.lock();
        // Another thread may have won the race while we waited.
        if let Some(id) = self.id_of::<T>() {
            return Ok(id);
        }

        let index = self.type_count.load(Ordering::Acquire);
        if index >= MAX_COMPONENT_TYPES {
            return Err(ComponentError::TooManyTypes {
                name: T::type_name(),
                max: MAX_COMPONENT_TYPES,
            });
        }

        let column: Box<dyn ErasedColumn> = Box::new(Column::<T>::new());
        if self.columns[index].set(column).is_err() {
            return Err(ComponentError::SlotOccupied { index });
        }
        let id = ComponentTypeId(index as u32);
        self.type_count.store(index + 1, Ordering::Release);
        self.ids.insert(TypeId::of::<T>(), id);
        Ok(id)
    }

    /// Returns the id of `T` if it has been registered.
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.ids.get(&TypeId::of::<T>()).map(|id| *id)
    }

    /// Returns the name of a registered component type.
    #[must_use]
    pub fn component_name(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.erased(id).map(|column| column.name())
    }

    /// Number of registered component types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.type_count.load(Ordering::Acquire)
    }

    /// Mask of every registered component type.
    #[must_use]
    pub fn registered_mask(&self) -> ComponentMask {
        (0..self.type_count() as u32).map(ComponentTypeId).collect()
    }

    fn erased(&self, id: ComponentTypeId) -> Option<&dyn ErasedColumn> {
        self.columns.get(id.index())?.get().map(|column| column.as_ref())
    }

    fn column<T: Component>(&self) -> Option<&Column<T>> {
        let id = self.id_of::<T>()?;
        self.erased(id)?.as_any().downcast_ref::<Column<T>>()
    }

    fn registered_columns(&self) -> impl Iterator<Item = &dyn ErasedColumn> {
        self.columns[..self.type_count()]
            .iter()
            .filter_map(|slot| slot.get().map(|column| column.as_ref()))
    }

    /// Attach `value` to `entity`, replacing any existing value of the same
    /// type. Returns the replaced value.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TooManyTypes`] if `T` is new and the store is full.
    pub fn set<T: Component>(&self, entity: Entity, value: T) -> Result<Option<T>, ComponentError> {
        self.register::<T>()?;
        let column = self
            .column::<T>()
            .ok_or(ComponentError::Unregistered { name: T::type_name() })?;
        Ok(column.rows.write().insert(entity, value))
    }

    /// Returns a clone of the entity's `T`, if present.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<T> {
        self.column::<T>()?.rows.read().get(&entity).cloned()
    }

    /// Run `f` against the entity's `T` without cloning it.
    pub fn with<T: Component, R>(&self, entity: Entity, f: impl FnOnce(&T) -> R) -> Option<R> {
        let column = self.column::<T>()?;
        let rows = column.rows.read();
        rows.get(&entity).map(f)
    }

    /// Mutate the entity's `T` in place.
    pub fn update<T: Component, R>(&self, entity: Entity, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let column = self.column::<T>()?;
        let mut rows = column.rows.write();
        rows.get_mut(&entity).map(f)
    }

    /// Detach and return the entity's `T`.
    pub fn remove<T: Component>(&self, entity: Entity) -> Option<T> {
        self.column::<T>()?.rows.write().remove(&entity)
    }

    /// Returns `true` if the entity has a `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.column::<T>()
            .is_some_and(|column| column.rows.read().contains_key(&entity))
    }

    /// Returns `true` if the entity has a component with the given id.
    #[must_use]
    pub fn has_id(&self, entity: Entity, id: ComponentTypeId) -> bool {
        self.erased(id).is_some_and(|column| column.contains(entity))
    }

    /// Sorted snapshot of every entity that has a `T`.
    #[must_use]
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        let _gate = self.gate.read();
        let Some(column) = self.column::<T>() else {
            return Vec::new();
        };
        let mut entities = column.entities();
        entities.sort_unstable();
        entities
    }

    /// Sorted snapshot of every entity that has all component types in `mask`.
    ///
    /// An empty mask matches nothing.
    #[must_use]
    pub fn entities_with_all(&self, mask: ComponentMask) -> Vec<Entity> {
        let _gate = self.gate.read();
        let mut columns = Vec::with_capacity(mask.len());
        for id in mask.iter() {
            match self.erased(id) {
                Some(column) => columns.push(column),
                None => return Vec::new(),
            }
        }
        // Start from the smallest column and check the rest.
        columns.sort_by_key(|column| column.len());
        let Some((first, rest)) = columns.split_first() else {
            return Vec::new();
        };
        let mut entities: Vec<Entity> = first
            .entities()
            .into_iter()
            .filter(|&entity| rest.iter().all(|column| column.contains(entity)))
            .collect();
        entities.sort_unstable();
        entities
    }

    /// Remove every component attached to `entity` as one step with respect
    /// to entity enumeration. Returns the number of components removed.
    pub fn remove_all(&self, entity: Entity) -> usize {
        let _gate = self.gate.write();
        self.registered_columns()
            .filter(|column| column.remove_entity(entity))
            .count()
    }

    /// Number of `T` instances stored.
    #[must_use]
    pub fn len_of<T: Component>(&self) -> usize {
        self.column::<T>().map_or(0, |column| column.rows.read().len())
    }

    /// Total number of component instances across all types.
    #[must_use]
    pub fn component_count(&self) -> usize {
        let _gate = self.gate.read();
        self.registered_columns().map(|column| column.len()).sum()
    }

    /// Drop every component instance. Registered types keep their ids.
    pub fn clear(&self) {
        let _gate = self.gate.write();
        for column in self.registered_columns() {
            column.clear();
        }
    }
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.registered_columns().map(|column| column.name()).collect();
        f.debug_struct("ComponentStore")
            .field("types", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Cargo(u32);

    impl Component for Cargo {
        fn type_name() -> &'static str {
            "Cargo"
        }
    }

    #[test]
    fn test_register_assigns_dense_ids() {
        let store = ComponentStore::new();
        let p = store.register::<Position>().unwrap();
        let v = store.register::<Velocity>().unwrap();
        assert_eq!(p, ComponentTypeId(0));
        assert_eq!(v, ComponentTypeId(1));
        // Re-registering is stable.
        assert_eq!(store.register::<Position>().unwrap(), p);
        assert_eq!(store.type_count(), 2);
        assert_eq!(store.component_name(v), Some("Velocity"));
    }

    #[test]
    fn test_set_then_get() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(1);
        store.set(e, Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(store.get::<Position>(e), Some(Position { x: 1.0, y: 2.0 }));
        assert!(store.has::<Position>(e));
        assert!(!store.has::<Velocity>(e));
    }

    #[test]
    fn test_set_overwrites() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(1);
        assert_eq!(store.set(e, Cargo(10)).unwrap(), None);
        assert_eq!(store.set(e, Cargo(20)).unwrap(), Some(Cargo(10)));
        assert_eq!(store.get::<Cargo>(e), Some(Cargo(20)));
        assert_eq!(store.len_of::<Cargo>(), 1);
    }

    #[test]
    fn test_unknown_type_reads_are_empty() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(1);
        assert_eq!(store.get::<Cargo>(e), None);
        assert_eq!(store.remove::<Cargo>(e), None);
        assert!(store.entities_with::<Cargo>().is_empty());
    }

    #[test]
    fn test_remove() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(3);
        store.set(e, Cargo(5)).unwrap();
        assert_eq!(store.remove::<Cargo>(e), Some(Cargo(5)));
        assert!(!store.has::<Cargo>(e));
        assert_eq!(store.remove::<Cargo>(e), None);
    }

    #[test]
    fn test_update_in_place() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(1);
        store.set(e, Position { x: 0.0, y: 0.0 }).unwrap();
        store.update::<Position, _>(e, |p| p.x += 4.0);
        assert_eq!(store.with::<Position, _>(e, |p| p.x), Some(4.0));
        assert_eq!(store.update::<Position, _>(Entity::from_raw(9), |p| p.x), None);
    }

    #[test]
    fn test_entities_with_and_all() {
        let store = ComponentStore::new();
        let (a, b, c) = (Entity::from_raw(1), Entity::from_raw(2), Entity::from_raw(3));
        store.set(c, Position { x: 0.0, y: 0.0 }).unwrap();
        store.set(a, Position { x: 0.0, y: 0.0 }).unwrap();
        store.set(a, Velocity { x: 1.0, y: 1.0 }).unwrap();
        store.set(b, Velocity { x: 1.0, y: 1.0 }).unwrap();

        assert_eq!(store.entities_with::<Position>(), vec![a, c]);

        let mask = ComponentMask::new()
            .with(store.id_of::<Position>().unwrap())
            .with(store.id_of::<Velocity>().unwrap());
        assert_eq!(store.entities_with_all(mask), vec![a]);
        assert!(store.entities_with_all(ComponentMask::EMPTY).is_empty());
    }

    #[test]
    fn test_remove_all() {
        let store = ComponentStore::new();
        let e = Entity::from_raw(1);
        let other = Entity::from_raw(2);
        store.set(e, Position { x: 0.0, y: 0.0 }).unwrap();
        store.set(e, Velocity { x: 0.0, y: 0.0 }).unwrap();
        store.set(e, Cargo(1)).unwrap();
        store.set(other, Cargo(2)).unwrap();

        assert_eq!(store.remove_all(e), 3);
        assert!(!store.has::<Position>(e));
        assert!(!store.has::<Velocity>(e));
        assert!(!store.has::<Cargo>(e));
        assert_eq!(store.entities_with::<Cargo>(), vec![other]);
        assert_eq!(store.component_count(), 1);
        assert_eq!(store.remove_all(e), 0);
    }

    #[test]
    fn test_remove_all_never_observed_partially() {
        let store = Arc::new(ComponentStore::new());
        let entities: Vec<Entity> = (1..=200).map(Entity::from_raw).collect();
        for &e in &entities {
            store.set(e, Position { x: 0.0, y: 0.0 }).unwrap();
            store.set(e, Velocity { x: 0.0, y: 0.0 }).unwrap();
        }
        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    // Position is removed before Velocity inside `remove_all`,
                    // so a torn removal would show up as a Velocity-only entity.
                    let with_pos = store.entities_with::<Position>();
                    let with_vel = store.entities_with::<Velocity>();
                    assert!(with_vel.iter().all(|e| with_pos.binary_search(e).is_ok()));
                }
            })
        };

        for &e in &entities {
            store.remove_all(e);
        }
        reader.join().unwrap();
        assert_eq!(store.component_count(), 0);
    }

    #[test]
    fn test_concurrent_writes_to_different_types() {
        let store = Arc::new(ComponentStore::new());
        store.register::<Position>().unwrap();
        store.register::<Velocity>().unwrap();

        let writers: Vec<_> = (0..2)
            .map(|which| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 1..=500u64 {
                        let e = Entity::from_raw(i);
                        if which == 0 {
                            store.set(e, Position { x: i as f32, y: 0.0 }).unwrap();
                        } else {
                            store.set(e, Velocity { x: 0.0, y: i as f32 }).unwrap();
                        }
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(store.len_of::<Position>(), 500);
        assert_eq!(store.len_of::<Velocity>(), 500);
        assert_eq!(store.component_count(), 1000);
    }

    #[test]
    fn test_clear_keeps_registration() {
        let store = ComponentStore::new();
        store.set(Entity::from_raw(1), Cargo(1)).unwrap();
        store.clear();
        assert_eq!(store.component_count(), 0);
        assert_eq!(store.id_of::<Cargo>(), Some(ComponentTypeId(0)));
    }
}
