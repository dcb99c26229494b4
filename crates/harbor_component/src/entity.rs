//! Entity type and the registry that issues and retires entity ids.
//!
//! An [`Entity`] is a lightweight `u64` identifier with no inherent data.
//! Ids are handed out by an [`EntityRegistry`] from a monotonically increasing
//! counter and are never reused, so a stale id can never alias a live entity.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers: they carry no data of their own. Components
/// are attached to entities to give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Issues entity ids and tracks which of them are alive.
///
/// All methods take `&self`; the registry is shared between the world, the
/// systems of a running wave, and collaborators on other threads.
#[derive(Debug)]
pub struct EntityRegistry {
    next_id: AtomicU64,
    alive: DashSet<Entity>,
}

impl EntityRegistry {
    /// Creates a new registry. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            alive: DashSet::new(),
        }
    }

    /// Allocates a fresh entity id and marks it alive.
    pub fn create(&self) -> Entity {
        let entity = Entity(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.alive.insert(entity);
        entity
    }

    /// Marks an entity dead.
    ///
    /// Destroying a dead or unknown id is a no-op. Returns `true` if the
    /// entity was alive before the call.
    pub fn destroy(&self, entity: Entity) -> bool {
        self.alive.remove(&entity).is_some()
    }

    /// Returns `true` if the entity was created and not yet destroyed.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.contains(&entity)
    }

    /// Returns a sorted snapshot of all live entities.
    ///
    /// The snapshot is independent of the registry, so it can be iterated
    /// while other threads create or destroy entities.
    #[must_use]
    pub fn all(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.alive.iter().map(|e| *e).collect();
        entities.sort_unstable();
        entities
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Returns the number of ids issued so far, alive or not.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    /// Marks every entity dead. Issued ids are still never handed out again.
    pub fn clear(&self) {
        self.alive.clear();
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_entity_creation() {
        let e = Entity::from_raw(42);
        assert_eq!(e.id(), 42);
        assert!(e.is_valid());
    }

    #[test]
    fn test_entity_invalid() {
        assert!(!Entity::INVALID.is_valid());
        assert_eq!(Entity::INVALID.id(), 0);
    }

    #[test]
    fn test_registry_produces_unique_ids() {
        let registry = EntityRegistry::new();
        let e1 = registry.create();
        let e2 = registry.create();
        let e3 = registry.create();
        assert_eq!(e1.id(), 1);
        assert_eq!(e2.id(), 2);
        assert_eq!(e3.id(), 3);
        assert_eq!(registry.issued(), 3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let registry = EntityRegistry::new();
        let e = registry.create();
        assert!(registry.destroy(e));
        assert!(!registry.is_alive(e));
        assert!(!registry.destroy(e));
        assert!(!registry.destroy(Entity::from_raw(999)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_destroy() {
        let registry = EntityRegistry::new();
        let e1 = registry.create();
        registry.destroy(e1);
        let e2 = registry.create();
        assert_ne!(e1, e2);
        assert!(!registry.is_alive(e1));
        assert!(registry.is_alive(e2));
    }

    #[test]
    fn test_all_is_sorted_snapshot() {
        let registry = EntityRegistry::new();
        let created: Vec<_> = (0..10).map(|_| registry.create()).collect();
        registry.destroy(created[4]);

        let snapshot = registry.all();
        // Mutating the registry does not disturb the snapshot.
        registry.destroy(created[0]);

        assert_eq!(snapshot.len(), 9);
        assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
        assert!(!snapshot.contains(&created[4]));
        assert!(snapshot.contains(&created[0]));
    }

    #[test]
    fn test_concurrent_create_never_aliases() {
        let registry = Arc::new(EntityRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || (0..250).map(|_| registry.create()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Entity> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(registry.len(), 1000);
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = Entity::from_raw(999);
        let json = serde_json::to_string(&entity).unwrap();
        let restored: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(entity, restored);
    }
}
