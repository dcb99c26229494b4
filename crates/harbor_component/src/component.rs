//! Core [`Component`] trait and component type identity.
//!
//! Every piece of data stored in the simulation must implement [`Component`].
//! The trait requires `Clone + Send + Sync + 'static` so values can be copied
//! out of storage and shared between the worker threads of a wave.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is a dense index handed out by the
//! [`ComponentStore`](crate::ComponentStore) the first time a type is used.
//! It addresses a slot in a fixed-size array of typed columns, so lookups never
//! go through a runtime name table. Because ids are small integers they also
//! fit into a [`ComponentMask`] bitset, which is what the wave planner compares.

use serde::{Deserialize, Serialize};

/// Maximum number of distinct component types a single store can hold.
///
/// Bounded by the width of [`ComponentMask`].
pub const MAX_COMPONENT_TYPES: usize = 64;

/// A dense identifier for a registered component type.
///
/// Ids are assigned in registration order starting at zero and are stable for
/// the lifetime of the store that assigned them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Returns the id as an index into the store's column array.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

/// The core component trait.
///
/// All data attached to entities must implement this trait.
///
/// # Examples
///
/// ```rust
/// use harbor_component::Component;
///
/// #[derive(Debug, Clone)]
/// struct Hull {
///     integrity: f32,
/// }
///
/// impl Component for Hull {
///     fn type_name() -> &'static str { "Hull" }
/// }
/// ```
pub trait Component: Clone + Send + Sync + 'static {
    /// A human-readable name for this component type, used in logs and stats.
    fn type_name() -> &'static str;
}

/// A set of [`ComponentTypeId`]s stored as a 64-bit bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComponentMask(pub u64);

impl ComponentMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every possible component type.
    pub const ALL: Self = Self(u64::MAX);

    /// Create an empty mask.
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Add a component type to the set.
    pub fn insert(&mut self, id: ComponentTypeId) {
        self.0 |= 1u64 << id.0;
    }

    /// Builder form of [`ComponentMask::insert`].
    #[must_use]
    pub fn with(mut self, id: ComponentTypeId) -> Self {
        self.insert(id);
        self
    }

    /// Returns `true` if the set contains `id`.
    #[must_use]
    pub const fn contains(self, id: ComponentTypeId) -> bool {
        self.0 & (1u64 << id.0) != 0
    }

    /// Returns `true` if the two sets share at least one component type.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if no component type is in the set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of component types in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the ids in the set in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ComponentTypeId> {
        (0..MAX_COMPONENT_TYPES as u32)
            .filter(move |bit| self.0 & (1u64 << bit) != 0)
            .map(ComponentTypeId)
    }
}

impl FromIterator<ComponentTypeId> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut mask = Self::new();
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}
