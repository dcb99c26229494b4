//! Access declarations for system data requirements.
//!
//! An [`Access`] declares which component types a system reads and writes.
//! It is written against Rust types and resolved into an [`AccessMask`] of
//! dense ids when the system is registered. The world uses the mask to
//! detect conflicts between systems when it plans waves, and the system
//! context uses it to reject undeclared reads and writes.
//!
//! ## Modes
//!
//! - [`AccessMode::Declared`]: the read/write sets are the whole story. A
//!   declared access with *no* component types is treated as conflicting
//!   with everything, since nothing tells us what it touches.
//! - [`AccessMode::Commutative`]: the system promises its side effects commute
//!   with everyone else's. With empty sets it conflicts only with exclusive
//!   systems.
//! - [`AccessMode::Exclusive`]: the system may touch any component and always
//!   runs alone in its wave.

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentMask, ComponentTypeId};
use crate::error::ComponentError;
use crate::store::ComponentStore;

/// How an access declaration should be interpreted by the wave planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Only the declared component types are touched.
    #[default]
    Declared,
    /// Side effects commute with every other system.
    Commutative,
    /// May touch anything; never shares a wave.
    Exclusive,
}

/// A component type named in an [`Access`], not yet bound to a store.
#[derive(Clone, Copy)]
struct AccessKey {
    name: &'static str,
    register: fn(&ComponentStore) -> Result<ComponentTypeId, ComponentError>,
}

impl AccessKey {
    fn of<T: Component>() -> Self {
        Self {
            name: T::type_name(),
            register: |store| store.register::<T>(),
        }
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Describes the component access of a system in terms of Rust types.
///
/// ```rust
/// use harbor_component::{Access, Component};
///
/// #[derive(Clone)]
/// struct Position(f32, f32);
/// impl Component for Position { fn type_name() -> &'static str { "Position" } }
///
/// #[derive(Clone)]
/// struct Velocity(f32, f32);
/// impl Component for Velocity { fn type_name() -> &'static str { "Velocity" } }
///
/// let movement = Access::new().read::<Velocity>().write::<Position>();
/// assert_eq!(movement.write_names(), vec!["Position"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Access {
    reads: Vec<AccessKey>,
    writes: Vec<AccessKey>,
    mode: AccessMode,
}

impl Access {
    /// Create an empty declared access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An access for systems whose effects commute with everything else,
    /// e.g. a system that only logs.
    #[must_use]
    pub fn commutative() -> Self {
        Self {
            mode: AccessMode::Commutative,
            ..Self::default()
        }
    }

    /// An access that may touch every component type.
    #[must_use]
    pub fn exclusive() -> Self {
        Self {
            mode: AccessMode::Exclusive,
            ..Self::default()
        }
    }

    /// Add a read-only component requirement.
    #[must_use]
    pub fn read<T: Component>(mut self) -> Self {
        self.reads.push(AccessKey::of::<T>());
        self
    }

    /// Add a mutable component requirement.
    #[must_use]
    pub fn write<T: Component>(mut self) -> Self {
        self.writes.push(AccessKey::of::<T>());
        self
    }

    /// Returns the declaration mode.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns `true` if no component type is named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Names of the component types read.
    #[must_use]
    pub fn read_names(&self) -> Vec<&'static str> {
        self.reads.iter().map(|key| key.name).collect()
    }

    /// Names of the component types written.
    #[must_use]
    pub fn write_names(&self) -> Vec<&'static str> {
        self.writes.iter().map(|key| key.name).collect()
    }

    /// Bind the declaration to a store, registering any component type the
    /// store has not seen yet.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if a component type cannot be registered.
    pub fn resolve(&self, store: &ComponentStore) -> Result<AccessMask, ComponentError> {
        let mut reads = ComponentMask::new();
        for key in &self.reads {
            reads.insert((key.register)(store)?);
        }
        let mut writes = ComponentMask::new();
        for key in &self.writes {
            writes.insert((key.register)(store)?);
        }
        Ok(AccessMask {
            reads,
            writes,
            mode: self.mode,
        })
    }
}

/// A resolved access declaration over dense component ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessMask {
    /// Component types the system reads immutably.
    pub reads: ComponentMask,
    /// Component types the system writes (mutable access).
    pub writes: ComponentMask,
    /// How to interpret the sets.
    pub mode: AccessMode,
}

impl AccessMask {
    /// Create a declared mask from read and write sets.
    #[must_use]
    pub const fn new(reads: ComponentMask, writes: ComponentMask) -> Self {
        Self {
            reads,
            writes,
            mode: AccessMode::Declared,
        }
    }

    /// Returns `true` if no component type is named.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Returns `true` if this access must be assumed to touch everything.
    #[must_use]
    pub const fn is_universal(&self) -> bool {
        match self.mode {
            AccessMode::Exclusive => true,
            AccessMode::Declared => self.is_empty(),
            AccessMode::Commutative => false,
        }
    }

    /// Returns `true` if a system with this access may read `id`.
    #[must_use]
    pub const fn can_read(&self, id: ComponentTypeId) -> bool {
        self.is_universal() || self.reads.contains(id) || self.writes.contains(id)
    }

    /// Returns `true` if a system with this access may write `id`.
    #[must_use]
    pub const fn can_write(&self, id: ComponentTypeId) -> bool {
        self.is_universal() || self.writes.contains(id)
    }

    /// Checks whether this access conflicts with another.
    ///
    /// Two accesses conflict when one writes a component type that the other
    /// reads or writes, or when either is universal:
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    #[must_use]
    pub const fn conflicts_with(&self, other: &AccessMask) -> bool {
        if self.is_universal() || other.is_universal() {
            return true;
        }
        self.writes.intersects(other.reads.union(other.writes))
            || other.writes.intersects(self.reads.union(self.writes))
    }
}
