//! System registry: owns registered systems and their bookkeeping.
//!
//! Entries are kept in registration order. The wave planner refers to them
//! by index, so any change to the entry list invalidates the cached plan.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use harbor_component::AccessMask;
use harbor_system::System;

/// Opaque handle returned by system registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemHandle(pub u64);

impl std::fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemHandle({})", self.0)
    }
}

/// Per-system execution counters.
#[derive(Debug, Clone, Default)]
pub struct SystemCounters {
    /// Successful updates.
    pub updates: u64,
    /// Failed updates, all time.
    pub failures: u64,
    /// Failed updates since the last success.
    pub consecutive_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Wall time of the most recent update.
    pub last_update: Duration,
}

/// A registered system with its declaration and counters.
pub struct SystemEntry {
    /// Handle given to the registering caller.
    pub handle: SystemHandle,
    /// The system's human-readable name.
    pub name: String,
    /// Tie-breaker for wave placement.
    pub priority: i32,
    /// The resolved data access requirements.
    pub access: AccessMask,
    /// Wave the system was placed in by the current plan.
    pub wave: Option<usize>,
    /// Execution counters.
    pub counters: SystemCounters,
    /// The system itself.
    pub system: Box<dyn System>,
}

impl std::fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemEntry")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("access", &self.access)
            .field("wave", &self.wave)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/// Registry of all systems known to a world.
#[derive(Debug)]
pub struct SystemRegistry {
    entries: Vec<SystemEntry>,
    next_handle: u64,
}

impl SystemRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 1,
        }
    }

    /// Add a system, returning its handle.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        access: AccessMask,
        system: Box<dyn System>,
    ) -> SystemHandle {
        let handle = SystemHandle(self.next_handle);
        self.next_handle = handle.0 + 1;
        self.entries.push(SystemEntry {
            handle,
            name: name.into(),
            priority,
            access,
            wave: None,
            counters: SystemCounters::default(),
            system,
        });
        handle
    }

    /// Remove a system. Returns the entry so the caller can dispose it.
    pub fn unregister(&mut self, handle: SystemHandle) -> Option<SystemEntry> {
        let pos = self.entries.iter().position(|entry| entry.handle == handle)?;
        Some(self.entries.remove(pos))
    }

    /// Returns an entry by handle.
    #[must_use]
    pub fn get(&self, handle: SystemHandle) -> Option<&SystemEntry> {
        self.entries.iter().find(|entry| entry.handle == handle)
    }

    /// All entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[SystemEntry] {
        &self.entries
    }

    /// Mutable access to all entries, in registration order.
    pub fn entries_mut(&mut self) -> &mut [SystemEntry] {
        &mut self.entries
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<SystemEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}
