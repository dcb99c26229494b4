//! System configuration.

use harbor_component::Access;

/// Registration-time description of a system.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Human-readable system name (e.g. `"movement"`), used in logs and stats.
    pub name: String,
    /// The data access requirements of this system.
    pub access: Access,
    /// Tie-breaker among non-conflicting systems; lower numbers land in
    /// earlier waves.
    pub priority: i32,
}

impl SystemConfig {
    /// Create a new system config with the given name and access, at priority 0.
    #[must_use]
    pub fn new(name: impl Into<String>, access: Access) -> Self {
        Self {
            name: name.into(),
            access,
            priority: 0,
        }
    }

    /// Override the priority for this system.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
