//! System-layer error types.

use harbor_component::ComponentError;

/// Whether a rejected access was a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Reading a component.
    Read,
    /// Writing or removing a component.
    Write,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Errors a system can hit while using its [`SystemContext`](crate::SystemContext).
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// The system touched a component type outside its declared access.
    #[error("system `{system}` attempted to {kind} undeclared component `{component}`")]
    AccessViolation {
        /// Name of the offending system.
        system: String,
        /// Name of the component type.
        component: &'static str,
        /// Read or write.
        kind: AccessKind,
    },

    /// Component storage rejected an operation.
    #[error(transparent)]
    Component(#[from] ComponentError),
}
