//! World-level error types.

use harbor_component::{ComponentError, Entity};

use crate::registry::SystemHandle;

/// Boxed cause of a failed system hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons a system can be refused by [`World::register_system`](crate::World::register_system).
///
/// A rejected system is never scheduled.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The access declaration names no component and is not commutative.
    #[error("system `{name}` declares no component access and is not marked commutative")]
    EmptyAccess {
        /// Name of the rejected system.
        name: String,
    },

    /// A declared component type could not be registered.
    #[error("system `{name}` has an unusable access declaration")]
    Access {
        /// Name of the rejected system.
        name: String,
        /// The storage error.
        #[source]
        source: ComponentError,
    },

    /// `initialize` returned an error or panicked.
    #[error("system `{name}` failed to initialize")]
    Initialize {
        /// Name of the rejected system.
        name: String,
        /// What `initialize` reported.
        #[source]
        source: HookError,
    },

    /// The world no longer accepts systems.
    #[error("world has been disposed")]
    Disposed,
}

/// Errors returned by [`World`](crate::World) operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity was never created or has been destroyed.
    #[error("{0} is not alive")]
    DeadEntity(Entity),

    /// No registered system has this handle.
    #[error("no system registered with handle {0}")]
    UnknownSystem(SystemHandle),

    /// `start` was called while a tick loop is still active.
    #[error("tick loop is already running")]
    AlreadyRunning,

    /// `start` was called outside a tokio runtime.
    #[error("tick loop requires a tokio runtime")]
    NoRuntime,

    /// The world has been disposed.
    #[error("world has been disposed")]
    Disposed,

    /// A configuration value was rejected.
    #[error("invalid configuration `{key}` = `{value}`: {reason}")]
    Config {
        /// The offending key.
        key: &'static str,
        /// The value as given.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Component storage rejected an operation.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// The dedicated worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
