//! Component-layer error types.

/// Errors raised by component registration and storage.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The store already holds the maximum number of component types.
    #[error("cannot register component `{name}`: store is limited to {max} component types")]
    TooManyTypes {
        /// Name of the type that did not fit.
        name: &'static str,
        /// The store's capacity.
        max: usize,
    },

    /// A column slot was filled twice, which means id assignment raced.
    #[error("component slot {index} is already occupied")]
    SlotOccupied {
        /// The contested slot.
        index: usize,
    },

    /// A component type was used before being registered.
    #[error("component `{name}` is not registered")]
    Unregistered {
        /// Name of the unknown type.
        name: &'static str,
    },
}
