//! # harbor_component
//!
//! The entity and component layer of the harbor simulation core: what an
//! entity is, how component values are stored, and how systems declare the
//! data they touch.
//!
//! This crate provides:
//!
//! - [`Component`] trait: the contract all simulation data must satisfy.
//! - [`Entity`] / [`EntityRegistry`]: never-reused `u64` ids and their liveness.
//! - [`ComponentStore`]: per-type, individually locked component columns.
//! - [`Access`] / [`AccessMask`]: declarative read/write requirements for systems.

pub mod access;
pub mod component;
pub mod entity;
pub mod error;
pub mod store;

pub use access::{Access, AccessMask, AccessMode};
pub use component::{Component, ComponentMask, ComponentTypeId, MAX_COMPONENT_TYPES};
pub use entity::{Entity, EntityRegistry};
pub use error::ComponentError;
pub use store::ComponentStore;
