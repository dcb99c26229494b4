//! # harbor_system
//!
//! The system layer of the harbor simulation core.
//!
//! A system is any type implementing [`System`]: an `update` hook plus
//! optional `initialize`/`dispose` hooks. Its name, priority, and component
//! access are declared separately in a [`SystemConfig`] at registration time
//! and stay fixed for as long as the system is registered.
//!
//! ## Usage
//!
//! ```rust
//! use harbor_component::{Access, Component};
//! use harbor_system::{FnSystem, SystemConfig};
//!
//! #[derive(Clone)]
//! struct Fuel(f32);
//! impl Component for Fuel { fn type_name() -> &'static str { "Fuel" } }
//!
//! let config = SystemConfig::new("fuel_burn", Access::new().write::<Fuel>()).with_priority(10);
//! let system = FnSystem::new(|ctx| {
//!     for ship in ctx.entities_with::<Fuel>()? {
//!         if let Some(Fuel(level)) = ctx.get::<Fuel>(ship)? {
//!             ctx.set(ship, Fuel((level - ctx.dt() as f32).max(0.0)))?;
//!         }
//!     }
//!     Ok(())
//! });
//! # let _ = (config, system);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod system;

pub use config::SystemConfig;
pub use context::{Committed, PendingChanges, SystemContext};
pub use error::{AccessKind, SystemError};
pub use system::{FnSystem, System};
