//! # harbor_world
//!
//! The world, wave scheduler, and tick loop of the harbor simulation core.
//!
//! A [`World`] owns entities, components, and systems. Each tick it runs the
//! systems in **waves**: systems whose declared accesses cannot conflict share
//! a wave and run in parallel on the rayon pool; waves run one after another,
//! so every write made in wave N is visible to wave N+1. A failing or
//! panicking system is isolated and counted, never fatal.
//!
//! ## Usage
//!
//! ```rust
//! use harbor_component::{Access, Component};
//! use harbor_system::{FnSystem, SystemConfig};
//! use harbor_world::{World, WorldConfig};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Fuel(f32);
//! impl Component for Fuel { fn type_name() -> &'static str { "Fuel" } }
//!
//! # fn main() -> anyhow::Result<()> {
//! let world = World::new(WorldConfig::default())?;
//! let tug = world.create_entity();
//! world.set_component(tug, Fuel(10.0))?;
//!
//! world.register_system(
//!     SystemConfig::new("fuel_burn", Access::new().write::<Fuel>()),
//!     FnSystem::new(|ctx| {
//!         for ship in ctx.entities_with::<Fuel>()? {
//!             if let Some(Fuel(level)) = ctx.get::<Fuel>(ship)? {
//!                 ctx.set(ship, Fuel(level - ctx.dt() as f32))?;
//!             }
//!         }
//!         Ok(())
//!     }),
//! )?;
//!
//! world.step(1.0)?;
//! assert_eq!(world.get_component::<Fuel>(tug), Some(Fuel(9.0)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod stats;
pub mod tick;
pub mod world;

pub use config::WorldConfig;
pub use error::{HookError, RegistrationError, WorldError};
pub use registry::SystemHandle;
pub use resolver::{Wave, WavePlan, compute_waves};
pub use scheduler::TickReport;
pub use stats::{SystemStats, WorldStats};
pub use tick::{FrameClock, RunState};
pub use world::World;
