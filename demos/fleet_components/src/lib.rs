//! Component definitions for a shipping fleet.
//!
//! Plain data shapes that satisfy the [`Component`] contract. Vectors use
//! [`glam::Vec2`] on the sea plane.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use harbor_component::Component;

/// Where a ship is on the sea plane, in nautical miles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    /// Coordinates on the sea plane.
    pub value: Vec2,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            value: Vec2::new(x, y),
        }
    }
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

/// Heading and speed of a ship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    /// Nautical miles per second.
    pub linear: Vec2,
}

impl Velocity {
    /// Dead in the water.
    pub const ZERO: Self = Self { linear: Vec2::ZERO };

    /// Create a velocity.
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            linear: Vec2::new(x, y),
        }
    }

    /// Speed regardless of heading.
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.linear.length()
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Goods carried by a ship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Cargo {
    /// Tons on board.
    pub tons: u32,
    /// Maximum tons.
    pub capacity: u32,
}

impl Cargo {
    /// An empty hold of the given capacity.
    #[must_use]
    pub fn empty(capacity: u32) -> Self {
        Self { tons: 0, capacity }
    }

    /// Free space in tons.
    #[must_use]
    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.tons)
    }

    /// Load up to `tons`, returning how much fit.
    pub fn load(&mut self, tons: u32) -> u32 {
        let loaded = tons.min(self.free());
        self.tons += loaded;
        loaded
    }

    /// Unload everything, returning the tons removed.
    pub fn unload(&mut self) -> u32 {
        std::mem::take(&mut self.tons)
    }
}

impl Component for Cargo {
    fn type_name() -> &'static str {
        "Cargo"
    }
}

/// Bunker fuel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Fuel {
    /// Tons remaining.
    pub level: f32,
    /// Tank size in tons.
    pub capacity: f32,
}

impl Fuel {
    /// A full tank.
    #[must_use]
    pub fn full(capacity: f32) -> Self {
        Self {
            level: capacity,
            capacity,
        }
    }

    /// Returns `true` if the tank is dry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.level <= 0.0
    }

    /// Burn fuel, clamping to zero.
    pub fn burn(&mut self, amount: f32) {
        self.level = (self.level - amount).max(0.0);
    }

    /// Refill, clamping to capacity.
    pub fn refill(&mut self, amount: f32) {
        self.level = (self.level + amount).min(self.capacity);
    }
}

impl Component for Fuel {
    fn type_name() -> &'static str {
        "Fuel"
    }
}

/// A port a ship is moored at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Berth {
    /// Port name.
    pub port: String,
    /// Port location.
    pub location: Vec2,
}

impl Berth {
    /// Create a berth at the named port.
    #[must_use]
    pub fn new(port: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            port: port.into(),
            location: Vec2::new(x, y),
        }
    }
}

impl Component for Berth {
    fn type_name() -> &'static str {
        "Berth"
    }
}
