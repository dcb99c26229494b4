//! Fleet systems.
//!
//! | system   | reads            | writes        | priority |
//! |----------|------------------|---------------|----------|
//! | movement | Velocity, Fuel   | Position      | 0        |
//! | fuel     | Velocity, Cargo  | Fuel          | 10       |
//! | trade    | Position         | Cargo, Berth  | 20       |
//! | report   | (commutative)    |               | 30       |

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::info;

use fleet_components::{Berth, Cargo, Fuel, Position, Velocity};
use harbor_component::Access;
use harbor_system::{FnSystem, System, SystemConfig, SystemContext};

use crate::market::Market;

/// Distance at which a ship counts as moored, in nautical miles.
pub const DOCKING_RADIUS: f32 = 5.0;

/// Tons of fuel burned per nautical mile when empty.
const BURN_PER_MILE: f32 = 0.02;

/// Advances ships along their velocity. Ships out of fuel drift in place.
#[derive(Debug, Default)]
pub struct MovementSystem;

impl MovementSystem {
    /// Registration config.
    #[must_use]
    pub fn config() -> SystemConfig {
        SystemConfig::new(
            "movement",
            Access::new()
                .read::<Velocity>()
                .read::<Fuel>()
                .write::<Position>(),
        )
    }
}

impl System for MovementSystem {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let dt = ctx.dt() as f32;
        for ship in ctx.entities_with::<Velocity>()? {
            if ctx.get::<Fuel>(ship)?.is_some_and(|fuel| fuel.is_empty()) {
                continue;
            }
            let (Some(pos), Some(vel)) = (ctx.get::<Position>(ship)?, ctx.get::<Velocity>(ship)?)
            else {
                continue;
            };
            ctx.set(
                ship,
                Position {
                    value: pos.value + vel.linear * dt,
                },
            )?;
        }
        Ok(())
    }
}

/// Burns fuel in proportion to distance covered and load carried.
#[derive(Debug, Default)]
pub struct FuelSystem;

impl FuelSystem {
    /// Registration config.
    #[must_use]
    pub fn config() -> SystemConfig {
        SystemConfig::new(
            "fuel",
            Access::new()
                .read::<Velocity>()
                .read::<Cargo>()
                .write::<Fuel>(),
        )
        .with_priority(10)
    }
}

impl System for FuelSystem {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let dt = ctx.dt() as f32;
        for ship in ctx.entities_with::<Fuel>()? {
            let Some(mut fuel) = ctx.get::<Fuel>(ship)? else {
                continue;
            };
            let speed = ctx.get::<Velocity>(ship)?.map_or(0.0, |v| v.speed());
            let load = ctx
                .get::<Cargo>(ship)?
                .filter(|c| c.capacity > 0)
                .map_or(0.0, |c| c.tons as f32 / c.capacity as f32);
            fuel.burn(speed * dt * BURN_PER_MILE * (1.0 + load));
            ctx.set(ship, fuel)?;
        }
        Ok(())
    }
}

/// Moors ships that reach a port, sells their cargo on the market, and
/// loads a fresh consignment.
#[derive(Debug)]
pub struct TradeSystem {
    market: Arc<Market>,
    ports: Vec<Berth>,
    visits: u64,
}

impl TradeSystem {
    /// Trade through `market` at `ports`.
    #[must_use]
    pub fn new(market: Arc<Market>, ports: Vec<Berth>) -> Self {
        Self {
            market,
            ports,
            visits: 0,
        }
    }

    /// Registration config.
    #[must_use]
    pub fn config() -> SystemConfig {
        SystemConfig::new(
            "trade",
            Access::new()
                .read::<Position>()
                .write::<Cargo>()
                .write::<Berth>(),
        )
        .with_priority(20)
    }

    fn nearest_port(&self, position: &Position) -> Option<&Berth> {
        self.ports
            .iter()
            .find(|port| port.location.distance(position.value) <= DOCKING_RADIUS)
    }
}

impl System for TradeSystem {
    fn initialize(&mut self) -> Result<()> {
        if self.market.price_per_ton() <= 0.0 {
            bail!("market pays nothing for freight");
        }
        if self.ports.is_empty() {
            bail!("no ports to trade at");
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        for ship in ctx.entities_with::<Position>()? {
            let Some(position) = ctx.get::<Position>(ship)? else {
                continue;
            };
            let moored = ctx.get::<Berth>(ship)?;
            match (self.nearest_port(&position), moored) {
                (Some(port), None) => {
                    if let Some(mut hold) = ctx.get::<Cargo>(ship)? {
                        self.market.sell(hold.unload());
                        hold.load(hold.capacity);
                        ctx.set(ship, hold)?;
                    }
                    ctx.set(ship, port.clone())?;
                    self.visits += 1;
                }
                (None, Some(_)) => {
                    ctx.remove::<Berth>(ship)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        info!(
            visits = self.visits,
            tons_sold = self.market.tons_sold(),
            revenue = self.market.revenue(),
            "trade closed"
        );
        Ok(())
    }
}

/// Logs market totals once per simulated second.
pub fn fleet_report(market: Arc<Market>, tick_rate: f64) -> (SystemConfig, impl System) {
    let every = tick_rate.round().max(1.0) as u64;
    let system = FnSystem::new(move |ctx| {
        if ctx.tick_id() % every == 0 {
            info!(
                tick = ctx.tick_id(),
                tons_sold = market.tons_sold(),
                revenue = market.revenue(),
                "fleet report"
            );
        }
        Ok(())
    });
    (
        SystemConfig::new("report", Access::commutative()).with_priority(30),
        system,
    )
}

#[cfg(test)]
mod tests {
    use harbor_world::{World, WorldConfig};

    use super::*;

    fn world_with_ship(position: Position, velocity: Velocity) -> (World, harbor_component::Entity) {
        let world = World::new(WorldConfig::default()).unwrap();
        let ship = world.create_entity();
        world.set_component(ship, position).unwrap();
        world.set_component(ship, velocity).unwrap();
        world.set_component(ship, Fuel::full(10.0)).unwrap();
        world.set_component(ship, Cargo { tons: 40, capacity: 100 }).unwrap();
        (world, ship)
    }

    #[test]
    fn test_fleet_plan() {
        let (world, _) = world_with_ship(Position::default(), Velocity::ZERO);
        let market = Arc::new(Market::new(10.0));
        world.register_system(MovementSystem::config(), MovementSystem).unwrap();
        world.register_system(FuelSystem::config(), FuelSystem).unwrap();
        world
            .register_system(
                TradeSystem::config(),
                TradeSystem::new(Arc::clone(&market), vec![Berth::new("Rotterdam", 0.0, 0.0)]),
            )
            .unwrap();
        let (config, report) = fleet_report(market, 60.0);
        world.register_system(config, report).unwrap();

        assert_eq!(
            world.wave_plan(),
            vec![
                vec!["movement".to_string(), "report".to_string()],
                vec!["fuel".to_string()],
                vec!["trade".to_string()],
            ]
        );
    }

    #[test]
    fn test_ship_moves_and_burns_fuel() {
        let (world, ship) = world_with_ship(Position::new(0.0, 0.0), Velocity::new(3.0, 4.0));
        world.register_system(MovementSystem::config(), MovementSystem).unwrap();
        world.register_system(FuelSystem::config(), FuelSystem).unwrap();

        world.step(1.0).unwrap();

        assert_eq!(world.get_component::<Position>(ship), Some(Position::new(3.0, 4.0)));
        let fuel = world.get_component::<Fuel>(ship).unwrap();
        // 5 miles at 0.02 t/mile with a 40% load.
        assert!((fuel.level - (10.0 - 5.0 * 0.02 * 1.4)).abs() < 1e-5);
    }

    #[test]
    fn test_dry_ship_drifts() {
        let (world, ship) = world_with_ship(Position::new(1.0, 1.0), Velocity::new(1.0, 0.0));
        world.set_component(ship, Fuel { level: 0.0, capacity: 10.0 }).unwrap();
        world.register_system(MovementSystem::config(), MovementSystem).unwrap();

        world.step(1.0).unwrap();

        assert_eq!(world.get_component::<Position>(ship), Some(Position::new(1.0, 1.0)));
    }

    #[test]
    fn test_trade_sells_and_reloads_at_port() {
        let (world, ship) = world_with_ship(Position::new(1.0, 1.0), Velocity::ZERO);
        let market = Arc::new(Market::new(10.0));
        world
            .register_system(
                TradeSystem::config(),
                TradeSystem::new(Arc::clone(&market), vec![Berth::new("Rotterdam", 0.0, 0.0)]),
            )
            .unwrap();

        world.step(1.0).unwrap();
        world.step(1.0).unwrap();

        assert_eq!(market.tons_sold(), 40, "moored ships sell once");
        assert_eq!(market.revenue(), 400.0);
        assert_eq!(world.get_component::<Cargo>(ship).map(|c| c.tons), Some(100));
        assert_eq!(
            world.get_component::<Berth>(ship).map(|b| b.port),
            Some("Rotterdam".to_string())
        );

        world.set_component(ship, Position::new(50.0, 50.0)).unwrap();
        world.step(1.0).unwrap();
        assert!(!world.has_component::<Berth>(ship));
    }

    #[test]
    fn test_trade_rejected_without_price() {
        let world = World::new(WorldConfig::default()).unwrap();
        let result = world.register_system(
            TradeSystem::config(),
            TradeSystem::new(Arc::new(Market::new(0.0)), vec![Berth::new("Rotterdam", 0.0, 0.0)]),
        );
        assert!(result.is_err());
        assert!(world.wave_plan().is_empty());
    }
}
