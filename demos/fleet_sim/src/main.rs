//! # fleet_sim: harbor world demo
//!
//! Spawns a fleet of cargo ships between four ports and runs the world's
//! tick loop for ten simulated seconds at 60 Hz (override with
//! `HARBOR_TICK_RATE` / `HARBOR_MAX_TICKS`). Ships move, burn fuel, and sell
//! their cargo whenever they reach a port. Final statistics are logged as
//! JSON.

mod market;
mod systems;

use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleet_components::{Berth, Cargo, Fuel, Position, Velocity};
use harbor_world::{World, WorldConfig};
use market::Market;
use systems::{FuelSystem, MovementSystem, TradeSystem, fleet_report};

/// Ships in the fleet.
const FLEET_SIZE: usize = 1_000;

/// Ticks to run when `HARBOR_MAX_TICKS` is not set.
const DEFAULT_TICKS: u64 = 600;

/// Side of the square sea area, in nautical miles.
const SEA_SIZE: f32 = 400.0;

/// Freight price per ton.
const PRICE_PER_TON: f64 = 42.0;

fn ports() -> Vec<Berth> {
    vec![
        Berth::new("Rotterdam", 0.0, 0.0),
        Berth::new("Singapore", SEA_SIZE, 0.0),
        Berth::new("Shanghai", SEA_SIZE, SEA_SIZE),
        Berth::new("Los Angeles", 0.0, SEA_SIZE),
    ]
}

fn spawn_fleet(world: &World, size: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..size {
        let ship = world.create_entity();
        let heading: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let speed: f32 = rng.gen_range(1.0..8.0);
        world.set_component(
            ship,
            Position::new(rng.gen_range(0.0..SEA_SIZE), rng.gen_range(0.0..SEA_SIZE)),
        )?;
        world.set_component(
            ship,
            Velocity::new(heading.cos() * speed, heading.sin() * speed),
        )?;
        world.set_component(ship, Fuel::full(rng.gen_range(20.0..60.0)))?;
        let capacity = rng.gen_range(50..500);
        world.set_component(
            ship,
            Cargo {
                tons: rng.gen_range(0..=capacity),
                capacity,
            },
        )?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fleet_sim=info".parse()?)
                .add_directive("harbor_world=info".parse()?),
        )
        .init();

    let mut config = WorldConfig::from_env()?;
    if config.max_ticks == 0 {
        config.max_ticks = DEFAULT_TICKS;
    }
    let tick_rate = config.tick_rate;

    let world = World::new(config)?;
    info!(session = %world.session_id(), "fleet simulation starting");

    spawn_fleet(&world, FLEET_SIZE)?;

    let market = Arc::new(Market::new(PRICE_PER_TON));
    world.register_system(MovementSystem::config(), MovementSystem)?;
    world.register_system(FuelSystem::config(), FuelSystem)?;
    world.register_system(
        TradeSystem::config(),
        TradeSystem::new(Arc::clone(&market), ports()),
    )?;
    let (report_config, report) = fleet_report(Arc::clone(&market), tick_rate);
    world.register_system(report_config, report)?;

    for (wave, systems) in world.wave_plan().iter().enumerate() {
        info!(wave, systems = ?systems, "planned wave");
    }

    world.start()?;
    let finished = world.join();
    tokio::pin!(finished);
    tokio::select! {
        ticks = &mut finished => {
            info!(ticks = ?ticks, "tick loop finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
            world.stop();
            let ticks = finished.await;
            info!(ticks = ?ticks, "tick loop finished");
        }
    }

    let stats = world.get_stats();
    info!(stats = %serde_json::to_string(&stats)?, "final statistics");
    info!(
        tons_sold = market.tons_sold(),
        revenue = market.revenue(),
        "fleet simulation complete"
    );

    world.dispose();
    Ok(())
}
