//! # Simulation Harness
//!
//! Headless churn run: spawns movers, lets them stop and expire, and logs
//! query traffic and tick timing.
//!
//! Usage: `sim_harness [config.toml] [ticks]`
//!
//! `RUST_LOG` overrides the config's `log_level`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera::core::{ComponentOptions, Filter, Overrides, QueryEvent};
use tessera::{Game, GameConfig, GameResult, Phase};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_TICKS: u64 = 600;
const MAX_SPAWN_PER_TICK: u32 = 12;
const SEED: u64 = 0x7e55_e7a;

#[derive(Clone, Copy, Debug, Default)]
struct Position([f32; 2]);

#[derive(Clone, Copy, Debug, Default)]
struct Velocity([f32; 2]);

/// Ticks left before the entity is destroyed.
#[derive(Clone, Copy, Debug, Default)]
struct Lifetime(u32);

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn main() -> GameResult<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    let ticks = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_TICKS);

    init_tracing(config.log_level.as_deref());
    info!(ticks, max_entities = config.world.max_entities, "sim harness starting");

    let mut game = Game::new(config)?;
    let world = game.world_mut();
    let position = world.register_component("position", Position::default, ComponentOptions::new())?;
    let velocity = world.register_component("velocity", Velocity::default, ComponentOptions::new())?;
    let lifetime = world.register_component(
        "lifetime",
        Lifetime::default,
        ComponentOptions::new().with_reset(|l: &mut Lifetime| l.0 = 0),
    )?;

    let moving = world.query(Filter::new().has(position).has(velocity));
    let parked = world.query(Filter::new().has(position).not(velocity));
    let aging = world.query(Filter::new().has(lifetime));

    let arrivals = Arc::new(AtomicUsize::new(0));
    let departures = Arc::new(AtomicUsize::new(0));
    {
        let arrivals = Arc::clone(&arrivals);
        let departures = Arc::clone(&departures);
        world.subscribe_query(moving, move |event| match event {
            QueryEvent::EntityAdded(_) => {
                arrivals.fetch_add(1, Ordering::Relaxed);
            }
            QueryEvent::EntityRemoved(_) => {
                departures.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    }

    // Spawner
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    game.add_hook(Phase::Step, move |world, _| {
        for _ in 0..rng.gen_range(0..=MAX_SPAWN_PER_TICK) {
            let entity = match world.create_entity() {
                Ok(entity) => entity,
                Err(err) => {
                    warn!(%err, "spawn skipped");
                    return;
                }
            };
            let start = [rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)];
            let heading = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
            world.add_component_with(entity, position, Overrides::value(Position(start)));
            world.add_component_with(entity, velocity, Overrides::value(Velocity(heading)));
            world.add_component_with(
                entity,
                lifetime,
                Overrides::value(Lifetime(rng.gen_range(30..240))),
            );
        }
    });

    // Movement
    game.add_hook(Phase::Step, move |world, info| {
        let movers: Vec<_> = world.matching(moving).collect();
        for id in movers {
            if let Some(mut entity) = world.get_mut(id) {
                let Some(v) = entity.get(velocity).copied() else {
                    continue;
                };
                if let Some(p) = entity.get_mut(position) {
                    p.0[0] += v.0[0] * info.delta;
                    p.0[1] += v.0[1] * info.delta;
                }
            }
        }
    });

    // Aging: movers that leave the arena park, expired entities are destroyed
    game.add_hook(Phase::PostStep, move |world, _| {
        let aged: Vec<_> = world.matching(aging).collect();
        for id in aged {
            let Some(mut entity) = world.get_mut(id) else {
                continue;
            };
            let out_of_bounds = entity
                .get(position)
                .is_some_and(|p| p.0.iter().any(|c| c.abs() > 50.0));
            let moving_now = entity.get(velocity).is_some();
            let expired = match entity.get_mut(lifetime) {
                Some(l) => {
                    l.0 = l.0.saturating_sub(1);
                    l.0 == 0
                }
                None => false,
            };
            if expired {
                world.destroy_entity(id);
            } else if out_of_bounds && moving_now {
                world.remove_component(id, velocity);
            }
        }
    });

    game.add_hook(Phase::StepComplete, move |world, info| {
        if let (Some(m), Some(p)) = (world.query_ref(moving), world.query_ref(parked)) {
            debug!(
                tick = info.tick,
                moving = m.len(),
                moving_added = m.added().len(),
                moving_removed = m.removed().len(),
                parked = p.len(),
                "queries"
            );
        }
    });

    for _ in 0..ticks {
        if let Err(err) = game.tick(1.0 / 60.0) {
            error!(%err, tick = game.tick_count(), "tick failed");
            return Err(err);
        }
    }

    game.stats().log_summary();
    let world = game.world();
    info!(
        entities = world.entity_count(),
        archetypes = world.archetypes().len(),
        queries = world.queries().len(),
        arrivals = arrivals.load(Ordering::Relaxed),
        departures = departures.load(Ordering::Relaxed),
        "world summary"
    );
    for descriptor in world.registry().descriptors() {
        if let Some(stats) = world.pool_stats(descriptor.id()) {
            info!(
                component = descriptor.name(),
                total = stats.total,
                free = stats.free,
                in_use = stats.in_use,
                "component pool"
            );
        }
    }
    let records = world.record_pool_stats();
    info!(total = records.total, free = records.free, in_use = records.in_use, "entity record pool");
    Ok(())
}
