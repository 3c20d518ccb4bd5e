//! Rail Sim demo driver
//!
//! Builds a small grid level, spawns a few trains and drives them with a
//! caller-owned tick loop. Per-tick budgets come from a seeded RNG so every
//! run with the same seed plays out identically.
//!
//! Usage: `rail-sim [settings.json] [seed]`

use std::path::Path;

use glam::{IVec2, Vec2};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use rail_sim::sim::{BakedTrackPart, RouteStep, SegmentKey, TrainPhase};
use rail_sim::{Settings, SimError, SpawnSpec, TrackRegistry, World};

/// Ticks to give up after when trains keep blocking each other
const DEMO_MAX_TICKS: u32 = 2_000;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load(Path::new(&path)).unwrap_or_else(|e| {
            log::warn!("Falling back to default settings: {e}");
            Settings::default()
        }),
        None => Settings::default(),
    };
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(12345);

    log::info!("Rail Sim (native) starting, seed {seed}");
    if let Err(e) = run_demo(settings, seed) {
        log::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

/// Horizontal line through row 0 and a vertical line crossing it at column 4
fn demo_level() -> Vec<BakedTrackPart> {
    let straight = vec![Vec2::new(0.0, 0.5), Vec2::new(1.0, 0.5)];
    let vertical = vec![Vec2::new(0.5, 0.0), Vec2::new(0.5, 1.0)];

    let mut parts = Vec::new();
    for x in 0..10 {
        parts.push(BakedTrackPart {
            id: x as u32,
            cell: IVec2::new(x, 0),
            splines: vec![straight.clone()],
        });
    }
    for y in -4..5 {
        if y == 0 {
            continue;
        }
        parts.push(BakedTrackPart {
            id: 100 + (y + 4) as u32,
            cell: IVec2::new(4, y),
            splines: vec![vertical.clone()],
        });
    }
    parts
}

fn run_demo(settings: Settings, seed: u64) -> Result<(), SimError> {
    let cell = settings.cell_size;
    let tracks = TrackRegistry::from_baked_grid(&demo_level(), cell, Vec2::ZERO);
    let mut world = World::with_tracks(settings, tracks);
    let mut rng = Pcg32::seed_from_u64(seed);

    // The first horizontal cell is a one-shot bridge
    let bridge = SegmentKey::whole(0, 0, 2);
    world.tracks_mut().mark_consumable(bridge)?;

    let east = world.spawn(
        SpawnSpec::new(Vec2::new(0.5, 0.5) * cell, Vec2::X)
            .with_carts(vec![1.0 * cell, 2.0 * cell])
            .with_seed_length(2.5 * cell),
    )?;
    let horizontal: Vec<RouteStep> = (0..10)
        .map(|x| RouteStep::full(SegmentKey::whole(x, 0, 2), false))
        .collect();
    world.load_route(east, &horizontal)?;

    let north = world.spawn(
        SpawnSpec::new(Vec2::new(4.5, -1.5) * cell, Vec2::Y)
            .with_carts(vec![1.0 * cell])
            .with_seed_length(1.5 * cell),
    )?;
    world.load_leg(
        north,
        &[Vec2::new(4.5, -1.5) * cell, Vec2::new(4.5, 4.5) * cell],
    )?;

    // Independent copy fed the same budgets; must stay in lockstep
    let mut mirror = world.clone();

    for tick in 0..DEMO_MAX_TICKS {
        let budget = rng.random_range(0.05..0.15) * cell;
        for (id, result) in world.tick_all(budget)? {
            if result.is_blocked() {
                log::debug!("tick {tick}: train {id} waiting on {:?}", result.obstacle);
            }
        }
        mirror.tick_all(budget)?;
        if let Some(id) = world.parity_mismatch(&mirror, 1e-3) {
            log::warn!("tick {tick}: mirror drifted on train {id}");
        }

        let done = world.trains().all(|t| t.phase() == TrainPhase::Arrived);
        if done {
            log::info!("All trains arrived after {} ticks", tick + 1);
            break;
        }
    }

    for train in world.trains() {
        let head = train.head();
        println!(
            "train {} {:?} at ({:.2}, {:.2}), {} carts",
            train.id(),
            train.phase(),
            head.position.x,
            head.position.y,
            train.cart_poses().iter().flatten().count()
        );
    }
    println!(
        "bridge consumed: {}, mirror drift: {:?}",
        !world.tracks().contains(&bridge),
        world.parity_mismatch(&mirror, 1e-3)
    );
    Ok(())
}
