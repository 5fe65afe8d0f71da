//! Predator/prey demo -- foxes chase rabbits across a walled field and the
//! run is recorded as a command log.
//!
//! Run with:
//!   cargo run --example predator_prey -p arena-engine -- [output.arena]
//!
//! Set `RUST_LOG=info` to see progress. The log can be replayed with
//! `arena_log::stream::LogReader`.

use std::f64::consts::TAU;
use std::path::PathBuf;

use arena_engine::prelude::*;
use rand::Rng;

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// Wanders in a random direction each tick.
struct Rabbit {
    step: f64,
}

impl Behavior for Rabbit {
    fn choose_action(&mut self, ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>> {
        let heading = ctx.rng().gen_range(0.0..TAU);
        Ok(Some(Turn::MoveBy {
            dx: self.step * heading.cos(),
            dy: self.step * heading.sin(),
        }))
    }
}

/// Heads for the closest rabbit in sight, otherwise wanders.
struct Fox {
    step: f64,
    sight: f64,
}

impl Behavior for Fox {
    fn choose_action(&mut self, ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>> {
        let here = ctx.me().position();
        let target = ctx
            .nearby(here, self.sight, Filter::Name("rabbit"))
            .map(|r| r.position())
            .min_by(|a, b| here.distance(*a).total_cmp(&here.distance(*b)));

        let heading = match target {
            Some(p) => (p.y - here.y).atan2(p.x - here.x),
            None => ctx.rng().gen_range(0.0..TAU),
        };
        let dist = target.map_or(self.step, |p| here.distance(p).min(self.step));
        Ok(Some(Turn::MoveBy {
            dx: dist * heading.cos(),
            dy: dist * heading.sin(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("predator_prey.arena"));

    let config = ArenaConfig {
        width: 20.0,
        height: 20.0,
        x_divisions: 20,
        y_divisions: 20,
        seed: 7,
        worker_threads: 4,
        background: Some("grass.png".into()),
        window: Some(WindowDimensions {
            display_width: 800.0,
            display_height: 800.0,
        }),
    };
    let mut arena = Arena::new(config, Predation::new("fox", "rabbit", 0.6).stop_when_extinct())?;

    let registry = arena.state().registry();
    let wall = registry.add_entry(AssetEntry::new("wall.png", 1.0, 1.0));
    let rabbit = registry.add_entry(AssetEntry::new("rabbit.png", 0.4, 0.4));
    let fox = registry.add_entry(AssetEntry::new("fox.png", 0.6, 0.6));

    // A wall across the middle with a gap.
    for i in 0..20 {
        if (8..12).contains(&i) {
            continue;
        }
        arena.add_object(
            NewAgent::stationary("wall", 1, wall, Shape::rect(Point::ORIGIN, 1.0, 1.0)),
            Point::new(i as f64 + 0.5, 10.0),
        )?;
    }

    let mut placed = 0;
    while placed < 40 {
        let shape = Shape::circle(Point::ORIGIN, 0.2);
        let agent = NewAgent::moving("rabbit", 2, rabbit, shape, Rabbit { step: 0.3 });
        let code = arena.add_object_random(agent)?;
        // Random placement may overlap a wall or the edge; retry those.
        let state = arena.state();
        let fits = state
            .get(code)
            .is_some_and(|r| state.test_shape(r.shape()) && !state.is_occupied(r.shape(), Some(code)));
        if fits {
            placed += 1;
        } else {
            arena.remove_object(code)?;
        }
    }
    for x in [3.0, 17.0] {
        arena.add_object(
            NewAgent::moving("fox", 3, fox, Shape::circle(Point::ORIGIN, 0.3), Fox { step: 0.4, sight: 5.0 }),
            Point::new(x, 3.0),
        )?;
    }

    let summary = LogRunner::new(&mut arena)
        .with_telemetry(|state| state.count(Filter::Name("rabbit")).to_string().into_bytes())
        .with_progress(100)
        .run(&output, 0.1, 120.0)?;

    println!(
        "{} ticks, {:.1}s simulated, {} rabbits left, log written to {}",
        summary.ticks,
        summary.final_time,
        arena.state().count(Filter::Name("rabbit")),
        output.display()
    );
    Ok(())
}
