//! The tick scheduler.
//!
//! [`Arena`] drives an [`ArenaState`] forward one tick at a time. Each tick:
//!
//! 1. Every moving agent's `beginning_of_turn` runs (parallel), then the
//!    rules' `beginning_of_turn`.
//! 2. The moving agents are shuffled with the seeded generator, then every
//!    `choose_action` runs (parallel, read-only).
//! 3. Each chosen turn is executed, one agent at a time, in shuffled order.
//! 4. Every `end_of_turn` runs (parallel), then the rules' `end_of_turn`.
//! 5. Cleanup: queued removals, then queued additions.
//! 6. The rules' `done` check.
//!
//! Parallel phases run on a dedicated rayon pool sized by
//! `config.worker_threads`; with one worker they run inline. Each agent
//! callback is isolated: an error or panic becomes an [`AgentFault`] in the
//! returned [`TickReport`] and that agent simply does nothing this phase.
//!
//! # Example
//!
//! ```
//! use arena_engine::prelude::*;
//!
//! struct Faulty;
//! impl Behavior for Faulty {
//!     fn choose_action(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>> {
//!         anyhow::bail!("no idea what to do")
//!     }
//! }
//!
//! let mut arena = Arena::new(ArenaConfig::default(), NoRules).unwrap();
//! let sprite = arena.state().registry().add_entry(AssetEntry::new("x.png", 0.5, 0.5));
//! arena
//!     .add_object(
//!         NewAgent::moving("faulty", 1, sprite, Shape::rect(Point::ORIGIN, 0.5, 0.5), Faulty),
//!         Point::new(2.0, 2.0),
//!     )
//!     .unwrap();
//!
//! let report = arena.tick(1.0);
//! assert_eq!(report.faults.len(), 1);
//! assert_eq!(report.faults[0].phase, Phase::ChooseAction);
//! assert!(arena.continues());
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use arena_core::agent::AgentCode;
use arena_core::geometry::Point;
use arena_log::command::TurnBatch;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::behavior::{ActionContext, AgentContext, Behavior, NewAgent, Turn};
use crate::config::ArenaConfig;
use crate::report::{AgentFault, Phase, TickReport};
use crate::rules::Rules;
use crate::state::ArenaState;
use crate::ArenaError;

// ---------------------------------------------------------------------------
// Mover
// ---------------------------------------------------------------------------

/// A moving agent's behavior and the turn it chose this tick.
struct Mover {
    code: AgentCode,
    behavior: Box<dyn Behavior>,
    turn: Option<Turn>,
}

// ---------------------------------------------------------------------------
// Fault capture
// ---------------------------------------------------------------------------

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Run one agent callback, turning an error or a panic into a fault.
fn isolate<T>(code: AgentCode, phase: Phase, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, AgentFault> {
    let message = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    tracing::warn!(code = %code, phase = %phase, error = %message, "agent callback failed");
    Err(AgentFault {
        code,
        phase,
        message,
    })
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// An arena plus everything needed to advance it.
pub struct Arena {
    state: ArenaState,
    /// Moving agents in the order of the last shuffle.
    movers: Vec<Mover>,
    rules: Box<dyn Rules>,
    /// `None` when the parallel phases run inline.
    pool: Option<rayon::ThreadPool>,
}

impl Arena {
    /// Build an arena from `config`, driven by `rules`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidConfig`] for an unusable configuration, or
    /// [`ArenaError::WorkerPool`] if the worker threads cannot be started.
    pub fn new(config: ArenaConfig, rules: impl Rules + 'static) -> Result<Self, ArenaError> {
        let workers = config.worker_threads;
        let state = ArenaState::new(config)?;
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("arena-worker-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        tracing::info!(
            width = state.width(),
            height = state.height(),
            workers,
            seed = state.config().seed,
            "arena created"
        );
        Ok(Self {
            state,
            movers: Vec::new(),
            rules: Box::new(rules),
            pool,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> &ArenaState {
        &self.state
    }

    /// Direct access for setup and tests. Moving agents added through this
    /// handle are picked up at the start of the next tick.
    pub fn state_mut(&mut self) -> &mut ArenaState {
        &mut self.state
    }

    pub fn time(&self) -> f64 {
        self.state.time()
    }

    pub fn tick_count(&self) -> u64 {
        self.state.tick_count()
    }

    /// `false` once the rules said done or the simulation was ended.
    pub fn continues(&self) -> bool {
        self.state.continues()
    }

    pub fn end_simulation(&self) {
        self.state.end_simulation();
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.set_paused(paused);
    }

    /// Codes of the moving agents in the order they executed last tick.
    pub fn execution_order(&self) -> Vec<AgentCode> {
        self.movers.iter().map(|m| m.code).collect()
    }

    /// See [`ArenaState::initialization`].
    pub fn initialization(&self) -> TurnBatch {
        self.state.initialization()
    }

    /// The commands produced by the last tick.
    pub fn last_batch(&self) -> &TurnBatch {
        self.state.batch()
    }

    /// See [`ArenaState::state_hash`].
    pub fn state_hash(&self) -> Result<String, ArenaError> {
        self.state.state_hash()
    }

    // -- setup --------------------------------------------------------------

    /// Place an agent now. See [`ArenaState::add_object`].
    pub fn add_object(&mut self, agent: NewAgent, location: Point) -> Result<AgentCode, ArenaError> {
        let code = self.state.add_object(agent, location)?;
        self.adopt_new_movers();
        Ok(code)
    }

    /// Place an agent at a random location. See
    /// [`ArenaState::add_object_random`].
    pub fn add_object_random(&mut self, agent: NewAgent) -> Result<AgentCode, ArenaError> {
        let code = self.state.add_object_random(agent)?;
        self.adopt_new_movers();
        Ok(code)
    }

    /// Remove an agent now. See [`ArenaState::remove_object`].
    pub fn remove_object(&mut self, code: AgentCode) -> Result<(), ArenaError> {
        self.state.remove_object(code)?;
        self.movers.retain(|m| m.code != code);
        Ok(())
    }

    fn adopt_new_movers(&mut self) {
        for (code, behavior) in self.state.take_adopted() {
            self.movers.push(Mover {
                code,
                behavior,
                turn: None,
            });
        }
    }

    /// Drop behaviors whose agent is gone.
    fn prune_movers(&mut self) {
        let state = &self.state;
        self.movers.retain(|m| state.contains(m.code));
    }

    // -- ticking ------------------------------------------------------------

    /// Advance the arena by one tick of `dt` simulated seconds.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let started = Instant::now();
        if self.state.is_paused() {
            self.state.idle_tick(dt);
            return TickReport {
                tick: self.state.tick_count(),
                time: self.state.time(),
                paused: true,
                elapsed: started.elapsed(),
                ..Default::default()
            };
        }

        self.state.begin_tick(dt);
        self.adopt_new_movers();
        self.prune_movers();
        let mut faults = Vec::new();

        // Phase 1: beginning of turn.
        faults.extend(self.run_parallel(Phase::BeginningOfTurn, |mover, ctx| {
            mover.behavior.beginning_of_turn(ctx)
        }));
        self.rules.beginning_of_turn(&mut self.state);
        self.adopt_new_movers();
        self.prune_movers();

        // Phase 2: shuffle, then choose.
        self.movers.shuffle(self.state.rng());
        faults.extend(self.run_parallel(Phase::ChooseAction, |mover, ctx| {
            // Cleared first so a failed choice executes nothing.
            mover.turn = None;
            mover.turn = mover.behavior.choose_action(ctx)?;
            Ok(())
        }));

        // Phase 3: execute, sequentially in shuffled order.
        faults.extend(self.execute_actions());

        // Phase 4: end of turn.
        faults.extend(self.run_parallel(Phase::EndOfTurn, |mover, ctx| {
            mover.behavior.end_of_turn(ctx)
        }));
        self.rules.end_of_turn(&mut self.state);

        // Phase 5: cleanup.
        let (removed, added) = self.cleanup();

        // Phase 6: done check.
        if self.rules.done(&self.state) {
            tracing::info!(tick = self.state.tick_count(), "rules report done");
            self.state.end_simulation();
        }

        let (accepted, rejected) = self.state.mutation_counts();
        let report = TickReport {
            tick: self.state.tick_count(),
            time: self.state.time(),
            paused: false,
            accepted,
            rejected,
            removed,
            added,
            faults,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            tick = report.tick,
            commands = self.state.batch().len(),
            accepted,
            rejected,
            faults = report.faults.len(),
            "tick complete"
        );
        report
    }

    /// Run `tick` `count` times or until the simulation ends. Returns the
    /// number of ticks run.
    pub fn run_ticks(&mut self, count: u64, dt: f64) -> u64 {
        let mut ran = 0;
        while ran < count && self.continues() {
            self.tick(dt);
            ran += 1;
        }
        ran
    }

    /// Call `f` for every mover with a read-only context, in parallel when a
    /// pool is configured. Faults come back in mover order.
    fn run_parallel<F>(&mut self, phase: Phase, f: F) -> Vec<AgentFault>
    where
        F: Fn(&mut Mover, &mut AgentContext<'_>) -> anyhow::Result<()> + Sync,
    {
        let state = &self.state;
        let call = |mover: &mut Mover| -> Option<AgentFault> {
            let mut ctx = AgentContext::new(state, mover.code, phase)?;
            isolate(mover.code, phase, || f(mover, &mut ctx)).err()
        };
        match &self.pool {
            Some(pool) => pool.install(|| self.movers.par_iter_mut().filter_map(call).collect()),
            None => self.movers.iter_mut().filter_map(call).collect(),
        }
    }

    fn execute_actions(&mut self) -> Vec<AgentFault> {
        let mut faults = Vec::new();
        for mover in &mut self.movers {
            let Some(turn) = mover.turn.take() else {
                continue;
            };
            if !self.state.contains(mover.code) {
                continue;
            }
            let code = mover.code;
            let mut ctx = ActionContext::new(&mut self.state, code);
            let behavior = &mut mover.behavior;
            if let Err(fault) = isolate(code, Phase::ExecuteAction, || {
                behavior.execute_action(turn, &mut ctx)
            }) {
                faults.push(fault);
            }
        }
        faults
    }

    /// Apply queued removals, then queued additions. Returns how many of
    /// each took effect.
    fn cleanup(&mut self) -> (usize, usize) {
        let (removals, additions) = self.state.take_pending();
        let mut removed = 0;
        for code in removals {
            match self.state.remove_object(code) {
                Ok(_) => removed += 1,
                Err(e) => tracing::debug!(code = %code, error = %e, "queued removal skipped"),
            }
        }
        let mut added = 0;
        for (agent, location) in additions {
            let name = agent.name.clone();
            match self.state.add_object(agent, location) {
                Ok(_) => added += 1,
                Err(e) => tracing::warn!(name = %name, error = %e, "queued addition dropped"),
            }
        }
        self.prune_movers();
        self.adopt_new_movers();
        (removed, added)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::NoRules;
    use arena_core::geometry::Shape;
    use arena_core::registry::AssetEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    impl Behavior for Counter {
        fn beginning_of_turn(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn choose_action(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Turn::Stay))
        }
        fn end_of_turn(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn arena_with_counters(n: usize, workers: usize) -> (Arena, Arc<AtomicUsize>) {
        let config = ArenaConfig {
            worker_threads: workers,
            ..Default::default()
        };
        let mut arena = Arena::new(config, NoRules).unwrap();
        let asset = arena
            .state()
            .registry()
            .add_entry(AssetEntry::new("c.png", 0.2, 0.2));
        let calls = Arc::new(AtomicUsize::new(0));
        for i in 0..n {
            arena
                .add_object(
                    NewAgent::moving(
                        "counter",
                        1,
                        asset,
                        Shape::rect(Point::ORIGIN, 0.2, 0.2),
                        Counter {
                            calls: Arc::clone(&calls),
                        },
                    ),
                    Point::new(0.5 + i as f64 * 0.5, 0.5),
                )
                .unwrap();
        }
        (arena, calls)
    }

    #[test]
    fn every_parallel_phase_reaches_every_mover() {
        for workers in [1, 3] {
            let (mut arena, calls) = arena_with_counters(8, workers);
            let report = arena.tick(1.0);
            assert!(report.faults.is_empty());
            assert_eq!(calls.load(Ordering::SeqCst), 24);
            assert_eq!(report.accepted, 0);
        }
    }

    #[test]
    fn paused_tick_only_moves_the_clock() {
        let (mut arena, calls) = arena_with_counters(2, 1);
        arena.set_paused(true);
        let report = arena.tick(0.5);
        assert!(report.paused);
        assert_eq!(arena.time(), 0.5);
        assert_eq!(arena.tick_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(arena.last_batch().is_empty());

        arena.set_paused(false);
        arena.tick(0.5);
        assert_eq!(arena.tick_count(), 1);
        assert_eq!(arena.time(), 1.0);
    }

    #[test]
    fn shuffle_is_a_permutation_and_seeded() {
        let order = |seed| {
            let config = ArenaConfig {
                seed,
                ..Default::default()
            };
            let mut arena = Arena::new(config, NoRules).unwrap();
            let asset = arena
                .state()
                .registry()
                .add_entry(AssetEntry::new("c.png", 0.2, 0.2));
            for i in 0..10 {
                arena
                    .add_object(
                        NewAgent::moving(
                            "counter",
                            1,
                            asset,
                            Shape::rect(Point::ORIGIN, 0.2, 0.2),
                            Counter {
                                calls: Arc::new(AtomicUsize::new(0)),
                            },
                        ),
                        Point::new(0.5 + i as f64 * 0.5, 0.5),
                    )
                    .unwrap();
            }
            arena.tick(1.0);
            arena.execution_order()
        };
        let a = order(1);
        assert_eq!(a, order(1));
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..10).map(AgentCode).collect::<Vec<_>>());
    }

    #[test]
    fn run_ticks_stops_when_ended() {
        let (mut arena, _) = arena_with_counters(1, 1);
        assert_eq!(arena.run_ticks(3, 1.0), 3);
        arena.end_simulation();
        assert_eq!(arena.run_ticks(3, 1.0), 0);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panic: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panic: bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert!(panic_message(payload.as_ref()).contains("non-string"));
    }
}
