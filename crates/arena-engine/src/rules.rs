//! Arena-wide logic that runs once per tick, after every agent has acted.
//!
//! A [`Rules`] object sees the whole [`ArenaState`] mutably, but runs
//! sequentially between phases, so it may use the immediate operations as
//! well as the deferred queues.

use std::collections::BTreeSet;

use arena_core::agent::AgentCode;
use arena_core::population::Filter;

use crate::state::ArenaState;

/// Collective rules for an arena.
pub trait Rules {
    /// Runs after every agent's `beginning_of_turn`.
    fn beginning_of_turn(&mut self, _state: &mut ArenaState) {}

    /// Runs after every agent's `end_of_turn`, before cleanup.
    fn end_of_turn(&mut self, _state: &mut ArenaState) {}

    /// Checked once after cleanup. Returning `true` ends the simulation.
    fn done(&self, _state: &ArenaState) -> bool {
        false
    }
}

/// No collective rules; the simulation runs until ended from outside.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl Rules for NoRules {}

// ---------------------------------------------------------------------------
// Predation
// ---------------------------------------------------------------------------

/// Hunters remove prey they touch.
///
/// At the end of each turn every prey agent within `reach` of a hunter's
/// center is queued for removal. With `stop_when_extinct`, the simulation
/// ends once no prey is left.
#[derive(Debug, Clone)]
pub struct Predation {
    pub hunter: String,
    pub prey: String,
    pub reach: f64,
    pub stop_when_extinct: bool,
    caught: u64,
}

impl Predation {
    pub fn new(hunter: impl Into<String>, prey: impl Into<String>, reach: f64) -> Self {
        Self {
            hunter: hunter.into(),
            prey: prey.into(),
            reach,
            stop_when_extinct: false,
            caught: 0,
        }
    }

    pub fn stop_when_extinct(mut self) -> Self {
        self.stop_when_extinct = true;
        self
    }

    /// Prey caught since the rules were created.
    pub fn caught(&self) -> u64 {
        self.caught
    }
}

impl Rules for Predation {
    fn end_of_turn(&mut self, state: &mut ArenaState) {
        let mut victims = BTreeSet::<AgentCode>::new();
        for hunter in state.agents(Filter::Name(&self.hunter)) {
            let center = hunter.position();
            victims.extend(
                state
                    .nearby(center, self.reach, Filter::Name(&self.prey))
                    .filter(|prey| prey.position().distance(center) <= self.reach)
                    .map(|prey| prey.code),
            );
        }
        for code in &victims {
            state.remove_object_delay(*code);
        }
        if !victims.is_empty() {
            tracing::debug!(caught = victims.len(), prey = %self.prey, "prey caught");
        }
        self.caught += victims.len() as u64;
    }

    fn done(&self, state: &ArenaState) -> bool {
        self.stop_when_extinct && state.count(Filter::Name(&self.prey)) == 0
    }
}
