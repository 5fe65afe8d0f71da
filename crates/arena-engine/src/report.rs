//! What happened during one tick, beyond the commands it produced.

use std::fmt;
use std::time::Duration;

use arena_core::agent::AgentCode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The tick phase an agent callback ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    BeginningOfTurn,
    ChooseAction,
    ExecuteAction,
    EndOfTurn,
    Cleanup,
}

impl Phase {
    /// Discriminant mixed into per-agent random streams.
    pub(crate) fn stream_id(self) -> u128 {
        match self {
            Phase::BeginningOfTurn => 0,
            Phase::ChooseAction => 1,
            Phase::ExecuteAction => 2,
            Phase::EndOfTurn => 3,
            Phase::Cleanup => 4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::BeginningOfTurn => "beginning_of_turn",
            Phase::ChooseAction => "choose_action",
            Phase::ExecuteAction => "execute_action",
            Phase::EndOfTurn => "end_of_turn",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// AgentFault
// ---------------------------------------------------------------------------

/// A callback that returned an error or panicked. The agent contributed no
/// action for that phase; the tick carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFault {
    pub code: AgentCode,
    pub phase: Phase,
    pub message: String,
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// Summary of one call to [`Arena::tick`](crate::scheduler::Arena::tick).
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick counter after this tick.
    pub tick: u64,
    /// Simulated time after this tick.
    pub time: f64,
    /// Whether the tick was skipped because the arena is paused.
    pub paused: bool,
    /// Moves, rotations and asset changes that were applied.
    pub accepted: usize,
    /// Turns that were refused (blocked or out of bounds).
    pub rejected: usize,
    /// Deferred removals applied at cleanup.
    pub removed: usize,
    /// Deferred additions applied at cleanup.
    pub added: usize,
    /// Faults in arrival order.
    pub faults: Vec<AgentFault>,
    /// Wall-clock time spent in the tick.
    pub elapsed: Duration,
}

impl TickReport {
    /// Faults raised in `phase`.
    pub fn faults_in(&self, phase: Phase) -> impl Iterator<Item = &AgentFault> + '_ {
        self.faults.iter().filter(move |f| f.phase == phase)
    }
}
