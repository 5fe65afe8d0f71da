//! Arena Engine -- the tick scheduler that drives an arena of agents.
//!
//! This crate builds on [`arena_core`] for agent storage and spatial queries
//! and on [`arena_log`] for the command stream. An [`Arena`](scheduler::Arena)
//! owns the shared [`ArenaState`](state::ArenaState), one
//! [`Behavior`](behavior::Behavior) per moving agent, and a [`Rules`](rules::Rules)
//! object for arena-wide logic. Each tick runs the same fixed phases:
//!
//! 1. beginning of turn (parallel over moving agents),
//! 2. shuffle, then choose action (parallel, read-only),
//! 3. execute action (sequential, shuffled order),
//! 4. end of turn (parallel), then the arena rules,
//! 5. cleanup of deferred removals and additions,
//! 6. the `done` check.
//!
//! Every accepted change lands in the tick's [`TurnBatch`](arena_log::command::TurnBatch).
//!
//! # Quick Start
//!
//! ```
//! use arena_engine::prelude::*;
//!
//! struct Drift;
//!
//! impl Behavior for Drift {
//!     fn choose_action(&mut self, ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>> {
//!         let p = ctx.me().position();
//!         Ok(Some(Turn::MoveTo(p.offset(0.5, 0.0))))
//!     }
//! }
//!
//! let config = ArenaConfig { width: 10.0, height: 10.0, ..Default::default() };
//! let mut arena = Arena::new(config, NoRules).unwrap();
//! let sprite = arena.state().registry().add_entry(AssetEntry::new("drift.png", 0.2, 0.2));
//! let code = arena
//!     .add_object(
//!         NewAgent::moving("drifter", 1, sprite, Shape::rect(Point::ORIGIN, 0.2, 0.2), Drift),
//!         Point::new(1.0, 5.0),
//!     )
//!     .unwrap();
//!
//! let init = arena.initialization();
//! assert_eq!(init.len(), 1);
//!
//! let report = arena.tick(0.1);
//! assert!(report.faults.is_empty());
//! assert_eq!(arena.state().get(code).unwrap().position(), Point::new(1.5, 5.0));
//! ```

#![deny(unsafe_code)]

pub mod behavior;
pub mod config;
pub mod report;
pub mod rules;
pub mod runner;
pub mod scheduler;
pub mod snapshot;
pub mod state;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use arena_core;

/// Re-export the log crate for convenience.
pub use arena_log;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while building or running an arena.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The configuration cannot describe a usable arena.
    #[error("invalid arena configuration: {detail}")]
    InvalidConfig { detail: String },

    /// The configuration text is not valid JSON for [`ArenaConfig`](config::ArenaConfig).
    #[error("failed to parse arena configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// An agent was given a location that is not a finite point.
    #[error("agent '{name}' cannot be placed at ({x}, {y})")]
    InvalidPlacement { name: String, x: f64, y: f64 },

    /// An agent refers to an asset the arena's registry does not hold.
    #[error("asset {code:?} is not registered")]
    UnknownAsset { code: arena_core::registry::AssetCode },

    /// The state could not be serialized for hashing.
    #[error("failed to encode arena state for hashing: {0}")]
    StateEncoding(serde_json::Error),

    /// The run loop was given a time step it cannot advance with.
    #[error("invalid time step {dt}")]
    InvalidTimeStep { dt: f64 },

    /// Opening or flushing a log file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Agent storage rejected an operation.
    #[error(transparent)]
    Core(#[from] arena_core::CoreError),

    /// Writing the command log failed.
    #[error(transparent)]
    Log(#[from] arena_log::LogError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use arena_core::prelude::*;
    pub use arena_log::prelude::*;

    pub use crate::behavior::{ActionContext, AgentContext, Behavior, NewAgent, Turn};
    pub use crate::config::{ArenaConfig, WindowDimensions};
    pub use crate::report::{AgentFault, Phase, TickReport};
    pub use crate::rules::{NoRules, Predation, Rules};
    pub use crate::runner::{LogRunner, RunSummary};
    pub use crate::scheduler::Arena;
    pub use crate::snapshot::ArenaSnapshot;
    pub use crate::state::ArenaState;
    pub use crate::ArenaError;
}
