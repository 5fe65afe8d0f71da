//! Arena Core -- agents, spatial grid and asset registry for the arena
//! simulation kernel.
//!
//! This crate holds the passive data of an arena: the [`AgentRecord`](agent::AgentRecord)
//! of every simulated object, the [`Population`](population::Population)
//! that keeps membership lists and the [`SpatialGrid`](grid::SpatialGrid) in
//! step with agent shapes, and the [`AssetRegistry`](registry::AssetRegistry)
//! that interns drawable assets into stable codes. Scheduling and logging live
//! in `arena-engine` and `arena-log`.
//!
//! # Quick Start
//!
//! ```
//! use arena_core::prelude::*;
//!
//! let registry = AssetRegistry::new();
//! let hare_asset = registry.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
//!
//! let ids = IdentityAllocator::new();
//! let mut pop = Population::new(20.0, 20.0, 4, 4).unwrap();
//! for i in 0..3 {
//!     let code = ids.allocate().unwrap();
//!     let shape = Shape::rect(Point::new(2.0 + 5.0 * i as f64, 2.0), 0.5, 0.5);
//!     pop.insert(AgentRecord::new(
//!         code,
//!         "hare",
//!         Kind::Moving,
//!         2,
//!         hare_asset,
//!         Passability::Solid,
//!         shape,
//!     ))
//!     .unwrap();
//! }
//!
//! assert_eq!(pop.members(Kind::Moving).len(), 3);
//! assert_eq!(pop.query_nearby(Point::new(2.0, 2.0), 1.0, Filter::Any).count(), 1);
//! pop.check_invariants().unwrap();
//! ```

#![deny(unsafe_code)]

pub mod agent;
pub mod geometry;
pub mod grid;
pub mod population;
pub mod registry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by core arena data structures.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The grid bounds or divisions are unusable.
    #[error("invalid grid: {detail}")]
    InvalidGrid { detail: String },

    /// An agent with this code is already held.
    #[error("agent {code} is already present")]
    DuplicateAgent { code: agent::AgentCode },

    /// No agent with this code is held.
    #[error("agent {code} does not exist")]
    UnknownAgent { code: agent::AgentCode },

    /// A log tried to load an asset into a slot that already has one.
    #[error("asset slot {code} already holds '{existing}'")]
    AssetSlotOccupied { code: u32, existing: String },

    /// Every agent code has been handed out.
    #[error("agent codes exhausted")]
    CodesExhausted,

    /// Membership lists or grid listings disagree with agent shapes.
    #[error("membership invariant violated: {detail}")]
    InvariantViolation { detail: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::agent::{AgentCode, AgentRecord, IdentityAllocator, Kind, Passability};
    pub use crate::geometry::{Point, Range, Shape};
    pub use crate::grid::{CellSpan, SpatialGrid};
    pub use crate::population::{Filter, Population};
    pub use crate::registry::{AssetCode, AssetEntry, AssetRegistry};
    pub use crate::CoreError;
}
