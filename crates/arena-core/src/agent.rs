//! Agent records, kinds and identity allocation.
//!
//! An [`AgentRecord`] is the data the arena holds for every simulated object:
//! its immutable [`AgentCode`], its [`Kind`], its layer, the asset it is drawn
//! with, whether other agents may pass through it, and its shape. The shape
//! can only be changed through [`Population::relocate`](crate::population::Population::relocate)
//! so that the spatial grid never goes stale.
//!
//! Codes come from an [`IdentityAllocator`] owned by a single arena. Two
//! arenas never share a counter.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Shape};
use crate::registry::AssetCode;
use crate::CoreError;

// ---------------------------------------------------------------------------
// AgentCode
// ---------------------------------------------------------------------------

/// The unique, immutable identity of an agent within one arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentCode(pub u32);

impl AgentCode {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for AgentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentCode({})", self.0)
    }
}

impl fmt::Display for AgentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Which membership collection an agent belongs to.
///
/// The kind is fixed at construction. Only [`Kind::Moving`] agents take part
/// in the per-tick phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Scenery such as the backdrop. Never blocks anything.
    Background,
    /// Fixed agents such as walls and water.
    Stationary,
    /// Agents that decide and act every tick.
    Moving,
}

impl Kind {
    /// All kinds in membership-slot order.
    pub const ALL: [Kind; 3] = [Kind::Background, Kind::Stationary, Kind::Moving];

    /// Slot index used for per-kind storage.
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            Kind::Background => 0,
            Kind::Stationary => 1,
            Kind::Moving => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Passability
// ---------------------------------------------------------------------------

/// Whether an agent lets others overlap it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Passability {
    /// Nobody may overlap this agent.
    Solid,
    /// Everybody may overlap this agent.
    Open,
    /// Only agents whose name is listed may overlap this agent.
    OpenTo(Vec<String>),
}

impl Passability {
    /// Whether `mover` may overlap an agent with this passability. An
    /// anonymous mover (`None`) only passes through [`Passability::Open`].
    pub fn allows(&self, mover: Option<&AgentRecord>) -> bool {
        match self {
            Passability::Solid => false,
            Passability::Open => true,
            Passability::OpenTo(names) => {
                mover.is_some_and(|m| names.iter().any(|n| *n == m.name))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRecord
// ---------------------------------------------------------------------------

/// Everything the arena stores about one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Immutable identity.
    pub code: AgentCode,
    /// Species or category name (e.g. `"hare"`, `"obstacle"`). Used by
    /// name filters and by [`Passability::OpenTo`].
    pub name: String,
    /// Membership collection.
    pub kind: Kind,
    /// Rendering layer.
    pub layer: i32,
    /// Asset drawn for this agent.
    pub asset: AssetCode,
    /// Who may overlap this agent.
    pub passability: Passability,
    pub(crate) shape: Shape,
}

impl AgentRecord {
    pub fn new(
        code: AgentCode,
        name: impl Into<String>,
        kind: Kind,
        layer: i32,
        asset: AssetCode,
        passability: Passability,
        shape: Shape,
    ) -> Self {
        Self {
            code,
            name: name.into(),
            kind,
            layer,
            asset,
            passability,
            shape,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The center of the shape.
    pub fn position(&self) -> Point {
        self.shape.center()
    }

    /// Whether `mover` may overlap this agent.
    pub fn is_passable_for(&self, mover: Option<&AgentRecord>) -> bool {
        self.passability.allows(mover)
    }
}

// ---------------------------------------------------------------------------
// IdentityAllocator
// ---------------------------------------------------------------------------

/// Hands out monotonically increasing [`AgentCode`]s.
///
/// The counter is atomic so agents can be constructed from several threads
/// during setup; codes are never recycled. Once the counter can no longer
/// advance, allocation fails instead of wrapping around to live codes.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    next: AtomicU32,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::starting_at(AgentCode(0))
    }

    /// An allocator whose first code is `first`.
    pub fn starting_at(first: AgentCode) -> Self {
        Self {
            next: AtomicU32::new(first.raw()),
        }
    }

    /// Allocate a fresh code.
    ///
    /// # Errors
    ///
    /// [`CoreError::CodesExhausted`] when every code has been issued.
    pub fn allocate(&self) -> Result<AgentCode, CoreError> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map(AgentCode)
            .map_err(|last| {
                tracing::error!(last, "agent codes exhausted");
                CoreError::CodesExhausted
            })
    }

    /// The code the next call to [`allocate`](Self::allocate) will return.
    pub fn peek(&self) -> AgentCode {
        AgentCode(self.next.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
