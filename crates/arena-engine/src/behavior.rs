//! The agent intelligence boundary.
//!
//! Every moving agent is driven by a [`Behavior`]. The arena calls it once
//! per phase per tick and hands it a context rather than a reference to the
//! arena itself:
//!
//! - [`AgentContext`] for the parallel phases. Read-only access to the arena,
//!   plus the deferred add/remove queues.
//! - [`ActionContext`] for the sequential execute phase. Adds the mutating
//!   operations (move, rotate, change asset).
//!
//! Each context carries its own random stream derived from the arena seed,
//! the tick, the agent and the phase, so results do not depend on how the
//! parallel phases were scheduled across workers.
//!
//! A callback that returns an error or panics is treated as "no action" and
//! reported in the tick's [`TickReport`](crate::report::TickReport).

use std::fmt;

use arena_core::agent::{AgentCode, AgentRecord, Kind, Passability};
use arena_core::geometry::{Point, Shape};
use arena_core::population::Filter;
use arena_core::registry::AssetCode;
use rand_pcg::Pcg64;

use crate::report::Phase;
use crate::state::ArenaState;

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// An intent chosen by an agent, applied during the execute phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Do nothing.
    Stay,
    /// Move the center to an absolute point.
    MoveTo(Point),
    /// Move the center by an offset.
    MoveBy { dx: f64, dy: f64 },
    /// Rotate by a relative angle in radians.
    Rotate(f64),
    /// Switch to another registered asset.
    ChangeAsset(AssetCode),
    /// Apply several turns in order, stopping at the first refusal.
    Sequence(Vec<Turn>),
}

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Decision logic for one moving agent.
///
/// Only [`choose_action`](Self::choose_action) is required. The default
/// [`execute_action`](Self::execute_action) applies the chosen [`Turn`]
/// through [`ActionContext::apply`].
pub trait Behavior: Send {
    /// Adjust internal state before anyone decides. Runs in parallel.
    fn beginning_of_turn(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Look at the arena and pick a turn. Runs in parallel.
    fn choose_action(&mut self, ctx: &mut AgentContext<'_>) -> anyhow::Result<Option<Turn>>;

    /// Carry out the chosen turn. Runs sequentially in shuffled order.
    ///
    /// Returns whether the turn took effect.
    fn execute_action(&mut self, turn: Turn, ctx: &mut ActionContext<'_>) -> anyhow::Result<bool> {
        Ok(ctx.apply(&turn))
    }

    /// React to the outcome of the tick. Runs in parallel.
    fn end_of_turn(&mut self, _ctx: &mut AgentContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NewAgent
// ---------------------------------------------------------------------------

/// An agent that has been built but not yet placed in an arena.
///
/// The code is allocated when the agent is added. `shape` is a template: its
/// center is replaced by the placement location.
pub struct NewAgent {
    pub name: String,
    pub kind: Kind,
    pub layer: i32,
    pub asset: AssetCode,
    pub passability: Passability,
    pub shape: Shape,
    pub(crate) behavior: Option<Box<dyn Behavior>>,
}

impl NewAgent {
    /// A moving agent driven by `behavior`. Solid by default.
    pub fn moving(
        name: impl Into<String>,
        layer: i32,
        asset: AssetCode,
        shape: Shape,
        behavior: impl Behavior + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Moving,
            layer,
            asset,
            passability: Passability::Solid,
            shape,
            behavior: Some(Box::new(behavior)),
        }
    }

    /// A stationary agent such as a wall or a rock. Solid by default.
    pub fn stationary(name: impl Into<String>, layer: i32, asset: AssetCode, shape: Shape) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Stationary,
            layer,
            asset,
            passability: Passability::Solid,
            shape,
            behavior: None,
        }
    }

    /// A backdrop on layer 0. Passable and dimensionless.
    pub fn background(asset: AssetCode) -> Self {
        Self {
            name: "Background".to_string(),
            kind: Kind::Background,
            layer: 0,
            asset,
            passability: Passability::Open,
            shape: Shape::marker(Point::ORIGIN),
            behavior: None,
        }
    }

    pub fn with_passability(mut self, passability: Passability) -> Self {
        self.passability = passability;
        self
    }

    pub(crate) fn into_record(self, code: AgentCode, location: Point) -> (AgentRecord, Option<Box<dyn Behavior>>) {
        let record = AgentRecord::new(
            code,
            self.name,
            self.kind,
            self.layer,
            self.asset,
            self.passability,
            self.shape.translated_to(location),
        );
        (record, self.behavior)
    }
}

impl fmt::Debug for NewAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAgent")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("layer", &self.layer)
            .field("asset", &self.asset)
            .field("passability", &self.passability)
            .field("shape", &self.shape)
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AgentContext
// ---------------------------------------------------------------------------

/// What an agent sees during the parallel phases.
pub struct AgentContext<'a> {
    state: &'a ArenaState,
    me: &'a AgentRecord,
    phase: Phase,
    rng: Pcg64,
    queued: u32,
}

impl<'a> AgentContext<'a> {
    /// `None` if `code` is no longer in the arena.
    pub(crate) fn new(state: &'a ArenaState, code: AgentCode, phase: Phase) -> Option<Self> {
        let me = state.get(code)?;
        Some(Self {
            state,
            me,
            phase,
            rng: state.agent_rng(code, phase),
            queued: 0,
        })
    }

    /// The agent being driven.
    pub fn me(&self) -> &'a AgentRecord {
        self.me
    }

    pub fn code(&self) -> AgentCode {
        self.me.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read-only view of the whole arena.
    pub fn state(&self) -> &'a ArenaState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.state.time()
    }

    /// This agent's random stream for the current phase.
    pub fn rng(&mut self) -> &mut Pcg64 {
        &mut self.rng
    }

    /// Other agents matching `filter` near `point`. The caller is excluded.
    pub fn nearby(
        &self,
        point: Point,
        radius: f64,
        filter: Filter<'a>,
    ) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        let me = self.me.code;
        self.state
            .nearby(point, radius, filter)
            .filter(move |r| r.code != me)
    }

    /// Whether this agent would be blocked with its center at `point`.
    pub fn is_blocked_at(&self, point: Point) -> bool {
        self.state.is_point_occupied(point, Some(self.me.code))
    }

    /// Queue `code` for removal at the end of the tick.
    pub fn remove_object_delay(&self, code: AgentCode) {
        self.state.remove_object_delay(code);
    }

    /// Queue a new agent for placement at the end of the tick.
    pub fn add_object_delay(&mut self, agent: NewAgent, location: Point) {
        let order = (self.phase.stream_id() as u8, self.me.code.raw(), self.queued);
        self.queued += 1;
        self.state.enqueue_addition(order, agent, location);
    }

    /// Ask the arena to stop after this tick.
    pub fn end_simulation(&self) {
        self.state.end_simulation();
    }
}

// ---------------------------------------------------------------------------
// ActionContext
// ---------------------------------------------------------------------------

/// What an agent can do during the execute phase.
pub struct ActionContext<'a> {
    state: &'a mut ArenaState,
    code: AgentCode,
    rng: Pcg64,
    queued: u32,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(state: &'a mut ArenaState, code: AgentCode) -> Self {
        let rng = state.agent_rng(code, Phase::ExecuteAction);
        Self {
            state,
            code,
            rng,
            queued: 0,
        }
    }

    pub fn code(&self) -> AgentCode {
        self.code
    }

    /// The agent being driven, as it stands after any turns applied so far.
    pub fn me(&self) -> Option<&AgentRecord> {
        self.state.get(self.code)
    }

    pub fn state(&self) -> &ArenaState {
        &*self.state
    }

    pub fn rng(&mut self) -> &mut Pcg64 {
        &mut self.rng
    }

    /// Move this agent's center to `target`. See [`ArenaState::move_object`].
    pub fn move_to(&mut self, target: Point) -> bool {
        self.state.move_object(self.code, target)
    }

    /// Rotate this agent by `delta` radians. See [`ArenaState::rotate_object`].
    pub fn rotate(&mut self, delta: f64) -> bool {
        self.state.rotate_object(self.code, delta)
    }

    pub fn change_asset(&mut self, asset: AssetCode) -> bool {
        self.state.change_asset(self.code, asset)
    }

    /// Apply a standard [`Turn`].
    pub fn apply(&mut self, turn: &Turn) -> bool {
        match turn {
            Turn::Stay => true,
            Turn::MoveTo(target) => self.move_to(*target),
            Turn::MoveBy { dx, dy } => match self.me() {
                Some(me) => {
                    let target = me.position().offset(*dx, *dy);
                    self.move_to(target)
                }
                None => false,
            },
            Turn::Rotate(delta) => self.rotate(*delta),
            Turn::ChangeAsset(asset) => self.change_asset(*asset),
            Turn::Sequence(turns) => turns.iter().all(|t| self.apply(t)),
        }
    }

    pub fn remove_object_delay(&self, code: AgentCode) {
        self.state.remove_object_delay(code);
    }

    pub fn add_object_delay(&mut self, agent: NewAgent, location: Point) {
        let order = (Phase::ExecuteAction.stream_id() as u8, self.code.raw(), self.queued);
        self.queued += 1;
        self.state.enqueue_addition(order, agent, location);
    }
}
