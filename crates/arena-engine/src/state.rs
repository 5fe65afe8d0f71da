//! The shared state of an arena: its agents, assets, random source and the
//! batch of commands the current tick is building.
//!
//! [`ArenaState`] is what behaviors and rules see. During the parallel
//! phases it is shared read-only; the only things touched concurrently are
//! the deferred add/remove queues, each behind its own mutex. Every mutation
//! that the renderer should know about (`add_object`, `remove_object`,
//! `move_object`, `rotate_object`, `change_asset`, `set_window_dimensions`)
//! appends exactly one [`Command`] to the current batch, and only when it
//! actually happened.
//!
//! # Example
//!
//! ```
//! use arena_engine::prelude::*;
//!
//! let mut state = ArenaState::new(ArenaConfig::default()).unwrap();
//! let rock = state.registry().add_entry(AssetEntry::new("rock.png", 1.0, 1.0));
//! let code = state
//!     .add_object(
//!         NewAgent::stationary("obstacle", 1, rock, Shape::rect(Point::ORIGIN, 1.0, 1.0)),
//!         Point::new(5.0, 5.0),
//!     )
//!     .unwrap();
//!
//! assert!(state.is_point_occupied(Point::new(5.2, 5.2), None));
//! assert!(!state.is_point_occupied(Point::new(7.0, 7.0), None));
//! assert_eq!(state.count(Filter::Name("obstacle")), 1);
//! assert_eq!(state.batch().len(), 1);
//! # let _ = code;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use arena_core::agent::{AgentCode, AgentRecord, IdentityAllocator, Kind};
use arena_core::geometry::{Point, Range, Shape};
use arena_core::population::{Filter, Population};
use arena_core::registry::{AssetCode, AssetEntry, AssetRegistry};
use arena_log::command::{Command, TurnBatch};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::behavior::{Behavior, NewAgent};
use crate::config::ArenaConfig;
use crate::report::Phase;
use crate::ArenaError;

/// Ordering key for deferred additions: (phase, enqueuing agent, sequence).
pub(crate) type AdditionOrder = (u8, u32, u32);

/// Key used for additions queued from outside any agent callback.
const EXTERNAL_PHASE: u8 = u8::MAX;

struct PendingAddition {
    order: AdditionOrder,
    agent: NewAgent,
    location: Point,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ArenaState
// ---------------------------------------------------------------------------

/// Agents, assets and bookkeeping for one arena.
pub struct ArenaState {
    config: ArenaConfig,
    population: Population,
    registry: AssetRegistry,
    ids: IdentityAllocator,
    batch: TurnBatch,

    to_add: Mutex<Vec<PendingAddition>>,
    to_remove: Mutex<Vec<AgentCode>>,
    external_seq: AtomicU32,
    /// Behaviors of moving agents added since the scheduler last looked.
    adopted: Mutex<Vec<(AgentCode, Box<dyn Behavior>)>>,

    rng: Mutex<Pcg64>,
    time: f64,
    tick: u64,
    ended: AtomicBool,
    paused: bool,
    background: Option<AgentCode>,

    accepted: usize,
    rejected: usize,
}

impl ArenaState {
    /// Build an empty arena. If `config.background` names an asset, it is
    /// registered at the arena's full size and placed at the center.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let population = Population::new(
            config.width,
            config.height,
            config.x_divisions,
            config.y_divisions,
        )?;
        let mut state = Self {
            population,
            registry: AssetRegistry::new(),
            ids: IdentityAllocator::new(),
            batch: TurnBatch::new(),
            to_add: Mutex::new(Vec::new()),
            to_remove: Mutex::new(Vec::new()),
            external_seq: AtomicU32::new(0),
            adopted: Mutex::new(Vec::new()),
            rng: Mutex::new(Pcg64::seed_from_u64(config.seed)),
            time: 0.0,
            tick: 0,
            ended: AtomicBool::new(false),
            paused: false,
            background: None,
            accepted: 0,
            rejected: 0,
            config,
        };

        if let Some(filename) = state.config.background.clone() {
            let asset = state.registry.add_entry(AssetEntry::new(
                filename,
                state.config.width,
                state.config.height,
            ));
            let center = Point::new(state.config.width / 2.0, state.config.height / 2.0);
            let code = state.add_object(NewAgent::background(asset), center)?;
            state.background = Some(code);
        }
        Ok(state)
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn width(&self) -> f64 {
        self.config.width
    }

    pub fn height(&self) -> f64 {
        self.config.height
    }

    /// `[0, width] x [0, height]`.
    pub fn bounds(&self) -> Range {
        self.population.bounds()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// The code the backdrop was given, if one was configured.
    pub fn background(&self) -> Option<AgentCode> {
        self.background
    }

    /// Simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Ticks run so far, paused ticks excluded.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// The commands produced so far by the current (or last) tick.
    pub fn batch(&self) -> &TurnBatch {
        &self.batch
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Ask the arena to stop. Takes effect at the next tick boundary.
    pub fn end_simulation(&self) {
        self.ended.store(true, Ordering::Relaxed);
    }

    /// `false` once the simulation has been ended.
    pub fn continues(&self) -> bool {
        !self.ended.load(Ordering::Relaxed)
    }

    // -- lookups ------------------------------------------------------------

    pub fn get(&self, code: AgentCode) -> Option<&AgentRecord> {
        self.population.get(code)
    }

    pub fn contains(&self, code: AgentCode) -> bool {
        self.population.contains(code)
    }

    /// Agents matching `filter`, in code order.
    pub fn agents<'a>(&'a self, filter: Filter<'a>) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.population.matching(filter)
    }

    pub fn count(&self, filter: Filter<'_>) -> usize {
        self.population.count(filter)
    }

    /// Agents matching `filter` whose bounds overlap the square of side
    /// `2 * radius` around `point`.
    pub fn nearby<'a>(
        &'a self,
        point: Point,
        radius: f64,
        filter: Filter<'a>,
    ) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.population.query_nearby(point, radius, filter)
    }

    // -- occupancy ----------------------------------------------------------

    /// Whether `shape` would overlap an agent that does not let `asker`
    /// through. The asker itself never blocks.
    pub fn is_occupied(&self, shape: &Shape, asker: Option<AgentCode>) -> bool {
        let asker_record = asker.and_then(|c| self.population.get(c));
        self.population
            .query_nearby(shape.center(), shape.max_radius(), Filter::Any)
            .any(|other| {
                Some(other.code) != asker
                    && !other.is_passable_for(asker_record)
                    && other.shape().intersects(shape)
            })
    }

    /// Whether `point` is taken. With an asker, tests the asker's own shape
    /// centered on `point`; without one, tests whether any agent that is not
    /// open to everyone contains the point.
    pub fn is_point_occupied(&self, point: Point, asker: Option<AgentCode>) -> bool {
        if let Some(record) = asker.and_then(|c| self.population.get(c)) {
            return self.is_occupied(&record.shape().translated_to(point), asker);
        }
        self.population
            .query_nearby(point, 0.0, Filter::Any)
            .any(|other| !other.is_passable_for(None) && other.shape().contains_point(point))
    }

    /// Inside the arena bounds (boundary included).
    pub fn test_point(&self, point: Point) -> bool {
        self.bounds().contains_point(point)
    }

    /// Entirely inside the arena bounds.
    pub fn test_shape(&self, shape: &Shape) -> bool {
        self.bounds().contains_range(&shape.range())
    }

    /// In bounds and not occupied.
    pub fn is_valid_point(&self, point: Point) -> bool {
        self.test_point(point) && !self.is_point_occupied(point, None)
    }

    /// Entirely in bounds and not occupied.
    pub fn is_valid_location(&self, shape: &Shape) -> bool {
        self.test_shape(shape) && !self.is_occupied(shape, None)
    }

    // -- immediate structural changes --------------------------------------

    /// Place `agent` with its center at `location`, allocate its code and log
    /// `AddObject`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::UnknownAsset`] if the asset is not registered,
    /// [`ArenaError::InvalidPlacement`] if `location` is not finite,
    /// [`ArenaError::Core`] if no agent code is left to give it.
    pub fn add_object(&mut self, agent: NewAgent, location: Point) -> Result<AgentCode, ArenaError> {
        if !(location.x.is_finite() && location.y.is_finite()) {
            return Err(ArenaError::InvalidPlacement {
                name: agent.name,
                x: location.x,
                y: location.y,
            });
        }
        if self.registry.get(agent.asset).is_none() {
            return Err(ArenaError::UnknownAsset { code: agent.asset });
        }

        let code = self.ids.allocate()?;
        let (record, behavior) = agent.into_record(code, location);
        let layer = record.layer;
        let asset = record.asset;
        let kind = record.kind;
        self.population.insert(record)?;
        if let Some(behavior) = behavior {
            if kind == Kind::Moving {
                lock(&self.adopted).push((code, behavior));
            }
        }
        self.batch.push(Command::AddObject {
            layer,
            code,
            asset,
            position: location,
        });
        tracing::debug!(code = %code, kind = ?kind, "agent added");
        Ok(code)
    }

    /// Place `agent` at a uniformly random location drawn from the arena's
    /// seeded generator.
    pub fn add_object_random(&mut self, agent: NewAgent) -> Result<AgentCode, ArenaError> {
        let (w, h) = (self.config.width, self.config.height);
        let location = {
            let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
            Point::new(rng.gen_range(0.0..w), rng.gen_range(0.0..h))
        };
        self.add_object(agent, location)
    }

    /// Take `code` out of the arena and log `RemoveObject`.
    pub fn remove_object(&mut self, code: AgentCode) -> Result<AgentRecord, ArenaError> {
        let record = self.population.remove(code)?;
        self.batch.push(Command::RemoveObject {
            layer: record.layer,
            code,
        });
        if self.background == Some(code) {
            self.background = None;
        }
        tracing::debug!(code = %code, "agent removed");
        Ok(record)
    }

    // -- deferred structural changes ---------------------------------------

    /// Queue `code` for removal at the end of the tick. Safe to call from
    /// any phase; duplicates are applied once.
    pub fn remove_object_delay(&self, code: AgentCode) {
        lock(&self.to_remove).push(code);
    }

    /// Queue `agent` for placement at `location` at the end of the tick.
    pub fn add_object_delay(&self, agent: NewAgent, location: Point) {
        let seq = self.external_seq.fetch_add(1, Ordering::Relaxed);
        self.enqueue_addition((EXTERNAL_PHASE, u32::MAX, seq), agent, location);
    }

    pub(crate) fn enqueue_addition(&self, order: AdditionOrder, agent: NewAgent, location: Point) {
        lock(&self.to_add).push(PendingAddition {
            order,
            agent,
            location,
        });
    }

    /// Number of queued removals and additions.
    pub fn pending(&self) -> (usize, usize) {
        (lock(&self.to_remove).len(), lock(&self.to_add).len())
    }

    /// Drain both queues. Removals come back sorted by code without
    /// duplicates and additions in a schedule-independent order.
    pub(crate) fn take_pending(&mut self) -> (Vec<AgentCode>, Vec<(NewAgent, Point)>) {
        let mut removals = std::mem::take(
            self.to_remove
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        removals.sort_unstable();
        removals.dedup();

        let mut additions = std::mem::take(
            self.to_add
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        additions.sort_by_key(|p| p.order);
        self.external_seq.store(0, Ordering::Relaxed);
        let additions = additions
            .into_iter()
            .map(|p| (p.agent, p.location))
            .collect();
        (removals, additions)
    }

    /// Behaviors of moving agents added since the last call.
    pub(crate) fn take_adopted(&mut self) -> Vec<(AgentCode, Box<dyn Behavior>)> {
        std::mem::take(self.adopted.get_mut().unwrap_or_else(PoisonError::into_inner))
    }

    // -- mutations ----------------------------------------------------------

    /// Move the center of `code` to `target`.
    ///
    /// Refused (returns `false`, changes nothing, logs nothing) if the agent
    /// does not exist, the moved shape would leave the arena, or it would
    /// overlap an agent that does not let it through.
    pub fn move_object(&mut self, code: AgentCode, target: Point) -> bool {
        let Some(record) = self.population.get(code) else {
            return false;
        };
        let candidate = record.shape().translated_to(target);
        let layer = record.layer;
        if !self.accepts(code, &candidate) {
            self.rejected += 1;
            return false;
        }
        if self.population.relocate(code, candidate).is_err() {
            return false;
        }
        self.accepted += 1;
        self.batch.push(Command::MoveObject {
            layer,
            code,
            position: target,
        });
        true
    }

    /// Rotate `code` by `delta` radians about its center. Same refusal rules
    /// as [`move_object`](Self::move_object). The logged angle is the
    /// resulting absolute orientation.
    pub fn rotate_object(&mut self, code: AgentCode, delta: f64) -> bool {
        let Some(record) = self.population.get(code) else {
            return false;
        };
        let candidate = record.shape().rotated(delta);
        let layer = record.layer;
        if !self.accepts(code, &candidate) {
            self.rejected += 1;
            return false;
        }
        if self.population.relocate(code, candidate).is_err() {
            return false;
        }
        self.accepted += 1;
        self.batch.push(Command::RotateObject {
            layer,
            code,
            angle: candidate.angle(),
        });
        true
    }

    /// Draw `code` with `asset` from now on. Refused if either is unknown.
    pub fn change_asset(&mut self, code: AgentCode, asset: AssetCode) -> bool {
        if self.registry.get(asset).is_none() {
            tracing::warn!(code = %code, asset = asset.0, "change to unregistered asset refused");
            self.rejected += 1;
            return false;
        }
        let Some(layer) = self.population.get(code).map(|r| r.layer) else {
            return false;
        };
        if self.population.set_asset(code, asset).is_err() {
            return false;
        }
        self.accepted += 1;
        self.batch.push(Command::ChangeAsset { layer, code, asset });
        true
    }

    /// Announce the display size. The logical size is the arena's.
    pub fn set_window_dimensions(&mut self, display_width: f64, display_height: f64) {
        self.batch.push(Command::SetWindowDimensions {
            logical_width: self.config.width,
            logical_height: self.config.height,
            display_width,
            display_height,
        });
    }

    fn accepts(&self, code: AgentCode, candidate: &Shape) -> bool {
        self.test_shape(candidate) && !self.is_occupied(candidate, Some(code))
    }

    // -- tick bookkeeping ---------------------------------------------------

    /// The batch a renderer needs before the first tick: window dimensions
    /// (if configured) and one `AddObject` per agent in code order.
    pub fn initialization(&self) -> TurnBatch {
        let mut batch = TurnBatch::new();
        if let Some(window) = &self.config.window {
            batch.push(Command::SetWindowDimensions {
                logical_width: self.config.width,
                logical_height: self.config.height,
                display_width: window.display_width,
                display_height: window.display_height,
            });
        }
        for record in self.population.iter() {
            batch.push(Command::AddObject {
                layer: record.layer,
                code: record.code,
                asset: record.asset,
                position: record.position(),
            });
        }
        batch
    }

    /// Start a tick: advance time and the counter, reset the batch.
    pub(crate) fn begin_tick(&mut self, dt: f64) {
        self.time += dt;
        self.tick += 1;
        self.batch = TurnBatch::new();
        self.accepted = 0;
        self.rejected = 0;
    }

    /// A paused tick only moves the clock.
    pub(crate) fn idle_tick(&mut self, dt: f64) {
        self.time += dt;
        self.batch = TurnBatch::new();
    }

    /// `(accepted, rejected)` mutations in the current tick.
    pub(crate) fn mutation_counts(&self) -> (usize, usize) {
        (self.accepted, self.rejected)
    }

    /// The master generator, for draws made outside the parallel phases.
    pub fn rng(&mut self) -> &mut Pcg64 {
        self.rng.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// A generator private to one agent in one phase of the current tick.
    pub(crate) fn agent_rng(&self, code: AgentCode, phase: Phase) -> Pcg64 {
        let state = (u128::from(self.config.seed) << 64) | u128::from(self.tick);
        let stream = (u128::from(code.raw()) << 8) | phase.stream_id();
        Pcg64::new(state, stream)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
