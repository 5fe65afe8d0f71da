//! Running an arena to completion while recording its command log.
//!
//! [`LogRunner`] ticks an [`Arena`] with a fixed time step and writes the
//! binary log: header, initialization batch, then one frame per tick. The
//! continue flag of the last frame is `false`, so a reader knows where the
//! run ended even if the file is later appended to.
//!
//! ```
//! use arena_engine::prelude::*;
//!
//! let mut arena = Arena::new(ArenaConfig::default(), NoRules).unwrap();
//! let mut buf = Vec::new();
//! let summary = LogRunner::new(&mut arena).run_to_writer(&mut buf, 0.25, 1.0).unwrap();
//! assert_eq!(summary.ticks, 4);
//!
//! let mut reader = LogReader::open(buf.as_slice()).unwrap();
//! let mut scene = Scene::default();
//! assert_eq!(reader.replay_all(&mut scene).unwrap(), 4);
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use arena_log::stream::LogWriter;

use crate::scheduler::Arena;
use crate::state::ArenaState;
use crate::ArenaError;

/// Produces the telemetry block for a tick.
pub type TelemetryFn<'a> = Box<dyn FnMut(&ArenaState) -> Vec<u8> + 'a>;

/// Outcome of a complete run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_time: f64,
    /// Agent faults over the whole run.
    pub faults: usize,
}

/// Drives an arena and records it.
pub struct LogRunner<'a> {
    arena: &'a mut Arena,
    telemetry: Option<TelemetryFn<'a>>,
    message_every: Option<u64>,
}

impl<'a> LogRunner<'a> {
    pub fn new(arena: &'a mut Arena) -> Self {
        Self {
            arena,
            telemetry: None,
            message_every: None,
        }
    }

    /// Attach `f`'s output to every tick frame. Without it the telemetry
    /// block is empty.
    pub fn with_telemetry(mut self, f: impl FnMut(&ArenaState) -> Vec<u8> + 'a) -> Self {
        self.telemetry = Some(Box::new(f));
        self
    }

    /// Log progress every `ticks` ticks.
    pub fn with_progress(mut self, ticks: u64) -> Self {
        self.message_every = (ticks > 0).then_some(ticks);
        self
    }

    /// Run into a new file at `path`.
    ///
    /// # Errors
    ///
    /// I/O failures creating or writing the file, plus everything
    /// [`run_to_writer`](Self::run_to_writer) reports.
    pub fn run(self, path: impl AsRef<Path>, time_step: f64, max_time: f64) -> Result<RunSummary, ArenaError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "recording arena run");
        self.run_to_writer(BufWriter::new(file), time_step, max_time)
    }

    /// Tick until the simulation ends or simulated time reaches `max_time`,
    /// writing every frame to `writer`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidTimeStep`] for a step that is not positive and
    /// finite, [`ArenaError::Log`] if a command cannot be encoded or written.
    pub fn run_to_writer<W: Write>(mut self, writer: W, time_step: f64, max_time: f64) -> Result<RunSummary, ArenaError> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(ArenaError::InvalidTimeStep { dt: time_step });
        }

        let mut log = LogWriter::new(writer)?;
        log.write_initialization(&self.arena.initialization(), self.arena.state().registry())?;

        let mut summary = RunSummary::default();
        while self.arena.continues() && self.arena.time() < max_time {
            let report = self.arena.tick(time_step);
            summary.ticks += 1;
            summary.faults += report.faults.len();

            let state = self.arena.state();
            let telemetry = match self.telemetry.as_mut() {
                Some(f) => f(state),
                None => Vec::new(),
            };
            let continues = state.continues() && state.time() < max_time;
            log.write_tick(state.batch(), state.registry(), &telemetry, state.time(), continues)?;

            if let Some(every) = self.message_every {
                if summary.ticks % every == 0 {
                    tracing::info!(
                        tick = summary.ticks,
                        time = state.time(),
                        agents = state.population().len(),
                        "run progress"
                    );
                }
            }
        }
        log.flush()?;

        summary.final_time = self.arena.time();
        tracing::info!(
            ticks = summary.ticks,
            final_time = summary.final_time,
            faults = summary.faults,
            "run finished"
        );
        Ok(summary)
    }
}
