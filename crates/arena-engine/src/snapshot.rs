//! Canonical state capture with BLAKE3 hashing.
//!
//! Provides [`ArenaSnapshot`] -- a serializable picture of everything in an
//! arena that determines what happens next (agents, assets, clock) with a
//! BLAKE3 content hash. Two arenas built from the same configuration, the
//! same agents and the same seed have equal hashes after the same ticks,
//! whatever the worker count.
//!
//! ```
//! use arena_engine::prelude::*;
//!
//! let mut arena = Arena::new(ArenaConfig::default(), NoRules).unwrap();
//! arena.tick(0.5);
//!
//! let snapshot = arena.state().capture_snapshot().unwrap();
//! assert_eq!(snapshot.tick, 1);
//! assert_eq!(snapshot.hash.len(), 64); // BLAKE3 hex digest
//! assert!(snapshot.verify());
//! assert_eq!(snapshot.hash, arena.state_hash().unwrap());
//! ```
//!
//! Behaviors and rules are not captured: they are arbitrary user code.

use std::io::Write;

use arena_core::agent::AgentRecord;
use arena_core::registry::AssetEntry;
use serde::{Deserialize, Serialize};

use crate::state::ArenaState;
use crate::ArenaError;

// ---------------------------------------------------------------------------
// ArenaSnapshot
// ---------------------------------------------------------------------------

/// A serializable snapshot of arena state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    /// Every agent, in code order.
    pub agents: Vec<AgentRecord>,
    /// Every asset slot, in code order.
    pub assets: Vec<AssetEntry>,
    pub time: f64,
    pub tick: u64,
    pub continues: bool,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the fields above.
    pub hash: String,
}

impl ArenaSnapshot {
    /// Recompute the hash and compare it with the recorded one. A snapshot
    /// that can no longer be encoded does not verify.
    pub fn verify(&self) -> bool {
        compute_hash(&self.agents, &self.assets, self.time, self.tick, self.continues)
            .is_ok_and(|hash| hash == self.hash)
    }
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HashableState<'a> {
    agents: &'a [AgentRecord],
    assets: &'a [AssetEntry],
    time: f64,
    tick: u64,
    continues: bool,
}

/// Serialize the hashed fields to `w` in their canonical form.
fn write_canonical(w: impl Write, state: &HashableState<'_>) -> Result<(), serde_json::Error> {
    serde_json::to_writer(w, state)
}

fn compute_hash(
    agents: &[AgentRecord],
    assets: &[AssetEntry],
    time: f64,
    tick: u64,
    continues: bool,
) -> Result<String, serde_json::Error> {
    let hashable = HashableState {
        agents,
        assets,
        time,
        tick,
        continues,
    };
    let mut hasher = blake3::Hasher::new();
    write_canonical(&mut hasher, &hashable)?;
    Ok(hasher.finalize().to_hex().to_string())
}

// ---------------------------------------------------------------------------
// ArenaState snapshot methods
// ---------------------------------------------------------------------------

impl ArenaState {
    /// Capture the current state and its hash.
    ///
    /// # Errors
    ///
    /// [`ArenaError::StateEncoding`] if the state cannot be serialized.
    pub fn capture_snapshot(&self) -> Result<ArenaSnapshot, ArenaError> {
        let agents: Vec<AgentRecord> = self.population().iter().cloned().collect();
        let assets = self.registry().entries();
        let hash = compute_hash(&agents, &assets, self.time(), self.tick_count(), self.continues())
            .map_err(|e| {
                tracing::error!(error = %e, tick = self.tick_count(), "state hashing failed");
                ArenaError::StateEncoding(e)
            })?;
        Ok(ArenaSnapshot {
            agents,
            assets,
            time: self.time(),
            tick: self.tick_count(),
            continues: self.continues(),
            hash,
        })
    }

    /// The BLAKE3 hash [`capture_snapshot`](Self::capture_snapshot) would
    /// record.
    pub fn state_hash(&self) -> Result<String, ArenaError> {
        Ok(self.capture_snapshot()?.hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
