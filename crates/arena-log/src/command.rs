//! Commands and per-tick batches.
//!
//! A [`Command`] is a pure value describing one visible change: an agent
//! appearing, moving, turning, changing asset or disappearing, or the window
//! being resized. Commands hold codes, never references, so a batch stays
//! valid after the agents it mentions are gone.
//!
//! A [`TurnBatch`] is the ordered list of commands one tick produced. The
//! scheduler starts a fresh batch every tick and hands the finished one out;
//! it is the unit that gets written to a log or sent to a renderer.
//!
//! # Example
//!
//! ```
//! use arena_core::prelude::*;
//! use arena_log::command::{Command, TurnBatch};
//! use arena_log::visitor::RecordingVisitor;
//!
//! let assets = AssetRegistry::new();
//! let hare = assets.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
//!
//! let mut batch = TurnBatch::new();
//! batch.push(Command::AddObject {
//!     layer: 2,
//!     code: AgentCode(0),
//!     asset: hare,
//!     position: Point::new(1.0, 1.0),
//! });
//! batch.push(Command::MoveObject {
//!     layer: 2,
//!     code: AgentCode(0),
//!     position: Point::new(1.5, 1.0),
//! });
//!
//! let mut visitor = RecordingVisitor::new();
//! batch.apply_to(&assets, &mut visitor);
//! assert_eq!(visitor.calls, batch.commands());
//! ```

use arena_core::agent::AgentCode;
use arena_core::geometry::Point;
use arena_core::registry::{AssetCode, AssetRegistry};
use serde::{Deserialize, Serialize};

use crate::visitor::ArenaVisitor;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// One-byte type tags used on the wire.
pub mod tag {
    pub const SET_WINDOW_DIMENSIONS: u8 = 0;
    pub const ADD_OBJECT: u8 = 1;
    pub const REMOVE_OBJECT: u8 = 2;
    pub const MOVE_OBJECT: u8 = 3;
    pub const ROTATE_OBJECT: u8 = 4;
    pub const CHANGE_ASSET: u8 = 5;
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Size of the arena in logical units and of the display in pixels.
    SetWindowDimensions {
        logical_width: f64,
        logical_height: f64,
        display_width: f64,
        display_height: f64,
    },
    /// An agent entered the arena.
    AddObject {
        layer: i32,
        code: AgentCode,
        asset: AssetCode,
        position: Point,
    },
    /// An agent left the arena.
    RemoveObject { layer: i32, code: AgentCode },
    /// An agent's center moved to `position`.
    MoveObject {
        layer: i32,
        code: AgentCode,
        position: Point,
    },
    /// An agent's orientation is now `angle` radians.
    RotateObject {
        layer: i32,
        code: AgentCode,
        angle: f64,
    },
    /// An agent is now drawn with `asset`.
    ChangeAsset {
        layer: i32,
        code: AgentCode,
        asset: AssetCode,
    },
}

impl Command {
    /// The wire tag for this variant.
    pub fn tag(&self) -> u8 {
        match self {
            Command::SetWindowDimensions { .. } => tag::SET_WINDOW_DIMENSIONS,
            Command::AddObject { .. } => tag::ADD_OBJECT,
            Command::RemoveObject { .. } => tag::REMOVE_OBJECT,
            Command::MoveObject { .. } => tag::MOVE_OBJECT,
            Command::RotateObject { .. } => tag::ROTATE_OBJECT,
            Command::ChangeAsset { .. } => tag::CHANGE_ASSET,
        }
    }

    /// The agent this command concerns, if any.
    pub fn agent(&self) -> Option<AgentCode> {
        match *self {
            Command::SetWindowDimensions { .. } => None,
            Command::AddObject { code, .. }
            | Command::RemoveObject { code, .. }
            | Command::MoveObject { code, .. }
            | Command::RotateObject { code, .. }
            | Command::ChangeAsset { code, .. } => Some(code),
        }
    }

    /// Drive the matching visitor call.
    pub fn apply_to(&self, assets: &AssetRegistry, visitor: &mut dyn ArenaVisitor) {
        match *self {
            Command::SetWindowDimensions {
                logical_width,
                logical_height,
                display_width,
                display_height,
            } => visitor.set_window_dimensions(
                display_width,
                display_height,
                logical_width,
                logical_height,
            ),
            Command::AddObject {
                layer,
                code,
                asset,
                position,
            } => visitor.add_object(assets, layer, asset, code, position),
            Command::RemoveObject { layer, code } => visitor.remove_object(layer, code),
            Command::MoveObject {
                layer,
                code,
                position,
            } => visitor.move_object(layer, code, position),
            Command::RotateObject { layer, code, angle } => {
                visitor.rotate_object(layer, code, angle)
            }
            Command::ChangeAsset { layer, code, asset } => {
                visitor.change_asset(assets, layer, code, asset)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TurnBatch
// ---------------------------------------------------------------------------

/// The ordered commands produced by one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnBatch {
    commands: Vec<Command>,
}

impl TurnBatch {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a command. Order of pushes is the replay order.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    /// Replay every command, in order, on `visitor`.
    pub fn apply_to(&self, assets: &AssetRegistry, visitor: &mut dyn ArenaVisitor) {
        for command in &self.commands {
            command.apply_to(assets, visitor);
        }
    }
}

impl From<Vec<Command>> for TurnBatch {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

impl<'a> IntoIterator for &'a TurnBatch {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn every_variant() -> Vec<Command> {
        vec![
            Command::SetWindowDimensions {
                logical_width: 10.0,
                logical_height: 8.0,
                display_width: 800.0,
                display_height: 640.0,
            },
            Command::AddObject {
                layer: 1,
                code: AgentCode(4),
                asset: AssetCode(0),
                position: Point::new(1.0, 2.0),
            },
            Command::RemoveObject {
                layer: 1,
                code: AgentCode(4),
            },
            Command::MoveObject {
                layer: 1,
                code: AgentCode(4),
                position: Point::new(3.0, 2.0),
            },
            Command::RotateObject {
                layer: 1,
                code: AgentCode(4),
                angle: 0.5,
            },
            Command::ChangeAsset {
                layer: 1,
                code: AgentCode(4),
                asset: AssetCode(1),
            },
        ]
    }

    #[test]
    fn tags_are_unique() {
        let tags: HashSet<u8> = every_variant().iter().map(Command::tag).collect();
        assert_eq!(tags.len(), 6);
    }

    #[test]
    fn rotate_has_its_own_tag() {
        let rotate = Command::RotateObject {
            layer: 0,
            code: AgentCode(0),
            angle: 1.0,
        };
        assert_eq!(rotate.tag(), tag::ROTATE_OBJECT);
        assert_ne!(rotate.tag(), tag::MOVE_OBJECT);
    }

    #[test]
    fn agent_code_extraction() {
        let cmds = every_variant();
        assert_eq!(cmds[0].agent(), None);
        assert!(cmds[1..].iter().all(|c| c.agent() == Some(AgentCode(4))));
    }

    #[test]
    fn batch_preserves_push_order() {
        let mut batch = TurnBatch::new();
        for c in every_variant() {
            batch.push(c);
        }
        assert_eq!(batch.len(), 6);
        assert_eq!(batch.commands(), every_variant().as_slice());
        let tags: Vec<u8> = batch.iter().map(Command::tag).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4, 5]);
    }
}
