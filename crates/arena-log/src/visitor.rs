//! The rendering boundary: anything that consumes a command stream.
//!
//! An [`ArenaVisitor`] receives one call per [`Command`](crate::command::Command),
//! in the order the commands were produced. The kernel never depends on what a
//! visitor does with them; a window, a file exporter and a test double are all
//! equally valid.
//!
//! Two visitors ship with this crate:
//!
//! - [`RecordingVisitor`] keeps the call sequence as commands, plus the asset
//!   entries resolved for each `add_object`. Used for round-trip checks.
//! - [`Scene`] folds the calls into the current set of visible objects, the
//!   way a renderer would.

use std::collections::BTreeMap;

use arena_core::agent::AgentCode;
use arena_core::geometry::Point;
use arena_core::registry::{AssetCode, AssetEntry, AssetRegistry};
use serde::{Deserialize, Serialize};

use crate::command::Command;

// ---------------------------------------------------------------------------
// ArenaVisitor
// ---------------------------------------------------------------------------

/// Receives replayed commands.
pub trait ArenaVisitor {
    /// `assets` is the table the stream has built so far; it resolves `asset`.
    fn add_object(
        &mut self,
        assets: &AssetRegistry,
        layer: i32,
        asset: AssetCode,
        code: AgentCode,
        position: Point,
    );

    fn move_object(&mut self, layer: i32, code: AgentCode, position: Point);

    fn rotate_object(&mut self, layer: i32, code: AgentCode, angle: f64);

    fn remove_object(&mut self, layer: i32, code: AgentCode);

    /// `assets` resolves the new `asset`, as in [`add_object`](Self::add_object).
    fn change_asset(
        &mut self,
        assets: &AssetRegistry,
        layer: i32,
        code: AgentCode,
        asset: AssetCode,
    );

    fn set_window_dimensions(
        &mut self,
        display_width: f64,
        display_height: f64,
        logical_width: f64,
        logical_height: f64,
    );
}

// ---------------------------------------------------------------------------
// RecordingVisitor
// ---------------------------------------------------------------------------

/// Records every call as the [`Command`] that would produce it.
#[derive(Debug, Clone, Default)]
pub struct RecordingVisitor {
    /// Calls in arrival order.
    pub calls: Vec<Command>,
    /// The entry each asset code resolved to, from `add_object` and
    /// `change_asset` calls.
    pub resolved_assets: BTreeMap<AssetCode, AssetEntry>,
}

impl RecordingVisitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArenaVisitor for RecordingVisitor {
    fn add_object(
        &mut self,
        assets: &AssetRegistry,
        layer: i32,
        asset: AssetCode,
        code: AgentCode,
        position: Point,
    ) {
        if let Some(entry) = assets.get(asset) {
            self.resolved_assets.insert(asset, entry);
        }
        self.calls.push(Command::AddObject {
            layer,
            code,
            asset,
            position,
        });
    }

    fn move_object(&mut self, layer: i32, code: AgentCode, position: Point) {
        self.calls.push(Command::MoveObject {
            layer,
            code,
            position,
        });
    }

    fn rotate_object(&mut self, layer: i32, code: AgentCode, angle: f64) {
        self.calls.push(Command::RotateObject { layer, code, angle });
    }

    fn remove_object(&mut self, layer: i32, code: AgentCode) {
        self.calls.push(Command::RemoveObject { layer, code });
    }

    fn change_asset(
        &mut self,
        assets: &AssetRegistry,
        layer: i32,
        code: AgentCode,
        asset: AssetCode,
    ) {
        if let Some(entry) = assets.get(asset) {
            self.resolved_assets.insert(asset, entry);
        }
        self.calls.push(Command::ChangeAsset { layer, code, asset });
    }

    fn set_window_dimensions(
        &mut self,
        display_width: f64,
        display_height: f64,
        logical_width: f64,
        logical_height: f64,
    ) {
        self.calls.push(Command::SetWindowDimensions {
            logical_width,
            logical_height,
            display_width,
            display_height,
        });
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// One visible object as a renderer would track it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub layer: i32,
    pub asset: AssetCode,
    /// Filename of `asset`, or `None` when the table could not resolve it.
    pub filename: Option<String>,
    pub position: Point,
    pub angle: f64,
}

/// The visible state reconstructed from a command stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub objects: BTreeMap<AgentCode, SceneObject>,
    /// `(display_width, display_height, logical_width, logical_height)`.
    pub window: Option<(f64, f64, f64, f64)>,
    /// Commands that referred to an object the scene does not hold.
    pub orphaned: usize,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_mut(&mut self, code: AgentCode) -> Option<&mut SceneObject> {
        let found = self.objects.get_mut(&code);
        if found.is_none() {
            self.orphaned += 1;
        }
        found
    }
}

impl ArenaVisitor for Scene {
    fn add_object(
        &mut self,
        assets: &AssetRegistry,
        layer: i32,
        asset: AssetCode,
        code: AgentCode,
        position: Point,
    ) {
        self.objects.insert(
            code,
            SceneObject {
                layer,
                asset,
                filename: assets.get(asset).map(|e| e.filename),
                position,
                angle: 0.0,
            },
        );
    }

    fn move_object(&mut self, _layer: i32, code: AgentCode, position: Point) {
        if let Some(obj) = self.object_mut(code) {
            obj.position = position;
        }
    }

    fn rotate_object(&mut self, _layer: i32, code: AgentCode, angle: f64) {
        if let Some(obj) = self.object_mut(code) {
            obj.angle = angle;
        }
    }

    fn remove_object(&mut self, _layer: i32, code: AgentCode) {
        if self.objects.remove(&code).is_none() {
            self.orphaned += 1;
        }
    }

    fn change_asset(
        &mut self,
        assets: &AssetRegistry,
        _layer: i32,
        code: AgentCode,
        asset: AssetCode,
    ) {
        if let Some(obj) = self.object_mut(code) {
            obj.asset = asset;
            obj.filename = assets.get(asset).map(|e| e.filename);
        }
    }

    fn set_window_dimensions(
        &mut self,
        display_width: f64,
        display_height: f64,
        logical_width: f64,
        logical_height: f64,
    ) {
        self.window = Some((display_width, display_height, logical_width, logical_height));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
