//! Arena Log -- the command log that decouples an arena from whatever draws
//! it.
//!
//! Every visible change an arena makes is recorded as a [`Command`](command::Command)
//! in the tick's [`TurnBatch`](command::TurnBatch). Batches are encoded into a
//! compact little-endian binary stream by [`LogWriter`](stream::LogWriter) and
//! replayed, in the order written, on any [`ArenaVisitor`](visitor::ArenaVisitor)
//! by [`LogReader`](stream::LogReader).
//!
//! Asset descriptors travel inside the stream: the first `AddObject` that
//! uses an asset carries its entry, later ones carry only the code. This
//! state belongs to each stream, so independent streams written from one
//! registry never depend on each other.
//!
//! # Quick Start
//!
//! ```
//! use arena_core::prelude::*;
//! use arena_log::prelude::*;
//!
//! let assets = AssetRegistry::new();
//! let hare = assets.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
//!
//! let mut init = TurnBatch::new();
//! for i in 0..3u32 {
//!     init.push(Command::AddObject {
//!         layer: 2,
//!         code: AgentCode(i),
//!         asset: hare,
//!         position: Point::new(1.0 + i as f64, 1.0),
//!     });
//! }
//!
//! let mut buf = Vec::new();
//! let mut writer = LogWriter::new(&mut buf).unwrap();
//! writer.write_initialization(&init, &assets).unwrap();
//! drop(writer);
//!
//! let reader = LogReader::open(buf.as_slice()).unwrap();
//! let mut rec = RecordingVisitor::new();
//! reader.replay_initialization(&mut rec);
//! assert_eq!(rec.calls, init.commands());
//! assert_eq!(reader.assets().get(hare).unwrap().filename, "hare.png");
//! ```

#![deny(unsafe_code)]

pub mod codec;
pub mod command;
pub mod stream;
pub mod visitor;

/// Magic bytes at the start of every log file.
pub const MAGIC: [u8; 4] = *b"ARNA";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;

/// Marker string that opens a serialized asset table.
pub const REGISTRY_HEADER: &str = "MAIN";

/// Highest asset code a stream may carry. A decoded code beyond it is
/// treated as corruption rather than grown into the reader's table.
pub const MAX_ASSET_CODE: u32 = u16::MAX as u32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while writing or reading a command log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream does not start with the expected magic bytes.
    #[error("invalid magic bytes: not a command log")]
    InvalidMagic,

    /// The log was written by an incompatible format version.
    #[error("unsupported format version {found}, expected {FORMAT_VERSION}")]
    UnsupportedVersion { found: u8 },

    /// A frame is truncated or holds an impossible value.
    #[error("malformed frame: {detail}")]
    MalformedFrame { detail: String },

    /// A command tag outside the known set.
    #[error("unknown command tag {tag}")]
    UnknownCommandTag { tag: u8 },

    /// An `AddObject` refers to an asset the registry does not hold.
    #[error("asset code {code} is not registered")]
    UnknownAsset { code: u32 },

    /// An asset table does not open with the expected marker.
    #[error("bad asset table header '{found}'")]
    BadRegistryHeader { found: String },

    /// Writer methods were called out of order, or after a failed write.
    #[error("stream order violated: {detail}")]
    StreamOrder { detail: String },

    /// The stream conflicts with the asset table it is loaded into.
    #[error(transparent)]
    Registry(#[from] arena_core::CoreError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::codec::{read_registry_table, write_registry_table, LogDecoder, LogEncoder};
    pub use crate::command::{Command, TurnBatch};
    pub use crate::stream::{LogReader, LogWriter, TickFrame};
    pub use crate::visitor::{ArenaVisitor, RecordingVisitor, Scene, SceneObject};
    pub use crate::LogError;
}
