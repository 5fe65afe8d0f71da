//! Binary encode/decode for the command log.
//!
//! All integers and floats are little-endian. Strings are UTF-8 with a `u32`
//! length prefix. Each command is a one-byte tag followed by its fields:
//!
//! | tag | command               | fields                                              |
//! |-----|-----------------------|-----------------------------------------------------|
//! | 0   | `SetWindowDimensions` | display w, display h, logical w, logical h (`f64`)  |
//! | 1   | `AddObject`           | layer `i32`, code `u32`, asset `u32`, x, y `f64`, [asset entry] |
//! | 2   | `RemoveObject`        | layer `i32`, code `u32`                             |
//! | 3   | `MoveObject`          | layer `i32`, code `u32`, x, y `f64`                 |
//! | 4   | `RotateObject`        | layer `i32`, code `u32`, angle `f64`                |
//! | 5   | `ChangeAsset`         | layer `i32`, asset `u32`, code `u32`                |
//!
//! The bracketed asset entry (filename, width, height) follows an
//! `AddObject` only the first time that asset code appears in the stream.
//! Which codes a stream has already carried is tracked by a [`LogEncoder`] on
//! the writing side and a [`LogDecoder`] on the reading side; each is created
//! with its stream and dropped with it, so two streams written from the same
//! registry each carry their own copy of every entry they use.

use std::collections::HashSet;
use std::io::{Read, Write};

use arena_core::agent::AgentCode;
use arena_core::geometry::Point;
use arena_core::registry::{AssetCode, AssetEntry, AssetRegistry};

use crate::command::{tag, Command, TurnBatch};
use crate::{LogError, FORMAT_VERSION, MAGIC, MAX_ASSET_CODE, REGISTRY_HEADER};

// ---------------------------------------------------------------------------
// Primitive writers
// ---------------------------------------------------------------------------

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), LogError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a bool as one byte (0 or 1).
pub fn write_bool(w: &mut dyn Write, v: bool) -> Result<(), LogError> {
    write_u8(w, u8::from(v))
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a point as two f64s.
pub fn write_point(w: &mut dyn Write, p: Point) -> Result<(), LogError> {
    write_f64_le(w, p.x)?;
    write_f64_le(w, p.y)
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), LogError> {
    write_length_prefixed_bytes(w, s.as_bytes())
}

/// Write a length-prefixed byte block (u32 length + bytes).
pub fn write_length_prefixed_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), LogError> {
    write_u32_le(w, wire_len(b.len(), "block bytes")?)?;
    w.write_all(b)?;
    Ok(())
}

/// Narrow an in-memory length to the `u32` the format stores.
pub(crate) fn wire_len(len: usize, what: &str) -> Result<u32, LogError> {
    u32::try_from(len).map_err(|_| LogError::MalformedFrame {
        detail: format!("{len} {what} exceed the u32 length prefix"),
    })
}

fn check_asset_code(asset: AssetCode) -> Result<(), LogError> {
    if asset.0 > MAX_ASSET_CODE {
        return Err(LogError::MalformedFrame {
            detail: format!("asset code {} is above the limit {MAX_ASSET_CODE}", asset.0),
        });
    }
    Ok(())
}

fn write_asset_entry(w: &mut dyn Write, entry: &AssetEntry) -> Result<(), LogError> {
    write_length_prefixed_str(w, &entry.filename)?;
    write_f64_le(w, entry.size_x)?;
    write_f64_le(w, entry.size_y)
}

// ---------------------------------------------------------------------------
// Primitive readers
// ---------------------------------------------------------------------------

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, LogError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a bool written by [`write_bool`]. Any byte other than 0 or 1 is
/// malformed.
pub fn read_bool(r: &mut dyn Read) -> Result<bool, LogError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LogError::MalformedFrame {
            detail: format!("invalid bool byte {other}"),
        }),
    }
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, LogError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32_le(r: &mut dyn Read) -> Result<i32, LogError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, LogError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a point written by [`write_point`].
pub fn read_point(r: &mut dyn Read) -> Result<Point, LogError> {
    let x = read_f64_le(r)?;
    let y = read_f64_le(r)?;
    Ok(Point::new(x, y))
}

/// Read a length-prefixed byte block.
pub fn read_length_prefixed_bytes(r: &mut dyn Read) -> Result<Vec<u8>, LogError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(LogError::MalformedFrame {
            detail: format!("block truncated: expected {len} bytes, got {}", buf.len()),
        });
    }
    Ok(buf)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, LogError> {
    let buf = read_length_prefixed_bytes(r)?;
    String::from_utf8(buf).map_err(|e| LogError::MalformedFrame {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

fn read_asset_entry(r: &mut dyn Read) -> Result<AssetEntry, LogError> {
    let filename = read_length_prefixed_str(r)?;
    let size_x = read_f64_le(r)?;
    let size_y = read_f64_le(r)?;
    Ok(AssetEntry::new(filename, size_x, size_y))
}

/// Read a u32 at a frame boundary. Returns `None` on a clean end of stream
/// (no bytes at all), an error on a partial read.
pub(crate) fn read_u32_or_eof(r: &mut dyn Read) -> Result<Option<u32>, LogError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(LogError::MalformedFrame {
                    detail: format!("stream ended {filled} bytes into a frame header"),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Write the file header: magic bytes followed by the format version.
pub fn encode_header(w: &mut dyn Write) -> Result<(), LogError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)
}

/// Read and validate the file header.
pub fn decode_header(r: &mut dyn Read) -> Result<(), LogError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|_| LogError::InvalidMagic)?;
    if magic != MAGIC {
        return Err(LogError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(LogError::UnsupportedVersion { found: version });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Registry table
// ---------------------------------------------------------------------------

/// Write a full asset table: the `"MAIN"` marker, the slot count, then every
/// slot in code order. Placeholder slots are written with an empty filename
/// so codes survive the round trip.
pub fn write_registry_table(w: &mut dyn Write, registry: &AssetRegistry) -> Result<(), LogError> {
    let entries = registry.entries();
    let count = wire_len(entries.len(), "asset slots")?;
    write_length_prefixed_str(w, REGISTRY_HEADER)?;
    write_u32_le(w, count)?;
    for entry in &entries {
        write_asset_entry(w, entry)?;
    }
    Ok(())
}

/// Read a table written by [`write_registry_table`] into `registry`,
/// replacing its contents. Returns the number of slots read.
pub fn read_registry_table(r: &mut dyn Read, registry: &AssetRegistry) -> Result<usize, LogError> {
    let header = read_length_prefixed_str(r)?;
    if header != REGISTRY_HEADER {
        return Err(LogError::BadRegistryHeader { found: header });
    }
    let count = read_u32_le(r)?;
    if count > MAX_ASSET_CODE.saturating_add(1) {
        return Err(LogError::MalformedFrame {
            detail: format!("asset table claims {count} slots"),
        });
    }
    registry.clear();
    for index in 0..count {
        let entry = read_asset_entry(r)?;
        if !entry.is_placeholder() {
            registry.add_entry_with_index(entry, AssetCode(index))?;
        }
    }
    Ok(count as usize)
}

// ---------------------------------------------------------------------------
// LogEncoder
// ---------------------------------------------------------------------------

/// Per-stream encoding context.
///
/// Remembers which asset codes this stream has already carried inline.
#[derive(Debug, Default)]
pub struct LogEncoder {
    written: HashSet<AssetCode>,
}

impl LogEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `asset` has already been written to this stream.
    pub fn has_written(&self, asset: AssetCode) -> bool {
        self.written.contains(&asset)
    }

    /// Encode one command.
    ///
    /// Nothing is written when the command cannot be encoded.
    ///
    /// # Errors
    ///
    /// [`LogError::UnknownAsset`] if an `AddObject` names an asset that is
    /// neither registered nor already written to this stream, and
    /// [`LogError::MalformedFrame`] if its code is above [`MAX_ASSET_CODE`].
    pub fn write_command(
        &mut self,
        w: &mut dyn Write,
        command: &Command,
        assets: &AssetRegistry,
    ) -> Result<(), LogError> {
        let mut staged = HashSet::new();
        self.encode_command(w, command, assets, &mut staged)?;
        self.written.extend(staged);
        Ok(())
    }

    /// Encode a batch: command count, then each command.
    ///
    /// The batch is assembled in memory and reaches `w` in one write, so a
    /// command that fails to encode leaves both `w` and this encoder as they
    /// were.
    pub fn write_batch(
        &mut self,
        w: &mut dyn Write,
        batch: &TurnBatch,
        assets: &AssetRegistry,
    ) -> Result<(), LogError> {
        let mut scratch = Vec::new();
        write_u32_le(&mut scratch, wire_len(batch.len(), "commands")?)?;
        let mut staged = HashSet::new();
        for command in batch {
            self.encode_command(&mut scratch, command, assets, &mut staged)?;
        }
        w.write_all(&scratch)?;
        self.written.extend(staged);
        Ok(())
    }

    /// Codes inlined here go into `staged`; the caller commits them once
    /// the bytes have reached the sink.
    fn encode_command(
        &self,
        w: &mut dyn Write,
        command: &Command,
        assets: &AssetRegistry,
        staged: &mut HashSet<AssetCode>,
    ) -> Result<(), LogError> {
        let inline = match *command {
            Command::AddObject { asset, .. }
                if !self.written.contains(&asset) && !staged.contains(&asset) =>
            {
                check_asset_code(asset)?;
                let entry = assets
                    .get(asset)
                    .ok_or(LogError::UnknownAsset { code: asset.0 })?;
                Some(entry)
            }
            _ => None,
        };

        write_u8(w, command.tag())?;
        match *command {
            Command::SetWindowDimensions {
                logical_width,
                logical_height,
                display_width,
                display_height,
            } => {
                write_f64_le(w, display_width)?;
                write_f64_le(w, display_height)?;
                write_f64_le(w, logical_width)?;
                write_f64_le(w, logical_height)?;
            }
            Command::AddObject {
                layer,
                code,
                asset,
                position,
            } => {
                write_i32_le(w, layer)?;
                write_u32_le(w, code.raw())?;
                write_u32_le(w, asset.0)?;
                write_point(w, position)?;
                if let Some(entry) = inline {
                    write_asset_entry(w, &entry)?;
                    staged.insert(asset);
                }
            }
            Command::RemoveObject { layer, code } => {
                write_i32_le(w, layer)?;
                write_u32_le(w, code.raw())?;
            }
            Command::MoveObject {
                layer,
                code,
                position,
            } => {
                write_i32_le(w, layer)?;
                write_u32_le(w, code.raw())?;
                write_point(w, position)?;
            }
            Command::RotateObject { layer, code, angle } => {
                write_i32_le(w, layer)?;
                write_u32_le(w, code.raw())?;
                write_f64_le(w, angle)?;
            }
            Command::ChangeAsset { layer, code, asset } => {
                write_i32_le(w, layer)?;
                write_u32_le(w, asset.0)?;
                write_u32_le(w, code.raw())?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogDecoder
// ---------------------------------------------------------------------------

/// Per-stream decoding context.
///
/// Remembers which asset codes this stream has already introduced, so it
/// knows whether an `AddObject` is followed by an inline entry.
#[derive(Debug, Default)]
pub struct LogDecoder {
    seen: HashSet<AssetCode>,
}

impl LogDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one command. Inline asset entries are loaded into `assets`
    /// under the code the stream assigned them.
    pub fn read_command(
        &mut self,
        r: &mut dyn Read,
        assets: &AssetRegistry,
    ) -> Result<Command, LogError> {
        let tag = read_u8(r)?;
        self.decode_tagged(tag, r, assets)
    }

    fn decode_tagged(
        &mut self,
        tag_byte: u8,
        r: &mut dyn Read,
        assets: &AssetRegistry,
    ) -> Result<Command, LogError> {
        let command = match tag_byte {
            tag::SET_WINDOW_DIMENSIONS => {
                let display_width = read_f64_le(r)?;
                let display_height = read_f64_le(r)?;
                let logical_width = read_f64_le(r)?;
                let logical_height = read_f64_le(r)?;
                Command::SetWindowDimensions {
                    logical_width,
                    logical_height,
                    display_width,
                    display_height,
                }
            }
            tag::ADD_OBJECT => {
                let layer = read_i32_le(r)?;
                let code = AgentCode(read_u32_le(r)?);
                let asset = AssetCode(read_u32_le(r)?);
                let position = read_point(r)?;
                check_asset_code(asset)?;
                if self.seen.insert(asset) {
                    let entry = read_asset_entry(r)?;
                    if assets.get(asset).as_ref() != Some(&entry) {
                        assets.add_entry_with_index(entry, asset)?;
                    }
                }
                Command::AddObject {
                    layer,
                    code,
                    asset,
                    position,
                }
            }
            tag::REMOVE_OBJECT => {
                let layer = read_i32_le(r)?;
                let code = AgentCode(read_u32_le(r)?);
                Command::RemoveObject { layer, code }
            }
            tag::MOVE_OBJECT => {
                let layer = read_i32_le(r)?;
                let code = AgentCode(read_u32_le(r)?);
                let position = read_point(r)?;
                Command::MoveObject {
                    layer,
                    code,
                    position,
                }
            }
            tag::ROTATE_OBJECT => {
                let layer = read_i32_le(r)?;
                let code = AgentCode(read_u32_le(r)?);
                let angle = read_f64_le(r)?;
                Command::RotateObject { layer, code, angle }
            }
            tag::CHANGE_ASSET => {
                let layer = read_i32_le(r)?;
                let asset = AssetCode(read_u32_le(r)?);
                let code = AgentCode(read_u32_le(r)?);
                Command::ChangeAsset { layer, code, asset }
            }
            other => return Err(LogError::UnknownCommandTag { tag: other }),
        };
        Ok(command)
    }

    /// Decode a batch written by [`LogEncoder::write_batch`].
    pub fn read_batch(
        &mut self,
        r: &mut dyn Read,
        assets: &AssetRegistry,
    ) -> Result<TurnBatch, LogError> {
        let count = read_u32_le(r)?;
        self.read_batch_body(count, r, assets)
    }

    pub(crate) fn read_batch_body(
        &mut self,
        count: u32,
        r: &mut dyn Read,
        assets: &AssetRegistry,
    ) -> Result<TurnBatch, LogError> {
        let mut batch = TurnBatch::new();
        for _ in 0..count {
            batch.push(self.read_command(r, assets)?);
        }
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
