//! Whole-file log streams.
//!
//! A log file is laid out as:
//!
//! ```text
//! header            magic "ARNA", format version
//! initialization    batch: u32 count, commands
//! tick*             batch, telemetry block (u32 length + bytes),
//!                   time f64, continue flag (u8)
//! ```
//!
//! [`LogWriter`] produces this layout on any `Write` sink and [`LogReader`]
//! consumes it from any `Read` source, rebuilding the asset table from the
//! entries carried inline. A stream that ends exactly at a tick boundary is
//! complete; one that ends anywhere else is malformed.

use std::io::{Read, Write};

use arena_core::registry::AssetRegistry;

use crate::codec::{
    decode_header, encode_header, read_bool, read_f64_le, read_length_prefixed_bytes,
    read_u32_or_eof, write_bool, write_f64_le, write_length_prefixed_bytes, LogDecoder,
    LogEncoder,
};
use crate::command::TurnBatch;
use crate::visitor::ArenaVisitor;
use crate::LogError;

// ---------------------------------------------------------------------------
// TickFrame
// ---------------------------------------------------------------------------

/// One decoded tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickFrame {
    pub batch: TurnBatch,
    /// Opaque bytes from the telemetry hook; empty when none was recorded.
    pub telemetry: Vec<u8>,
    /// Simulated time after this tick.
    pub time: f64,
    /// `false` on the last tick the simulation produced.
    pub continues: bool,
}

// ---------------------------------------------------------------------------
// LogWriter
// ---------------------------------------------------------------------------

/// Writes a command log to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and the run loop can
/// use `BufWriter<File>`. The header is written on construction.
///
/// # Examples
///
/// ```
/// use arena_core::prelude::*;
/// use arena_log::prelude::*;
///
/// let assets = AssetRegistry::new();
/// let rock = assets.add_entry(AssetEntry::new("rock.png", 1.0, 1.0));
///
/// let mut init = TurnBatch::new();
/// init.push(Command::AddObject {
///     layer: 0,
///     code: AgentCode(0),
///     asset: rock,
///     position: Point::new(5.0, 5.0),
/// });
///
/// let mut buf = Vec::new();
/// let mut writer = LogWriter::new(&mut buf).unwrap();
/// writer.write_initialization(&init, &assets).unwrap();
/// writer.write_tick(&TurnBatch::new(), &assets, &[], 0.1, false).unwrap();
/// drop(writer);
///
/// let mut reader = LogReader::open(buf.as_slice()).unwrap();
/// let mut scene = Scene::new();
/// reader.replay_initialization(&mut scene);
/// let tick = reader.next_tick(&mut scene).unwrap().unwrap();
/// assert!(!tick.continues);
/// assert!(reader.next_tick(&mut scene).unwrap().is_none());
/// assert_eq!(scene.objects.len(), 1);
/// ```
pub struct LogWriter<W: Write> {
    writer: W,
    encoder: LogEncoder,
    initialized: bool,
    /// Set once a write to the sink fails partway; the stream is no longer
    /// decodable past that point.
    broken: bool,
    ticks_written: u64,
}

impl<W: Write> LogWriter<W> {
    /// Create a writer, immediately writing the header.
    pub fn new(mut writer: W) -> Result<Self, LogError> {
        encode_header(&mut writer)?;
        Ok(Self {
            writer,
            encoder: LogEncoder::new(),
            initialized: false,
            broken: false,
            ticks_written: 0,
        })
    }

    /// Write the initialization batch. Must be called exactly once, before
    /// any tick.
    pub fn write_initialization(
        &mut self,
        batch: &TurnBatch,
        assets: &AssetRegistry,
    ) -> Result<(), LogError> {
        self.ensure_intact()?;
        if self.initialized {
            return Err(LogError::StreamOrder {
                detail: "initialization batch already written".to_string(),
            });
        }
        let mut frame = Vec::new();
        self.encoder.write_batch(&mut frame, batch, assets)?;
        self.emit(&frame)?;
        self.initialized = true;
        Ok(())
    }

    /// Write one tick: its batch, telemetry bytes, time and continue flag.
    ///
    /// A tick that fails to encode writes nothing, and the writer can carry
    /// on with the next one.
    pub fn write_tick(
        &mut self,
        batch: &TurnBatch,
        assets: &AssetRegistry,
        telemetry: &[u8],
        time: f64,
        continues: bool,
    ) -> Result<(), LogError> {
        self.ensure_intact()?;
        if !self.initialized {
            return Err(LogError::StreamOrder {
                detail: "tick written before the initialization batch".to_string(),
            });
        }
        let mut trailer = Vec::new();
        write_length_prefixed_bytes(&mut trailer, telemetry)?;
        write_f64_le(&mut trailer, time)?;
        write_bool(&mut trailer, continues)?;

        let mut frame = Vec::new();
        self.encoder.write_batch(&mut frame, batch, assets)?;
        frame.extend_from_slice(&trailer);
        self.emit(&frame)?;
        self.ticks_written += 1;
        Ok(())
    }

    fn ensure_intact(&self) -> Result<(), LogError> {
        if self.broken {
            return Err(LogError::StreamOrder {
                detail: "an earlier write to this log failed".to_string(),
            });
        }
        Ok(())
    }

    fn emit(&mut self, frame: &[u8]) -> Result<(), LogError> {
        if let Err(e) = self.writer.write_all(frame) {
            self.broken = true;
            tracing::warn!(error = %e, bytes = frame.len(), "command log write failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of ticks written so far.
    pub fn ticks_written(&self) -> u64 {
        self.ticks_written
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ---------------------------------------------------------------------------
// LogReader
// ---------------------------------------------------------------------------

/// Reads a command log and replays it on visitors.
///
/// The header and initialization batch are read by [`open`](Self::open).
/// Asset entries found inline are loaded into the reader's own
/// [`AssetRegistry`], which is what visitors receive.
pub struct LogReader<R: Read> {
    reader: R,
    decoder: LogDecoder,
    assets: AssetRegistry,
    initialization: TurnBatch,
    ticks_read: u64,
}

impl<R: Read> LogReader<R> {
    /// Open a log, validating the header and reading the initialization
    /// batch.
    pub fn open(reader: R) -> Result<Self, LogError> {
        Self::open_with_assets(reader, AssetRegistry::new())
    }

    /// Like [`open`](Self::open), but inline entries are loaded into
    /// `assets`. A table read ahead of time with
    /// [`read_registry_table`](crate::codec::read_registry_table) can be
    /// passed here; entries the stream repeats must match it.
    pub fn open_with_assets(mut reader: R, assets: AssetRegistry) -> Result<Self, LogError> {
        decode_header(&mut reader)?;
        let mut decoder = LogDecoder::new();
        let initialization = decoder.read_batch(&mut reader, &assets)?;
        tracing::debug!(
            commands = initialization.len(),
            assets = assets.len(),
            "opened command log"
        );
        Ok(Self {
            reader,
            decoder,
            assets,
            initialization,
            ticks_read: 0,
        })
    }

    /// The asset table built so far.
    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// The initialization batch.
    pub fn initialization(&self) -> &TurnBatch {
        &self.initialization
    }

    /// Apply the initialization batch to `visitor`.
    pub fn replay_initialization(&self, visitor: &mut dyn ArenaVisitor) {
        self.initialization.apply_to(&self.assets, visitor);
    }

    /// Read the next tick and apply its batch to `visitor`.
    ///
    /// Returns `None` on a clean end of stream.
    pub fn next_tick(
        &mut self,
        visitor: &mut dyn ArenaVisitor,
    ) -> Result<Option<TickFrame>, LogError> {
        let Some(frame) = self.read_tick()? else {
            return Ok(None);
        };
        frame.batch.apply_to(&self.assets, visitor);
        Ok(Some(frame))
    }

    /// Read the next tick without replaying it.
    pub fn read_tick(&mut self) -> Result<Option<TickFrame>, LogError> {
        let Some(count) = read_u32_or_eof(&mut self.reader)? else {
            return Ok(None);
        };
        let batch = self
            .decoder
            .read_batch_body(count, &mut self.reader, &self.assets)?;
        let telemetry = read_length_prefixed_bytes(&mut self.reader)?;
        let time = read_f64_le(&mut self.reader)?;
        let continues = read_bool(&mut self.reader)?;
        self.ticks_read += 1;
        Ok(Some(TickFrame {
            batch,
            telemetry,
            time,
            continues,
        }))
    }

    /// Replay the initialization batch and every remaining tick on
    /// `visitor`. Returns the number of ticks replayed.
    pub fn replay_all(&mut self, visitor: &mut dyn ArenaVisitor) -> Result<u64, LogError> {
        self.replay_initialization(visitor);
        let mut replayed = 0;
        while let Some(frame) = self.next_tick(visitor)? {
            replayed += 1;
            if !frame.continues {
                break;
            }
        }
        Ok(replayed)
    }

    /// Number of ticks read so far.
    pub fn ticks_read(&self) -> u64 {
        self.ticks_read
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::visitor::RecordingVisitor;
    use arena_core::agent::AgentCode;
    use arena_core::geometry::Point;
    use arena_core::registry::AssetEntry;

    fn setup() -> (AssetRegistry, TurnBatch) {
        let assets = AssetRegistry::new();
        let a = assets.add_entry(AssetEntry::new("a.png", 1.0, 1.0));
        let init = TurnBatch::from(vec![Command::AddObject {
            layer: 0,
            code: AgentCode(0),
            asset: a,
            position: Point::new(1.0, 1.0),
        }]);
        (assets, init)
    }

    #[test]
    fn tick_before_initialization_is_rejected() {
        let (assets, _) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        let err = writer
            .write_tick(&TurnBatch::new(), &assets, &[], 0.0, true)
            .unwrap_err();
        assert!(matches!(err, LogError::StreamOrder { .. }));
    }

    #[test]
    fn initialization_written_once() {
        let (assets, init) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &assets).unwrap();
        assert!(writer.write_initialization(&init, &assets).is_err());
    }

    #[test]
    fn unencodable_tick_writes_nothing_and_stream_continues() {
        let (assets, init) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &assets).unwrap();
        let before = writer.writer.clone();

        let bad = TurnBatch::from(vec![Command::AddObject {
            layer: 0,
            code: AgentCode(1),
            asset: arena_core::registry::AssetCode(40),
            position: Point::new(2.0, 2.0),
        }]);
        let err = writer.write_tick(&bad, &assets, b"t", 0.5, true).unwrap_err();
        assert!(matches!(err, LogError::UnknownAsset { code: 40 }));
        assert_eq!(writer.writer, before);
        assert_eq!(writer.ticks_written(), 0);

        writer
            .write_tick(&TurnBatch::new(), &assets, &[], 1.0, false)
            .unwrap();
        let buf = writer.into_inner();
        let mut reader = LogReader::open(buf.as_slice()).unwrap();
        assert_eq!(reader.read_tick().unwrap().unwrap().time, 1.0);
        assert!(reader.read_tick().unwrap().is_none());
    }

    /// Accepts `limit` bytes, then fails every write.
    struct ShortSink {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let room = self.limit.saturating_sub(self.data.len());
            if room == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "sink full"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_sink_write_refuses_further_ticks() {
        let (assets, init) = setup();
        let sink = ShortSink {
            data: Vec::new(),
            limit: 8,
        };
        let mut writer = LogWriter::new(sink).unwrap();
        let err = writer.write_initialization(&init, &assets).unwrap_err();
        assert!(matches!(err, LogError::Io(_)));
        let err = writer
            .write_tick(&TurnBatch::new(), &assets, &[], 1.0, false)
            .unwrap_err();
        assert!(matches!(err, LogError::StreamOrder { .. }));
        assert_eq!(writer.into_inner().data.len(), 8);
    }

    #[test]
    fn telemetry_and_time_survive() {
        let (assets, init) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &assets).unwrap();
        writer
            .write_tick(&TurnBatch::new(), &assets, b"{\"hares\":3}", 0.5, true)
            .unwrap();
        writer
            .write_tick(&TurnBatch::new(), &assets, &[], 1.0, false)
            .unwrap();
        assert_eq!(writer.ticks_written(), 2);
        let buf = writer.into_inner();

        let mut reader = LogReader::open(buf.as_slice()).unwrap();
        let first = reader.read_tick().unwrap().unwrap();
        assert_eq!(first.telemetry, b"{\"hares\":3}");
        assert_eq!(first.time, 0.5);
        assert!(first.continues);
        let second = reader.read_tick().unwrap().unwrap();
        assert!(second.telemetry.is_empty());
        assert!(!second.continues);
        assert!(reader.read_tick().unwrap().is_none());
        assert_eq!(reader.ticks_read(), 2);
    }

    #[test]
    fn truncated_tick_is_malformed() {
        let (assets, init) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &assets).unwrap();
        writer
            .write_tick(&TurnBatch::new(), &assets, &[], 1.0, true)
            .unwrap();
        let mut buf = writer.into_inner();
        buf.truncate(buf.len() - 3);

        let mut reader = LogReader::open(buf.as_slice()).unwrap();
        assert!(reader.read_tick().is_err());
    }

    #[test]
    fn replay_all_stops_at_last_tick() {
        let (assets, init) = setup();
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &assets).unwrap();
        let step = TurnBatch::from(vec![Command::MoveObject {
            layer: 0,
            code: AgentCode(0),
            position: Point::new(2.0, 1.0),
        }]);
        writer.write_tick(&step, &assets, &[], 1.0, true).unwrap();
        writer.write_tick(&step, &assets, &[], 2.0, false).unwrap();
        let buf = writer.into_inner();

        let mut reader = LogReader::open(buf.as_slice()).unwrap();
        let mut rec = RecordingVisitor::new();
        assert_eq!(reader.replay_all(&mut rec).unwrap(), 2);
        assert_eq!(rec.calls.len(), 3);
        assert_eq!(rec.resolved_assets.len(), 1);
    }
}
