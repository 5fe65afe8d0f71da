//! Encode/decode round trips through the public API.

use std::io::Cursor;

use arena_core::prelude::*;
use arena_log::codec::{
    encode_header, write_f64_le, write_i32_le, write_length_prefixed_str, write_u32_le, write_u8,
};
use arena_log::prelude::*;
use arena_log::{FORMAT_VERSION, MAX_ASSET_CODE};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn assets() -> (AssetRegistry, AssetCode, AssetCode) {
    let reg = AssetRegistry::new();
    let hare = reg.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
    let lynx = reg.add_entry(AssetEntry::new("lynx.png", 1.0, 1.5));
    (reg, hare, lynx)
}

fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

fn encode(batch: &TurnBatch, reg: &AssetRegistry) -> Vec<u8> {
    let mut buf = Vec::new();
    LogEncoder::new().write_batch(&mut buf, batch, reg).unwrap();
    buf
}

// ---------------------------------------------------------------------------
// Per-command round trips
// ---------------------------------------------------------------------------

#[test]
fn every_command_variant_roundtrips() {
    let (reg, hare, lynx) = assets();
    let batch = TurnBatch::from(vec![
        Command::SetWindowDimensions {
            logical_width: 10.0,
            logical_height: 10.0,
            display_width: 800.0,
            display_height: 800.0,
        },
        Command::AddObject {
            layer: -1,
            code: AgentCode(7),
            asset: hare,
            position: Point::new(0.25, 9.75),
        },
        Command::MoveObject {
            layer: -1,
            code: AgentCode(7),
            position: Point::new(0.5, 9.5),
        },
        Command::RotateObject {
            layer: -1,
            code: AgentCode(7),
            angle: -1.25,
        },
        Command::ChangeAsset {
            layer: -1,
            code: AgentCode(7),
            asset: lynx,
        },
        Command::RemoveObject {
            layer: -1,
            code: AgentCode(7),
        },
    ]);

    let buf = encode(&batch, &reg);
    let rebuilt = AssetRegistry::new();
    let decoded = LogDecoder::new()
        .read_batch(&mut Cursor::new(&buf), &rebuilt)
        .unwrap();
    assert_eq!(decoded, batch);
}

#[test]
fn replay_reaches_visitor_in_written_order() {
    let (reg, hare, _) = assets();
    let mut init = TurnBatch::new();
    for i in 0..5u32 {
        init.push(Command::AddObject {
            layer: 1,
            code: AgentCode(i),
            asset: hare,
            position: Point::new(i as f64, 0.5),
        });
    }
    let mut ticks = Vec::new();
    for t in 1..=3u32 {
        ticks.push(TurnBatch::from(vec![
            Command::MoveObject {
                layer: 1,
                code: AgentCode(t),
                position: Point::new(t as f64, 1.0 + t as f64),
            },
            Command::RotateObject {
                layer: 1,
                code: AgentCode(0),
                angle: 0.1 * t as f64,
            },
        ]));
    }

    let mut writer = LogWriter::new(Vec::new()).unwrap();
    writer.write_initialization(&init, &reg).unwrap();
    for (i, batch) in ticks.iter().enumerate() {
        let last = i + 1 == ticks.len();
        writer
            .write_tick(batch, &reg, &[], (i + 1) as f64, !last)
            .unwrap();
    }
    let buf = writer.into_inner();

    let mut reader = LogReader::open(buf.as_slice()).unwrap();
    let mut rec = RecordingVisitor::new();
    reader.replay_all(&mut rec).unwrap();

    let mut expected: Vec<Command> = init.into_commands();
    for batch in &ticks {
        expected.extend(batch.iter().cloned());
    }
    assert_eq!(rec.calls, expected);
    assert_eq!(rec.resolved_assets[&hare].filename, "hare.png");
}

#[test]
fn scene_replay_matches_final_positions() {
    let (reg, hare, lynx) = assets();
    let init = TurnBatch::from(vec![
        Command::SetWindowDimensions {
            logical_width: 10.0,
            logical_height: 10.0,
            display_width: 500.0,
            display_height: 500.0,
        },
        Command::AddObject {
            layer: 1,
            code: AgentCode(0),
            asset: hare,
            position: Point::new(1.0, 1.0),
        },
        Command::AddObject {
            layer: 1,
            code: AgentCode(1),
            asset: lynx,
            position: Point::new(4.0, 4.0),
        },
    ]);
    let tick = TurnBatch::from(vec![
        Command::MoveObject {
            layer: 1,
            code: AgentCode(1),
            position: Point::new(2.0, 2.0),
        },
        Command::RemoveObject {
            layer: 1,
            code: AgentCode(0),
        },
    ]);
    let mut writer = LogWriter::new(Vec::new()).unwrap();
    writer.write_initialization(&init, &reg).unwrap();
    writer.write_tick(&tick, &reg, &[], 1.0, false).unwrap();
    let buf = writer.into_inner();

    let mut scene = Scene::new();
    LogReader::open(buf.as_slice())
        .unwrap()
        .replay_all(&mut scene)
        .unwrap();
    assert_eq!(scene.window, Some((500.0, 500.0, 10.0, 10.0)));
    assert_eq!(scene.objects.len(), 1);
    let lynx_obj = &scene.objects[&AgentCode(1)];
    assert_eq!(lynx_obj.position, Point::new(2.0, 2.0));
    assert_eq!(lynx_obj.filename.as_deref(), Some("lynx.png"));
}

// ---------------------------------------------------------------------------
// Asset de-duplication
// ---------------------------------------------------------------------------

#[test]
fn each_stream_inlines_each_asset_once() {
    let (reg, hare, lynx) = assets();
    let init = TurnBatch::from(
        (0..5u32)
            .map(|i| Command::AddObject {
                layer: 1,
                code: AgentCode(i),
                asset: if i % 2 == 0 { hare } else { lynx },
                position: Point::new(i as f64, 0.0),
            })
            .collect::<Vec<_>>(),
    );

    let mut streams = Vec::new();
    for _ in 0..2 {
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&init, &reg).unwrap();
        writer.write_tick(&init, &reg, &[], 1.0, false).unwrap();
        streams.push(writer.into_inner());
    }

    for stream in &streams {
        assert_eq!(occurrences(stream, b"hare.png"), 1);
        assert_eq!(occurrences(stream, b"lynx.png"), 1);
    }
    assert_eq!(streams[0], streams[1]);
}

#[test]
fn reader_rebuilds_registry_codes() {
    let reg = AssetRegistry::new();
    reg.add_entry(AssetEntry::new("unused.png", 1.0, 1.0));
    let used = reg.add_entry(AssetEntry::new("used.png", 2.0, 2.0));

    let init = TurnBatch::from(vec![Command::AddObject {
        layer: 0,
        code: AgentCode(0),
        asset: used,
        position: Point::new(1.0, 1.0),
    }]);
    let mut writer = LogWriter::new(Vec::new()).unwrap();
    writer.write_initialization(&init, &reg).unwrap();
    let buf = writer.into_inner();

    let reader = LogReader::open(buf.as_slice()).unwrap();
    assert_eq!(reader.assets().get(used), reg.get(used));
    assert!(reader.assets().get(AssetCode(0)).is_none());
}

#[test]
fn reader_accepts_preloaded_table() {
    let (reg, hare, _) = assets();
    let mut table = Vec::new();
    write_registry_table(&mut table, &reg).unwrap();

    let init = TurnBatch::from(vec![Command::AddObject {
        layer: 0,
        code: AgentCode(0),
        asset: hare,
        position: Point::new(1.0, 1.0),
    }]);
    let mut writer = LogWriter::new(Vec::new()).unwrap();
    writer.write_initialization(&init, &reg).unwrap();
    let buf = writer.into_inner();

    let preloaded = AssetRegistry::new();
    read_registry_table(&mut Cursor::new(&table), &preloaded).unwrap();
    let reader = LogReader::open_with_assets(buf.as_slice(), preloaded).unwrap();
    assert_eq!(reader.assets().len(), 2);
}

// ---------------------------------------------------------------------------
// Fatal input
// ---------------------------------------------------------------------------

#[test]
fn unknown_tag_in_initialization_is_fatal() {
    let mut buf = Vec::new();
    encode_header(&mut buf).unwrap();
    write_u32_le(&mut buf, 1).unwrap();
    write_u8(&mut buf, 200).unwrap();
    let err = LogReader::open(buf.as_slice()).err().unwrap();
    assert!(matches!(err, LogError::UnknownCommandTag { tag: 200 }));
}

/// A one-command batch: `AddObject` naming `asset`, with its inline entry.
fn single_add_batch(asset: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    write_u32_le(&mut buf, 1).unwrap();
    write_u8(&mut buf, 1).unwrap();
    write_i32_le(&mut buf, 0).unwrap();
    write_u32_le(&mut buf, 0).unwrap();
    write_u32_le(&mut buf, asset).unwrap();
    write_f64_le(&mut buf, 1.0).unwrap();
    write_f64_le(&mut buf, 1.0).unwrap();
    write_length_prefixed_str(&mut buf, "x.png").unwrap();
    write_f64_le(&mut buf, 1.0).unwrap();
    write_f64_le(&mut buf, 1.0).unwrap();
    buf
}

#[test]
fn out_of_range_asset_code_is_malformed() {
    for asset in [20_000_000, u32::MAX, MAX_ASSET_CODE + 1] {
        let reg = AssetRegistry::new();
        let err = LogDecoder::new()
            .read_batch(&mut Cursor::new(single_add_batch(asset)), &reg)
            .unwrap_err();
        assert!(matches!(err, LogError::MalformedFrame { .. }), "{asset}: {err}");
        assert!(reg.is_empty());

        let mut log = Vec::new();
        encode_header(&mut log).unwrap();
        log.extend(single_add_batch(asset));
        let err = LogReader::open(log.as_slice()).err().unwrap();
        assert!(matches!(err, LogError::MalformedFrame { .. }));
    }

    let reg = AssetRegistry::new();
    LogDecoder::new()
        .read_batch(&mut Cursor::new(single_add_batch(MAX_ASSET_CODE)), &reg)
        .unwrap();
    assert_eq!(reg.get(AssetCode(MAX_ASSET_CODE)).unwrap().filename, "x.png");
}

#[test]
fn rejected_tick_leaves_the_log_decodable() {
    let (reg, hare, _) = assets();
    let init = TurnBatch::from(vec![Command::AddObject {
        layer: 0,
        code: AgentCode(0),
        asset: hare,
        position: Point::new(1.0, 1.0),
    }]);
    let mut writer = LogWriter::new(Vec::new()).unwrap();
    writer.write_initialization(&init, &reg).unwrap();

    let unregistered = TurnBatch::from(vec![
        Command::MoveObject {
            layer: 0,
            code: AgentCode(0),
            position: Point::new(2.0, 2.0),
        },
        Command::AddObject {
            layer: 0,
            code: AgentCode(1),
            asset: AssetCode(77),
            position: Point::new(3.0, 3.0),
        },
    ]);
    let err = writer
        .write_tick(&unregistered, &reg, &[], 0.5, true)
        .unwrap_err();
    assert!(matches!(err, LogError::UnknownAsset { code: 77 }));

    let step = TurnBatch::from(vec![Command::MoveObject {
        layer: 0,
        code: AgentCode(0),
        position: Point::new(4.0, 4.0),
    }]);
    writer.write_tick(&step, &reg, &[], 1.0, false).unwrap();
    let buf = writer.into_inner();

    let mut reader = LogReader::open(buf.as_slice()).unwrap();
    let mut rec = RecordingVisitor::new();
    assert_eq!(reader.replay_all(&mut rec).unwrap(), 1);
    assert_eq!(rec.calls.len(), 2);
    assert_eq!(rec.calls[1], step.commands()[0]);
}

#[test]
fn wrong_version_is_fatal() {
    let mut buf = b"ARNA".to_vec();
    buf.push(FORMAT_VERSION + 9);
    write_u32_le(&mut buf, 0).unwrap();
    let err = LogReader::open(buf.as_slice()).err().unwrap();
    assert!(matches!(err, LogError::UnsupportedVersion { .. }));
}

#[test]
fn foreign_file_is_fatal() {
    let err = LogReader::open(&b"PNG\x89 not a log"[..]).err().unwrap();
    assert!(matches!(err, LogError::InvalidMagic));
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

fn arb_point() -> impl Strategy<Value = Point> {
    (-50.0f64..50.0, -50.0f64..50.0).prop_map(|(x, y)| Point::new(x, y))
}

fn arb_command() -> impl Strategy<Value = Command> {
    let code = (0u32..20).prop_map(AgentCode);
    let asset = (0u32..3).prop_map(AssetCode);
    let layer = -3i32..3;
    prop_oneof![
        (layer.clone(), code.clone(), asset.clone(), arb_point()).prop_map(
            |(layer, code, asset, position)| Command::AddObject {
                layer,
                code,
                asset,
                position
            }
        ),
        (layer.clone(), code.clone(), arb_point()).prop_map(|(layer, code, position)| {
            Command::MoveObject {
                layer,
                code,
                position,
            }
        }),
        (layer.clone(), code.clone(), -6.3f64..6.3)
            .prop_map(|(layer, code, angle)| Command::RotateObject { layer, code, angle }),
        (layer.clone(), code.clone()).prop_map(|(layer, code)| Command::RemoveObject { layer, code }),
        (layer, code, asset).prop_map(|(layer, code, asset)| Command::ChangeAsset {
            layer,
            code,
            asset
        }),
    ]
}

proptest! {
    #[test]
    fn batch_sequences_roundtrip(batches in prop::collection::vec(
        prop::collection::vec(arb_command(), 0..12), 1..6)
    ) {
        let reg = AssetRegistry::new();
        for i in 0..3 {
            reg.add_entry(AssetEntry::new(format!("asset{i}.png"), 1.0 + i as f64, 1.0));
        }
        let batches: Vec<TurnBatch> = batches.into_iter().map(TurnBatch::from).collect();

        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.write_initialization(&batches[0], &reg).unwrap();
        for (i, b) in batches[1..].iter().enumerate() {
            writer.write_tick(b, &reg, &[i as u8], i as f64, true).unwrap();
        }
        let buf = writer.into_inner();

        for i in 0..3 {
            let name = format!("asset{i}.png");
            prop_assert!(occurrences(&buf, name.as_bytes()) <= 1);
        }

        let mut reader = LogReader::open(buf.as_slice()).unwrap();
        prop_assert_eq!(reader.initialization(), &batches[0]);
        for (i, b) in batches[1..].iter().enumerate() {
            let frame = reader.read_tick().unwrap().unwrap();
            prop_assert_eq!(&frame.batch, b);
            prop_assert_eq!(frame.telemetry, vec![i as u8]);
        }
        prop_assert!(reader.read_tick().unwrap().is_none());
    }
}
