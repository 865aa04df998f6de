//! Integration tests for the dmx-protocol crate.
//!
//! Exercise the channel buffer the way the bridge drives it: frames diffed
//! against the buffer, changes applied one channel at a time, full resyncs.

use dmx_protocol::channels::{diff, ChannelBuffer, ChannelChange};
use dmx_protocol::events::{BridgeEvent, LightingFrame};
use dmx_protocol::DMX_CHANNELS;
use proptest::prelude::*;

/// A full universe: either sparse (mostly zero, like a desk with a few
/// fixtures up) or dense noise.
fn universe() -> impl Strategy<Value = [u8; DMX_CHANNELS]> {
    prop_oneof![
        prop::collection::vec(prop_oneof![4 => Just(0u8), 1 => any::<u8>()], DMX_CHANNELS),
        prop::collection::vec(any::<u8>(), DMX_CHANNELS),
    ]
    .prop_map(|values: Vec<u8>| -> [u8; DMX_CHANNELS] { values.try_into().unwrap() })
}

// ---------------------------------------------------------------------------
// 1. Diff correctness over arbitrary buffer pairs
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn diff_matches_naive_comparison(a in universe(), b in universe()) {
        let expected: Vec<usize> = (0..DMX_CHANNELS).filter(|&i| a[i] != b[i]).collect();
        let changes = diff(&a, &b);
        let got: Vec<usize> = changes.iter().map(|c| c.index).collect();

        prop_assert_eq!(got, expected);
        for c in &changes {
            prop_assert_eq!(c.value, b[c.index]);
        }
        prop_assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn buffer_converges_after_applying_diff(frames in prop::collection::vec(universe(), 1..8)) {
        let mut buf = ChannelBuffer::new();
        for frame in &frames {
            for c in buf.diff(frame) {
                buf.apply(c.index, c.value);
            }
            prop_assert_eq!(buf.as_slice(), frame);
            prop_assert!(buf.diff(frame).is_empty());
        }
    }

    #[test]
    fn partial_frame_only_touches_its_prefix(
        start in universe(),
        incoming in prop::collection::vec(any::<u8>(), 0..600),
    ) {
        let buf = ChannelBuffer::from(start);
        let covered = incoming.len().min(DMX_CHANNELS);
        for c in buf.diff(&incoming) {
            prop_assert!(c.index < covered);
            prop_assert_ne!(start[c.index], c.value);
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Ordering of a typical sparse frame
// ---------------------------------------------------------------------------

#[test]
fn sparse_changes_come_out_in_ascending_order() {
    let buf = ChannelBuffer::new();
    let mut frame = [0u8; DMX_CHANNELS];
    frame[500] = 1;
    frame[3] = 2;
    frame[40] = 3;

    let changes = buf.diff(&frame);
    assert_eq!(
        changes,
        vec![
            ChannelChange { index: 3, value: 2 },
            ChannelChange { index: 40, value: 3 },
            ChannelChange { index: 500, value: 1 },
        ]
    );
}

// ---------------------------------------------------------------------------
// 3. Resync reflects the latest buffer state
// ---------------------------------------------------------------------------

#[test]
fn resync_reflects_latest_values() {
    let mut buf = ChannelBuffer::new();
    buf.apply(1, 10);
    buf.apply(2, 20);
    buf.apply(1, 11);

    let writes: Vec<(u16, u8)> = buf.resync_writes().collect();
    assert_eq!(writes.len(), DMX_CHANNELS);
    assert_eq!(writes[1], (2, 11));
    assert_eq!(writes[2], (3, 20));
    assert!(writes
        .iter()
        .enumerate()
        .all(|(i, &(ch, _))| ch as usize == i + 1));
}

// ---------------------------------------------------------------------------
// 4. Frame → event conversion
// ---------------------------------------------------------------------------

#[test]
fn frame_event_carries_universe_origin_and_data() {
    let frame = LightingFrame {
        universe: 3,
        data: vec![1, 2, 3],
        origin: "192.168.1.20:6454".parse().unwrap(),
    };

    match BridgeEvent::frame(&frame) {
        BridgeEvent::FramePayload { universe, origin, data } => {
            assert_eq!(universe, 3);
            assert_eq!(origin, frame.origin);
            assert_eq!(data, vec![1, 2, 3]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
