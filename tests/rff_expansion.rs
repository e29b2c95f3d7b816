//! RFF expansion end to end: field-count conservation, direct-copy vs
//! interleave compositing, and idempotence.

mod common;

use common::{MockAdapter, elementary_index};
use d2vserve::{
    D2vError, DecodeContext, FRAME_FLAG_PROGRESSIVE, FRAME_FLAG_RFF, FRAME_FLAG_TFF, FieldOrder,
    GOP_FLAG_CLOSED, GOP_FLAG_PROGRESSIVE_SEQUENCE, RffExpander,
};

fn expander_for(gops: &[(u16, &[u8])]) -> (tempfile::TempDir, RffExpander) {
    let (dir, index) = elementary_index(gops);
    let (adapter, _stats) = MockAdapter::new(&index);
    let ctx = DecodeContext::with_adapter(index, adapter).unwrap();
    (dir, RffExpander::new(ctx))
}

#[test]
fn interlaced_stream_without_rff_conserves_frame_count() {
    let (_dir, mut expander) = expander_for(&[(GOP_FLAG_CLOSED, &[FRAME_FLAG_TFF; 4])]);
    assert_eq!(expander.output_frame_count(), 4);

    for n in 0..4 {
        let frame = expander.output_frame(n).unwrap();
        // Both fields come from source frame n: direct copy.
        assert_eq!(frame.planes, MockAdapter::picture_for(n).planes);
        assert_eq!(frame.field_order, FieldOrder::TopFieldFirst);
    }
}

#[test]
fn all_rff_stream_expands_by_three_halves() {
    let (_dir, expander) = expander_for(&[(GOP_FLAG_CLOSED, &[FRAME_FLAG_RFF; 4])]);
    // 3 fields per source frame: 4 * 3 / 2 output frames.
    assert_eq!(expander.output_frame_count(), 6);
}

#[test]
fn progressive_sequence_repeats_are_direct_copies() {
    let (_dir, mut expander) = expander_for(&[(
        GOP_FLAG_CLOSED | GOP_FLAG_PROGRESSIVE_SEQUENCE,
        &[FRAME_FLAG_PROGRESSIVE | FRAME_FLAG_RFF; 2],
    )]);
    // 4 fields per frame with RFF in a progressive sequence.
    assert_eq!(expander.output_frame_count(), 4);

    let first = expander.output_frame(0).unwrap();
    let second = expander.output_frame(1).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.field_order, FieldOrder::Progressive);
}

#[test]
fn mixed_pair_interleaves_rows_by_parity() {
    // Frame 0: RFF, bottom first (fields B0 T0 B0); frame 1: TFF (T1 B1).
    // Output 1 pairs (B0, T1): top rows from frame 1, bottom from frame 0.
    let (_dir, mut expander) =
        expander_for(&[(GOP_FLAG_CLOSED, &[FRAME_FLAG_RFF, FRAME_FLAG_TFF])]);
    assert_eq!(expander.output_frame_count(), 2);

    let frame = expander.output_frame(1).unwrap();
    assert_eq!(frame.field_order, FieldOrder::BottomFieldFirst);

    // Mock pictures fill plane rows with frame*16 + plane*4 + row.
    for plane in 0..3 {
        for row in 0..frame.plane_height(plane) {
            let source = if row % 2 == 0 { 1 } else { 0 };
            let expected = (source * 16 + plane * 4 + row) as u8;
            assert!(
                frame.row(plane, row).iter().all(|&b| b == expected),
                "plane {plane} row {row}: {:?}",
                frame.row(plane, row),
            );
        }
    }
}

#[test]
fn output_frames_are_idempotent() {
    let (_dir, mut expander) =
        expander_for(&[(GOP_FLAG_CLOSED, &[FRAME_FLAG_RFF, FRAME_FLAG_TFF])]);

    let once = expander.output_frame(1).unwrap();
    let twice = expander.output_frame(1).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn five_frame_example_expands_one_to_one() {
    let (_dir, mut expander) = expander_for(&[(GOP_FLAG_CLOSED, &[0x00; 5])]);
    assert_eq!(expander.output_frame_count(), 5);

    for n in 0..5 {
        let frame = expander.output_frame(n).unwrap();
        // No RFF/TFF: every pair is a direct copy of source frame n.
        assert_eq!(frame.planes, MockAdapter::picture_for(n).planes);
    }

    let stats_proof = expander.into_inner();
    assert_eq!(stats_proof.total_frames(), 5);
}

#[test]
fn rejects_out_of_range_output_frames() {
    let (_dir, mut expander) = expander_for(&[(GOP_FLAG_CLOSED, &[0x00; 2])]);
    match expander.output_frame(2) {
        Err(D2vError::FrameOutOfRange {
            frame_number,
            total_frames,
        }) => {
            assert_eq!(frame_number, 2);
            assert_eq!(total_frames, 2);
        }
        other => panic!("expected FrameOutOfRange, got {other:?}"),
    }
}
