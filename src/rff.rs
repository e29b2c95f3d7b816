//! RFF (repeat-first-field) expansion.
//!
//! MPEG-2 streams telecined with 3:2 pulldown don't store the displayed
//! frame sequence; each coded frame carries RFF/TFF bits describing how its
//! fields repeat on playback. This module turns those bits into a *field
//! schedule* built once from the index, then composites display frames on
//! demand: schedule positions `[2n, 2n+1]` are the two fields of output
//! frame `n`, each naming the source frame it is read from.

use log::debug;

use crate::{
    decode::DecodeContext,
    error::D2vError,
    index::{FRAME_FLAG_RFF, FRAME_FLAG_TFF, Index},
    picture::{FieldOrder, Picture},
};

/// Which part of its source frame a scheduled field reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// The top field (even rows) of the source frame.
    Top,
    /// The bottom field (odd rows) of the source frame.
    Bottom,
    /// A whole progressive frame counted as one field of display time.
    Progressive,
}

/// One entry of the field schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RffField {
    /// Canonical number of the source frame this field is read from.
    pub source: usize,
    /// Which rows of that frame it contributes.
    pub kind: FieldKind,
}

/// Build the display-order field schedule for an indexed stream.
///
/// Progressive-sequence GOPs emit whole-frame repeats: 2 fields per frame,
/// 4 with RFF set, 6 with RFF and TFF both set. Interlaced GOPs emit a
/// TFF-ordered field pair, plus one repeat of the first field when RFF is
/// set.
pub fn build_field_schedule(index: &Index) -> Vec<RffField> {
    let mut schedule = Vec::with_capacity(index.total_frames() * 2);

    for (source, entry) in index.frames.iter().enumerate() {
        let gop = &index.gops[entry.gop];
        let flags = gop.flags[entry.offset];
        let rff = flags & FRAME_FLAG_RFF != 0;
        let tff = flags & FRAME_FLAG_TFF != 0;

        if gop.is_progressive_sequence() {
            let mut repeats = 2;
            if rff {
                repeats += 2;
                if tff {
                    repeats += 2;
                }
            }
            for _ in 0..repeats {
                schedule.push(RffField {
                    source,
                    kind: FieldKind::Progressive,
                });
            }
        } else {
            let (first, second) = if tff {
                (FieldKind::Top, FieldKind::Bottom)
            } else {
                (FieldKind::Bottom, FieldKind::Top)
            };
            schedule.push(RffField { source, kind: first });
            schedule.push(RffField {
                source,
                kind: second,
            });
            if rff {
                schedule.push(RffField { source, kind: first });
            }
        }
    }

    debug!(
        "Built field schedule: {} source frames, {} fields, {} output frames",
        index.total_frames(),
        schedule.len(),
        schedule.len() / 2,
    );
    schedule
}

/// Serves display frames by compositing scheduled fields from decoded
/// source frames.
///
/// The schedule is immutable after construction; each
/// [`output_frame`](RffExpander::output_frame) call decodes at most two
/// source frames through the wrapped [`DecodeContext`].
///
/// # Example
///
/// ```no_run
/// use d2vserve::{DecodeContext, DecodeOptions, Index, RffExpander};
///
/// let index = Index::open("movie.d2v")?;
/// let ctx = DecodeContext::open(index, &DecodeOptions::default())?;
/// let mut expander = RffExpander::new(ctx);
/// for n in 0..expander.output_frame_count() {
///     let frame = expander.output_frame(n)?;
///     // hand `frame` to the host
///     # let _ = frame;
/// }
/// # Ok::<(), d2vserve::D2vError>(())
/// ```
pub struct RffExpander {
    ctx: DecodeContext,
    schedule: Vec<RffField>,
}

impl RffExpander {
    /// Build the schedule for the context's stream and wrap the context.
    pub fn new(ctx: DecodeContext) -> Self {
        let schedule = build_field_schedule(ctx.index());
        Self { ctx, schedule }
    }

    /// Number of display frames after expansion: `floor(fields / 2)`.
    pub fn output_frame_count(&self) -> usize {
        self.schedule.len() / 2
    }

    /// The built field schedule.
    pub fn schedule(&self) -> &[RffField] {
        &self.schedule
    }

    /// Give back the wrapped decode context.
    pub fn into_inner(self) -> DecodeContext {
        self.ctx
    }

    /// Composite display frame `n`.
    ///
    /// When both scheduled fields read the same source frame the decoded
    /// picture is returned as-is; otherwise the two sources are decoded in
    /// ascending order (cheap when the host walks frames forward) and
    /// interleaved by row parity, chroma included.
    ///
    /// # Errors
    ///
    /// - [`D2vError::FrameOutOfRange`] if `n ≥ output_frame_count()`.
    /// - Any error from the underlying [`DecodeContext::decode_frame`].
    pub fn output_frame(&mut self, n: usize) -> Result<Picture, D2vError> {
        if 2 * n + 1 >= self.schedule.len() {
            return Err(D2vError::FrameOutOfRange {
                frame_number: n,
                total_frames: self.output_frame_count(),
            });
        }

        let first = self.schedule[2 * n];
        let second = self.schedule[2 * n + 1];

        if first.source == second.source {
            return self.ctx.decode_frame(first.source);
        }

        // The fields straddle two source frames. Decode low frame first so
        // consecutive output requests stay on the linear path.
        let (low, high) = if first.source < second.source {
            (first, second)
        } else {
            (second, first)
        };
        let low_picture = self.ctx.decode_frame(low.source)?;
        let high_picture = self.ctx.decode_frame(high.source)?;

        debug_assert_eq!(
            (low_picture.width, low_picture.height),
            (high_picture.width, high_picture.height),
        );
        debug_assert_eq!(
            (low_picture.subsampling_w, low_picture.subsampling_h),
            (high_picture.subsampling_w, high_picture.subsampling_h),
        );

        // Which source supplies the even (top-field) rows. A Progressive
        // entry in a mixed pair takes whichever parity the other leaves.
        let first_is_top = match (first.kind, second.kind) {
            (FieldKind::Top, _) => true,
            (FieldKind::Bottom, _) => false,
            (FieldKind::Progressive, FieldKind::Top) => false,
            (FieldKind::Progressive, _) => true,
        };
        let (first_picture, second_picture) = if first.source == low.source {
            (&low_picture, &high_picture)
        } else {
            (&high_picture, &low_picture)
        };
        let (top, bottom) = if first_is_top {
            (first_picture, second_picture)
        } else {
            (second_picture, first_picture)
        };

        let mut out = Picture::new(
            top.width,
            top.height,
            top.subsampling_w,
            top.subsampling_h,
        );
        for plane in 0..3 {
            for row in 0..out.plane_height(plane) {
                let source = if row % 2 == 0 { top } else { bottom };
                out.row_mut(plane, row).copy_from_slice(source.row(plane, row));
            }
        }
        out.field_order = if first_is_top {
            FieldOrder::TopFieldFirst
        } else {
            FieldOrder::BottomFieldFirst
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{
        FrameEntry, GOP_FLAG_CLOSED, GOP_FLAG_PROGRESSIVE_SEQUENCE, GopEntry, Index, MpegProfile,
        StreamKind, StreamParams,
    };

    fn index_with(info: u16, flags: Vec<u8>) -> Index {
        let frames = (0..flags.len())
            .map(|offset| FrameEntry { gop: 0, offset })
            .collect();
        Index {
            params: StreamParams {
                stream_kind: StreamKind::Elementary,
                mpeg_profile: MpegProfile::Mpeg2,
                transport_pid: None,
                idct_algorithm: 0,
                yuvrgb_scale: 0,
                width: 720,
                height: 480,
                fps_num: 30000,
                fps_den: 1001,
                location: None,
                files: Vec::new(),
            },
            gops: vec![GopEntry {
                info,
                matrix: 0,
                file: 0,
                pos: 0,
                skip: 0,
                vob: 0,
                cell: 0,
                flags,
            }],
            frames,
        }
    }

    #[test]
    fn interlaced_frame_without_rff_emits_one_pair() {
        let index = index_with(GOP_FLAG_CLOSED, vec![FRAME_FLAG_TFF]);
        let schedule = build_field_schedule(&index);
        assert_eq!(
            schedule,
            vec![
                RffField { source: 0, kind: FieldKind::Top },
                RffField { source: 0, kind: FieldKind::Bottom },
            ],
        );
    }

    #[test]
    fn rff_repeats_the_first_field() {
        // Bottom field first, repeated: B T B.
        let index = index_with(GOP_FLAG_CLOSED, vec![FRAME_FLAG_RFF]);
        let schedule = build_field_schedule(&index);
        assert_eq!(
            schedule,
            vec![
                RffField { source: 0, kind: FieldKind::Bottom },
                RffField { source: 0, kind: FieldKind::Top },
                RffField { source: 0, kind: FieldKind::Bottom },
            ],
        );
    }

    #[test]
    fn progressive_sequence_repeat_counts() {
        let info = GOP_FLAG_CLOSED | GOP_FLAG_PROGRESSIVE_SEQUENCE;

        let schedule = build_field_schedule(&index_with(info, vec![0]));
        assert_eq!(schedule.len(), 2);

        let schedule = build_field_schedule(&index_with(info, vec![FRAME_FLAG_RFF]));
        assert_eq!(schedule.len(), 4);

        let schedule =
            build_field_schedule(&index_with(info, vec![FRAME_FLAG_RFF | FRAME_FLAG_TFF]));
        assert_eq!(schedule.len(), 6);
        assert!(schedule
            .iter()
            .all(|f| f.kind == FieldKind::Progressive && f.source == 0));
    }

    #[test]
    fn telecine_pattern_pairs_fields_across_frames() {
        // Frame 0: RFF, bottom first (B0 T0 B0); frame 1: TFF (T1 B1).
        // Output pairs: (B0, T0), (B0, T1), (B1, ...) — 5 fields, 2 frames.
        let index = index_with(
            GOP_FLAG_CLOSED,
            vec![FRAME_FLAG_RFF, FRAME_FLAG_TFF],
        );
        let schedule = build_field_schedule(&index);
        assert_eq!(schedule.len(), 5);
        assert_eq!(schedule[2], RffField { source: 0, kind: FieldKind::Bottom });
        assert_eq!(schedule[3], RffField { source: 1, kind: FieldKind::Top });
    }
}
