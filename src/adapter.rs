//! The demuxer/decoder adapter seam.
//!
//! All entropy/DCT decoding and container demuxing is delegated to an
//! external library behind [`DemuxerAdapter`], a deliberately narrow trait.
//! The decode engine drives it with a fixed call pattern: per Seek it
//! closes and reopens the demuxer on the virtual stream, probes the track
//! list, and flushes the decoder; then it alternates `next_packet` /
//! `decode_pending` until the target picture completes, with
//! [`drain_final_picture`](DemuxerAdapter::drain_final_picture) covering
//! the one frame of pipeline latency at the very end of the stream.
//!
//! The shipped implementation is [`FfmpegAdapter`](crate::ffmpeg::FfmpegAdapter);
//! tests substitute scripted adapters through the same trait.

use crate::{error::D2vError, index::StreamKind, picture::Picture, stream::MultiFileStream};

/// Which libavformat demuxer to bind to the virtual stream, derived from
/// the index's stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    /// Raw MPEG video elementary stream.
    Elementary,
    /// MPEG program stream.
    Program,
    /// MPEG transport stream.
    Transport,
}

impl FormatHint {
    /// Map a stream kind to its demuxer hint.
    ///
    /// # Errors
    ///
    /// Returns [`D2vError::Unsupported`] for stream kinds the engine
    /// cannot demux (PVA).
    pub fn for_kind(kind: StreamKind) -> Result<Self, D2vError> {
        match kind {
            StreamKind::Elementary => Ok(FormatHint::Elementary),
            StreamKind::Program => Ok(FormatHint::Program),
            StreamKind::Transport => Ok(FormatHint::Transport),
            StreamKind::Pva => Err(D2vError::Unsupported("PVA streams".to_string())),
        }
    }

    /// The libavformat short name of the demuxer.
    pub fn demuxer_name(self) -> &'static str {
        match self {
            FormatHint::Elementary => "mpegvideo",
            FormatHint::Program => "mpeg",
            FormatHint::Transport => "mpegts",
        }
    }
}

/// One track enumerated by the demuxer probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Demuxer-level track index; packets report this value.
    pub index: usize,
    /// Container-level id; the PID for transport streams.
    pub id: i32,
    /// Whether the track carries video.
    pub is_video: bool,
}

/// Options applied when constructing a decoder.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Decoder thread count; 0 lets the library decide.
    pub threads: usize,
}

/// The narrow seam between the decode engine and the external
/// demuxing/decoding library.
///
/// Implementations own one decoder instance for their whole lifetime and
/// one demuxer instance between `open_demuxer`/`close_demuxer` pairs. One
/// packet at a time is held *pending* inside the adapter: `next_packet`
/// replaces it, `decode_pending` and `drain_final_picture` consume it.
pub trait DemuxerAdapter {
    /// Bind a fresh demuxer instance to the virtual stream, whose cursor
    /// and origin have already been placed on the target GOP.
    ///
    /// The stream reference must stay at a stable address and must not be
    /// repositioned by the caller until `close_demuxer`.
    fn open_demuxer(
        &mut self,
        stream: &mut MultiFileStream,
        hint: FormatHint,
    ) -> Result<(), D2vError>;

    /// Tear down the demuxer instance, if any. Idempotent. The decoder
    /// instance survives.
    fn close_demuxer(&mut self);

    /// Enumerate the tracks of the open demuxer.
    fn probe_tracks(&mut self) -> Result<Vec<TrackInfo>, D2vError>;

    /// Read the next packet, making it the pending packet. Returns its
    /// track index, or `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<usize>, D2vError>;

    /// Feed the pending packet to the decoder. Returns `true` once a
    /// complete picture is available via `take_picture` (a coded frame may
    /// span several packets, so this may need more input).
    fn decode_pending(&mut self) -> Result<bool, D2vError>;

    /// Discard the pending packet (if any) and flush the one picture of
    /// pipeline latency the decoder holds at end of stream, making it
    /// available via `take_picture`.
    fn drain_final_picture(&mut self) -> Result<(), D2vError>;

    /// Drop decoder-internal buffered state after a seek.
    fn flush_decoder(&mut self);

    /// Copy out the most recently completed picture.
    fn take_picture(&mut self) -> Result<Picture, D2vError>;
}
