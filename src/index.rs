//! The in-memory index model.
//!
//! A D2V index describes one logical MPEG stream spread over one or more
//! on-disk files: global stream parameters ([`StreamParams`]), one
//! [`GopEntry`] per group of pictures with its byte position and per-frame
//! flag bytes, and a flattened [`FrameEntry`] list that defines the
//! canonical frame numbering used by callers.
//!
//! The model is built once by the parser (see [`Index::open`]) and is
//! immutable for the life of a session.

use std::path::PathBuf;

/// GOP info bit: the GOP is closed and decodes without the previous GOP.
pub const GOP_FLAG_CLOSED: u16 = 0x400;
/// GOP info bit: the GOP belongs to a progressive sequence.
pub const GOP_FLAG_PROGRESSIVE_SEQUENCE: u16 = 0x200;

/// Frame flag bit: repeat first field (3:2 pulldown).
pub const FRAME_FLAG_RFF: u8 = 0x01;
/// Frame flag bit: top field first.
pub const FRAME_FLAG_TFF: u8 = 0x02;
/// Frame flag bit: progressive frame; clear means the frame depends on the
/// tail of the previous GOP when its own GOP is open.
pub const FRAME_FLAG_PROGRESSIVE: u8 = 0x40;

/// The multiplexing variant of the indexed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// A raw MPEG video elementary stream.
    Elementary,
    /// An MPEG program stream (e.g. DVD VOB).
    Program,
    /// An MPEG transport stream; track selection is PID-based.
    Transport,
    /// A PVA stream. Indexable, but not decodable by this crate.
    Pva,
}

/// MPEG profile of the coded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegProfile {
    /// MPEG-1 video.
    Mpeg1,
    /// MPEG-2 video.
    Mpeg2,
}

/// One referenced media file with its size cached at parse time.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Resolved path (relative entries are resolved against the index
    /// file's directory).
    pub path: PathBuf,
    /// File size in bytes, cached when the index was parsed.
    pub size: u64,
}

/// Global stream parameters from the index header block.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Multiplexing variant.
    pub stream_kind: StreamKind,
    /// MPEG-1 or MPEG-2.
    pub mpeg_profile: MpegProfile,
    /// Video PID for transport streams, if one was recorded.
    pub transport_pid: Option<u16>,
    /// iDCT algorithm id recorded by the indexer, passed to the decoder.
    pub idct_algorithm: i32,
    /// YUV↔RGB scale mode (PC/TV range) recorded by the indexer.
    pub yuvrgb_scale: i32,
    /// Coded picture width.
    pub width: u32,
    /// Coded picture height.
    pub height: u32,
    /// Frame rate numerator.
    pub fps_num: u32,
    /// Frame rate denominator.
    pub fps_den: u32,
    /// Opaque `Location` record from the header, passed through unparsed.
    pub location: Option<String>,
    /// Ordered media file list; byte positions in [`GopEntry`] refer into
    /// these files.
    pub files: Vec<SourceFile>,
}

/// One group of pictures as recorded in the index.
#[derive(Debug, Clone)]
pub struct GopEntry {
    /// Info bits; see [`GOP_FLAG_CLOSED`] and
    /// [`GOP_FLAG_PROGRESSIVE_SEQUENCE`].
    pub info: u16,
    /// Quantization matrix id.
    pub matrix: i32,
    /// Index into [`StreamParams::files`] of the file holding this GOP.
    pub file: usize,
    /// Byte position of the GOP within that file.
    pub pos: u64,
    /// Skip count recorded by the indexer.
    pub skip: i32,
    /// Opaque VOB id.
    pub vob: i32,
    /// Opaque cell id.
    pub cell: i32,
    /// One flag byte per coded frame in this GOP, in coded order.
    pub flags: Vec<u8>,
}

impl GopEntry {
    /// Whether this GOP decodes independently of its predecessor.
    pub fn is_closed(&self) -> bool {
        self.info & GOP_FLAG_CLOSED != 0
    }

    /// Whether this GOP belongs to a progressive sequence.
    pub fn is_progressive_sequence(&self) -> bool {
        self.info & GOP_FLAG_PROGRESSIVE_SEQUENCE != 0
    }

    /// Count of leading frames that lack the progressive-frame bit, i.e.
    /// frames that need the tail of the previous GOP when this GOP is open.
    ///
    /// This is the O(GOP size) scan the open-GOP priming logic is built on.
    pub fn leading_dependent_frames(&self) -> usize {
        self.flags
            .iter()
            .take_while(|&&f| f & FRAME_FLAG_PROGRESSIVE == 0)
            .count()
    }
}

/// Position of one frame: its owning GOP and the coded-order offset within
/// that GOP. The flattened list of these in GOP order is the canonical
/// frame numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    /// Index into [`Index::gops`].
    pub gop: usize,
    /// Coded-order offset within the GOP.
    pub offset: usize,
}

/// A fully parsed D2V index: stream parameters, GOP table, and the
/// flattened frame table.
///
/// Built once via [`Index::open`] and immutable thereafter.
///
/// # Example
///
/// ```no_run
/// use d2vserve::Index;
///
/// let index = Index::open("movie.d2v")?;
/// println!("{} frames across {} GOPs", index.total_frames(), index.gops.len());
/// # Ok::<(), d2vserve::D2vError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Index {
    /// Global stream parameters.
    pub params: StreamParams,
    /// GOP table in file order.
    pub gops: Vec<GopEntry>,
    /// Flattened frame table; `frames[n]` locates frame `n`.
    pub frames: Vec<FrameEntry>,
}

impl Index {
    /// Total number of coded frames in the stream.
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Flag byte of frame `n`, if `n` is in range.
    pub fn frame_flags(&self, n: usize) -> Option<u8> {
        let entry = self.frames.get(n)?;
        self.gops.get(entry.gop)?.flags.get(entry.offset).copied()
    }

    /// Coded-order offset of the last frame in `gop`, i.e. the offset of
    /// the frame entry immediately preceding the next GOP's first entry.
    ///
    /// Returns `None` for an out-of-range GOP or an (invalid) empty GOP.
    pub fn last_frame_offset(&self, gop: usize) -> Option<usize> {
        self.gops.get(gop)?.flags.len().checked_sub(1)
    }
}
