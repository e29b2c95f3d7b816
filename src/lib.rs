//! # d2vserve
//!
//! Frame-accurate, random-access decoding of MPEG-1/2 streams driven by a
//! D2V side-car index.
//!
//! MPEG program/transport streams aren't randomly seekable on their own: a
//! frame may depend on pictures from the previous GOP, streams span several
//! files (one VOB per DVD cell), and 3:2-pulldown material stores fewer
//! coded frames than it displays. `d2vserve` parses a DGIndex-style D2V
//! index into an in-memory model, exposes the referenced files as one
//! virtual byte stream, and decodes any frame by number — seeking to the
//! indexed GOP (priming from the previous GOP when it is open) or stepping
//! linearly when the host walks frames in order. An optional RFF expander
//! reconstructs the displayed frame sequence from the repeat-field flags.
//! Decoding itself is done by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Decode a Frame by Number
//!
//! ```no_run
//! use d2vserve::{DecodeContext, DecodeOptions, Index};
//!
//! let index = Index::open("movie.d2v").unwrap();
//! let mut ctx = DecodeContext::open(index, &DecodeOptions::default()).unwrap();
//! let picture = ctx.decode_frame(1234).unwrap();
//! assert_eq!(picture.planes.len(), 3);
//! ```
//!
//! ### Serve the Displayed (RFF-Expanded) Sequence
//!
//! ```no_run
//! use d2vserve::{DecodeContext, DecodeOptions, Index, RffExpander};
//!
//! let index = Index::open("telecined.d2v").unwrap();
//! let ctx = DecodeContext::open(index, &DecodeOptions::default()).unwrap();
//! let mut expander = RffExpander::new(ctx);
//! let first = expander.output_frame(0).unwrap();
//! # let _ = first;
//! ```
//!
//! ## Features
//!
//! - **D2V index parsing** — version check, referenced file list, header
//!   parameters, GOP table with per-frame flag bytes
//! - **Virtual multi-file stream** — VOB sets and segmented captures read
//!   as one seekable byte stream
//! - **Frame-accurate random access** — Seek/Linear path selection with
//!   open-GOP priming from the previous GOP
//! - **Elementary, program, and transport streams** — with PID-based track
//!   selection for transport captures
//! - **RFF/TFF field expansion** — reconstructs the display sequence of
//!   3:2-pulldown material, interleaving fields across source frames
//! - **Pluggable decoding backend** — the FFmpeg adapter sits behind a
//!   narrow trait, so the engine is testable without media files
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod adapter;
pub mod decode;
pub mod error;
pub mod ffmpeg;
pub mod index;
mod parser;
pub mod picture;
pub mod rff;
pub mod stream;

pub use adapter::{DecodeOptions, DemuxerAdapter, FormatHint, TrackInfo};
pub use decode::DecodeContext;
pub use error::D2vError;
pub use ffmpeg::{FfmpegAdapter, FfmpegLogLevel, set_ffmpeg_log_level};
pub use index::{
    FRAME_FLAG_PROGRESSIVE, FRAME_FLAG_RFF, FRAME_FLAG_TFF, FrameEntry, GOP_FLAG_CLOSED,
    GOP_FLAG_PROGRESSIVE_SEQUENCE, GopEntry, Index, MpegProfile, SourceFile, StreamKind,
    StreamParams,
};
pub use parser::INDEX_VERSION_TAG;
pub use picture::{FieldOrder, Picture};
pub use rff::{FieldKind, RffExpander, RffField, build_field_schedule};
pub use stream::MultiFileStream;
