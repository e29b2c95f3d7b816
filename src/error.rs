//! Error types for the `d2vserve` crate.
//!
//! This module defines [`D2vError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context to diagnose
//! the problem without additional logging at the call site: index line
//! numbers for parse failures, frame numbers for out-of-range requests, and
//! upstream FFmpeg error messages.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `d2vserve` operations.
///
/// Every public method that can fail returns `Result<T, D2vError>`. No error
/// is retried internally; callers treat each error as terminal for that
/// single request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum D2vError {
    /// The index file could not be opened.
    #[error("Failed to open index file at {path}: {reason}")]
    IndexOpen {
        /// Path that was passed to [`crate::Index::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The index file is structurally malformed or has an unsupported
    /// version tag. Parsing aborts on the first such line; no partial index
    /// is ever returned.
    #[error("Malformed index (line {line}): {message}")]
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// The demuxer or decoder could not be allocated or opened.
    #[error("Failed to open decoder: {0}")]
    Open(String),

    /// No video track was found while probing after a seek.
    #[error("No video stream found")]
    NoVideoStream,

    /// The configured transport PID matched no track while probing.
    #[error("PID {pid:#x} does not exist in source file")]
    PidNotFound {
        /// The PID that was configured in the index.
        pid: u16,
    },

    /// An operation the virtual stream or decode engine does not support:
    /// an unexpected seek mode, or a stream kind the engine cannot demux.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The requested frame number exceeds the total frame count.
    #[error("Frame {frame_number} is out of range (stream has {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame number that was requested.
        frame_number: usize,
        /// The total number of frames available.
        total_frames: usize,
    },

    /// A picture could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading index or media files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl From<FfmpegError> for D2vError {
    fn from(error: FfmpegError) -> Self {
        D2vError::Ffmpeg(error.to_string())
    }
}
