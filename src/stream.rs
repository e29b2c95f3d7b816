//! The virtual multi-file byte stream.
//!
//! A D2V index may reference several on-disk files (e.g. one VOB per DVD
//! cell) that together form one logical MPEG stream. [`MultiFileStream`]
//! presents that ordered list as a single seekable byte stream for the
//! demuxer adapter: reads cross file boundaries transparently, and absolute
//! seeks are interpreted relative to a stored *origin* — the `(file, byte)`
//! position of the GOP the decode engine last seeked to — so libavformat's
//! probing never learns that GOP offsets or multiple files exist.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

use ffmpeg_sys_next::{AVSEEK_FORCE, AVSEEK_SIZE};

use crate::{error::D2vError, index::SourceFile};

/// `SEEK_SET` as passed by libavformat's seek callback.
const WHENCE_SET: i32 = 0;

/// An ordered list of files exposed as one logical, seekable byte stream.
///
/// Only the access pattern of libavformat's open/probe phase needs to be
/// supported: forward reads plus absolute seeks resolved against the origin,
/// and the `AVSEEK_SIZE` size query. Any other seek mode is rejected.
#[derive(Debug)]
pub struct MultiFileStream {
    files: Vec<File>,
    sizes: Vec<u64>,
    /// `prefix[i]` is the byte count of all files before file `i`;
    /// `prefix[len]` is the total. Precomputed once so seek resolution does
    /// not re-walk the size table.
    prefix: Vec<u64>,
    origin_file: usize,
    origin_offset: u64,
    current_file: usize,
}

impl MultiFileStream {
    /// Open every referenced file and build the size table.
    ///
    /// # Errors
    ///
    /// Returns [`D2vError::Io`] if any file cannot be opened or stat'ed.
    pub fn open(sources: &[SourceFile]) -> Result<Self, D2vError> {
        let mut files = Vec::with_capacity(sources.len());
        let mut sizes = Vec::with_capacity(sources.len());
        for source in sources {
            let file = File::open(&source.path)?;
            let size = file.metadata()?.len();
            files.push(file);
            sizes.push(size);
        }

        let mut prefix = Vec::with_capacity(sizes.len() + 1);
        let mut total = 0u64;
        prefix.push(0);
        for &size in &sizes {
            total += size;
            prefix.push(total);
        }

        Ok(Self {
            files,
            sizes,
            prefix,
            origin_file: 0,
            origin_offset: 0,
            current_file: 0,
        })
    }

    /// Number of files in the stream.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// The stored origin as `(file index, byte offset within that file)`.
    pub fn origin(&self) -> (usize, u64) {
        (self.origin_file, self.origin_offset)
    }

    /// Move the cursor to `pos` within file `file` and make that position
    /// the new origin for subsequent relative seek arithmetic.
    ///
    /// The decode engine calls this once per Seek path, just before
    /// reopening the demuxer on the target GOP.
    pub fn reset_origin(&mut self, file: usize, pos: u64) -> Result<(), D2vError> {
        if file >= self.files.len() {
            return Err(D2vError::Unsupported(format!(
                "GOP references file {file}, stream has {} files",
                self.files.len(),
            )));
        }
        self.files[file].seek(SeekFrom::Start(pos))?;
        self.origin_file = file;
        self.origin_offset = pos;
        self.current_file = file;
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the cursor, continuing seamlessly
    /// into the next file when the current one is exhausted. Returns the
    /// number of bytes read; 0 only at end of the last file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, D2vError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.files[self.current_file].read(&mut buf[filled..])?;
            filled += n;
            if filled == buf.len() {
                break;
            }
            if self.current_file + 1 == self.files.len() {
                break;
            }
            self.current_file += 1;
            self.files[self.current_file].seek(SeekFrom::Start(0))?;
        }
        Ok(filled)
    }

    /// Total bytes from the origin to the end of the last file.
    pub fn remaining_size(&self) -> i64 {
        let after_origin: u64 = self.sizes[self.origin_file..].iter().sum();
        after_origin as i64 - self.origin_offset as i64
    }

    /// Move the cursor to `offset` bytes past the origin, walking the
    /// file-size prefix sums to resolve the target `(file, intra-offset)`.
    ///
    /// Negative resolved positions clamp to the start of the first file;
    /// positions past the end resolve into the last file (reads there
    /// return 0, like an ordinary past-end seek).
    pub fn seek_from_origin(&mut self, offset: i64) -> Result<(), D2vError> {
        let origin_global = self.prefix[self.origin_file] as i64 + self.origin_offset as i64;
        let target = (origin_global + offset).max(0) as u64;

        let mut file = match self.prefix.partition_point(|&p| p <= target) {
            0 => 0,
            n => n - 1,
        };
        if file >= self.files.len() {
            file = self.files.len() - 1;
        }

        let intra = target - self.prefix[file];
        self.files[file].seek(SeekFrom::Start(intra))?;
        self.current_file = file;
        Ok(())
    }

    /// Seek entry point for the demuxer adapter's AVIO callback, taking the
    /// raw libavformat `whence` value.
    ///
    /// # Errors
    ///
    /// Returns [`D2vError::Unsupported`] for any mode other than an
    /// absolute seek or the `AVSEEK_SIZE` size query.
    pub fn avio_seek(&mut self, offset: i64, whence: i32) -> Result<i64, D2vError> {
        if whence & AVSEEK_SIZE as i32 != 0 {
            return Ok(self.remaining_size());
        }
        match whence & !(AVSEEK_FORCE as i32) {
            WHENCE_SET => {
                self.seek_from_origin(offset)?;
                Ok(offset)
            }
            other => Err(D2vError::Unsupported(format!("seek mode {other}"))),
        }
    }
}
