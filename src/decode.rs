//! The frame-accurate decode engine.
//!
//! [`DecodeContext`] owns one indexed stream end to end: the parsed
//! [`Index`], the virtual [`MultiFileStream`] over its media files, and the
//! [`DemuxerAdapter`] doing the actual demuxing and decoding. Each
//! [`decode_frame`](DecodeContext::decode_frame) call resolves to one of
//! two paths:
//!
//! - **Linear**: the request is the immediate successor of the previous one
//!   and the demuxer is already positioned; decode exactly one more frame.
//! - **Seek**: reposition the stream on the byte offset of the target
//!   frame's GOP (or the previous GOP when open-GOP priming applies),
//!   reopen the demuxer, re-select the video track, and decode forward to
//!   the target.
//!
//! The context is strictly single-threaded: the host must serialize calls.

use log::debug;

use crate::{
    adapter::{DecodeOptions, DemuxerAdapter, FormatHint},
    error::D2vError,
    ffmpeg::FfmpegAdapter,
    index::{FRAME_FLAG_PROGRESSIVE, FRAME_FLAG_TFF, Index, StreamKind},
    picture::{FieldOrder, Picture},
    stream::MultiFileStream,
};

/// One open decoding session over an indexed MPEG stream.
///
/// # Example
///
/// ```no_run
/// use d2vserve::{DecodeContext, DecodeOptions, Index};
///
/// let index = Index::open("movie.d2v")?;
/// let mut ctx = DecodeContext::open(index, &DecodeOptions::default())?;
/// let picture = ctx.decode_frame(42)?;
/// println!("{}x{}", picture.width, picture.height);
/// # Ok::<(), d2vserve::D2vError>(())
/// ```
pub struct DecodeContext {
    index: Index,
    /// Boxed so its address stays stable for the adapter's I/O callbacks
    /// while a demuxer is open.
    stream: Box<MultiFileStream>,
    adapter: Box<dyn DemuxerAdapter>,
    hint: FormatHint,
    /// Track selected after the most recent successful Seek.
    selected_track: Option<usize>,
    /// Track index of the packet currently pending inside the adapter.
    pending_track: Option<usize>,
    last_gop: Option<usize>,
    last_frame: Option<usize>,
}

impl DecodeContext {
    /// Open a session using the FFmpeg adapter.
    ///
    /// # Errors
    ///
    /// - [`D2vError::Unsupported`] for stream kinds that cannot be decoded
    ///   (PVA).
    /// - [`D2vError::Open`] if the decoder cannot be set up.
    /// - [`D2vError::Io`] if a referenced media file cannot be opened.
    pub fn open(index: Index, options: &DecodeOptions) -> Result<Self, D2vError> {
        let adapter = FfmpegAdapter::new(&index.params, options)?;
        Self::with_adapter(index, Box::new(adapter))
    }

    /// Open a session with a caller-supplied adapter.
    ///
    /// # Errors
    ///
    /// Same as [`DecodeContext::open`], minus decoder setup.
    pub fn with_adapter(
        index: Index,
        adapter: Box<dyn DemuxerAdapter>,
    ) -> Result<Self, D2vError> {
        let hint = FormatHint::for_kind(index.params.stream_kind)?;
        let stream = Box::new(MultiFileStream::open(&index.params.files)?);
        Ok(Self {
            index,
            stream,
            adapter,
            hint,
            selected_track: None,
            pending_track: None,
            last_gop: None,
            last_frame: None,
        })
    }

    /// The parsed index this session decodes from.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Total number of coded frames in the stream.
    pub fn total_frames(&self) -> usize {
        self.index.total_frames()
    }

    /// Decode frame `frame_number` (canonical numbering).
    ///
    /// # Errors
    ///
    /// - [`D2vError::FrameOutOfRange`] if `frame_number ≥ total_frames()`.
    /// - [`D2vError::Open`], [`D2vError::NoVideoStream`],
    ///   [`D2vError::PidNotFound`] if the Seek path fails.
    /// - [`D2vError::VideoDecode`] if decoding fails.
    ///
    /// A failed call leaves the linear-decode bookkeeping untouched, so the
    /// next call deterministically takes the Seek path.
    pub fn decode_frame(&mut self, frame_number: usize) -> Result<Picture, D2vError> {
        if frame_number >= self.index.total_frames() {
            return Err(D2vError::FrameOutOfRange {
                frame_number,
                total_frames: self.index.total_frames(),
            });
        }

        match self.decode_inner(frame_number) {
            Ok(picture) => Ok(picture),
            Err(error) => {
                self.adapter.close_demuxer();
                self.pending_track = None;
                self.selected_track = None;
                Err(error)
            }
        }
    }

    fn decode_inner(&mut self, frame_number: usize) -> Result<Picture, D2vError> {
        let entry = self.index.frames[frame_number];
        let gop = &self.index.gops[entry.gop];

        // How many frames past the seek point we must decode. The index
        // gives the within-GOP offset; an open GOP moves the seek point and
        // adjusts it.
        let mut target_offset = entry.offset;
        let mut seek_gop = entry.gop;
        let mut forced_seek = false;

        if !gop.is_closed() {
            if entry.gop == 0 {
                // No previous GOP to prime from. Dropping the leading
                // dependent frames shifts the decoder's output numbering
                // back by that count; when that would go negative, decode
                // from the GOP start instead. This approximation costs
                // extra decode work and is kept deliberately.
                let lead = gop.leading_dependent_frames();
                target_offset = entry.offset.saturating_sub(lead);
                forced_seek = target_offset == 0;
            } else {
                // Prime from the previous GOP: decode its tail so the
                // open GOP's leading frames have their references.
                seek_gop = entry.gop - 1;
                let previous = &self.index.gops[seek_gop];
                let previous_last = self.index.last_frame_offset(seek_gop).unwrap_or(0);
                let lead = if previous.is_closed() {
                    0
                } else {
                    previous.leading_dependent_frames()
                };
                target_offset += previous_last + 1 - lead;
            }
        }

        let follows_previous = self.last_gop == Some(entry.gop)
            || (entry.gop > 0 && self.last_gop == Some(entry.gop - 1));
        // A failed call tears down the demuxer and clears the selected
        // track, so requiring one here forces the next call onto the Seek
        // path even when the bookkeeping still lines up.
        let linear = !forced_seek
            && follows_previous
            && frame_number > 0
            && self.last_frame == Some(frame_number - 1)
            && self.selected_track.is_some();

        if !linear {
            let target = &self.index.gops[seek_gop];
            let (file, pos) = (target.file, target.pos);
            debug!(
                "Seek: frame {frame_number} via GOP {seek_gop} (file {file}, pos {pos}), \
                 decoding {target_offset} frame(s) forward",
            );

            self.adapter.close_demuxer();
            self.pending_track = None;
            self.selected_track = None;

            self.stream.reset_origin(file, pos)?;
            self.adapter.open_demuxer(&mut self.stream, self.hint)?;
            self.adapter.flush_decoder();
            self.selected_track = Some(self.select_track()?);
        } else {
            debug!("Linear: frame {frame_number}");
        }

        let selected = self.selected_track.ok_or(D2vError::NoVideoStream)?;
        let span = if linear { 0 } else { target_offset };
        let is_last_frame = frame_number + 1 == self.index.total_frames();

        for _ in 0..=span {
            // The decoder delivers the stream's final picture with one
            // frame of latency; drain it instead of reading past EOF.
            if is_last_frame {
                self.pending_track = None;
                self.adapter.drain_final_picture()?;
                break;
            }

            self.ensure_pending_packet(selected)?;
            loop {
                let complete = self.adapter.decode_pending()?;
                self.pending_track = None;
                if complete {
                    break;
                }
                // Multi-packet coded frame.
                self.ensure_pending_packet(selected)?;
            }

            // Pre-read the next packet so a following linear call finds it
            // waiting. Intermediate pictures before the final step are
            // simply overwritten in the adapter.
            self.prefetch_packet(selected)?;
        }

        let mut picture = self.adapter.take_picture()?;
        picture.field_order = self.field_order_of(frame_number);

        self.last_gop = Some(entry.gop);
        self.last_frame = Some(frame_number);
        Ok(picture)
    }

    /// Resolve the demuxer track to decode from, once per Seek.
    fn select_track(&mut self) -> Result<usize, D2vError> {
        let tracks = self.adapter.probe_tracks()?;
        match (self.index.params.stream_kind, self.index.params.transport_pid) {
            (StreamKind::Transport, Some(pid)) => tracks
                .iter()
                .find(|track| track.id == i32::from(pid))
                .map(|track| track.index)
                .ok_or(D2vError::PidNotFound { pid }),
            _ => tracks
                .iter()
                .find(|track| track.is_video)
                .map(|track| track.index)
                .ok_or(D2vError::NoVideoStream),
        }
    }

    /// Make sure the adapter holds a packet from the selected track,
    /// reading and discarding other tracks' packets as needed.
    fn ensure_pending_packet(&mut self, selected: usize) -> Result<(), D2vError> {
        loop {
            if self.pending_track == Some(selected) {
                return Ok(());
            }
            match self.adapter.next_packet()? {
                Some(track) => self.pending_track = Some(track),
                None => {
                    self.pending_track = None;
                    return Err(D2vError::VideoDecode(
                        "end of stream before the requested frame".to_string(),
                    ));
                }
            }
        }
    }

    /// Read ahead to the next selected-track packet; end of stream leaves
    /// nothing pending.
    fn prefetch_packet(&mut self, selected: usize) -> Result<(), D2vError> {
        loop {
            match self.adapter.next_packet()? {
                Some(track) if track == selected => {
                    self.pending_track = Some(track);
                    return Ok(());
                }
                Some(_) => continue,
                None => {
                    self.pending_track = None;
                    return Ok(());
                }
            }
        }
    }

    fn field_order_of(&self, frame_number: usize) -> FieldOrder {
        let entry = self.index.frames[frame_number];
        let flags = self.index.frame_flags(frame_number).unwrap_or(0);
        if self.index.gops[entry.gop].is_progressive_sequence()
            || flags & FRAME_FLAG_PROGRESSIVE != 0
        {
            FieldOrder::Progressive
        } else if flags & FRAME_FLAG_TFF != 0 {
            FieldOrder::TopFieldFirst
        } else {
            FieldOrder::BottomFieldFirst
        }
    }
}
