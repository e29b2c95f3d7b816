//! The FFmpeg-backed demuxer adapter, plus FFmpeg log level configuration.
//!
//! [`FfmpegAdapter`] implements [`DemuxerAdapter`] on top of the raw
//! libavformat/libavcodec bindings. The demuxer is fed through a custom
//! AVIO context whose callbacks read and seek the virtual
//! [`MultiFileStream`], so libavformat sees an ordinary byte stream that
//! begins at the last seek target. One decoder instance lives for the
//! adapter's whole lifetime; demuxer instances are created and torn down
//! per seek.
//!
//! FFmpeg also has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. By default it prints
//! warnings and errors to stderr, which is noisy in library usage;
//! [`set_ffmpeg_log_level`] tunes that output without making callers import
//! `ffmpeg-next` directly.

use std::{
    ffi::{CStr, c_int, c_void},
    ptr,
    slice,
};

use ffmpeg_next::{Error as FfmpegError, util::log::Level};
use ffmpeg_sys_next::{
    AVCodecContext, AVCodecID, AVFMT_FLAG_CUSTOM_IO, AVFormatContext, AVFrame, AVMediaType,
    AVPacket, AVERROR, AVERROR_EOF, AVERROR_UNKNOWN, EAGAIN, av_find_input_format, av_frame_alloc,
    av_frame_free, av_frame_unref, av_freep, av_malloc, av_packet_alloc, av_packet_free,
    av_packet_unref, av_read_frame, avcodec_alloc_context3, avcodec_find_decoder,
    avcodec_flush_buffers, avcodec_free_context, avcodec_open2, avcodec_receive_frame,
    avcodec_send_packet, avformat_alloc_context, avformat_close_input, avformat_find_stream_info,
    avformat_free_context, avformat_open_input, avio_alloc_context, avio_context_free,
};
use log::debug;

use crate::{
    adapter::{DecodeOptions, DemuxerAdapter, FormatHint, TrackInfo},
    error::D2vError,
    index::{MpegProfile, StreamParams},
    picture::Picture,
    stream::MultiFileStream,
};

/// Size of the scratch buffer handed to the custom AVIO context.
const AVIO_BUFFER_SIZE: usize = 32 * 1024;

fn demuxer_cname(hint: FormatHint) -> &'static CStr {
    match hint {
        FormatHint::Elementary => c"mpegvideo",
        FormatHint::Program => c"mpeg",
        FormatHint::Transport => c"mpegts",
    }
}

fn fake_cname(hint: FormatHint) -> &'static CStr {
    match hint {
        FormatHint::Elementary => c"fakevideo.m2v",
        FormatHint::Program => c"fakevideo.vob",
        FormatHint::Transport => c"fakevideo.ts",
    }
}

/// AVIO read callback: pull bytes from the virtual stream.
unsafe extern "C" fn read_stream(opaque: *mut c_void, buf: *mut u8, size: c_int) -> c_int {
    let stream = unsafe { &mut *(opaque as *mut MultiFileStream) };
    let out = unsafe { slice::from_raw_parts_mut(buf, size as usize) };
    match stream.read(out) {
        Ok(0) => AVERROR_EOF,
        Ok(n) => n as c_int,
        Err(_) => AVERROR_UNKNOWN,
    }
}

/// AVIO seek callback: absolute seeks resolve against the stream origin.
unsafe extern "C" fn seek_stream(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let stream = unsafe { &mut *(opaque as *mut MultiFileStream) };
    stream.avio_seek(offset, whence).unwrap_or(-1)
}

/// [`DemuxerAdapter`] implemented on the raw FFmpeg bindings.
///
/// The decoder context, reusable packet, and reusable frame are allocated
/// once in [`FfmpegAdapter::new`] and freed on drop. The format context
/// (and its AVIO context) exists only between `open_demuxer` and
/// `close_demuxer`.
pub struct FfmpegAdapter {
    codec_ctx: *mut AVCodecContext,
    fmt_ctx: *mut AVFormatContext,
    packet: *mut AVPacket,
    frame: *mut AVFrame,
    /// Whether `packet` currently holds an undecoded packet.
    pending: bool,
    /// Whether `frame` currently holds a completed picture.
    has_picture: bool,
}

// The raw pointers are owned by the adapter and never shared across
// threads by the engine; moving the adapter between threads is fine.
unsafe impl Send for FfmpegAdapter {}

impl FfmpegAdapter {
    /// Allocate and open the decoder matching the indexed stream.
    ///
    /// The iDCT algorithm id recorded in the index is handed to the decoder
    /// unchanged, so decoding reproduces the indexer's output bit-exactly.
    ///
    /// # Errors
    ///
    /// Returns [`D2vError::Open`] if FFmpeg has no decoder for the stream's
    /// MPEG profile or the decoder cannot be allocated or opened.
    pub fn new(params: &StreamParams, options: &DecodeOptions) -> Result<Self, D2vError> {
        ffmpeg_next::init()?;

        let codec_id = match params.mpeg_profile {
            MpegProfile::Mpeg1 => AVCodecID::AV_CODEC_ID_MPEG1VIDEO,
            MpegProfile::Mpeg2 => AVCodecID::AV_CODEC_ID_MPEG2VIDEO,
        };

        unsafe {
            let codec = avcodec_find_decoder(codec_id);
            if codec.is_null() {
                return Err(D2vError::Open(format!(
                    "no decoder available for {:?}",
                    params.mpeg_profile,
                )));
            }

            let mut codec_ctx = avcodec_alloc_context3(codec);
            if codec_ctx.is_null() {
                return Err(D2vError::Open("cannot allocate decoder context".to_string()));
            }
            (*codec_ctx).idct_algo = params.idct_algorithm;
            (*codec_ctx).thread_count = options.threads as c_int;

            let ret = avcodec_open2(codec_ctx, codec, ptr::null_mut());
            if ret < 0 {
                avcodec_free_context(&mut codec_ctx);
                return Err(D2vError::Open(FfmpegError::from(ret).to_string()));
            }

            let mut packet = av_packet_alloc();
            let mut frame = av_frame_alloc();
            if packet.is_null() || frame.is_null() {
                av_packet_free(&mut packet);
                av_frame_free(&mut frame);
                avcodec_free_context(&mut codec_ctx);
                return Err(D2vError::Open("cannot allocate packet or frame".to_string()));
            }

            Ok(Self {
                codec_ctx,
                fmt_ctx: ptr::null_mut(),
                packet,
                frame,
                pending: false,
                has_picture: false,
            })
        }
    }

    fn receive(&mut self) -> Result<bool, D2vError> {
        unsafe {
            let ret = avcodec_receive_frame(self.codec_ctx, self.frame);
            if ret == 0 {
                self.has_picture = true;
                return Ok(true);
            }
            if ret == AVERROR(EAGAIN as c_int) || ret == AVERROR_EOF {
                return Ok(false);
            }
            Err(D2vError::VideoDecode(FfmpegError::from(ret).to_string()))
        }
    }
}

impl DemuxerAdapter for FfmpegAdapter {
    fn open_demuxer(
        &mut self,
        stream: &mut MultiFileStream,
        hint: FormatHint,
    ) -> Result<(), D2vError> {
        self.close_demuxer();

        debug!(
            "Opening '{}' demuxer on virtual stream at origin {:?}",
            hint.demuxer_name(),
            stream.origin(),
        );

        unsafe {
            let input = av_find_input_format(demuxer_cname(hint).as_ptr());
            if input.is_null() {
                return Err(D2vError::Open(format!(
                    "demuxer '{}' is not available in this FFmpeg build",
                    hint.demuxer_name(),
                )));
            }

            let mut fmt_ctx = avformat_alloc_context();
            if fmt_ctx.is_null() {
                return Err(D2vError::Open("cannot allocate demuxer context".to_string()));
            }

            let buffer = av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                avformat_free_context(fmt_ctx);
                return Err(D2vError::Open("cannot allocate AVIO buffer".to_string()));
            }

            let mut pb = avio_alloc_context(
                buffer,
                AVIO_BUFFER_SIZE as c_int,
                0,
                stream as *mut MultiFileStream as *mut c_void,
                Some(read_stream),
                None,
                Some(seek_stream),
            );
            if pb.is_null() {
                let mut buffer = buffer;
                av_freep(&raw mut buffer as *mut c_void);
                avformat_free_context(fmt_ctx);
                return Err(D2vError::Open("cannot allocate AVIO context".to_string()));
            }

            (*fmt_ctx).pb = pb;
            (*fmt_ctx).flags |= AVFMT_FLAG_CUSTOM_IO;

            let ret = avformat_open_input(
                &mut fmt_ctx,
                fake_cname(hint).as_ptr(),
                input,
                ptr::null_mut(),
            );
            if ret < 0 {
                // On failure libavformat frees the format context but not
                // the caller-owned AVIO context.
                av_freep(&raw mut (*pb).buffer as *mut c_void);
                avio_context_free(&mut pb);
                return Err(D2vError::Open(FfmpegError::from(ret).to_string()));
            }

            let ret = avformat_find_stream_info(fmt_ctx, ptr::null_mut());
            if ret < 0 {
                self.fmt_ctx = fmt_ctx;
                self.close_demuxer();
                return Err(D2vError::Open(FfmpegError::from(ret).to_string()));
            }

            self.fmt_ctx = fmt_ctx;
        }

        Ok(())
    }

    fn close_demuxer(&mut self) {
        if self.fmt_ctx.is_null() {
            return;
        }
        unsafe {
            let mut pb = (*self.fmt_ctx).pb;
            avformat_close_input(&mut self.fmt_ctx);
            if !pb.is_null() {
                av_freep(&raw mut (*pb).buffer as *mut c_void);
                avio_context_free(&mut pb);
            }
        }
        self.fmt_ctx = ptr::null_mut();
        self.pending = false;
    }

    fn probe_tracks(&mut self) -> Result<Vec<TrackInfo>, D2vError> {
        if self.fmt_ctx.is_null() {
            return Err(D2vError::Open("demuxer is not open".to_string()));
        }
        unsafe {
            let count = (*self.fmt_ctx).nb_streams as usize;
            let streams = slice::from_raw_parts((*self.fmt_ctx).streams, count);
            let tracks = streams
                .iter()
                .enumerate()
                .map(|(index, &s)| TrackInfo {
                    index,
                    id: (*s).id,
                    is_video: (*(*s).codecpar).codec_type == AVMediaType::AVMEDIA_TYPE_VIDEO,
                })
                .collect::<Vec<_>>();
            debug!("Probed {} track(s)", tracks.len());
            Ok(tracks)
        }
    }

    fn next_packet(&mut self) -> Result<Option<usize>, D2vError> {
        unsafe {
            av_packet_unref(self.packet);
            self.pending = false;
            let ret = av_read_frame(self.fmt_ctx, self.packet);
            if ret == AVERROR_EOF {
                return Ok(None);
            }
            if ret < 0 {
                return Err(D2vError::from(FfmpegError::from(ret)));
            }
            self.pending = true;
            Ok(Some((*self.packet).stream_index as usize))
        }
    }

    fn decode_pending(&mut self) -> Result<bool, D2vError> {
        if !self.pending {
            return Err(D2vError::VideoDecode("no packet is pending".to_string()));
        }
        unsafe {
            let ret = avcodec_send_packet(self.codec_ctx, self.packet);
            if ret == AVERROR(EAGAIN as c_int) {
                // Decoder is full: pull out the picture it holds, keep the
                // packet pending for the next call.
                return self.receive();
            }
            self.pending = false;
            av_packet_unref(self.packet);
            if ret < 0 {
                return Err(D2vError::VideoDecode(FfmpegError::from(ret).to_string()));
            }
        }
        self.receive()
    }

    fn drain_final_picture(&mut self) -> Result<(), D2vError> {
        unsafe {
            if self.pending {
                av_packet_unref(self.packet);
                self.pending = false;
            }
            let ret = avcodec_send_packet(self.codec_ctx, ptr::null());
            if ret < 0 && ret != AVERROR_EOF {
                return Err(D2vError::VideoDecode(FfmpegError::from(ret).to_string()));
            }
        }
        if self.receive()? {
            Ok(())
        } else {
            Err(D2vError::VideoDecode(
                "decoder held no delayed picture at end of stream".to_string(),
            ))
        }
    }

    fn flush_decoder(&mut self) {
        unsafe {
            avcodec_flush_buffers(self.codec_ctx);
        }
        self.has_picture = false;
    }

    fn take_picture(&mut self) -> Result<Picture, D2vError> {
        if !self.has_picture {
            return Err(D2vError::VideoDecode(
                "no decoded picture is available".to_string(),
            ));
        }
        unsafe {
            let width = (*self.frame).width as usize;
            let height = (*self.frame).height as usize;
            let (ssw, ssh) = Picture::subsampling_for((*self.frame).format)?;
            let mut picture = Picture::new(width, height, ssw, ssh);

            for plane in 0..3 {
                let data = (*self.frame).data[plane];
                let stride = (*self.frame).linesize[plane] as usize;
                let row_width = picture.plane_width(plane);
                for row in 0..picture.plane_height(plane) {
                    let src = slice::from_raw_parts(data.add(row * stride), row_width);
                    picture.row_mut(plane, row).copy_from_slice(src);
                }
            }

            av_frame_unref(self.frame);
            self.has_picture = false;
            Ok(picture)
        }
    }
}

impl Drop for FfmpegAdapter {
    fn drop(&mut self) {
        self.close_demuxer();
        unsafe {
            av_packet_free(&mut self.packet);
            av_frame_free(&mut self.frame);
            avcodec_free_context(&mut self.codec_ctx);
        }
    }
}

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants. Setting a level causes
/// FFmpeg to suppress all messages below that severity.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log when a condition that cannot be recovered from is encountered
    /// and the process will abort.
    Panic,
    /// Only log when an unrecoverable error is encountered (the context
    /// becomes invalid but the process may continue).
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (default FFmpeg level).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does **not** affect
/// Rust-side `log` crate output.
///
/// # Example
///
/// ```no_run
/// use d2vserve::FfmpegLogLevel;
///
/// // Only show errors and above.
/// d2vserve::set_ffmpeg_log_level(FfmpegLogLevel::Error);
/// ```
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}
