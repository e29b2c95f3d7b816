//! The D2V index file parser.
//!
//! D2V indexes are line-oriented text: a version tag, the referenced media
//! file list, a `key=value` header block, and one line per GOP carrying its
//! byte position and per-frame flag bytes. [`Index::open`] parses a file
//! into the immutable [`Index`] model; any structural problem aborts the
//! whole parse with [`D2vError::Parse`] naming the offending line — no
//! partial model is ever returned.

use std::{fs, path::Path};

use crate::{
    error::D2vError,
    index::{FrameEntry, GopEntry, Index, MpegProfile, SourceFile, StreamKind, StreamParams},
};

/// The only index version this crate understands.
pub const INDEX_VERSION_TAG: &str = "DGIndexProjectFile16";

impl Index {
    /// Parse a D2V index file.
    ///
    /// Referenced media files are resolved relative to the index file's
    /// directory (absolute entries are used as-is), stat'ed, and their
    /// sizes cached in the returned [`StreamParams`].
    ///
    /// # Errors
    ///
    /// - [`D2vError::IndexOpen`] if the index file itself cannot be read.
    /// - [`D2vError::Parse`] for an unsupported version tag, a malformed
    ///   line, or a missing/unreadable referenced media file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use d2vserve::Index;
    ///
    /// let index = Index::open("movie.d2v")?;
    /// assert!(index.total_frames() > 0);
    /// # Ok::<(), d2vserve::D2vError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, D2vError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|error| D2vError::IndexOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        log::debug!("Parsing index file: {}", path.display());
        parse_index(&text, base_dir)
    }
}

/// Line reader that tracks 1-based line numbers for error reporting.
struct Lines<'a> {
    inner: std::str::Lines<'a>,
    number: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines(),
            number: 0,
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.inner.next()?;
        self.number += 1;
        Some(line)
    }

    /// The next line, failing with a parse error at end of file.
    fn expect(&mut self, what: &str) -> Result<&'a str, D2vError> {
        self.next().ok_or_else(|| D2vError::Parse {
            line: self.number + 1,
            message: format!("unexpected end of file, expected {what}"),
        })
    }

    fn error(&self, message: impl Into<String>) -> D2vError {
        D2vError::Parse {
            line: self.number,
            message: message.into(),
        }
    }
}

fn parse_index(text: &str, base_dir: &Path) -> Result<Index, D2vError> {
    let mut lines = Lines::new(text);

    let version = lines.expect("version tag")?;
    if version.trim() != INDEX_VERSION_TAG {
        return Err(lines.error(format!(
            "unsupported index version {:?}, expected {INDEX_VERSION_TAG:?}",
            version.trim(),
        )));
    }

    let count_line = lines.expect("file count")?;
    let file_count: usize = count_line
        .trim()
        .parse()
        .map_err(|_| lines.error(format!("invalid file count {:?}", count_line.trim())))?;

    let mut files = Vec::with_capacity(file_count);
    for _ in 0..file_count {
        let entry = lines.expect("file path")?;
        let raw = Path::new(entry);
        let resolved = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            base_dir.join(raw)
        };
        let metadata = fs::metadata(&resolved).map_err(|error| {
            lines.error(format!(
                "cannot stat referenced file {}: {error}",
                resolved.display(),
            ))
        })?;
        files.push(SourceFile {
            path: resolved,
            size: metadata.len(),
        });
    }

    let separator = lines.expect("blank separator line")?;
    if !separator.trim().is_empty() {
        return Err(lines.error("expected blank line after file list"));
    }

    let header = parse_header(&mut lines, files)?;
    let (gops, frames) = parse_gops(&mut lines, header.files.len())?;

    log::debug!(
        "Parsed index: {} files, {} GOPs, {} frames, {}x{} @ {}/{}",
        header.files.len(),
        gops.len(),
        frames.len(),
        header.width,
        header.height,
        header.fps_num,
        header.fps_den,
    );

    Ok(Index {
        params: header,
        gops,
        frames,
    })
}

/// Parse the `key=value` header block up to its terminating blank line.
fn parse_header(lines: &mut Lines<'_>, files: Vec<SourceFile>) -> Result<StreamParams, D2vError> {
    let mut stream_kind = None;
    let mut mpeg_profile = None;
    let mut transport_pid = None;
    let mut idct_algorithm = 0;
    let mut yuvrgb_scale = 0;
    let mut picture_size = None;
    let mut frame_rate = None;
    let mut location = None;

    loop {
        let line = lines.expect("header line")?;
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(lines.error(format!("header line has no '=': {line:?}")));
        };
        let value = value.trim();
        match key.trim() {
            "Stream_Type" => {
                stream_kind = Some(match value {
                    "0" => StreamKind::Elementary,
                    "1" => StreamKind::Program,
                    "2" => StreamKind::Transport,
                    "3" => StreamKind::Pva,
                    other => {
                        return Err(lines.error(format!("unknown Stream_Type {other:?}")));
                    }
                });
            }
            "MPEG2_Transport_PID" => {
                // "video,audio,pcr" — only the video PID matters here.
                let video = value.split(',').next().unwrap_or(value).trim();
                let pid = u16::from_str_radix(video, 16)
                    .map_err(|_| lines.error(format!("invalid transport PID {video:?}")))?;
                transport_pid = Some(pid);
            }
            "MPEG_Type" => {
                mpeg_profile = Some(match value {
                    "1" => MpegProfile::Mpeg1,
                    "2" => MpegProfile::Mpeg2,
                    other => return Err(lines.error(format!("invalid MPEG_Type {other:?}"))),
                });
            }
            "iDCT_Algorithm" => {
                idct_algorithm = value
                    .parse()
                    .map_err(|_| lines.error(format!("invalid iDCT_Algorithm {value:?}")))?;
            }
            "YUVRGB_Scale" => {
                yuvrgb_scale = value
                    .parse()
                    .map_err(|_| lines.error(format!("invalid YUVRGB_Scale {value:?}")))?;
            }
            "Picture_Size" => {
                let Some((w, h)) = value.split_once('x') else {
                    return Err(lines.error(format!("invalid Picture_Size {value:?}")));
                };
                let width = w
                    .trim()
                    .parse()
                    .map_err(|_| lines.error(format!("invalid picture width {w:?}")))?;
                let height = h
                    .trim()
                    .parse()
                    .map_err(|_| lines.error(format!("invalid picture height {h:?}")))?;
                picture_size = Some((width, height));
            }
            "Frame_Rate" => {
                // "29970000 (30000/1001)" — the parenthesized rational is
                // authoritative.
                let open = value.find('(');
                let close = value.rfind(')');
                let rational = match (open, close) {
                    (Some(o), Some(c)) if o < c => &value[o + 1..c],
                    _ => return Err(lines.error(format!("invalid Frame_Rate {value:?}"))),
                };
                let Some((num, den)) = rational.split_once('/') else {
                    return Err(lines.error(format!("invalid Frame_Rate rational {rational:?}")));
                };
                let num = num
                    .trim()
                    .parse()
                    .map_err(|_| lines.error(format!("invalid frame rate numerator {num:?}")))?;
                let den = den
                    .trim()
                    .parse()
                    .map_err(|_| lines.error(format!("invalid frame rate denominator {den:?}")))?;
                frame_rate = Some((num, den));
            }
            "Location" => {
                location = Some(value.to_string());
            }
            // Other recorded settings (Aspect_Ratio, Field_Operation, ...)
            // don't affect decoding.
            _ => {}
        }
    }

    let stream_kind =
        stream_kind.ok_or_else(|| lines.error("header is missing Stream_Type"))?;
    let mpeg_profile = mpeg_profile.ok_or_else(|| lines.error("header is missing MPEG_Type"))?;
    let (width, height) =
        picture_size.ok_or_else(|| lines.error("header is missing Picture_Size"))?;
    let (fps_num, fps_den) =
        frame_rate.ok_or_else(|| lines.error("header is missing Frame_Rate"))?;

    Ok(StreamParams {
        stream_kind,
        mpeg_profile,
        transport_pid,
        idct_algorithm,
        yuvrgb_scale,
        width,
        height,
        fps_num,
        fps_den,
        location,
        files,
    })
}

/// Parse GOP lines until a blank line or end of file, flattening the frame
/// table as we go. DGIndex appends a `FINISHED …` trailer after a blank
/// line; everything past the first blank line is ignored.
fn parse_gops(
    lines: &mut Lines<'_>,
    file_count: usize,
) -> Result<(Vec<GopEntry>, Vec<FrameEntry>), D2vError> {
    let mut gops = Vec::new();
    let mut frames = Vec::new();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            break;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 8 {
            return Err(lines.error(format!(
                "GOP line has {} fields, expected 8 (info matrix file pos skip vob cell flags)",
                fields.len(),
            )));
        }

        let info = u16::from_str_radix(fields[0], 16)
            .map_err(|_| lines.error(format!("invalid GOP info field {:?}", fields[0])))?;
        let matrix = parse_decimal(lines, fields[1], "matrix")?;
        let file = parse_decimal::<usize>(lines, fields[2], "file")?;
        let pos = parse_decimal::<u64>(lines, fields[3], "pos")?;
        let skip = parse_decimal(lines, fields[4], "skip")?;
        let vob = parse_decimal(lines, fields[5], "vob")?;
        let cell = parse_decimal(lines, fields[6], "cell")?;

        if file >= file_count {
            return Err(lines.error(format!(
                "GOP references file {file}, but the index lists only {file_count} files",
            )));
        }

        let flags = parse_flag_run(lines, fields[7])?;

        let gop_index = gops.len();
        for offset in 0..flags.len() {
            frames.push(FrameEntry {
                gop: gop_index,
                offset,
            });
        }

        gops.push(GopEntry {
            info,
            matrix,
            file,
            pos,
            skip,
            vob,
            cell,
            flags,
        });
    }

    Ok((gops, frames))
}

fn parse_decimal<T: std::str::FromStr>(
    lines: &Lines<'_>,
    token: &str,
    what: &str,
) -> Result<T, D2vError> {
    token
        .parse()
        .map_err(|_| lines.error(format!("invalid GOP {what} field {token:?}")))
}

/// Decode a contiguous run of two-hex-digit flag bytes, stripping the
/// trailing `ff` sentinel (which does not count as a coded frame).
fn parse_flag_run(lines: &Lines<'_>, run: &str) -> Result<Vec<u8>, D2vError> {
    if run.len() < 2 || run.len() % 2 != 0 {
        return Err(lines.error(format!("invalid flag run {run:?}")));
    }

    let mut bytes = Vec::with_capacity(run.len() / 2 - 1);
    for pair in 0..run.len() / 2 {
        let byte = u8::from_str_radix(&run[pair * 2..pair * 2 + 2], 16)
            .map_err(|_| lines.error(format!("invalid flag byte in run {run:?}")))?;
        bytes.push(byte);
    }

    match bytes.pop() {
        Some(0xff) if bytes.is_empty() => {
            Err(lines.error(format!("flag run {run:?} has no coded frames")))
        }
        Some(0xff) => Ok(bytes),
        _ => Err(lines.error(format!("flag run {run:?} is missing the ff sentinel"))),
    }
}
