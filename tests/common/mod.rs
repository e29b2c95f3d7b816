//! Shared fixtures: a synthetic index builder that goes through the real
//! parser, and a scripted demuxer adapter that decodes "frames" whose pixel
//! content encodes their frame number.

#![allow(dead_code)]

use std::{cell::RefCell, collections::HashMap, fmt::Write as _, fs, rc::Rc};

use tempfile::TempDir;

use d2vserve::{
    D2vError, DemuxerAdapter, FormatHint, Index, MultiFileStream, Picture, TrackInfo,
};

/// Luma size of mock pictures; chroma is 4:2:0 (2x2).
pub const MOCK_WIDTH: usize = 4;
pub const MOCK_HEIGHT: usize = 4;

/// Everything the synthetic index builder needs to know.
pub struct IndexLayout {
    /// `Stream_Type` header value (0 elementary, 1 program, 2 transport).
    pub stream_type: u8,
    /// Video PID written as `MPEG2_Transport_PID` when present.
    pub pid: Option<u16>,
    /// One `(info, frame flag bytes)` pair per GOP; GOP `i` gets byte
    /// position `i * 1000` in a single media file.
    pub gops: Vec<(u16, Vec<u8>)>,
}

/// Write a real index file plus its referenced media file and parse it.
/// The `TempDir` must outlive the returned `Index`.
pub fn build_index(layout: &IndexLayout) -> (TempDir, Index) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("media.m2v"), vec![0u8; 64 * 1024]).unwrap();

    let mut text = String::from("DGIndexProjectFile16\n1\nmedia.m2v\n\n");
    writeln!(text, "Stream_Type={}", layout.stream_type).unwrap();
    if let Some(pid) = layout.pid {
        writeln!(text, "MPEG2_Transport_PID={pid:x},0,0").unwrap();
    }
    text.push_str(
        "MPEG_Type=2\n\
         iDCT_Algorithm=5\n\
         YUVRGB_Scale=1\n\
         Picture_Size=320x240\n\
         Frame_Rate=23976 (24000/1001)\n\n",
    );
    for (i, (info, flags)) in layout.gops.iter().enumerate() {
        let mut run = String::new();
        for byte in flags {
            write!(run, "{byte:02x}").unwrap();
        }
        writeln!(text, "{info:x} 0 0 {} 0 0 0 {run}ff", i * 1000).unwrap();
    }
    text.push_str("\nFINISHED 100.00% VIDEO\n");

    let path = dir.path().join("test.d2v");
    fs::write(&path, text).unwrap();
    let index = Index::open(&path).unwrap();
    (dir, index)
}

/// Elementary-stream index with the given GOPs.
pub fn elementary_index(gops: &[(u16, &[u8])]) -> (TempDir, Index) {
    build_index(&IndexLayout {
        stream_type: 0,
        pid: None,
        gops: gops.iter().map(|(info, f)| (*info, f.to_vec())).collect(),
    })
}

/// Counters the tests assert on, shared with the adapter via `Rc`.
#[derive(Debug, Default)]
pub struct MockStats {
    /// `open_demuxer` calls, i.e. Seek-path entries that got that far.
    pub opens: usize,
    /// Completed `decode_pending` calls.
    pub decodes: usize,
    /// `drain_final_picture` calls.
    pub drains: usize,
    /// `flush_decoder` calls.
    pub flushes: usize,
    /// Stream origin observed by the most recent `open_demuxer`.
    pub last_origin: Option<(usize, u64)>,
    /// When set, the next `open_demuxer` fails with `D2vError::Open`.
    pub fail_open: bool,
}

/// A scripted adapter: each packet is one coded frame, numbered in canonical
/// order, and "decoding" produces a picture whose bytes encode that number.
pub struct MockAdapter {
    /// `(file, pos)` of each GOP mapped to its first canonical frame.
    origins: HashMap<(usize, u64), usize>,
    total_frames: usize,
    tracks: Vec<TrackInfo>,
    /// Track index every packet reports.
    packet_track: usize,
    open: bool,
    cursor: usize,
    pending: Option<usize>,
    produced: Option<usize>,
    stats: Rc<RefCell<MockStats>>,
}

impl MockAdapter {
    pub fn new(index: &Index) -> (Box<Self>, Rc<RefCell<MockStats>>) {
        Self::with_tracks(
            index,
            vec![TrackInfo {
                index: 0,
                id: 0,
                is_video: true,
            }],
            0,
        )
    }

    pub fn with_tracks(
        index: &Index,
        tracks: Vec<TrackInfo>,
        packet_track: usize,
    ) -> (Box<Self>, Rc<RefCell<MockStats>>) {
        let mut origins = HashMap::new();
        let mut first_frame = 0;
        for gop in &index.gops {
            origins.insert((gop.file, gop.pos), first_frame);
            first_frame += gop.flags.len();
        }
        let stats = Rc::new(RefCell::new(MockStats::default()));
        let adapter = Box::new(Self {
            origins,
            total_frames: index.total_frames(),
            tracks,
            packet_track,
            open: false,
            cursor: 0,
            pending: None,
            produced: None,
            stats: Rc::clone(&stats),
        });
        (adapter, stats)
    }

    /// The picture "decoding" frame `frame` yields: luma row `r` is filled
    /// with `frame * 16 + r`, chroma planes with distinct offsets, so tests
    /// can check both which frame a row came from and its parity.
    pub fn picture_for(frame: usize) -> Picture {
        let mut picture = Picture::new(MOCK_WIDTH, MOCK_HEIGHT, 1, 1);
        for plane in 0..3 {
            for row in 0..picture.plane_height(plane) {
                let value = (frame * 16 + plane * 4 + row) as u8;
                picture.row_mut(plane, row).fill(value);
            }
        }
        picture
    }
}

impl DemuxerAdapter for MockAdapter {
    fn open_demuxer(
        &mut self,
        stream: &mut MultiFileStream,
        _hint: FormatHint,
    ) -> Result<(), D2vError> {
        let mut stats = self.stats.borrow_mut();
        if stats.fail_open {
            return Err(D2vError::Open("injected open failure".to_string()));
        }
        let origin = stream.origin();
        stats.opens += 1;
        stats.last_origin = Some(origin);
        drop(stats);

        let first = *self
            .origins
            .get(&origin)
            .ok_or_else(|| D2vError::Open(format!("no GOP at origin {origin:?}")))?;
        self.cursor = first;
        self.pending = None;
        self.open = true;
        Ok(())
    }

    fn close_demuxer(&mut self) {
        self.open = false;
        self.pending = None;
    }

    fn probe_tracks(&mut self) -> Result<Vec<TrackInfo>, D2vError> {
        if !self.open {
            return Err(D2vError::Open("demuxer is not open".to_string()));
        }
        Ok(self.tracks.clone())
    }

    fn next_packet(&mut self) -> Result<Option<usize>, D2vError> {
        if !self.open {
            return Err(D2vError::Open("demuxer is not open".to_string()));
        }
        if self.cursor >= self.total_frames {
            self.pending = None;
            return Ok(None);
        }
        self.pending = Some(self.cursor);
        self.cursor += 1;
        Ok(Some(self.packet_track))
    }

    fn decode_pending(&mut self) -> Result<bool, D2vError> {
        let frame = self
            .pending
            .take()
            .ok_or_else(|| D2vError::VideoDecode("no packet is pending".to_string()))?;
        self.produced = Some(frame);
        self.stats.borrow_mut().decodes += 1;
        Ok(true)
    }

    fn drain_final_picture(&mut self) -> Result<(), D2vError> {
        self.stats.borrow_mut().drains += 1;
        match self.pending.take() {
            Some(frame) => {
                self.produced = Some(frame);
                Ok(())
            }
            None => Err(D2vError::VideoDecode(
                "decoder held no delayed picture at end of stream".to_string(),
            )),
        }
    }

    fn flush_decoder(&mut self) {
        self.stats.borrow_mut().flushes += 1;
        self.produced = None;
    }

    fn take_picture(&mut self) -> Result<Picture, D2vError> {
        self.produced
            .take()
            .map(Self::picture_for)
            .ok_or_else(|| D2vError::VideoDecode("no decoded picture is available".to_string()))
    }
}
