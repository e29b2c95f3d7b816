//! Benchmarks for index parsing and field-schedule construction.
//!
//! Run with: cargo bench

use std::{fmt::Write as _, fs};

use criterion::Criterion;
use d2vserve::{Index, build_field_schedule};

/// Write a synthetic index with `gops` GOPs of `frames_per_gop` frames each
/// (a telecine-style flag pattern) plus its referenced media file.
fn synthetic_index(dir: &tempfile::TempDir, gops: usize, frames_per_gop: usize) -> Index {
    fs::write(dir.path().join("media.m2v"), vec![0u8; 64 * 1024]).unwrap();

    let mut text = String::from(
        "DGIndexProjectFile16\n1\nmedia.m2v\n\n\
         Stream_Type=0\nMPEG_Type=2\niDCT_Algorithm=5\nYUVRGB_Scale=1\n\
         Picture_Size=720x480\nFrame_Rate=29970 (30000/1001)\n\n",
    );
    for i in 0..gops {
        write!(text, "400 0 0 {} 0 0 0 ", i * 2048).unwrap();
        for f in 0..frames_per_gop {
            // Alternate RFF/TFF the way 3:2 pulldown does.
            let flags = if f % 2 == 0 { 0x01 } else { 0x02 };
            write!(text, "{flags:02x}").unwrap();
        }
        text.push_str("ff\n");
    }
    text.push_str("\nFINISHED 100.00% VIDEO\n");

    let path = dir.path().join("bench.d2v");
    fs::write(&path, text).unwrap();
    Index::open(path).unwrap()
}

fn benchmark_index_parsing(criterion: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("media.m2v"), vec![0u8; 64 * 1024]).unwrap();
    // Build once so the bench only measures Index::open.
    synthetic_index(&dir, 2000, 15);
    let path = dir.path().join("bench.d2v");

    criterion.bench_function("parse 2000-GOP index", |bencher| {
        bencher.iter(|| {
            let index = Index::open(&path).unwrap();
            assert_eq!(index.gops.len(), 2000);
        });
    });
}

fn benchmark_schedule_build(criterion: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = synthetic_index(&dir, 2000, 15);

    criterion.bench_function("build field schedule for 30000 frames", |bencher| {
        bencher.iter(|| {
            let schedule = build_field_schedule(&index);
            assert!(schedule.len() >= index.total_frames() * 2);
        });
    });
}

criterion::criterion_group!(benches, benchmark_index_parsing, benchmark_schedule_build);
criterion::criterion_main!(benches);
