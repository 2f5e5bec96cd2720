//! Integration test: streams attached to `/bin/sh -c` children.
//!
//! Covers data delivery in both pipe directions across several buffer
//! capacities, and exit-status propagation through close.
//!
//! Run: cargo test -p sostdio-core --test popen_test

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use sostdio_core::{PipeDirection, ProcessStream, StdioConfig, StdioError};

static SEQ: AtomicUsize = AtomicUsize::new(0);

fn temp_path(prefix: &str) -> PathBuf {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("sostdio-{prefix}-{}-{n}", std::process::id()))
}

fn expected_seq(upto: usize) -> Vec<u8> {
    (1..=upto).map(|i| format!("{i}\n")).collect::<String>().into_bytes()
}

#[test]
fn write_direction_feeds_child_stdin() {
    for cap in [1, 5, 4096] {
        let path = temp_path("popen-w");
        let cfg = StdioConfig::with_capacity(cap);
        let command = format!("cat > '{}'", path.display());
        let data: Vec<u8> = (0..3 * 4096 + 11).map(|i| b'a' + (i % 26) as u8).collect();

        let mut p = ProcessStream::popen_with(&command, "w", &cfg).unwrap();
        assert_eq!(p.direction(), PipeDirection::Write);
        assert!(p.pid() > 0);
        assert_eq!(p.write(&data, 1, data.len()), data.len());
        p.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), data, "capacity {cap}");
        std::fs::remove_file(&path).unwrap();
    }
}

#[test]
fn read_direction_collects_child_stdout() {
    for cap in [1, 7, 4096] {
        let cfg = StdioConfig::with_capacity(cap);
        let mut p = ProcessStream::popen_with("seq 1 2000", "r", &cfg).unwrap();
        let got: Vec<u8> = std::iter::from_fn(|| p.getc()).collect();
        assert_eq!(got, expected_seq(2000), "capacity {cap}");
        assert!(p.is_eof());
        assert!(!p.is_error());
        p.close().unwrap();
    }
}

#[test]
fn block_read_from_child() {
    let mut p = ProcessStream::popen("printf 'abcdefgh'", "r").unwrap();
    let mut dst = [0u8; 12];
    assert_eq!(p.read(&mut dst, 4, 3), 2);
    assert_eq!(&dst[..8], b"abcdefgh");
    assert_eq!(p.tell(), 12);
    p.close().unwrap();
}

#[test]
fn non_zero_exit_after_clean_io_fails_close() {
    let mut p = ProcessStream::popen("cat > /dev/null; exit 3", "w").unwrap();
    p.write(b"ignored", 1, 7);
    assert_eq!(p.close(), Err(StdioError::Close));
}

#[test]
fn killed_child_fails_close() {
    let p = ProcessStream::popen("kill -9 $$", "r").unwrap();
    let status = p.close_with_status().unwrap();
    assert!(status.signaled());
    assert_eq!(status.term_signal(), Some(libc::SIGKILL));
    assert!(!status.success());
}

#[test]
fn child_sees_end_of_input_on_close() {
    // Hangs if a stray copy of the write end survives in the child.
    let mut p = ProcessStream::popen("wc -c > /dev/null", "w").unwrap();
    p.write(b"12345", 1, 5);
    p.close().unwrap();
}

#[test]
fn many_children_in_sequence() {
    for i in 0..64 {
        let mut p = ProcessStream::popen(format!("echo {i}"), "r").unwrap();
        let got: Vec<u8> = std::iter::from_fn(|| p.getc()).collect();
        assert_eq!(got, format!("{i}\n").into_bytes());
        p.close().unwrap();
    }
}

#[test]
fn dropping_unclosed_process_stream_reaps_child() {
    let path = temp_path("popen-drop");
    {
        let mut p = ProcessStream::popen(format!("cat > '{}'", path.display()), "w").unwrap();
        p.write(b"dropped", 1, 7);
    }
    // Drop waited for the child, so the file is complete.
    assert_eq!(std::fs::read(&path).unwrap(), b"dropped");
    std::fs::remove_file(&path).unwrap();
}
