//! Conformance scenarios.
//!
//! Each [`Scenario`] drives the streams in `sostdio-core` through one
//! observable property and reports [`Evidence`] on success or the first
//! violated check on failure. Scenarios work only inside the scratch
//! directory they are given.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sostdio_core::stdio::BufferState;
use sostdio_core::{OpenMode, ProcessStream, StdioConfig, StdioError, StdioStream, Whence};

/// Open/close cycles per mode in [`Scenario::OpenCloseCycle`].
pub const OPEN_CLOSE_CYCLES: usize = 256;

/// Spread of descriptor numbers tolerated across those cycles.
pub const FD_JITTER: i32 = 64;

/// One conformance property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// Every mode opens and closes repeatedly without leaking a descriptor.
    OpenCloseCycle,
    /// `len` bytes written, closed, reopened and read back unchanged.
    RoundTrip { len: usize },
    /// A second flush performs no write.
    FlushIdempotent,
    /// End of stream stays set and never turns into an error.
    EofSticky,
    /// A short block read still advances the offset by the full request.
    ShortReadOffset,
    /// Seeking drops bytes read ahead from the old position.
    SeekDiscardsReadAhead,
    /// A write-direction process stream delivers everything to the child.
    ProcessWrite,
    /// A read-direction process stream returns the child's output.
    ProcessRead,
    /// Closing a process stream reports the child's exit status.
    ProcessExitStatus,
    /// Unrecognized mode tokens fail without side effects.
    InvalidMode,
}

/// What a passing scenario observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub detail: String,
    pub digest: Option<String>,
    pub bytes: u64,
    pub exit_code: Option<i32>,
}

impl Evidence {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }

    fn with_payload(mut self, payload: &[u8]) -> Self {
        self.digest = Some(sha256_hex(payload));
        self.bytes = payload.len() as u64;
        self
    }
}

/// Failure: the first check that did not hold, and the errno involved if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub errno: Option<i32>,
}

impl Violation {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errno: None,
        }
    }

    fn stdio(step: &str, err: StdioError) -> Self {
        Self {
            message: format!("{step}: {err}"),
            errno: Some(err.errno()),
        }
    }
}

pub type ScenarioOutcome = Result<Evidence, Violation>;

fn ensure(cond: bool, message: impl FnOnce() -> String) -> Result<(), Violation> {
    if cond {
        Ok(())
    } else {
        Err(Violation::new(message()))
    }
}

/// The standard suite for a buffer capacity.
///
/// Round trips cover 0, 1, cap-1, cap, cap+1 and 4*cap bytes.
#[must_use]
pub fn default_suite(capacity: usize) -> Vec<Scenario> {
    let cap = capacity.max(1);
    let mut lens = vec![0, 1, cap - 1, cap, cap + 1, 4 * cap];
    lens.sort_unstable();
    lens.dedup();

    let mut suite = vec![Scenario::OpenCloseCycle];
    suite.extend(lens.into_iter().map(|len| Scenario::RoundTrip { len }));
    suite.extend([
        Scenario::FlushIdempotent,
        Scenario::EofSticky,
        Scenario::ShortReadOffset,
        Scenario::SeekDiscardsReadAhead,
        Scenario::ProcessWrite,
        Scenario::ProcessRead,
        Scenario::ProcessExitStatus,
        Scenario::InvalidMode,
    ]);
    suite
}

impl Scenario {
    /// Stable name used in logs and reports.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Scenario::OpenCloseCycle => "open_close_cycle".into(),
            Scenario::RoundTrip { len } => format!("round_trip/{len}"),
            Scenario::FlushIdempotent => "flush_idempotent".into(),
            Scenario::EofSticky => "eof_sticky".into(),
            Scenario::ShortReadOffset => "short_read_offset".into(),
            Scenario::SeekDiscardsReadAhead => "seek_discards_read_ahead".into(),
            Scenario::ProcessWrite => "process_write".into(),
            Scenario::ProcessRead => "process_read".into(),
            Scenario::ProcessExitStatus => "process_exit_status".into(),
            Scenario::InvalidMode => "invalid_mode".into(),
        }
    }

    /// The C entry point whose contract the scenario checks.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Scenario::OpenCloseCycle => "so_fopen",
            Scenario::RoundTrip { .. } => "so_fwrite",
            Scenario::FlushIdempotent => "so_fflush",
            Scenario::EofSticky => "so_feof",
            Scenario::ShortReadOffset => "so_fread",
            Scenario::SeekDiscardsReadAhead => "so_fseek",
            Scenario::ProcessWrite | Scenario::ProcessRead => "so_popen",
            Scenario::ProcessExitStatus => "so_pclose",
            Scenario::InvalidMode => "so_fopen",
        }
    }

    /// Run inside `dir`, which must exist and be empty.
    pub fn run(&self, dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
        match *self {
            Scenario::OpenCloseCycle => open_close_cycle(dir, config),
            Scenario::RoundTrip { len } => round_trip(dir, config, len),
            Scenario::FlushIdempotent => flush_idempotent(dir, config),
            Scenario::EofSticky => eof_sticky(dir, config),
            Scenario::ShortReadOffset => short_read_offset(dir, config),
            Scenario::SeekDiscardsReadAhead => seek_discards_read_ahead(dir, config),
            Scenario::ProcessWrite => process_write(dir, config),
            Scenario::ProcessRead => process_read(config),
            Scenario::ProcessExitStatus => process_exit_status(config),
            Scenario::InvalidMode => invalid_mode(dir, config),
        }
    }
}

// ---------------------------------------------------------------------------
// File scenarios
// ---------------------------------------------------------------------------

fn open_close_cycle(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("cycle");
    std::fs::write(&path, b"seed").map_err(|e| Violation::new(format!("seed file: {e}")))?;

    // A leak pushes every later descriptor number up; other threads opening
    // files concurrently only cause small jitter.
    let mut lowest = i32::MAX;
    let mut highest = i32::MIN;
    for mode in OpenMode::ALL {
        for _ in 0..OPEN_CLOSE_CYCLES {
            let s = StdioStream::open_mode(&path, mode, config)
                .map_err(|e| Violation::stdio(&format!("open {:?}", mode.token()), e))?;
            lowest = lowest.min(s.fileno());
            highest = highest.max(s.fileno());
            s.close()
                .map_err(|e| Violation::stdio(&format!("close {:?}", mode.token()), e))?;
        }
    }
    ensure(highest - lowest <= FD_JITTER, || {
        format!("descriptors drifted from {lowest} to {highest}")
    })?;
    Ok(Evidence::new(format!(
        "{} modes x {OPEN_CLOSE_CYCLES} cycles, descriptors {lowest}..={highest}",
        OpenMode::ALL.len(),
    )))
}

/// Deterministic non-repeating-looking payload.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(131) ^ (i >> 7)) as u8)
        .collect()
}

fn round_trip(dir: &Path, config: &StdioConfig, len: usize) -> ScenarioOutcome {
    let path = dir.join("round_trip");
    let data = payload(len);

    let mut w = StdioStream::open_with(&path, "w", config).map_err(|e| Violation::stdio("open w", e))?;
    let (head, tail) = data.split_at(len / 2);
    for &b in head {
        w.putc(b);
    }
    let staged = w.write(tail, 1, tail.len());
    ensure(staged == tail.len(), || format!("write staged {staged} of {}", tail.len()))?;
    w.close().map_err(|e| Violation::stdio("close writer", e))?;

    let mut r = StdioStream::open_with(&path, "r", config).map_err(|e| Violation::stdio("open r", e))?;
    let mut back = vec![0u8; len];
    let got = r.read(&mut back, 1, len);
    ensure(got == len, || format!("read {got} of {len} bytes"))?;
    if let Some(at) = data.iter().zip(&back).position(|(a, b)| a != b) {
        return Err(Violation::new(format!("mismatch at byte {at}")));
    }
    ensure(r.getc().is_none() && r.is_eof(), || "no end of stream after payload".into())?;
    r.close().map_err(|e| Violation::stdio("close reader", e))?;

    Ok(Evidence::new(format!("{len} bytes at capacity {}", config.capacity)).with_payload(&back))
}

fn flush_idempotent(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("flush");
    let mut s = StdioStream::open_with(&path, "w", config).map_err(|e| Violation::stdio("open", e))?;
    s.write(b"xyz", 1, 3);
    s.flush().map_err(|e| Violation::stdio("first flush", e))?;
    let after_first = file_len(&path)?;
    s.flush().map_err(|e| Violation::stdio("second flush", e))?;
    let after_second = file_len(&path)?;
    ensure(s.buffer_state() == BufferState::Empty, || "buffer not empty after flush".into())?;
    ensure(after_first == 3 && after_second == 3, || {
        format!("file length {after_first} then {after_second}, expected 3 both times")
    })?;
    s.close().map_err(|e| Violation::stdio("close", e))?;
    Ok(Evidence::new("3 bytes committed once"))
}

fn eof_sticky(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("eof");
    std::fs::write(&path, b"ab").map_err(|e| Violation::new(format!("seed file: {e}")))?;
    let mut s = StdioStream::open_with(&path, "r", config).map_err(|e| Violation::stdio("open", e))?;
    let data: Vec<u8> = std::iter::from_fn(|| s.getc()).collect();
    ensure(data == b"ab", || format!("read {data:?}"))?;
    for attempt in 0..3 {
        ensure(s.getc().is_none(), || format!("byte after end (attempt {attempt})"))?;
        ensure(s.is_eof() && !s.is_error(), || {
            format!("condition {:?} after end (attempt {attempt})", s.condition())
        })?;
    }
    s.close().map_err(|e| Violation::stdio("close", e))?;
    Ok(Evidence::new("eof after 2 bytes, held for 3 more reads").with_payload(&data))
}

fn short_read_offset(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("short");
    std::fs::write(&path, b"abcde").map_err(|e| Violation::new(format!("seed file: {e}")))?;
    let mut s = StdioStream::open_with(&path, "r", config).map_err(|e| Violation::stdio("open", e))?;
    let mut dst = [0u8; 40];
    let elems = s.read(&mut dst, 4, 10);
    let offset = s.tell();
    ensure(elems == 1, || format!("{elems} elements, expected 1"))?;
    ensure(offset == 40, || format!("offset {offset}, expected 40"))?;
    ensure(&dst[..5] == b"abcde", || "payload bytes differ".into())?;
    s.close().map_err(|e| Violation::stdio("close", e))?;
    Ok(Evidence::new("10x4 from 5 bytes: 1 element, offset 40"))
}

fn seek_discards_read_ahead(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("seek");
    std::fs::write(&path, b"0123456789").map_err(|e| Violation::new(format!("seed file: {e}")))?;
    let mut s = StdioStream::open_with(&path, "r", config).map_err(|e| Violation::stdio("open", e))?;
    ensure(s.getc() == Some(b'0') && s.getc() == Some(b'1'), || "bad leading bytes".into())?;
    let pos = s.seek(7, Whence::Start).map_err(|e| Violation::stdio("seek", e))?;
    ensure(pos == 7 && s.tell() == 7, || format!("position {pos}, tell {}", s.tell()))?;
    let next = s.getc();
    ensure(next == Some(b'7'), || format!("read {next:?} after seek, expected '7'"))?;
    s.close().map_err(|e| Violation::stdio("close", e))?;
    Ok(Evidence::new("read '7' after seeking past buffered bytes"))
}

fn invalid_mode(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("never_created");
    for token in ["", "rw", "rb", "w++", "R"] {
        match StdioStream::open_with(&path, token, config) {
            Err(StdioError::InvalidMode(_)) => {}
            Err(other) => return Err(Violation::stdio(&format!("open {token:?}"), other)),
            Ok(_) => return Err(Violation::new(format!("mode {token:?} was accepted"))),
        }
    }
    ensure(!path.exists(), || "rejected open created the file".into())?;
    match ProcessStream::popen_with("true", "rw", config) {
        Err(StdioError::InvalidMode(_)) => {}
        Err(other) => return Err(Violation::stdio("popen \"rw\"", other)),
        Ok(_) => return Err(Violation::new("pipe direction \"rw\" was accepted")),
    }
    Ok(Evidence::new("5 mode tokens and 1 pipe direction rejected"))
}

fn file_len(path: &Path) -> Result<u64, Violation> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| Violation::new(format!("stat {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Process scenarios
// ---------------------------------------------------------------------------

fn process_write(dir: &Path, config: &StdioConfig) -> ScenarioOutcome {
    let path = dir.join("from_child");
    let data = payload(3 * config.capacity + 1);
    let command = format!("cat > '{}'", path.display());

    let mut p = ProcessStream::popen_with(&command, "w", config)
        .map_err(|e| Violation::stdio("popen", e))?;
    let staged = p.write(&data, 1, data.len());
    ensure(staged == data.len(), || format!("staged {staged} of {}", data.len()))?;
    p.close().map_err(|e| Violation::stdio("pclose", e))?;

    let written = std::fs::read(&path).map_err(|e| Violation::new(format!("read back: {e}")))?;
    ensure(written == data, || {
        format!("child wrote {} bytes, expected {}", written.len(), data.len())
    })?;
    Ok(Evidence::new(format!("{} bytes through cat", data.len())).with_payload(&written))
}

fn process_read(config: &StdioConfig) -> ScenarioOutcome {
    let expected: Vec<u8> = (1..=500)
        .map(|i| format!("{i}\n"))
        .collect::<String>()
        .into_bytes();
    let mut p = ProcessStream::popen_with("seq 1 500", "r", config)
        .map_err(|e| Violation::stdio("popen", e))?;
    let got: Vec<u8> = std::iter::from_fn(|| p.getc()).collect();
    ensure(p.is_eof(), || "no end of stream after child output".into())?;
    ensure(got == expected, || {
        format!("read {} bytes, expected {}", got.len(), expected.len())
    })?;
    p.close().map_err(|e| Violation::stdio("pclose", e))?;
    Ok(Evidence::new(format!("{} bytes from seq", got.len())).with_payload(&got))
}

fn process_exit_status(config: &StdioConfig) -> ScenarioOutcome {
    let p = ProcessStream::popen_with("exit 3", "r", config)
        .map_err(|e| Violation::stdio("popen", e))?;
    let status = p
        .close_with_status()
        .map_err(|e| Violation::stdio("pclose", e))?;
    ensure(status.exit_code() == Some(3), || format!("child status {status}"))?;

    let p = ProcessStream::popen_with("exit 3", "r", config)
        .map_err(|e| Violation::stdio("popen", e))?;
    ensure(p.close() == Err(StdioError::Close), || {
        "close succeeded for a failing child".into()
    })?;

    let p = ProcessStream::popen_with("exit 0", "r", config)
        .map_err(|e| Violation::stdio("popen", e))?;
    p.close().map_err(|e| Violation::stdio("pclose clean child", e))?;

    Ok(Evidence {
        exit_code: Some(3),
        ..Evidence::new("exit 3 fails close, exit 0 succeeds")
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex_lower(&Sha256::digest(data))
}
