//! File stream state management.
//!
//! `StdioStream` is the safe Rust model of an `SO_FILE`: a descriptor, one
//! [`StreamBuffer`], a caller-visible logical offset and a sticky condition.
//! `getc` and `putc` are the only primitives that touch the buffer; the
//! block operations are loops over them.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::buffer::{BufferState, LastOp, StreamBuffer};
use crate::config::StdioConfig;
use crate::error::{StdioError, StdioResult};
use crate::syscall;

// ---------------------------------------------------------------------------
// Mode tokens
// ---------------------------------------------------------------------------

/// The six recognized `so_fopen` mode tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `r`
    Read,
    /// `r+`
    ReadWrite,
    /// `w`
    WriteTruncate,
    /// `w+`
    ReadWriteTruncate,
    /// `a`
    Append,
    /// `a+`
    AppendReadWrite,
}

impl OpenMode {
    /// Every mode, in token order.
    pub const ALL: [OpenMode; 6] = [
        OpenMode::Read,
        OpenMode::ReadWrite,
        OpenMode::WriteTruncate,
        OpenMode::ReadWriteTruncate,
        OpenMode::Append,
        OpenMode::AppendReadWrite,
    ];

    /// Parse a mode token. Anything but the six exact strings is rejected.
    #[must_use]
    pub fn parse(token: &[u8]) -> Option<OpenMode> {
        match token {
            b"r" => Some(OpenMode::Read),
            b"r+" => Some(OpenMode::ReadWrite),
            b"w" => Some(OpenMode::WriteTruncate),
            b"w+" => Some(OpenMode::ReadWriteTruncate),
            b"a" => Some(OpenMode::Append),
            b"a+" => Some(OpenMode::AppendReadWrite),
            _ => None,
        }
    }

    /// The token for this mode.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::WriteTruncate => "w",
            OpenMode::ReadWriteTruncate => "w+",
            OpenMode::Append => "a",
            OpenMode::AppendReadWrite => "a+",
        }
    }

    /// `open(2)` flags for this mode.
    #[must_use]
    pub fn oflags(self) -> i32 {
        match self {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::ReadWrite => libc::O_RDWR,
            OpenMode::WriteTruncate => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::ReadWriteTruncate => libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
            OpenMode::AppendReadWrite => libc::O_RDWR | libc::O_CREAT | libc::O_APPEND,
        }
    }

    /// Whether opening may create the file.
    #[must_use]
    pub fn creates(self) -> bool {
        self.oflags() & libc::O_CREAT != 0
    }
}

/// Origin for [`StdioStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// Convert from `SEEK_SET` / `SEEK_CUR` / `SEEK_END`.
    #[must_use]
    pub fn from_posix(whence: i32) -> Option<Whence> {
        match whence {
            libc::SEEK_SET => Some(Whence::Start),
            libc::SEEK_CUR => Some(Whence::Current),
            libc::SEEK_END => Some(Whence::End),
            _ => None,
        }
    }

    /// The matching `SEEK_*` constant.
    #[must_use]
    pub fn as_posix(self) -> i32 {
        match self {
            Whence::Start => libc::SEEK_SET,
            Whence::Current => libc::SEEK_CUR,
            Whence::End => libc::SEEK_END,
        }
    }
}

/// Sticky outcome of the last fill or write-back.
///
/// Set by a failed fill (`Eof` or `Error`, never both) or a failed flush
/// (`Error`). Cleared only by a successful fill or a successful seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    #[default]
    Clear,
    Eof,
    Error,
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// Buffered stream over an owned descriptor.
#[derive(Debug)]
pub struct StdioStream {
    /// Underlying descriptor; -1 once released.
    fd: i32,
    buffer: StreamBuffer,
    /// Logical position as seen by the caller.
    offset: i64,
    condition: Condition,
}

impl StdioStream {
    /// Open `path` with a mode token, using the process-wide config.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> StdioResult<Self> {
        Self::open_with(path, mode, StdioConfig::global())
    }

    /// Open `path` with a mode token and an explicit config.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: &str,
        config: &StdioConfig,
    ) -> StdioResult<Self> {
        let Some(mode) = OpenMode::parse(mode.as_bytes()) else {
            return Err(StdioError::InvalidMode(mode.to_string()));
        };
        Self::open_mode(path, mode, config)
    }

    /// Open `path` with an already-parsed mode.
    pub fn open_mode(
        path: impl AsRef<Path>,
        mode: OpenMode,
        config: &StdioConfig,
    ) -> StdioResult<Self> {
        let c_path = CString::new(path.as_ref().as_os_str().as_bytes())
            .map_err(|_| StdioError::Open(libc::EINVAL))?;
        let fd = syscall::sys_open(&c_path, mode.oflags(), config.create_mode)
            .map_err(StdioError::Open)?;
        Ok(Self::from_fd(fd, config))
    }

    /// Wrap a descriptor the caller hands over. The stream closes it.
    #[must_use]
    pub fn from_fd(fd: i32, config: &StdioConfig) -> Self {
        Self {
            fd,
            buffer: StreamBuffer::new(config.capacity),
            offset: 0,
            condition: Condition::Clear,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Underlying descriptor.
    pub fn fileno(&self) -> i32 {
        self.fd
    }

    /// True after a fill hit end of data.
    pub fn is_eof(&self) -> bool {
        self.condition == Condition::Eof
    }

    /// True after a fill or write-back hit a hard failure.
    pub fn is_error(&self) -> bool {
        self.condition == Condition::Error
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    /// Logical offset. Never re-queries the descriptor.
    pub fn tell(&self) -> i64 {
        self.offset
    }

    pub fn last_op(&self) -> LastOp {
        self.buffer.last_op()
    }

    pub fn buffer_state(&self) -> BufferState {
        self.buffer.state()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    // -----------------------------------------------------------------------
    // Byte primitives
    // -----------------------------------------------------------------------

    /// Next byte, or `None` at end of stream or on a read failure.
    ///
    /// Pending writes are flushed before the buffer switches to read-ahead.
    pub fn getc(&mut self) -> Option<u8> {
        if self.buffer.last_op() == LastOp::Write {
            let _ = self.flush();
        }
        if let Some(byte) = self.buffer.next_byte() {
            return Some(byte);
        }
        if !self.fill() {
            return None;
        }
        self.buffer.next_byte()
    }

    /// Stage one byte; a full buffer is flushed before returning.
    ///
    /// There is no failure signal: a failed implicit flush shows up as
    /// [`Condition::Error`].
    pub fn putc(&mut self, byte: u8) -> u8 {
        if self.buffer.last_op() == LastOp::Read {
            self.leave_read_mode();
        }
        if self.buffer.push(byte) {
            let _ = self.flush();
        }
        byte
    }

    // -----------------------------------------------------------------------
    // Block operations
    // -----------------------------------------------------------------------

    /// Read up to `count` elements of `elem_size` bytes into `dst`.
    ///
    /// Returns the number of complete elements copied. The logical offset
    /// advances by the requested `elem_size * count` even on a short read.
    pub fn read(&mut self, dst: &mut [u8], elem_size: usize, count: usize) -> usize {
        let requested = elem_size.saturating_mul(count);
        let limit = requested.min(dst.len());
        let mut copied = 0;
        while copied < limit {
            let Some(byte) = self.getc() else {
                break;
            };
            if self.condition != Condition::Clear {
                break;
            }
            dst[copied] = byte;
            copied += 1;
        }
        self.advance_offset(requested);
        copied.checked_div(elem_size).unwrap_or(0)
    }

    /// Write `count` elements of `elem_size` bytes from `src`.
    ///
    /// Returns the number of complete elements staged. The logical offset
    /// advances by the requested `elem_size * count`.
    pub fn write(&mut self, src: &[u8], elem_size: usize, count: usize) -> usize {
        let requested = elem_size.saturating_mul(count);
        let limit = requested.min(src.len());
        for &byte in &src[..limit] {
            self.putc(byte);
        }
        self.advance_offset(requested);
        limit.checked_div(elem_size).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Flush / seek / close
    // -----------------------------------------------------------------------

    /// Commit staged writes. A no-op unless the buffer is in write mode.
    ///
    /// The buffer is emptied on every outcome, including failure.
    pub fn flush(&mut self) -> StdioResult<()> {
        if self.buffer.last_op() != LastOp::Write {
            return Ok(());
        }
        let result = write_fully(self.fd, self.buffer.pending_write());
        self.buffer.reset();
        result.map_err(|errno| {
            self.condition = Condition::Error;
            StdioError::Io(errno)
        })
    }

    /// Flush, then reposition the descriptor.
    ///
    /// `Whence::Current` is relative to the descriptor position. On success
    /// the resulting absolute position becomes the logical offset, read-ahead
    /// is discarded and the condition is cleared.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> StdioResult<i64> {
        self.flush()?;
        // A failed reposition leaves read-ahead and offset untouched.
        let pos = syscall::sys_lseek(self.fd, offset, whence.as_posix())
            .map_err(StdioError::Seek)?;
        self.buffer.reset();
        self.offset = pos;
        self.condition = Condition::Clear;
        Ok(pos)
    }

    /// Flush, close the descriptor and release the stream.
    ///
    /// Fails if either step failed; the descriptor is released regardless.
    pub fn close(mut self) -> StdioResult<()> {
        self.release()
    }

    pub(crate) fn release(&mut self) -> StdioResult<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let flushed = self.flush();
        let closed = syscall::sys_close(self.fd);
        self.fd = -1;
        if flushed.is_ok() && closed.is_ok() {
            Ok(())
        } else {
            Err(StdioError::Close)
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// One bulk read into the buffer. Returns false at end of data or on error.
    fn fill(&mut self) -> bool {
        match syscall::sys_read(self.fd, self.buffer.fill_target()) {
            Ok(0) => {
                self.buffer.commit_fill(0);
                self.condition = Condition::Eof;
                false
            }
            Ok(n) => {
                self.buffer.commit_fill(n);
                self.condition = Condition::Clear;
                true
            }
            Err(_) => {
                self.buffer.commit_fill(0);
                self.condition = Condition::Error;
                false
            }
        }
    }

    /// Switch from read-ahead to writing at the logical read position.
    fn leave_read_mode(&mut self) {
        let unread = self.buffer.unread();
        if unread > 0 {
            // Pipes refuse with ESPIPE; their unread bytes are simply dropped.
            let _ = syscall::sys_lseek(self.fd, -(unread as i64), libc::SEEK_CUR);
        }
        self.buffer.reset();
    }

    fn advance_offset(&mut self, bytes: usize) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.offset = self.offset.saturating_add(bytes);
    }
}

impl Drop for StdioStream {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Write all of `pending`, continuing after partial writes.
///
/// Stops at the first failure. A write that makes no progress counts as a
/// failure (`EIO`).
fn write_fully(fd: i32, mut pending: &[u8]) -> Result<(), i32> {
    while !pending.is_empty() {
        match syscall::sys_write(fd, pending) {
            Ok(0) => return Err(libc::EIO),
            Ok(n) => pending = &pending[n..],
            Err(errno) => return Err(errno),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe_stream(capacity: usize) -> (StdioStream, i32) {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        (StdioStream::from_fd(rd, &StdioConfig::with_capacity(capacity)), wr)
    }

    #[test]
    fn parse_mode_tokens() {
        for mode in OpenMode::ALL {
            assert_eq!(OpenMode::parse(mode.token().as_bytes()), Some(mode));
        }
        assert_eq!(OpenMode::parse(b""), None);
        assert_eq!(OpenMode::parse(b"rb"), None);
        assert_eq!(OpenMode::parse(b"x"), None);
        assert_eq!(OpenMode::parse(b"r+ "), None);
    }

    #[test]
    fn oflags_match_modes() {
        assert_eq!(OpenMode::Read.oflags(), libc::O_RDONLY);
        assert_ne!(OpenMode::WriteTruncate.oflags() & libc::O_TRUNC, 0);
        assert_ne!(OpenMode::Append.oflags() & libc::O_APPEND, 0);
        assert_eq!(OpenMode::AppendReadWrite.oflags() & libc::O_ACCMODE, libc::O_RDWR);
        assert!(!OpenMode::ReadWrite.creates());
        assert!(OpenMode::ReadWriteTruncate.creates());
    }

    #[test]
    fn whence_roundtrip() {
        for w in [Whence::Start, Whence::Current, Whence::End] {
            assert_eq!(Whence::from_posix(w.as_posix()), Some(w));
        }
        assert_eq!(Whence::from_posix(42), None);
    }

    #[test]
    fn getc_reads_pipe_then_eof() {
        let (mut s, wr) = pipe_stream(4);
        syscall::sys_write(wr, b"abcdef").unwrap();
        syscall::sys_close(wr).unwrap();

        let got: Vec<u8> = std::iter::from_fn(|| s.getc()).collect();
        assert_eq!(got, b"abcdef");
        assert!(s.is_eof());
        assert!(!s.is_error());
        // Sticky: further reads keep reporting end of stream.
        assert_eq!(s.getc(), None);
        assert_eq!(s.condition(), Condition::Eof);
    }

    #[test]
    fn getc_on_write_only_descriptor_sets_error() {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        let mut s = StdioStream::from_fd(wr, &StdioConfig::default());
        assert_eq!(s.getc(), None);
        assert!(s.is_error());
        assert!(!s.is_eof());
        syscall::sys_close(rd).unwrap();
    }

    #[test]
    fn putc_flushes_when_full() {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        let mut s = StdioStream::from_fd(wr, &StdioConfig::with_capacity(3));
        s.putc(b'x');
        s.putc(b'y');
        assert_eq!(s.buffer_state(), BufferState::Writing { cursor: 2 });
        s.putc(b'z');
        assert_eq!(s.buffer_state(), BufferState::Empty);

        let mut buf = [0u8; 8];
        assert_eq!(syscall::sys_read(rd, &mut buf), Ok(3));
        assert_eq!(&buf[..3], b"xyz");
        syscall::sys_close(rd).unwrap();
    }

    #[test]
    fn flush_is_idempotent() {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        let mut s = StdioStream::from_fd(wr, &StdioConfig::default());
        s.write(b"hi", 1, 2);
        assert!(s.flush().is_ok());
        assert_eq!(s.last_op(), LastOp::None);
        assert!(s.flush().is_ok());
        drop(s);

        let mut buf = [0u8; 8];
        assert_eq!(syscall::sys_read(rd, &mut buf), Ok(2));
        assert_eq!(syscall::sys_read(rd, &mut buf), Ok(0));
        syscall::sys_close(rd).unwrap();
    }

    #[test]
    fn failed_flush_sets_error_and_drops_buffer() {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        let mut s = StdioStream::from_fd(rd, &StdioConfig::default());
        s.putc(b'q');
        assert_eq!(s.flush(), Err(StdioError::Io(libc::EBADF)));
        assert!(s.is_error());
        assert_eq!(s.buffer_state(), BufferState::Empty);
        syscall::sys_close(wr).unwrap();
    }

    #[test]
    fn block_read_counts_whole_elements() {
        let (mut s, wr) = pipe_stream(16);
        syscall::sys_write(wr, b"12345").unwrap();
        syscall::sys_close(wr).unwrap();

        let mut dst = [0u8; 40];
        assert_eq!(s.read(&mut dst, 4, 10), 1);
        assert_eq!(&dst[..5], b"12345");
        assert_eq!(s.tell(), 40);
        assert!(s.is_eof());
    }

    #[test]
    fn block_ops_with_zero_elem_size() {
        let (mut s, wr) = pipe_stream(16);
        let mut dst = [0u8; 4];
        assert_eq!(s.read(&mut dst, 0, 10), 0);
        assert_eq!(s.write(b"abc", 0, 3), 0);
        assert_eq!(s.tell(), 0);
        syscall::sys_close(wr).unwrap();
    }

    #[test]
    fn write_with_short_source_reports_short_count() {
        let [rd, wr] = syscall::sys_pipe2(libc::O_CLOEXEC).unwrap();
        let mut s = StdioStream::from_fd(wr, &StdioConfig::default());
        assert_eq!(s.write(b"abcdef", 4, 2), 1);
        assert_eq!(s.tell(), 8);
        drop(s);
        syscall::sys_close(rd).unwrap();
    }

    #[test]
    fn seek_on_pipe_fails_with_espipe() {
        let (mut s, wr) = pipe_stream(8);
        assert_eq!(s.seek(0, Whence::Start), Err(StdioError::Seek(libc::ESPIPE)));
        assert_eq!(s.tell(), 0);
        syscall::sys_close(wr).unwrap();
    }

    #[test]
    fn close_reports_bad_descriptor() {
        let s = StdioStream::from_fd(-1, &StdioConfig::default());
        // fd < 0 means already released: nothing to do.
        assert!(s.close().is_ok());

        // Far above any descriptor the test process holds.
        let s = StdioStream::from_fd(i32::MAX, &StdioConfig::default());
        assert_eq!(s.close(), Err(StdioError::Close));
    }
}
