//! Process-backed streams.
//!
//! A `ProcessStream` is an ordinary [`StdioStream`] over one end of a pipe,
//! plus the pid of the `/bin/sh -c` child holding the other end. It derefs
//! to the stream for all byte, block and flush operations; only `close`
//! differs, because it must also reap the child.

use std::ops::{Deref, DerefMut};

use super::file::StdioStream;
use crate::config::StdioConfig;
use crate::error::{StdioError, StdioResult};
use crate::process::{self, PipeDirection, WaitStatus};

/// Stream connected to a child's standard input or output.
#[derive(Debug)]
pub struct ProcessStream {
    stream: StdioStream,
    pid: i32,
    direction: PipeDirection,
    reaped: bool,
}

impl ProcessStream {
    /// Run `command` under `/bin/sh -c`; `direction` is `"r"` or `"w"`.
    pub fn popen(command: impl AsRef<[u8]>, direction: &str) -> StdioResult<Self> {
        Self::popen_with(command, direction, StdioConfig::global())
    }

    /// [`popen`](Self::popen) with an explicit config.
    pub fn popen_with(
        command: impl AsRef<[u8]>,
        direction: &str,
        config: &StdioConfig,
    ) -> StdioResult<Self> {
        let Some(dir) = PipeDirection::parse(direction.as_bytes()) else {
            return Err(StdioError::InvalidMode(direction.to_string()));
        };
        Self::spawn(command.as_ref(), dir, config)
    }

    /// Spawn with an already-parsed direction.
    pub fn spawn(command: &[u8], direction: PipeDirection, config: &StdioConfig) -> StdioResult<Self> {
        if command.contains(&0) {
            return Err(StdioError::Open(libc::EINVAL));
        }
        let child = process::spawn_piped(command, direction).map_err(StdioError::Spawn)?;
        Ok(Self {
            stream: StdioStream::from_fd(child.fd, config),
            pid: child.pid,
            direction,
            reaped: false,
        })
    }

    /// Child process id.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn direction(&self) -> PipeDirection {
        self.direction
    }

    /// Close the stream, then block until the child terminates.
    ///
    /// Fails if the close failed, the wait failed, or the child's status is
    /// anything but a clean exit 0.
    pub fn close(mut self) -> StdioResult<()> {
        let closed = self.stream.release();
        let waited = self.reap();
        match (closed, waited) {
            (Ok(()), Ok(status)) if status.success() => Ok(()),
            _ => Err(StdioError::Close),
        }
    }

    /// Like [`close`](Self::close) but hands back the child's status.
    ///
    /// The outer error covers the close and the wait; a non-zero status is
    /// reported in the returned [`WaitStatus`] instead.
    pub fn close_with_status(mut self) -> StdioResult<WaitStatus> {
        let closed = self.stream.release();
        let status = self.reap().map_err(|_| StdioError::Close)?;
        closed.map(|()| status)
    }

    fn reap(&mut self) -> Result<WaitStatus, i32> {
        if self.reaped {
            return Err(libc::ECHILD);
        }
        self.reaped = true;
        process::wait_child(self.pid)
    }
}

impl Deref for ProcessStream {
    type Target = StdioStream;

    fn deref(&self) -> &StdioStream {
        &self.stream
    }
}

impl DerefMut for ProcessStream {
    fn deref_mut(&mut self) -> &mut StdioStream {
        &mut self.stream
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if !self.reaped {
            // Close first so a reading child sees end of input.
            let _ = self.stream.release();
            let _ = self.reap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_direction_collects_output() {
        let mut p = ProcessStream::popen("printf 'one\\ntwo'", "r").unwrap();
        assert_eq!(p.direction(), PipeDirection::Read);
        let got: Vec<u8> = std::iter::from_fn(|| p.getc()).collect();
        assert_eq!(got, b"one\ntwo");
        assert!(p.is_eof());
        assert!(p.close().is_ok());
    }

    #[test]
    fn bad_direction_is_rejected() {
        let err = ProcessStream::popen("true", "rw").unwrap_err();
        assert_eq!(err, StdioError::InvalidMode("rw".into()));
        assert!(err.is_open_error());
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = ProcessStream::popen(b"echo a\0b", "r").unwrap_err();
        assert_eq!(err, StdioError::Open(libc::EINVAL));
    }

    #[test]
    fn non_zero_exit_fails_close() {
        let p = ProcessStream::popen("exit 5", "r").unwrap();
        assert_eq!(p.close(), Err(StdioError::Close));
    }

    #[test]
    fn close_with_status_reports_exit_code() {
        let p = ProcessStream::popen("exit 7", "w").unwrap();
        let status = p.close_with_status().unwrap();
        assert_eq!(status.exit_code(), Some(7));
    }

    #[test]
    fn missing_command_exits_127() {
        let p = ProcessStream::popen("/nonexistent/sostdio-command 2>/dev/null", "r").unwrap();
        let status = p.close_with_status().unwrap();
        assert_eq!(status.exit_code(), Some(127));
    }
}
