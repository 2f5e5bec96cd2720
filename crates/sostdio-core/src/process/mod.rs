//! Child processes attached to a pipe.
//!
//! [`spawn_piped`] creates a pipe, forks a `/bin/sh -c` child with one end on
//! its standard input or output, and hands the other end back together with
//! the child pid. [`wait_child`] blocks until that child terminates.
//! Together they are the whole process capability the stream layer needs: a
//! descriptor to buffer over and a handle to reap.

use crate::syscall::{self, ShellCommand};

/// Which side of the child the parent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    /// Parent reads the child's standard output (`"r"`).
    Read,
    /// Parent writes the child's standard input (`"w"`).
    Write,
}

impl PipeDirection {
    /// Parse a `popen` type token. Only `"r"` and `"w"` are recognized.
    #[must_use]
    pub fn parse(token: &[u8]) -> Option<PipeDirection> {
        match token {
            b"r" => Some(PipeDirection::Read),
            b"w" => Some(PipeDirection::Write),
            _ => None,
        }
    }

    /// The token this direction was parsed from.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            PipeDirection::Read => "r",
            PipeDirection::Write => "w",
        }
    }

    /// The child's standard stream that carries the pipe.
    #[must_use]
    pub fn child_stream(self) -> i32 {
        match self {
            PipeDirection::Read => libc::STDOUT_FILENO,
            PipeDirection::Write => libc::STDIN_FILENO,
        }
    }
}

/// Parent-side result of [`spawn_piped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeChild {
    /// Pipe end retained by the parent.
    pub fd: i32,
    /// Child process id.
    pub pid: i32,
}

/// Spawn `/bin/sh -c command` connected to the parent through one pipe.
///
/// Both pipe ends are created close-on-exec so the parent's end never leaks
/// into this or any later child. On error no descriptor is left open.
pub fn spawn_piped(command: &[u8], direction: PipeDirection) -> Result<PipeChild, i32> {
    let shell = ShellCommand::new(command)?;
    let [read_end, write_end] = syscall::sys_pipe2(libc::O_CLOEXEC)?;

    let (parent_end, child_end) = match direction {
        PipeDirection::Read => (read_end, write_end),
        PipeDirection::Write => (write_end, read_end),
    };

    let pid = match syscall::fork_exec_shell(&shell, child_end, parent_end, direction.child_stream())
    {
        Ok(pid) => pid,
        Err(e) => {
            let _ = syscall::sys_close(read_end);
            let _ = syscall::sys_close(write_end);
            return Err(e);
        }
    };

    // The child's end must go, or the reader never sees end of stream.
    let _ = syscall::sys_close(child_end);
    Ok(PipeChild {
        fd: parent_end,
        pid,
    })
}

/// Block until `pid` terminates. Interrupted waits are retried.
pub fn wait_child(pid: i32) -> Result<WaitStatus, i32> {
    loop {
        match syscall::sys_waitpid(pid, 0) {
            Ok((_, status)) => return Ok(WaitStatus(status)),
            Err(libc::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Wait-status decoding (glibc bit layout)
// ---------------------------------------------------------------------------

/// Raw status word reported by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus(pub i32);

impl WaitStatus {
    /// True if the child terminated through `exit`/`_exit`.
    #[must_use]
    pub const fn exited(self) -> bool {
        (self.0 & 0x7f) == 0
    }

    /// Exit code, when [`exited`](Self::exited).
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        if self.exited() {
            Some((self.0 >> 8) & 0xff)
        } else {
            None
        }
    }

    /// True if the child was killed by a signal.
    #[must_use]
    pub const fn signaled(self) -> bool {
        let low7 = self.0 & 0x7f;
        low7 != 0 && low7 != 0x7f
    }

    /// Terminating signal, when [`signaled`](Self::signaled).
    #[must_use]
    pub const fn term_signal(self) -> Option<i32> {
        if self.signaled() {
            Some(self.0 & 0x7f)
        } else {
            None
        }
    }

    /// A zero status word: normal exit with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.exit_code(), self.term_signal()) {
            (Some(code), _) => write!(f, "exit status {code}"),
            (None, Some(sig)) => write!(f, "killed by signal {sig}"),
            _ => write!(f, "raw status {:#x}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_exit_status_42() {
        // Normal exit(42) is encoded as (42 << 8) | 0.
        let status = WaitStatus(42 << 8);
        assert!(status.exited());
        assert_eq!(status.exit_code(), Some(42));
        assert!(!status.signaled());
        assert!(!status.success());
        assert_eq!(status.to_string(), "exit status 42");
    }

    #[test]
    fn killed_by_sigkill() {
        let status = WaitStatus(9);
        assert!(!status.exited());
        assert!(status.signaled());
        assert_eq!(status.term_signal(), Some(9));
        assert_eq!(status.exit_code(), None);
        assert_eq!(status.to_string(), "killed by signal 9");
    }

    #[test]
    fn zero_is_success() {
        assert!(WaitStatus(0).success());
        assert_eq!(WaitStatus(0).exit_code(), Some(0));
    }

    #[test]
    fn direction_tokens() {
        assert_eq!(PipeDirection::parse(b"r"), Some(PipeDirection::Read));
        assert_eq!(PipeDirection::parse(b"w"), Some(PipeDirection::Write));
        assert_eq!(PipeDirection::parse(b"rw"), None);
        assert_eq!(PipeDirection::parse(b""), None);
        assert_eq!(PipeDirection::Write.token(), "w");
        assert_eq!(PipeDirection::Read.child_stream(), libc::STDOUT_FILENO);
    }

    #[test]
    fn spawn_read_and_wait() {
        let child = spawn_piped(b"printf abc", PipeDirection::Read).unwrap();
        let mut buf = [0u8; 8];
        let mut got = Vec::new();
        loop {
            let n = syscall::sys_read(child.fd, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"abc");
        syscall::sys_close(child.fd).unwrap();
        assert!(wait_child(child.pid).unwrap().success());
    }

    #[test]
    fn wait_unknown_child_fails() {
        assert_eq!(wait_child(i32::MAX), Err(libc::ECHILD));
    }
}
