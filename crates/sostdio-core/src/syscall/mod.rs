//! Typed syscall veneer.
//!
//! Thin wrappers over the descriptor, pipe and process syscalls used by the
//! stream engine. Every wrapper returns `Result<T, i32>` where the error is
//! the raw errno, so callers above this module never touch `unsafe` or
//! global `errno` state.
//!
//! The wrappers take slices and `CStr`s rather than raw pointers, which lets
//! them be safe functions: the only preconditions the kernel has are the
//! buffer bounds, and those come from the slice.

use std::ffi::{CStr, CString, c_char};

/// Shell used for process-backed streams.
pub const SHELL_PATH: &CStr = c"/bin/sh";

/// Exit status of a child whose `execv` failed.
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Errno of the most recent failed libc call on this thread.
#[inline]
fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// `read(fd, buf, buf.len())`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_read(fd: i32, buf: &mut [u8]) -> Result<usize, i32> {
    // SAFETY: the pointer/length pair comes from a live mutable slice.
    let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `write(fd, buf, buf.len())`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_write(fd: i32, buf: &[u8]) -> Result<usize, i32> {
    // SAFETY: the pointer/length pair comes from a live slice.
    let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `open(path, flags, mode)`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_open(path: &CStr, flags: i32, mode: u32) -> Result<i32, i32> {
    // SAFETY: `path` is NUL-terminated by construction of `CStr`.
    let fd = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 { Err(last_errno()) } else { Ok(fd) }
}

/// `close(fd)`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_close(fd: i32) -> Result<(), i32> {
    // SAFETY: close is defined for any integer; a bad fd yields EBADF.
    let rc = unsafe { libc::close(fd) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}

/// `lseek(fd, offset, whence)`; returns the resulting absolute offset.
#[inline]
#[allow(unsafe_code)]
pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> Result<i64, i32> {
    // SAFETY: lseek takes no pointers; bad arguments yield an errno.
    let rc = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as i64) }
}

/// `pipe2(flags)`; returns `[read_end, write_end]`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_pipe2(flags: i32) -> Result<[i32; 2], i32> {
    let mut fds = [-1i32; 2];
    // SAFETY: `fds` is a writable `[i32; 2]`.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), flags) };
    if rc < 0 { Err(last_errno()) } else { Ok(fds) }
}

/// `waitpid(pid, &status, options)`; returns `(pid, raw_status)`.
#[inline]
#[allow(unsafe_code)]
pub fn sys_waitpid(pid: i32, options: i32) -> Result<(i32, i32), i32> {
    let mut status = 0i32;
    // SAFETY: `status` is a valid out-pointer for the duration of the call.
    let rc = unsafe { libc::waitpid(pid, &mut status, options) };
    if rc < 0 {
        Err(last_errno())
    } else {
        Ok((rc, status))
    }
}

/// Pre-built `argv` for `/bin/sh -c <command>`.
///
/// Everything is allocated before `fork`, so the child only issues syscalls.
pub struct ShellCommand {
    storage: [CString; 3],
    argv: [*const c_char; 4],
}

impl ShellCommand {
    /// Build the argument vector. Fails with `EINVAL` on an interior NUL.
    pub fn new(command: &[u8]) -> Result<Self, i32> {
        let name = CString::new("sh").map_err(|_| libc::EINVAL)?;
        let flag = CString::new("-c").map_err(|_| libc::EINVAL)?;
        let body = CString::new(command).map_err(|_| libc::EINVAL)?;
        // Pointers target the CString heap buffers, which do not move with `Self`.
        let argv = [
            name.as_ptr(),
            flag.as_ptr(),
            body.as_ptr(),
            std::ptr::null(),
        ];
        Ok(Self {
            storage: [name, flag, body],
            argv,
        })
    }

    /// The command text passed after `-c`.
    #[must_use]
    pub fn command(&self) -> &CStr {
        &self.storage[2]
    }
}

impl std::fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellCommand")
            .field("command", &self.command())
            .finish()
    }
}

/// Fork a child that runs `shell` with `used_fd` placed on `target_fd`.
///
/// In the child: close `unused_fd`, move `used_fd` onto `target_fd`, exec the
/// shell, and `_exit(127)` if any of that fails. Both pipe ends are expected
/// to be close-on-exec; `dup2` clears the flag on `target_fd`, and when
/// `used_fd == target_fd` it is cleared explicitly.
///
/// Returns the child pid in the parent.
#[allow(unsafe_code)]
pub fn fork_exec_shell(
    shell: &ShellCommand,
    used_fd: i32,
    unused_fd: i32,
    target_fd: i32,
) -> Result<i32, i32> {
    // SAFETY: fork has no pointer arguments. The child below only performs
    // async-signal-safe calls on data prepared before the fork.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(last_errno());
    }
    if pid == 0 {
        // SAFETY: child side; argv points into `shell`, which the child's
        // copy of the address space still holds.
        unsafe {
            libc::close(unused_fd);
            let placed = if used_fd == target_fd {
                libc::fcntl(target_fd, libc::F_SETFD, 0)
            } else {
                libc::dup2(used_fd, target_fd)
            };
            if placed >= 0 {
                libc::execv(SHELL_PATH.as_ptr(), shell.argv.as_ptr());
            }
            libc::_exit(EXEC_FAILED_STATUS);
        }
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_read_write_roundtrip() {
        let [rd, wr] = sys_pipe2(libc::O_CLOEXEC).expect("pipe2 should succeed");

        let msg = b"hello veneer";
        assert_eq!(sys_write(wr, msg), Ok(msg.len()));

        let mut buf = [0u8; 32];
        assert_eq!(sys_read(rd, &mut buf), Ok(msg.len()));
        assert_eq!(&buf[..msg.len()], msg);

        assert!(sys_close(rd).is_ok());
        assert!(sys_close(wr).is_ok());
    }

    #[test]
    fn read_after_writer_closed_is_eof() {
        let [rd, wr] = sys_pipe2(libc::O_CLOEXEC).unwrap();
        sys_close(wr).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(sys_read(rd, &mut buf), Ok(0));
        sys_close(rd).unwrap();
    }

    #[test]
    fn close_bad_fd_returns_ebadf() {
        assert_eq!(sys_close(-1), Err(libc::EBADF));
    }

    #[test]
    fn lseek_bad_fd() {
        assert_eq!(sys_lseek(-1, 0, libc::SEEK_SET), Err(libc::EBADF));
    }

    #[test]
    fn lseek_on_pipe_is_espipe() {
        let [rd, wr] = sys_pipe2(libc::O_CLOEXEC).unwrap();
        assert_eq!(sys_lseek(rd, 0, libc::SEEK_CUR), Err(libc::ESPIPE));
        sys_close(rd).unwrap();
        sys_close(wr).unwrap();
    }

    #[test]
    fn open_and_close_dev_null() {
        let fd = sys_open(c"/dev/null", libc::O_RDONLY, 0).expect("open /dev/null");
        assert!(fd >= 0);
        assert!(sys_close(fd).is_ok());
    }

    #[test]
    fn open_missing_file_is_enoent() {
        let res = sys_open(c"/nonexistent/sostdio/veneer", libc::O_RDONLY, 0);
        assert_eq!(res, Err(libc::ENOENT));
    }

    #[test]
    fn shell_command_rejects_interior_nul() {
        assert_eq!(ShellCommand::new(b"echo a\0b").unwrap_err(), libc::EINVAL);
        let cmd = ShellCommand::new(b"true").unwrap();
        assert_eq!(cmd.command().to_bytes(), b"true");
    }

    #[test]
    fn fork_exec_exit_status_is_reported() {
        let [rd, wr] = sys_pipe2(libc::O_CLOEXEC).unwrap();
        let shell = ShellCommand::new(b"exit 3").unwrap();
        let pid = fork_exec_shell(&shell, wr, rd, libc::STDOUT_FILENO).unwrap();
        sys_close(wr).unwrap();
        let (reaped, status) = sys_waitpid(pid, 0).unwrap();
        assert_eq!(reaped, pid);
        assert_eq!((status >> 8) & 0xff, 3);
        sys_close(rd).unwrap();
    }
}
