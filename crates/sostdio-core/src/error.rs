//! Error taxonomy for stream operations.
//!
//! Open failures, hard I/O failures and close failures each get a variant.
//! End of stream is not an error: it surfaces as `None` from
//! [`crate::StdioStream::getc`], a short count from the block operations,
//! and the sticky [`crate::Condition::Eof`].

use thiserror::Error;

/// Result alias for stream operations.
pub type StdioResult<T> = Result<T, StdioError>;

/// Errors raised by stream operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StdioError {
    /// The mode (or pipe direction) token is not one of the recognized strings.
    #[error("unrecognized mode token {0:?}")]
    InvalidMode(String),
    /// `open(2)` failed, or the path could not be passed to it.
    #[error("open failed (errno {0})")]
    Open(i32),
    /// Creating the pipe or forking the child failed.
    #[error("process spawn failed (errno {0})")]
    Spawn(i32),
    /// A write-back reported a hard failure.
    #[error("I/O error (errno {0})")]
    Io(i32),
    /// Repositioning the descriptor failed.
    #[error("seek failed (errno {0})")]
    Seek(i32),
    /// Flush, descriptor close, or child reaping failed during close.
    #[error("close failed")]
    Close,
}

impl StdioError {
    /// The errno value the C boundary should publish for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            StdioError::InvalidMode(_) => libc::EINVAL,
            StdioError::Open(e) | StdioError::Spawn(e) | StdioError::Io(e) | StdioError::Seek(e) => {
                *e
            }
            StdioError::Close => libc::EIO,
        }
    }

    /// True for the failures that belong to the open family.
    #[must_use]
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            StdioError::InvalidMode(_) | StdioError::Open(_) | StdioError::Spawn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(StdioError::InvalidMode("q".into()).errno(), libc::EINVAL);
        assert_eq!(StdioError::Open(libc::ENOENT).errno(), libc::ENOENT);
        assert_eq!(StdioError::Io(libc::EBADF).errno(), libc::EBADF);
        assert_eq!(StdioError::Close.errno(), libc::EIO);
    }

    #[test]
    fn open_family_classification() {
        assert!(StdioError::InvalidMode("rw".into()).is_open_error());
        assert!(StdioError::Spawn(libc::EAGAIN).is_open_error());
        assert!(!StdioError::Seek(libc::ESPIPE).is_open_error());
        assert!(!StdioError::Close.is_open_error());
    }

    #[test]
    fn display_mentions_token() {
        let msg = StdioError::InvalidMode("rw".into()).to_string();
        assert!(msg.contains("\"rw\""), "{msg}");
    }
}
