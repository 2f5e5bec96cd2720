//! Standard I/O streams.
//!
//! Buffered byte and block I/O over file descriptors (`file`), the buffer
//! engine underneath it (`buffer`), and streams attached to a child process
//! through a pipe (`popen`).

pub mod buffer;
pub mod file;
pub mod popen;

pub use buffer::{BufferState, LastOp, StreamBuffer};
pub use file::{Condition, OpenMode, StdioStream, Whence};
pub use popen::ProcessStream;
pub use crate::process::PipeDirection;
