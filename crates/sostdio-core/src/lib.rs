//! # sostdio-core
//!
//! Buffered stream I/O over raw file descriptors.
//!
//! A [`stdio::StdioStream`] wraps a descriptor with one fixed-capacity buffer
//! that serves either as read-ahead or as write-behind staging, and tracks a
//! caller-visible logical offset plus sticky end-of-file/error conditions.
//! A [`stdio::ProcessStream`] is the same engine attached to one end of a
//! pipe whose other end is the standard input or output of a `/bin/sh -c`
//! child.
//!
//! Only the [`syscall`] veneer contains `unsafe` code; everything above it is
//! safe Rust.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod process;
pub mod stdio;
pub mod syscall;

pub use config::{BUFF_SIZE, StdioConfig};
pub use error::{StdioError, StdioResult};
pub use stdio::{Condition, LastOp, OpenMode, PipeDirection, ProcessStream, StdioStream, Whence};
