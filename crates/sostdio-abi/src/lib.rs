// Every export takes raw pointers from C callers and validates them against
// the stream registry, so per-function safety docs would repeat one contract.
#![allow(clippy::missing_safety_doc)]
//! # sostdio-abi
//!
//! `extern "C"` boundary for sostdio.
//!
//! This crate produces a `cdylib` (`libso_stdio.so`) exporting the
//! `so_*` functions declared in `include/so_stdio.h`. Each entry point
//! resolves its opaque `SO_FILE*` through a registry, delegates to the safe
//! streams in `sostdio-core`, and translates the outcome into C return
//! conventions plus `errno`.
//!
//! ```text
//! C caller -> so_* entry (this crate) -> registry lookup -> core stream -> return
//! ```

pub mod stdio_abi;

pub use stdio_abi::{SO_EOF, SO_FILE};
