//! Stream configuration.
//!
//! The buffer capacity is injected at construction instead of being a
//! hard-wired literal, so the engine can be exercised at several sizes.
//! `SOSTDIO_BUFSIZ` overrides the default for the process-wide config.

use std::sync::OnceLock;

/// Default buffer capacity in bytes.
pub const BUFF_SIZE: usize = 4096;

/// Permission bits for files created by the `w`/`w+`/`a`/`a+` modes.
pub const DEFAULT_CREATE_MODE: u32 = 0o644;

/// Environment variable read by [`StdioConfig::from_env`].
pub const BUFSIZE_ENV: &str = "SOSTDIO_BUFSIZ";

/// Upper bound accepted from the environment (16 MiB).
pub const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Per-stream configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioConfig {
    /// Buffer capacity in bytes (always at least 1).
    pub capacity: usize,
    /// Mode bits passed to `open(2)` when a file is created.
    pub create_mode: u32,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            capacity: BUFF_SIZE,
            create_mode: DEFAULT_CREATE_MODE,
        }
    }
}

impl StdioConfig {
    /// Default configuration with a different buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Self::default()
        }
    }

    /// Override the creation mode bits.
    #[must_use]
    pub fn create_mode(mut self, mode: u32) -> Self {
        self.create_mode = mode;
        self
    }

    /// Build a configuration from the environment.
    ///
    /// An absent or unparsable `SOSTDIO_BUFSIZ` keeps [`BUFF_SIZE`].
    #[must_use]
    pub fn from_env() -> Self {
        let capacity = std::env::var(BUFSIZE_ENV)
            .ok()
            .and_then(|raw| parse_capacity(&raw))
            .unwrap_or(BUFF_SIZE);
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Process-wide configuration, read from the environment once.
    pub fn global() -> &'static StdioConfig {
        static CONFIG: OnceLock<StdioConfig> = OnceLock::new();
        CONFIG.get_or_init(Self::from_env)
    }
}

/// Parse a capacity value (decimal, or hex with a `0x` prefix; `_` allowed).
///
/// Returns `None` for zero, for values above [`MAX_CAPACITY`], and for
/// anything that is not a number.
#[must_use]
pub fn parse_capacity(raw: &str) -> Option<usize> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
    let value = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => cleaned.parse::<usize>().ok()?,
    };
    (1..=MAX_CAPACITY).contains(&value).then_some(value)
}
