//! Integration test: environment-driven stream configuration.
//!
//! Kept in its own test binary with a single test so mutating the process
//! environment cannot race other tests.
//!
//! Run: cargo test -p sostdio-core --test config_env_test

use sostdio_core::config::{BUFF_SIZE, BUFSIZE_ENV, StdioConfig};

#[allow(unsafe_code)]
fn set_bufsiz(value: Option<&str>) {
    // SAFETY: the only test in this binary; no other thread reads the environment.
    unsafe {
        match value {
            Some(v) => std::env::set_var(BUFSIZE_ENV, v),
            None => std::env::remove_var(BUFSIZE_ENV),
        }
    }
}

#[test]
fn capacity_follows_environment_and_falls_back() {
    set_bufsiz(None);
    assert_eq!(StdioConfig::from_env().capacity, BUFF_SIZE);

    set_bufsiz(Some("512"));
    assert_eq!(StdioConfig::from_env().capacity, 512);

    set_bufsiz(Some("0x40"));
    assert_eq!(StdioConfig::from_env().capacity, 64);

    for bad in ["0", "huge", "-1", "99999999999"] {
        set_bufsiz(Some(bad));
        assert_eq!(StdioConfig::from_env().capacity, BUFF_SIZE, "value {bad:?}");
    }

    set_bufsiz(Some("128"));
    let global = StdioConfig::global();
    assert_eq!(global.capacity, 128);
    set_bufsiz(Some("256"));
    assert!(std::ptr::eq(global, StdioConfig::global()));
    assert_eq!(StdioConfig::global().capacity, 128);
}
