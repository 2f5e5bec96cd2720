//! ABI layer for the `so_stdio.h` functions.
//!
//! Stream management (`so_fopen`/`so_fclose`), byte and block I/O
//! (`so_fgetc`/`so_fputc`/`so_fread`/`so_fwrite`), positioning
//! (`so_fseek`/`so_ftell`), status (`so_feof`/`so_ferror`/`so_fileno`),
//! `so_fflush`, and process streams (`so_popen`/`so_pclose`).
//!
//! Architecture: a global registry maps opaque `SO_FILE*` addresses to
//! per-stream slots. A lookup clones the slot out of the registry and locks
//! only that stream, so a blocking read on one stream never stalls another.
//! Closing takes the handle out of its slot; a racing call on the same
//! handle then sees an empty slot and fails with `EBADF`.

use std::collections::HashMap;
use std::ffi::{CStr, OsStr, c_char, c_int, c_long, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use sostdio_core::stdio::{OpenMode, PipeDirection, ProcessStream, StdioStream, Whence};
use sostdio_core::{StdioConfig, StdioError, StdioResult};

/// End-of-stream / failure sentinel, disjoint from every byte value.
pub const SO_EOF: c_int = -1;

/// Opaque stream handle handed to C callers.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct SO_FILE {
    _opaque: [u8; 0],
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() = val };
}

fn fail_null(err: StdioError) -> *mut SO_FILE {
    set_abi_errno(err.errno());
    std::ptr::null_mut()
}

fn status_code(result: StdioResult<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            set_abi_errno(err.errno());
            SO_EOF
        }
    }
}

// ---------------------------------------------------------------------------
// Stream registry
// ---------------------------------------------------------------------------

/// What an `SO_FILE*` refers to.
enum Handle {
    File(StdioStream),
    Process(ProcessStream),
}

impl Handle {
    fn stream(&mut self) -> &mut StdioStream {
        match self {
            Handle::File(s) => s,
            Handle::Process(p) => &mut **p,
        }
    }

    /// Close-family teardown. A process handle is also reaped.
    fn close(self) -> StdioResult<()> {
        match self {
            Handle::File(s) => s.close(),
            Handle::Process(p) => p.close(),
        }
    }
}

type Slot = Arc<Mutex<Option<Handle>>>;

/// First handle address. Far from null and from small integers a caller
/// might pass by mistake.
const STREAM_ID_BASE: usize = 0x5000_0000;
const STREAM_ID_STRIDE: usize = 16;

static NEXT_STREAM_ID: AtomicUsize = AtomicUsize::new(STREAM_ID_BASE);

struct StreamRegistry {
    streams: HashMap<usize, Slot>,
}

fn registry() -> &'static Mutex<StreamRegistry> {
    static REG: OnceLock<Mutex<StreamRegistry>> = OnceLock::new();
    REG.get_or_init(|| {
        Mutex::new(StreamRegistry {
            streams: HashMap::new(),
        })
    })
}

fn register(handle: Handle) -> *mut SO_FILE {
    let id = NEXT_STREAM_ID.fetch_add(STREAM_ID_STRIDE, Ordering::Relaxed);
    registry()
        .lock()
        .streams
        .insert(id, Arc::new(Mutex::new(Some(handle))));
    std::ptr::without_provenance_mut(id)
}

fn lookup(stream: *mut SO_FILE) -> Option<Slot> {
    if stream.is_null() {
        return None;
    }
    registry().lock().streams.get(&stream.addr()).cloned()
}

fn unregister(stream: *mut SO_FILE) -> Option<Handle> {
    if stream.is_null() {
        return None;
    }
    let slot = registry().lock().streams.remove(&stream.addr())?;
    slot.lock().take()
}

/// Run `f` on the stream behind `stream`, or return `on_bad` with `EBADF`.
fn with_stream<R>(stream: *mut SO_FILE, on_bad: R, f: impl FnOnce(&mut StdioStream) -> R) -> R {
    let Some(slot) = lookup(stream) else {
        set_abi_errno(libc::EBADF);
        return on_bad;
    };
    let mut guard = slot.lock();
    match guard.as_mut() {
        Some(handle) => f(handle.stream()),
        None => {
            set_abi_errno(libc::EBADF);
            on_bad
        }
    }
}

// ---------------------------------------------------------------------------
// so_fopen / so_fclose
// ---------------------------------------------------------------------------

/// Open `pathname` with one of the six mode tokens.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fopen(pathname: *const c_char, mode: *const c_char) -> *mut SO_FILE {
    if pathname.is_null() || mode.is_null() {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    }
    let path_bytes = unsafe { CStr::from_ptr(pathname) }.to_bytes();
    let mode_bytes = unsafe { CStr::from_ptr(mode) }.to_bytes();

    let Some(mode) = OpenMode::parse(mode_bytes) else {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    let path = Path::new(OsStr::from_bytes(path_bytes));
    match StdioStream::open_mode(path, mode, StdioConfig::global()) {
        Ok(s) => register(Handle::File(s)),
        Err(err) => fail_null(err),
    }
}

/// Flush, close and release. On a process stream this is a full `so_pclose`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fclose(stream: *mut SO_FILE) -> c_int {
    let Some(handle) = unregister(stream) else {
        set_abi_errno(libc::EBADF);
        return SO_EOF;
    };
    status_code(handle.close())
}

// ---------------------------------------------------------------------------
// Status and positioning
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fileno(stream: *mut SO_FILE) -> c_int {
    with_stream(stream, SO_EOF, |s| s.fileno())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fflush(stream: *mut SO_FILE) -> c_int {
    with_stream(stream, SO_EOF, |s| status_code(s.flush()))
}

/// Reposition; 0 on success, -1 with `errno` on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fseek(stream: *mut SO_FILE, offset: c_long, whence: c_int) -> c_int {
    let Some(whence) = Whence::from_posix(whence) else {
        set_abi_errno(libc::EINVAL);
        return -1;
    };
    with_stream(stream, -1, |s| match s.seek(i64::from(offset), whence) {
        Ok(_) => 0,
        Err(err) => {
            set_abi_errno(err.errno());
            -1
        }
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_ftell(stream: *mut SO_FILE) -> c_long {
    with_stream(stream, -1, |s| c_long::try_from(s.tell()).unwrap_or(c_long::MAX))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_feof(stream: *mut SO_FILE) -> c_int {
    with_stream(stream, 0, |s| c_int::from(s.is_eof()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_ferror(stream: *mut SO_FILE) -> c_int {
    with_stream(stream, 0, |s| c_int::from(s.is_error()))
}

// ---------------------------------------------------------------------------
// Byte and block I/O
// ---------------------------------------------------------------------------

/// Next byte as a non-negative int, or `SO_EOF`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fgetc(stream: *mut SO_FILE) -> c_int {
    with_stream(stream, SO_EOF, |s| s.getc().map_or(SO_EOF, c_int::from))
}

/// Stage the low byte of `c` and return it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fputc(c: c_int, stream: *mut SO_FILE) -> c_int {
    with_stream(stream, SO_EOF, |s| c_int::from(s.putc(c as u8)))
}

/// Byte length of a `size * nmemb` request, if it fits in one slice.
fn request_len(size: usize, nmemb: usize) -> Option<usize> {
    size.checked_mul(nmemb).filter(|&total| total <= isize::MAX as usize)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fread(
    ptr: *mut c_void,
    size: usize,
    nmemb: usize,
    stream: *mut SO_FILE,
) -> usize {
    if ptr.is_null() {
        set_abi_errno(libc::EINVAL);
        return 0;
    }
    let Some(total) = request_len(size, nmemb) else {
        set_abi_errno(libc::EINVAL);
        return 0;
    };
    with_stream(stream, 0, |s| {
        let dst = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), total) };
        s.read(dst, size, nmemb)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fwrite(
    ptr: *const c_void,
    size: usize,
    nmemb: usize,
    stream: *mut SO_FILE,
) -> usize {
    if ptr.is_null() {
        set_abi_errno(libc::EINVAL);
        return 0;
    }
    let Some(total) = request_len(size, nmemb) else {
        set_abi_errno(libc::EINVAL);
        return 0;
    };
    with_stream(stream, 0, |s| {
        let src = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), total) };
        s.write(src, size, nmemb)
    })
}

// ---------------------------------------------------------------------------
// so_popen / so_pclose
// ---------------------------------------------------------------------------

/// Run `command` under `/bin/sh -c`; `type` is `"r"` or `"w"`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_popen(command: *const c_char, r#type: *const c_char) -> *mut SO_FILE {
    if command.is_null() || r#type.is_null() {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    }
    let command = unsafe { CStr::from_ptr(command) }.to_bytes();
    let Some(direction) = PipeDirection::parse(unsafe { CStr::from_ptr(r#type) }.to_bytes()) else {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    match ProcessStream::spawn(command, direction, StdioConfig::global()) {
        Ok(p) => register(Handle::Process(p)),
        Err(err) => fail_null(err),
    }
}

/// Close a process stream and wait for its child.
///
/// Fails if the close or the wait failed, or the child did not exit with
/// status 0. A plain file stream is still closed, but the call fails with
/// `ECHILD` because there is no child to wait for.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_pclose(stream: *mut SO_FILE) -> c_int {
    match unregister(stream) {
        Some(Handle::Process(p)) => status_code(p.close()),
        Some(Handle::File(s)) => {
            let _ = s.close();
            set_abi_errno(libc::ECHILD);
            SO_EOF
        }
        None => {
            set_abi_errno(libc::EBADF);
            SO_EOF
        }
    }
}
