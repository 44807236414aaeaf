//! Purpose: `Engine` implementation over the native Vowpal Wabbit shim's C ABI.
//! Exports: `NativeEngine`, `NativeConfig`, `open_library`, `version`, `LIBRARY_ENV`.
//! Role: Resolves entry points from the running process first, then from a loaded library.
//! Invariants: The native library is loaded at most once per process and never unloaded.
//! Invariants: All FFI interaction is confined to this module + `sys`.
//! Invariants: Native error and buffer allocations are returned to the native allocator.
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::ptr;
use std::sync::OnceLock;

use libc::{c_char, c_float, c_int};
use libloading::Library;
use tracing::{debug, info};

use crate::core::engine::{Engine, Mode, RawHandle};
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::Loader;

pub mod sys;

/// Environment variable naming an explicit path to the native library.
pub const LIBRARY_ENV: &str = "VWGATE_LIB";

const DEFAULT_LIBRARY_NAME: &str = "vwgate";

static LIBRARY: Loader<Library> = Loader::new();
static SYMBOLS: OnceLock<Symbols> = OnceLock::new();

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NativeConfig {
    pub library_path: Option<PathBuf>,
}

impl NativeConfig {
    pub fn from_env() -> Self {
        let library_path = std::env::var_os(LIBRARY_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self { library_path }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Path handed to the OS loader: the explicit path, or the platform file name of `vwgate`.
    pub fn library_path(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(libloading::library_filename(DEFAULT_LIBRARY_NAME)))
    }
}

/// Opens the native library without touching the process-wide slot.
pub fn open_library(config: &NativeConfig) -> Result<Library, Error> {
    let path = config.library_path();
    info!(path = %path.display(), "loading native engine library");
    // SAFETY: loading runs the library's initializers; the shim has none beyond the C++ runtime.
    unsafe { Library::new(&path) }.map_err(|err| {
        Error::new(ErrorKind::Load)
            .with_message("failed to load native engine library")
            .with_path(path)
            .with_source(err)
    })
}

/// Version string of the native engine, loading the library if needed.
pub fn version() -> Result<String, Error> {
    NativeEngine::from_env().version()
}

#[derive(Clone, Debug, Default)]
pub struct NativeEngine {
    config: NativeConfig,
}

impl NativeEngine {
    pub fn new(config: NativeConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(NativeConfig::from_env())
    }

    pub fn config(&self) -> &NativeConfig {
        &self.config
    }

    pub fn version(&self) -> Result<String, Error> {
        let symbols = match symbols() {
            Err(err) if err.kind() == ErrorKind::Unlinked => {
                debug!(error = %err, "native symbols not linked; loading library");
                self.load()?;
                symbols()?
            }
            other => other?,
        };
        // SAFETY: `vwgate_version` takes no arguments and returns a static string or null.
        unsafe { decode_version((symbols.version)()) }
    }
}

impl Engine for NativeEngine {
    fn init(&self, command: &str) -> Result<RawHandle, Error> {
        let symbols = symbols()?;
        let command = c_string(command, "command")?;
        let mut err = ptr::null_mut();
        // SAFETY: `command` is NUL-terminated and outlives the call; `err` is a valid out slot.
        let handle = unsafe { (symbols.initialize)(command.as_ptr(), &mut err) };
        if handle.is_null() {
            return Err(native_error(
                symbols,
                err,
                ErrorKind::Init,
                "native initialization failed",
            ));
        }
        Ok(RawHandle::from_ptr(handle))
    }

    fn load(&self) -> Result<(), Error> {
        LIBRARY.load(|| open_library(&self.config)).map(|_| ())
    }

    unsafe fn run(&self, handle: RawHandle, example: &str, mode: Mode) -> Result<f32, Error> {
        let symbols = symbols()?;
        let example = c_string(example, "example")?;
        let mut prediction: c_float = 0.0;
        let mut err = ptr::null_mut();
        // SAFETY: the caller guarantees a live, exclusively held handle; the other pointers
        // are locals that outlive the call.
        let rc = unsafe {
            (symbols.run)(
                handle.as_ptr(),
                example.as_ptr(),
                c_int::from(mode.is_learn()),
                &mut prediction,
                &mut err,
            )
        };
        if rc != sys::VWGATE_OK {
            return Err(native_error(symbols, err, ErrorKind::Native, "native run failed"));
        }
        Ok(prediction)
    }

    unsafe fn query_topics(&self, handle: RawHandle, example: &str) -> Result<Vec<f32>, Error> {
        let symbols = symbols()?;
        let example = c_string(example, "example")?;
        let mut weights = sys::vwgate_floats {
            data: ptr::null_mut(),
            len: 0,
        };
        let mut err = ptr::null_mut();
        // SAFETY: as in `run`; `weights` is an empty buffer the native side fills.
        let rc = unsafe {
            (symbols.query_topics)(handle.as_ptr(), example.as_ptr(), &mut weights, &mut err)
        };
        if rc != sys::VWGATE_OK {
            return Err(native_error(
                symbols,
                err,
                ErrorKind::Native,
                "native topic query failed",
            ));
        }
        // SAFETY: on success the native side filled `weights` with its own allocation.
        Ok(unsafe { take_floats(symbols, &mut weights) })
    }

    unsafe fn release(&self, handle: RawHandle) -> Result<(), Error> {
        let symbols = symbols()?;
        let mut err = ptr::null_mut();
        // SAFETY: the caller guarantees a live, exclusively held handle released only once.
        let rc = unsafe { (symbols.release)(handle.as_ptr(), &mut err) };
        if rc != sys::VWGATE_OK {
            return Err(native_error(
                symbols,
                err,
                ErrorKind::Native,
                "native release failed",
            ));
        }
        Ok(())
    }
}

struct Symbols {
    initialize: sys::InitializeFn,
    run: sys::RunFn,
    query_topics: sys::QueryTopicsFn,
    release: sys::ReleaseFn,
    version: sys::VersionFn,
    floats_free: sys::FloatsFreeFn,
    error_free: sys::ErrorFreeFn,
    _process: Option<Library>,
}

impl Symbols {
    fn resolve(library: &Library) -> Result<Self, Error> {
        Ok(Self {
            initialize: lookup(library, sys::SYM_INITIALIZE)?,
            run: lookup(library, sys::SYM_RUN)?,
            query_topics: lookup(library, sys::SYM_QUERY_TOPICS)?,
            release: lookup(library, sys::SYM_RELEASE)?,
            version: lookup(library, sys::SYM_VERSION)?,
            floats_free: lookup(library, sys::SYM_FLOATS_FREE)?,
            error_free: lookup(library, sys::SYM_ERROR_FREE)?,
            _process: None,
        })
    }

    fn from_process() -> Result<Self, Error> {
        let library = process_library()?;
        let mut symbols = Self::resolve(&library)?;
        symbols._process = Some(library);
        Ok(symbols)
    }
}

// Resident library symbols win; before any load, try the process image.
fn symbols() -> Result<&'static Symbols, Error> {
    if let Some(symbols) = SYMBOLS.get() {
        return Ok(symbols);
    }
    let resolved = match LIBRARY.get() {
        Some(library) => Symbols::resolve(library)?,
        None => Symbols::from_process()?,
    };
    Ok(SYMBOLS.get_or_init(|| resolved))
}

#[cfg(unix)]
fn process_library() -> Result<Library, Error> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn process_library() -> Result<Library, Error> {
    libloading::os::windows::Library::this()
        .map(Into::into)
        .map_err(|err| {
            Error::new(ErrorKind::Unlinked)
                .with_message("cannot open the process image")
                .with_source(err)
        })
}

fn lookup<T: Copy>(library: &Library, name: &[u8]) -> Result<T, Error> {
    // SAFETY: `T` is the `sys` signature for `name`; the library outlives the copied pointer
    // because resident libraries are never unloaded and process symbols keep their handle.
    let symbol = unsafe { library.get::<T>(name) }.map_err(|err| {
        Error::new(ErrorKind::Unlinked)
            .with_message(format!("unresolved native symbol `{}`", symbol_name(name)))
            .with_source(err)
    })?;
    Ok(*symbol)
}

fn symbol_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned()
}

fn c_string(value: &str, what: &str) -> Result<CString, Error> {
    CString::new(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{what} contains NUL"))
            .with_source(err)
    })
}

fn native_error(
    symbols: &Symbols,
    err: *mut sys::vwgate_error,
    kind: ErrorKind,
    context: &str,
) -> Error {
    if err.is_null() {
        return Error::new(kind).with_message(context);
    }
    // SAFETY: a non-null `err` points at a native-allocated `vwgate_error` whose message is
    // null or NUL-terminated.
    let (code, detail) = unsafe {
        let native = &*err;
        let detail = if native.message.is_null() {
            None
        } else {
            Some(CStr::from_ptr(native.message).to_string_lossy().into_owned())
        };
        (native.kind, detail)
    };
    // SAFETY: `err` came from the native side and is freed exactly once, after the last read.
    unsafe { (symbols.error_free)(err) };

    let label = native_kind_label(code);
    let message = match detail {
        Some(detail) if !detail.is_empty() => format!("{context} ({label}): {detail}"),
        _ => format!("{context} ({label})"),
    };
    Error::new(kind).with_message(message).with_native_code(code)
}

/// Copies a native float buffer and hands it back to the native allocator.
///
/// # Safety
/// `weights.data` must be null or point at `weights.len` floats allocated by the native side.
unsafe fn take_floats(symbols: &Symbols, weights: &mut sys::vwgate_floats) -> Vec<f32> {
    let out = if weights.data.is_null() || weights.len == 0 {
        Vec::new()
    } else {
        // SAFETY: guaranteed by the caller.
        unsafe { std::slice::from_raw_parts(weights.data, weights.len) }.to_vec()
    };
    // SAFETY: the buffer is native-owned and not read after this point.
    unsafe { (symbols.floats_free)(weights) };
    out
}

/// # Safety
/// `raw` must be null or a NUL-terminated string valid for the duration of the call.
unsafe fn decode_version(raw: *const c_char) -> Result<String, Error> {
    if raw.is_null() {
        return Err(Error::new(ErrorKind::Native).with_message("native engine reported no version"));
    }
    // SAFETY: non-null and NUL-terminated per the caller.
    Ok(unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned())
}

fn native_kind_label(code: i32) -> &'static str {
    match code {
        sys::VWGATE_ERR_OUT_OF_MEMORY => "out of memory",
        sys::VWGATE_ERR_INVALID_ARGUMENT => "invalid argument",
        sys::VWGATE_ERR_EXCEPTION => "engine exception",
        sys::VWGATE_ERR_UNKNOWN => "unknown",
        _ => "unrecognized",
    }
}
