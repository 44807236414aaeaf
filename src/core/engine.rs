//! Purpose: The seam between the gate and whatever engine sits behind it.
//! Exports: `Engine`, `RawHandle`, `Mode`.
//! Role: `NativeEngine` implements it over the C ABI; tests implement it with instrumented stubs.
//! Invariants: Handle-taking methods are `unsafe`: the handle must be live and calls serialized.
use crate::core::error::Error;

/// Opaque engine handle as returned by `Engine::init`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> usize {
        self.0
    }

    pub(crate) fn from_ptr(ptr: *mut libc::c_void) -> Self {
        Self(ptr as usize)
    }

    pub(crate) fn as_ptr(self) -> *mut libc::c_void {
        self.0 as *mut libc::c_void
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Predict,
    Learn,
}

impl Mode {
    pub fn is_learn(self) -> bool {
        matches!(self, Mode::Learn)
    }
}

/// A non-reentrant learning engine.
///
/// Implementations need not be internally synchronized for a given handle; the gate in
/// `Vw` guarantees that at most one handle-taking call per handle is in flight.
pub trait Engine: Send + Sync {
    /// Creates a new engine instance from a command line.
    ///
    /// Must fail with `ErrorKind::Unlinked` when the engine's entry points are not yet
    /// available in the process, so the caller can `load` and retry.
    fn init(&self, command: &str) -> Result<RawHandle, Error>;

    /// Makes the engine's entry points available process-wide. Called at most once per failed
    /// `init`; implementations dedupe concurrent callers.
    fn load(&self) -> Result<(), Error>;

    /// Runs one example in `mode` and returns the scalar prediction.
    ///
    /// # Safety
    /// `handle` must come from `init` on this engine, must not have been released, and no
    /// other call with the same handle may be in flight.
    unsafe fn run(&self, handle: RawHandle, example: &str, mode: Mode) -> Result<f32, Error>;

    /// Predicts the topic distribution of one example.
    ///
    /// # Safety
    /// Same contract as `run`.
    unsafe fn query_topics(&self, handle: RawHandle, example: &str) -> Result<Vec<f32>, Error>;

    /// Releases the engine instance.
    ///
    /// # Safety
    /// Same contract as `run`; the handle is invalid afterwards even if this returns an error.
    unsafe fn release(&self, handle: RawHandle) -> Result<(), Error>;
}
