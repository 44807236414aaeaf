//! Purpose: Process-wide, exactly-once loading of a resident resource (the native library).
//! Exports: `Loader`.
//! Role: Backs the library fallback path taken when native symbols are not already linked.
//! Invariants: The loaded flag moves false -> true at most once and is never reset.
//! Invariants: The load routine runs under the loader lock; the fast path takes no lock.
//! Invariants: A failed load leaves the flag false and propagates the error to its caller.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::core::error::{Error, ErrorKind};

pub struct Loader<T> {
    loaded: AtomicBool,
    lock: Mutex<()>,
    resident: OnceLock<T>,
}

impl<T> Loader<T> {
    pub const fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            lock: Mutex::new(()),
            resident: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Returns the resident value if a load has completed.
    pub fn get(&self) -> Option<&T> {
        if self.is_loaded() {
            self.resident.get()
        } else {
            None
        }
    }

    /// Runs `load` unless a previous call already succeeded, then returns the resident value.
    ///
    /// Concurrent callers block on the loader lock while one of them runs `load`; the rest
    /// observe the flag on re-check and return without loading again.
    pub fn load<F>(&self, load: F) -> Result<&T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if self.is_loaded() {
            return self.resident();
        }

        // The guarded data is `()`, so a panic inside a previous load leaves nothing torn.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.loaded.load(Ordering::Acquire) {
            let value = load()?;
            if self.resident.set(value).is_err() {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message("loader slot filled outside the loader lock"));
            }
            self.loaded.store(true, Ordering::Release);
        }
        self.resident()
    }

    fn resident(&self) -> Result<&T, Error> {
        self.resident.get().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("loaded flag set without a resident value")
        })
    }
}

impl<T> Default for Loader<T> {
    fn default() -> Self {
        Self::new()
    }
}
