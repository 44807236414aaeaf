//! Purpose: One engine instance behind a per-instance call gate.
//! Exports: `Vw`.
//! Role: Owns the native handle; serializes predict/learn/close and dispatcher calls.
//! Invariants: The handle is reachable only through the gate mutex.
//! Invariants: The open flag is written only while the gate is held; once false it stays false.
//! Invariants: Construction retries init exactly once, and only after an `Unlinked` failure.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::core::engine::{Engine, Mode, RawHandle};
use crate::core::error::{Error, ErrorKind};
use crate::core::native::NativeEngine;
use crate::core::predictor::{MultiPredictor, Prediction};

/// A Vowpal Wabbit instance that is safe to share across threads.
///
/// Every call into the engine goes through one mutex per instance, so overlapping
/// `predict`, `learn`, `close`, and dispatcher calls are serialized. `close` must be called
/// (or the last reference dropped) to free the native memory.
pub struct Vw {
    ctx: Arc<Context>,
    command: String,
}

impl Vw {
    /// Opens an instance on the native engine, configured from the environment.
    ///
    /// `command` uses the engine's own command-line syntax and is passed through untouched.
    pub fn new(command: impl Into<String>) -> Result<Self, Error> {
        Self::with_engine(Arc::new(NativeEngine::from_env()), command)
    }

    pub fn with_engine(engine: Arc<dyn Engine>, command: impl Into<String>) -> Result<Self, Error> {
        let command = command.into();
        let handle = match engine.init(&command) {
            Err(err) if err.kind() == ErrorKind::Unlinked => {
                debug!(error = %err, "engine not linked into process; loading");
                engine.load()?;
                engine.init(&command)?
            }
            other => other?,
        };
        debug!(command = %command, "engine instance opened");
        Ok(Self {
            ctx: Arc::new(Context::new(engine, handle)),
            command,
        })
    }

    /// The command this instance was initialized with.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_open(&self) -> bool {
        self.ctx.open.load(Ordering::Acquire)
    }

    /// Runs prediction on one example.
    pub fn predict(&self, example: &str) -> Result<f32, Error> {
        self.ctx.run(example, Mode::Predict)
    }

    /// Learns from one example and returns the prediction made before the update.
    pub fn learn(&self, example: &str) -> Result<f32, Error> {
        self.ctx.run(example, Mode::Learn)
    }

    /// Releases the native instance. Later calls are no-ops; every other operation fails
    /// with `ErrorKind::Closed` afterwards.
    pub fn close(&self) -> Result<(), Error> {
        self.ctx.close()
    }

    /// Binds a dispatcher for `prediction` to this instance's gate and handle.
    pub fn multi_predictor<P: Prediction>(&self, prediction: P) -> MultiPredictor<P> {
        MultiPredictor::new(prediction, Arc::clone(&self.ctx))
    }
}

impl fmt::Debug for Vw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vw")
            .field("command", &self.command)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Gate, handle, and open flag shared by an instance and its dispatchers.
pub struct Context {
    engine: Arc<dyn Engine>,
    gate: Mutex<RawHandle>,
    open: AtomicBool,
}

impl Context {
    fn new(engine: Arc<dyn Engine>, handle: RawHandle) -> Self {
        Self {
            engine,
            gate: Mutex::new(handle),
            open: AtomicBool::new(true),
        }
    }

    /// Runs `call` with the handle while holding the gate, or fails if closed.
    pub(crate) fn with_handle<T, F>(&self, call: F) -> Result<T, Error>
    where
        F: FnOnce(&dyn Engine, RawHandle) -> Result<T, Error>,
    {
        let handle = self.lock()?;
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        call(self.engine.as_ref(), *handle)
    }

    pub(crate) fn run(&self, example: &str, mode: Mode) -> Result<f32, Error> {
        // SAFETY: the handle is live (open checked under the gate) and the gate is held.
        self.with_handle(|engine, handle| unsafe { engine.run(handle, example, mode) })
    }

    fn close(&self) -> Result<(), Error> {
        let handle = self.lock()?;
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("engine instance closed");
        // SAFETY: the open flag was true under the gate, so this is the only release.
        unsafe { self.engine.release(*handle) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RawHandle>, Error> {
        self.gate
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("instance gate poisoned"))
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !*self.open.get_mut() {
            return;
        }
        *self.open.get_mut() = false;
        let handle = match self.gate.get_mut() {
            Ok(handle) => *handle,
            Err(poisoned) => *poisoned.into_inner(),
        };
        // SAFETY: `&mut self` excludes every other caller and the handle was still open.
        if let Err(err) = unsafe { self.engine.release(handle) } {
            warn!(error = %err, "failed to release engine instance on drop");
        }
    }
}
