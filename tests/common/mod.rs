// Instrumented in-process engine for observing the gate from the outside.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use vwgate::api::{Engine, Error, ErrorKind, Loader, Mode, RawHandle};

#[derive(Default)]
struct StubModel {
    bias: f32,
    weights: HashMap<String, f32>,
}

impl StubModel {
    fn from_command(command: &str) -> Self {
        let mut tokens = command.split_whitespace();
        let mut bias = 0.0;
        while let Some(token) = tokens.next() {
            if token == "--bias" {
                bias = tokens.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
            }
        }
        Self {
            bias,
            weights: HashMap::new(),
        }
    }

    fn score(&self, features: &[(String, f32)]) -> f32 {
        self.bias
            + features
                .iter()
                .map(|(name, value)| self.weights.get(name).copied().unwrap_or(0.0) * value)
                .sum::<f32>()
    }
}

// "label | name:value name" -> (label, features)
fn parse_example(example: &str) -> (Option<f32>, Vec<(String, f32)>) {
    let (head, body) = example.split_once('|').unwrap_or(("", example));
    let label = head.split_whitespace().next().and_then(|v| v.parse().ok());
    let features = body
        .split_whitespace()
        .map(|token| match token.split_once(':') {
            Some((name, value)) => (name.to_string(), value.parse().unwrap_or(1.0)),
            None => (token.to_string(), 1.0),
        })
        .collect();
    (label, features)
}

pub struct StubEngine {
    linked: bool,
    fail_load: bool,
    call_delay: Duration,
    load_delay: Duration,
    loader: Loader<()>,
    loads: AtomicUsize,
    inits: AtomicUsize,
    calls: AtomicUsize,
    releases: AtomicUsize,
    stale_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_handle: AtomicUsize,
    models: Mutex<HashMap<RawHandle, StubModel>>,
}

impl StubEngine {
    /// Entry points already available; `load` is never needed.
    pub fn linked() -> Self {
        Self::build(true)
    }

    /// `init` fails with `Unlinked` until `load` succeeds.
    pub fn unlinked() -> Self {
        Self::build(false)
    }

    fn build(linked: bool) -> Self {
        Self {
            linked,
            fail_load: false,
            call_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            loader: Loader::new(),
            loads: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            stale_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            next_handle: AtomicUsize::new(0x1000),
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Handle-taking calls (run, query_topics, release) that reached the engine.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn stale_calls(&self) -> usize {
        self.stale_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.models.lock().expect("models").len()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            thread::sleep(self.call_delay);
        }
        InFlight { engine: self }
    }

    fn stale(&self, handle: RawHandle) -> Error {
        self.stale_calls.fetch_add(1, Ordering::SeqCst);
        Error::new(ErrorKind::Internal).with_message(format!("stale handle {:#x}", handle.into_raw()))
    }
}

struct InFlight<'a> {
    engine: &'a StubEngine,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.engine.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Engine for StubEngine {
    fn init(&self, command: &str) -> Result<RawHandle, Error> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if !self.linked && !self.loader.is_loaded() {
            return Err(Error::new(ErrorKind::Unlinked).with_message("stub entry points missing"));
        }
        if command.split_whitespace().any(|token| token == "--reject") {
            return Err(Error::new(ErrorKind::Init)
                .with_message("unrecognised option '--reject'")
                .with_native_code(2));
        }
        let handle = RawHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.models
            .lock()
            .expect("models")
            .insert(handle, StubModel::from_command(command));
        Ok(handle)
    }

    fn load(&self) -> Result<(), Error> {
        self.loader
            .load(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                if !self.load_delay.is_zero() {
                    thread::sleep(self.load_delay);
                }
                if self.fail_load {
                    return Err(Error::new(ErrorKind::Load).with_message("stub library missing"));
                }
                Ok(())
            })
            .map(|_| ())
    }

    unsafe fn run(&self, handle: RawHandle, example: &str, mode: Mode) -> Result<f32, Error> {
        let _guard = self.enter();
        let mut models = self.models.lock().expect("models");
        let Some(model) = models.get_mut(&handle) else {
            return Err(self.stale(handle));
        };
        let (label, features) = parse_example(example);
        let prediction = model.score(&features);
        if mode.is_learn() {
            if let Some(label) = label {
                let step = 0.5 * (label - prediction);
                for (name, value) in &features {
                    *model.weights.entry(name.clone()).or_insert(0.0) += step * value;
                }
            }
        }
        Ok(prediction)
    }

    unsafe fn query_topics(&self, handle: RawHandle, example: &str) -> Result<Vec<f32>, Error> {
        let _guard = self.enter();
        let models = self.models.lock().expect("models");
        if !models.contains_key(&handle) {
            return Err(self.stale(handle));
        }
        let (_, features) = parse_example(example);
        let total: f32 = features.iter().map(|(_, value)| value.abs()).sum();
        if total == 0.0 {
            return Ok(Vec::new());
        }
        Ok(features.iter().map(|(_, value)| value.abs() / total).collect())
    }

    unsafe fn release(&self, handle: RawHandle) -> Result<(), Error> {
        let _guard = self.enter();
        if self.models.lock().expect("models").remove(&handle).is_none() {
            return Err(self.stale(handle));
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
