//! Purpose: Thread-safe access to the non-reentrant Vowpal Wabbit native engine.
//! Exports: `api` (instances, dispatchers, engine seam, loader, errors).
//! Role: Library backing the `vwgate` CLI and embedding hosts.
//! Invariants: Every native call on one instance is serialized by that instance's gate.
//! Invariants: The native library is loaded at most once per process.
pub mod api;
mod core;
