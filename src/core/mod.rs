// Core modules implementing the loader, the engine seam, and the per-instance gate.
pub mod engine;
pub mod error;
pub mod instance;
pub mod loader;
pub mod native;
pub mod predictor;
