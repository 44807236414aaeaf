//! Purpose: Define the public Rust API boundary for vwgate.
//! Exports: Instance, dispatcher, engine-seam, loader, and error types.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path to core types.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::engine::{Engine, Mode, RawHandle};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::instance::Vw;
pub use crate::core::loader::Loader;
pub use crate::core::native::{
    LIBRARY_ENV, NativeConfig, NativeEngine, open_library, sys, version,
};
pub use crate::core::predictor::{MultiPredictor, Multilabel, Prediction, Scalar, Topics, lda};
