//! Purpose: Typed dispatchers producing different result shapes from one engine instance.
//! Exports: `Prediction`, `MultiPredictor`, `Scalar`, `Multilabel`, `Topics`.
//! Role: Extension beside predict/learn that shares the instance gate and handle.
//! Invariants: The variant set is closed (sealed trait).
//! Invariants: Every variant re-checks the open flag under the instance gate before acting.
use std::sync::Arc;

use crate::core::engine::Mode;
use crate::core::error::Error;
use crate::core::instance::Context;

mod sealed {
    pub trait Sealed {}
}

/// One result shape a `MultiPredictor` can produce.
pub trait Prediction: sealed::Sealed + Send + Sync {
    type Output;

    #[doc(hidden)]
    fn predict(&self, example: &str, ctx: &Context) -> Result<Self::Output, Error>;
}

/// Scalar prediction through the same path as `Vw::predict` / `Vw::learn`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Scalar {
    mode: Mode,
}

impl Scalar {
    pub fn predict() -> Self {
        Self {
            mode: Mode::Predict,
        }
    }

    pub fn learn() -> Self {
        Self { mode: Mode::Learn }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl sealed::Sealed for Scalar {}

impl Prediction for Scalar {
    type Output = f32;

    fn predict(&self, example: &str, ctx: &Context) -> Result<f32, Error> {
        ctx.run(example, self.mode)
    }
}

/// Label-set prediction.
///
/// Decoding of multi-label predictions is not implemented: after the gate check this always
/// yields an empty label set and never calls into the engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Multilabel;

impl sealed::Sealed for Multilabel {}

impl Prediction for Multilabel {
    type Output = Vec<i32>;

    fn predict(&self, _example: &str, ctx: &Context) -> Result<Vec<i32>, Error> {
        ctx.with_handle(|_, _| Ok(Vec::new()))
    }
}

/// Topic-distribution prediction for LDA models; one weight per topic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Topics;

impl sealed::Sealed for Topics {}

impl Prediction for Topics {
    type Output = Vec<f32>;

    fn predict(&self, example: &str, ctx: &Context) -> Result<Vec<f32>, Error> {
        // SAFETY: `with_handle` holds the gate and has checked the handle is open.
        ctx.with_handle(|engine, handle| unsafe { engine.query_topics(handle, example) })
    }
}

/// Shorthand for `Topics`, matching the engine's `--lda` mode.
pub fn lda() -> Topics {
    Topics
}

/// A dispatcher bound to one instance. Keeps the instance's native state alive while held.
pub struct MultiPredictor<P> {
    prediction: P,
    ctx: Arc<Context>,
}

impl<P: Prediction> MultiPredictor<P> {
    pub(crate) fn new(prediction: P, ctx: Arc<Context>) -> Self {
        Self { prediction, ctx }
    }

    pub fn predict(&self, example: &str) -> Result<P::Output, Error> {
        self.prediction.predict(example, &self.ctx)
    }

    pub fn prediction(&self) -> &P {
        &self.prediction
    }
}
