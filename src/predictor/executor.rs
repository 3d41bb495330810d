//! Single forward-pass execution.
//!
//! Runs one loaded variant against one preprocessed tensor: forward pass,
//! softmax over the two logits, argmax, and wall-clock timing of the
//! forward pass only. Class index 1 maps to `Cancer`, class index 0 to
//! `Non-Cancer`; the convention is fixed and not configurable.

use crate::core::errors::{DetectError, DetectResult};
use crate::core::predictions::{Label, Prediction};
use crate::models::architecture::NUM_CLASSES;
use crate::pipeline::cache::LoadedModel;
use crate::processors::preprocess::PreprocessedTensor;
use candle_nn::ops::softmax_last_dim;
use std::time::Instant;
use tracing::debug;

/// Runs one forward pass and shapes the output into a [`Prediction`].
///
/// Mutates no shared state: the model's weights are plain tensors read
/// concurrently by any number of executors, and the network has no training
/// mode that could leak between callers.
pub fn run(model: &LoadedModel, input: &PreprocessedTensor) -> DetectResult<Prediction> {
    let started = Instant::now();
    let logits = model
        .network()
        .forward(input.tensor())
        .map_err(|e| DetectError::inference(model.name(), "forward pass", e))?;
    let duration = started.elapsed();

    let probabilities: Vec<f32> = softmax_last_dim(&logits)
        .and_then(|probs| probs.flatten_all())
        .and_then(|probs| probs.to_vec1())
        .map_err(|e| DetectError::inference(model.name(), "softmax over logits", e))?;
    if probabilities.len() != NUM_CLASSES {
        return Err(DetectError::inference_message(
            model.name(),
            format!(
                "expected {NUM_CLASSES} class probabilities, got {}",
                probabilities.len()
            ),
        ));
    }

    let (label, confidence) = decide(probabilities[0], probabilities[1]);
    debug!(
        model = model.name(),
        label = label.as_str(),
        confidence,
        elapsed_ms = duration.as_millis() as u64,
        "forward pass complete"
    );

    Ok(Prediction {
        model: model.name().to_string(),
        model_version: model.version().to_string(),
        label,
        confidence,
        raw_probability: probabilities[1],
        duration,
    })
}

/// Picks the argmax class. The positive class wins ties, so the label is
/// `Cancer` exactly when the positive probability is at least 0.5.
fn decide(negative: f32, positive: f32) -> (Label, f32) {
    if positive >= negative {
        (Label::Cancer, positive)
    } else {
        (Label::NonCancer, negative)
    }
}
