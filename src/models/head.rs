//! Two-class classifier head shared by every backbone.

use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, Dropout, Linear, ModuleT, VarBuilder, batch_norm, linear};

use super::BN_EPS;

/// Classifier head: two Linear -> BatchNorm -> ReLU -> Dropout stages
/// followed by the final two-logit projection.
///
/// Every backbone feeds this head, so the output contract (two class
/// logits) is identical across variants.
#[derive(Debug)]
pub struct ClassifierHead {
    fc1: Linear,
    bn1: BatchNorm,
    drop1: Dropout,
    fc2: Linear,
    bn2: BatchNorm,
    drop2: Dropout,
    out: Linear,
}

impl ClassifierHead {
    pub fn new(
        in_dim: usize,
        hidden: (usize, usize),
        dropout: (f32, f32),
        classes: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            fc1: linear(in_dim, hidden.0, vb.pp("fc1"))?,
            bn1: batch_norm(hidden.0, BN_EPS, vb.pp("bn1"))?,
            drop1: Dropout::new(dropout.0),
            fc2: linear(hidden.0, hidden.1, vb.pp("fc2"))?,
            bn2: batch_norm(hidden.1, BN_EPS, vb.pp("bn2"))?,
            drop2: Dropout::new(dropout.1),
            out: linear(hidden.1, classes, vb.pp("out"))?,
        })
    }

    /// Evaluation-mode forward: dropout is an identity and batch norm uses
    /// its running statistics.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let xs = self
            .bn1
            .forward_t(&self.fc1.forward_t(features, false)?, false)?
            .relu()?;
        let xs = self.drop1.forward(&xs, false)?;
        let xs = self
            .bn2
            .forward_t(&self.fc2.forward_t(&xs, false)?, false)?
            .relu()?;
        let xs = self.drop2.forward(&xs, false)?;
        self.out.forward_t(&xs, false)
    }
}
