//! Network topology construction.
//!
//! This module builds the exact network a checkpoint was trained against:
//! a feature-extraction backbone followed by the shared two-class
//! classifier head. Construction never fetches pretrained weights; the
//! parameters a [`candle_nn::VarBuilder`] does not supply are initialized
//! randomly and overwritten when the checkpoint is applied.

use crate::models::backbone::{REGNET_FEATURE_DIM, RegNetBackbone, VGG_FEATURE_DIM, VggBackbone};
use crate::models::head::ClassifierHead;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Number of output classes (non-cancer, cancer).
pub const NUM_CLASSES: usize = 2;

/// Hidden widths of the classifier head.
const HEAD_HIDDEN: (usize, usize) = (512, 256);

/// Dropout probabilities of the two head stages.
const HEAD_DROPOUT: (f32, f32) = (0.5, 0.3);

/// Closed set of supported backbone topologies.
///
/// Each variant maps onto one fixed architecture; unknown identifiers are
/// rejected when a configuration is parsed, not at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackboneKind {
    /// Plain VGG-style convolutional stack.
    #[serde(rename = "vgg")]
    Vgg,
    /// RegNet-style residual stack with grouped convolutions.
    #[serde(rename = "regnet")]
    RegNet,
}

impl BackboneKind {
    /// The identifier used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackboneKind::Vgg => "vgg",
            BackboneKind::RegNet => "regnet",
        }
    }

    /// Width of the feature vector this backbone feeds into the head.
    pub fn feature_dim(&self) -> usize {
        match self {
            BackboneKind::Vgg => VGG_FEATURE_DIM,
            BackboneKind::RegNet => REGNET_FEATURE_DIM,
        }
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum BackboneNet {
    Vgg(VggBackbone),
    RegNet(RegNetBackbone),
}

impl BackboneNet {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            BackboneNet::Vgg(backbone) => backbone.forward(xs),
            BackboneNet::RegNet(backbone) => backbone.forward(xs),
        }
    }
}

/// A variant's full network: backbone features flowing into the two-class
/// head.
///
/// The model has no training forward path; every forward pass runs in
/// evaluation mode, so dropout and batch-norm behavior cannot be left in an
/// inconsistent state by another caller.
#[derive(Debug)]
pub struct DetectionModel {
    backbone: BackboneNet,
    head: ClassifierHead,
}

impl DetectionModel {
    /// Builds the topology for `kind`, pulling parameters from `vb`.
    pub fn new(kind: BackboneKind, vb: VarBuilder) -> Result<Self> {
        let backbone = match kind {
            BackboneKind::Vgg => BackboneNet::Vgg(VggBackbone::new(vb.pp("backbone"))?),
            BackboneKind::RegNet => BackboneNet::RegNet(RegNetBackbone::new(vb.pp("backbone"))?),
        };
        let head = ClassifierHead::new(
            kind.feature_dim(),
            HEAD_HIDDEN,
            HEAD_DROPOUT,
            NUM_CLASSES,
            vb.pp("classifier"),
        )?;
        Ok(Self { backbone, head })
    }

    /// Evaluation-mode forward pass from input image tensor to class logits.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let features = self.backbone.forward(xs)?;
        self.head.forward(&features)
    }
}

/// Builds `kind` over a fresh [`VarMap`] with randomly initialized weights.
///
/// The map gives callers access to every parameter of the constructed
/// topology; tests use it to fabricate shape-compatible checkpoints.
pub fn build_with_varmap(kind: BackboneKind, device: &Device) -> Result<(VarMap, DetectionModel)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = DetectionModel::new(kind, vb)?;
    Ok((varmap, model))
}

/// Parameter name to shape manifest of `kind`'s topology.
///
/// The checkpoint loader validates serialized weights against this manifest
/// so that architecture/checkpoint drift surfaces as a typed error naming
/// the offending parameter.
pub fn parameter_shapes(kind: BackboneKind) -> Result<HashMap<String, Vec<usize>>> {
    let (varmap, _model) = build_with_varmap(kind, &Device::Cpu)?;
    let data = varmap.data().lock().unwrap();
    Ok(data
        .iter()
        .map(|(name, var)| (name.clone(), var.dims().to_vec()))
        .collect())
}
