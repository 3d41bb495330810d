//! Feature-extraction backbones.
//!
//! Two structurally different topologies are supported behind the same head
//! contract: a plain VGG-style convolutional stack and a RegNet-style
//! residual stack with grouped convolutions. The topology of each backbone
//! is fixed; its dimensions are part of the checkpoint compatibility
//! contract and must not change without retraining.

use candle_core::{D, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, ModuleT, VarBuilder, batch_norm, conv2d};

use super::BN_EPS;

/// Channel progression of the plain convolutional stack.
const VGG_CHANNELS: [usize; 5] = [32, 64, 128, 256, 256];

/// Flattened feature width after five stride-2 pools over a 224x224 input.
pub(crate) const VGG_FEATURE_DIM: usize = 256 * 7 * 7;

/// Stem width of the residual stack.
const REGNET_STEM: usize = 32;

/// Stage widths of the residual stack.
const REGNET_WIDTHS: [usize; 3] = [64, 160, 384];

/// Channels per group in the stage 3x3 convolutions.
const REGNET_GROUP_WIDTH: usize = 8;

/// Feature width after global average pooling of the last stage.
pub(crate) const REGNET_FEATURE_DIM: usize = REGNET_WIDTHS[2];

/// Plain convolutional stack: five conv3x3 + ReLU + max-pool blocks,
/// flattened into one feature vector.
#[derive(Debug)]
pub struct VggBackbone {
    blocks: Vec<Conv2d>,
}

impl VggBackbone {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let mut blocks = Vec::with_capacity(VGG_CHANNELS.len());
        let mut in_channels = 3;
        for (index, &out_channels) in VGG_CHANNELS.iter().enumerate() {
            blocks.push(conv2d(
                in_channels,
                out_channels,
                3,
                cfg,
                vb.pp(format!("conv{index}")),
            )?);
            in_channels = out_channels;
        }
        Ok(Self { blocks })
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for conv in &self.blocks {
            xs = conv.forward_t(&xs, false)?.relu()?.max_pool2d(2)?;
        }
        xs.flatten_from(1)
    }
}

/// Bottleneck residual block with a grouped 3x3 convolution.
#[derive(Debug)]
struct ResidualBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    conv3: Conv2d,
    bn3: BatchNorm,
    shortcut: Option<(Conv2d, BatchNorm)>,
}

impl ResidualBlock {
    fn new(in_channels: usize, out_channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let groups = out_channels / REGNET_GROUP_WIDTH;
        let conv1 = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("conv1"),
        )?;
        let bn1 = batch_norm(out_channels, BN_EPS, vb.pp("bn1"))?;
        let conv2 = conv2d(
            out_channels,
            out_channels,
            3,
            Conv2dConfig {
                padding: 1,
                stride,
                groups,
                ..Default::default()
            },
            vb.pp("conv2"),
        )?;
        let bn2 = batch_norm(out_channels, BN_EPS, vb.pp("bn2"))?;
        let conv3 = conv2d(
            out_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("conv3"),
        )?;
        let bn3 = batch_norm(out_channels, BN_EPS, vb.pp("bn3"))?;
        let shortcut = if stride != 1 || in_channels != out_channels {
            Some((
                conv2d(
                    in_channels,
                    out_channels,
                    1,
                    Conv2dConfig {
                        stride,
                        ..Default::default()
                    },
                    vb.pp("downsample"),
                )?,
                batch_norm(out_channels, BN_EPS, vb.pp("downsample_bn"))?,
            ))
        } else {
            None
        };
        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            shortcut,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let residual = match &self.shortcut {
            Some((conv, bn)) => bn.forward_t(&conv.forward_t(xs, false)?, false)?,
            None => xs.clone(),
        };
        let ys = self
            .bn1
            .forward_t(&self.conv1.forward_t(xs, false)?, false)?
            .relu()?;
        let ys = self
            .bn2
            .forward_t(&self.conv2.forward_t(&ys, false)?, false)?
            .relu()?;
        let ys = self.bn3.forward_t(&self.conv3.forward_t(&ys, false)?, false)?;
        (ys + residual)?.relu()
    }
}

/// Residual stack: strided stem, three bottleneck stages, global average
/// pooling.
#[derive(Debug)]
pub struct RegNetBackbone {
    stem_conv: Conv2d,
    stem_bn: BatchNorm,
    stages: Vec<ResidualBlock>,
}

impl RegNetBackbone {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let stem_conv = conv2d(
            3,
            REGNET_STEM,
            3,
            Conv2dConfig {
                padding: 1,
                stride: 2,
                ..Default::default()
            },
            vb.pp("stem"),
        )?;
        let stem_bn = batch_norm(REGNET_STEM, BN_EPS, vb.pp("stem_bn"))?;
        let mut stages = Vec::with_capacity(REGNET_WIDTHS.len());
        let mut in_channels = REGNET_STEM;
        for (index, &width) in REGNET_WIDTHS.iter().enumerate() {
            stages.push(ResidualBlock::new(
                in_channels,
                width,
                2,
                vb.pp(format!("stage{index}")),
            )?);
            in_channels = width;
        }
        Ok(Self {
            stem_conv,
            stem_bn,
            stages,
        })
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self
            .stem_bn
            .forward_t(&self.stem_conv.forward_t(xs, false)?, false)?
            .relu()?;
        for block in &self.stages {
            xs = block.forward(&xs)?;
        }
        // Global average pooling over the spatial dimensions.
        xs.mean(D::Minus1)?.mean(D::Minus1)
    }
}
