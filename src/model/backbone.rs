use std::path::{Path, PathBuf};

use burn::{
    nn::{
        Dropout, DropoutConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError},
};
use derive_new::new;
use thiserror::Error;

/// File stem of the weight record inside a backbone artifact directory.
pub const BACKBONE_WEIGHTS: &str = "vgg16";

#[derive(Error, Debug)]
pub enum BackboneError {
    #[error("backbone directory does not exist: {0:?}")]
    MissingArtifact(PathBuf),

    #[error("backbone weight record does not exist: {0:?}")]
    MissingWeights(PathBuf),

    #[error("failed to load backbone weights: {0}")]
    InvalidWeights(#[from] RecorderError),
}

#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    max_pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> VggBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for conv in &self.convs {
            x = self.activation.forward(conv.forward(x));
        }

        self.max_pool.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct VggBlockConfig {
    input_channels: usize,
    num_filters: usize,
    depth: usize,
}

impl VggBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> VggBlock<B> {
        let convs = (0..self.depth)
            .map(|i| {
                let input = if i == 0 {
                    self.input_channels
                } else {
                    self.num_filters
                };
                Conv2dConfig::new([input, self.num_filters], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect();

        VggBlock {
            convs,
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }
}

/// Feature maps tapped from the encoder at 1/8, 1/16 and 1/32 of the input
/// resolution. Together with the image input and the dropout retention these
/// are the five handles the rest of the pipeline is built against.
#[derive(Clone, Debug, new)]
pub struct EncoderFeatures<B: Backend> {
    pub pool3: Tensor<B, 4>,
    pub pool4: Tensor<B, 4>,
    pub output: Tensor<B, 4>,
}

/// VGG16 feature extractor, fully convolutionalized: the two dense classifier
/// layers of the original network are replaced by conv6 (7x7) and conv7 (1x1)
/// so spatial structure survives to the coarsest map.
#[derive(Module, Debug)]
pub struct VggEncoder<B: Backend> {
    block1: VggBlock<B>,
    block2: VggBlock<B>,
    block3: VggBlock<B>,
    block4: VggBlock<B>,
    block5: VggBlock<B>,
    conv6: Conv2d<B>,
    conv7: Conv2d<B>,
    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> VggEncoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> EncoderFeatures<B> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);

        let pool3 = self.block3.forward(x);
        let pool4 = self.block4.forward(pool3.clone());
        let x = self.block5.forward(pool4.clone());

        let x = self.dropout.forward(self.activation.forward(self.conv6.forward(x)));
        let x = self.dropout.forward(self.activation.forward(self.conv7.forward(x)));

        EncoderFeatures::new(pool3, pool4, x)
    }
}

#[derive(Config, Debug)]
pub struct VggEncoderConfig {
    #[config(default = "3")]
    pub input_channels: usize,

    #[config(default = "64")]
    pub base_channels: usize,

    /// Channel count of the convolutionalized classifier layers.
    #[config(default = "4096")]
    pub classifier_channels: usize,

    /// Drop probability of the classifier dropout (retention 0.5 in training,
    /// inert outside an autodiff backend).
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl VggEncoderConfig {
    /// Channel counts of the three tapped feature maps, finest first.
    pub fn feature_channels(&self) -> [usize; 3] {
        [
            self.base_channels * 4,
            self.base_channels * 8,
            self.classifier_channels,
        ]
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VggEncoder<B> {
        let b = self.base_channels;

        VggEncoder {
            block1: VggBlockConfig::new(self.input_channels, b, 2).init(device),
            block2: VggBlockConfig::new(b, b * 2, 2).init(device),
            block3: VggBlockConfig::new(b * 2, b * 4, 3).init(device),
            block4: VggBlockConfig::new(b * 4, b * 8, 3).init(device),
            block5: VggBlockConfig::new(b * 8, b * 8, 3).init(device),
            conv6: Conv2dConfig::new([b * 8, self.classifier_channels], [7, 7])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv7: Conv2dConfig::new(
                [self.classifier_channels, self.classifier_channels],
                [1, 1],
            )
            .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }

    /// Load a pretrained encoder from an artifact directory holding a
    /// `vgg16.mpk` named-MPK record. Missing directory, missing record and
    /// undecodable record are all fatal.
    pub fn load_pretrained<B: Backend>(
        &self,
        dir: &Path,
        device: &B::Device,
    ) -> Result<VggEncoder<B>, BackboneError> {
        if !dir.is_dir() {
            return Err(BackboneError::MissingArtifact(dir.to_path_buf()));
        }

        let record_path = dir.join(format!("{BACKBONE_WEIGHTS}.mpk"));
        if !record_path.is_file() {
            return Err(BackboneError::MissingWeights(record_path));
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let encoder = self
            .init(device)
            .load_file(dir.join(BACKBONE_WEIGHTS), &recorder, device)?;

        tracing::info!(path = ?record_path, "loaded pretrained backbone");
        Ok(encoder)
    }
}
