use std::path::Path;

use burn::prelude::*;

use super::backbone::{BackboneError, VggEncoder, VggEncoderConfig};
use super::decoder::{FcnDecoder, FcnDecoderConfig};

/// Full segmentation network: VGG16 encoder with the FCN-8 head grafted on.
#[derive(Module, Debug)]
pub struct FcnModel<B: Backend> {
    encoder: VggEncoder<B>,
    decoder: FcnDecoder<B>,
}

impl<B: Backend> FcnModel<B> {
    /// Dense per-pixel class scores at the input resolution.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, 3, height, width]`, height and width multiples of 32
    /// - output: `[batch_size, num_classes, height, width]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.decoder.forward(self.encoder.forward(images))
    }

    /// Regularization terms of the decoder kernels. The pretrained encoder
    /// is fine-tuned but not regularized, matching the topology where only
    /// the grafted layers carry a weight penalty.
    pub fn l2_penalties(&self) -> Vec<Tensor<B, 1>> {
        self.decoder.l2_penalties()
    }
}

#[derive(Config, Debug)]
pub struct FcnModelConfig {
    #[config(default = "2")]
    pub num_classes: usize,

    #[config(default = "VggEncoderConfig::new()")]
    pub encoder: VggEncoderConfig,
}

impl FcnModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FcnModel<B> {
        let [c8, c16, c32] = self.encoder.feature_channels();

        FcnModel {
            encoder: self.encoder.init(device),
            decoder: FcnDecoderConfig::new(c8, c16, c32, self.num_classes).init(device),
        }
    }

    /// Build the model around a pretrained encoder loaded from `backbone_dir`;
    /// the decoder starts from its random initialization.
    pub fn init_with_pretrained<B: Backend>(
        &self,
        backbone_dir: &Path,
        device: &B::Device,
    ) -> Result<FcnModel<B>, BackboneError> {
        let [c8, c16, c32] = self.encoder.feature_channels();

        Ok(FcnModel {
            encoder: self.encoder.load_pretrained(backbone_dir, device)?,
            decoder: FcnDecoderConfig::new(c8, c16, c32, self.num_classes).init(device),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn scores_come_back_at_input_resolution() {
        let device = Default::default();
        let model = FcnModelConfig::new()
            .with_encoder(
                VggEncoderConfig::new()
                    .with_base_channels(4)
                    .with_classifier_channels(8),
            )
            .init::<TestBackend>(&device);

        let out = model.forward(Tensor::zeros([2, 3, 64, 96], &device));

        assert_eq!(out.dims(), [2, 2, 64, 96]);
        assert_eq!(model.l2_penalties().len(), 6);
    }
}
