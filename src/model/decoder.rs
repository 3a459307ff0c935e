use burn::{
    nn::{
        Initializer,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::*,
};

use super::backbone::EncoderFeatures;

/// FCN-8 head: three 1x1 score projections, two x2 transposed-conv upsamples
/// with skip additions, and a final x8 upsample back to input resolution.
///
/// The topology is deliberately fixed. The upsample factors (2, 2, 8) cancel
/// the encoder's downsampling (8, 16, 32) exactly, so every skip addition is
/// shape-correct by construction; a mismatched operand is a topology defect
/// and panics at the add.
#[derive(Module, Debug)]
pub struct FcnDecoder<B: Backend> {
    score_32: Conv2d<B>,
    score_16: Conv2d<B>,
    score_8: Conv2d<B>,
    up_32: ConvTranspose2d<B>,
    up_16: ConvTranspose2d<B>,
    up_final: ConvTranspose2d<B>,
}

impl<B: Backend> FcnDecoder<B> {
    pub fn forward(&self, features: EncoderFeatures<B>) -> Tensor<B, 4> {
        let x = self.score_32.forward(features.output);
        let x = self.up_32.forward(x);
        let x = x + self.score_16.forward(features.pool4);

        let x = self.up_16.forward(x);
        let x = x + self.score_8.forward(features.pool3);

        self.up_final.forward(x)
    }

    /// One `sum(w^2)` term per learned kernel, returned explicitly so the
    /// loss can apply its regularization coefficient without any shared
    /// penalty collection.
    pub fn l2_penalties(&self) -> Vec<Tensor<B, 1>> {
        vec![
            self.score_32.weight.val().powf_scalar(2.0).sum(),
            self.score_16.weight.val().powf_scalar(2.0).sum(),
            self.score_8.weight.val().powf_scalar(2.0).sum(),
            self.up_32.weight.val().powf_scalar(2.0).sum(),
            self.up_16.weight.val().powf_scalar(2.0).sum(),
            self.up_final.weight.val().powf_scalar(2.0).sum(),
        ]
    }
}

#[derive(Config, Debug)]
pub struct FcnDecoderConfig {
    /// Channels of the finest feature map (1/8 resolution).
    pub channels_8x: usize,
    /// Channels of the mid feature map (1/16 resolution).
    pub channels_16x: usize,
    /// Channels of the coarsest feature map (1/32 resolution).
    pub channels_32x: usize,
    pub num_classes: usize,
}

impl FcnDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FcnDecoder<B> {
        let init = Initializer::Normal {
            mean: 0.0,
            std: 0.01,
        };
        let nc = self.num_classes;

        FcnDecoder {
            score_32: Conv2dConfig::new([self.channels_32x, nc], [1, 1])
                .with_initializer(init.clone())
                .init(device),
            score_16: Conv2dConfig::new([self.channels_16x, nc], [1, 1])
                .with_initializer(init.clone())
                .init(device),
            score_8: Conv2dConfig::new([self.channels_8x, nc], [1, 1])
                .with_initializer(init.clone())
                .init(device),
            // Kernel 4, stride 2, padding 1 doubles the spatial size exactly.
            up_32: ConvTranspose2dConfig::new([nc, nc], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_initializer(init.clone())
                .init(device),
            up_16: ConvTranspose2dConfig::new([nc, nc], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_initializer(init.clone())
                .init(device),
            // Kernel 16, stride 8, padding 4 upsamples by 8 exactly.
            up_final: ConvTranspose2dConfig::new([nc, nc], [16, 16])
                .with_stride([8, 8])
                .with_padding([4, 4])
                .with_initializer(init)
                .init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn features(
        shape_8x: [usize; 4],
        shape_16x: [usize; 4],
        shape_32x: [usize; 4],
    ) -> EncoderFeatures<TestBackend> {
        let device = Default::default();
        EncoderFeatures::new(
            Tensor::zeros(shape_8x, &device),
            Tensor::zeros(shape_16x, &device),
            Tensor::zeros(shape_32x, &device),
        )
    }

    #[test]
    fn output_is_8x_the_finest_feature_map() {
        let device = Default::default();
        let decoder = FcnDecoderConfig::new(256, 512, 256, 2).init::<TestBackend>(&device);

        // Feature maps of a 160x576 frame at 1/8, 1/16 and 1/32 resolution.
        let out = decoder.forward(features(
            [8, 256, 20, 72],
            [8, 512, 10, 36],
            [8, 256, 5, 18],
        ));

        assert_eq!(out.dims(), [8, 2, 160, 576]);
    }

    #[test]
    fn channel_count_follows_num_classes() {
        let device = Default::default();
        let decoder = FcnDecoderConfig::new(16, 32, 8, 5).init::<TestBackend>(&device);

        let out = decoder.forward(features([1, 16, 8, 12], [1, 32, 4, 6], [1, 8, 2, 3]));

        assert_eq!(out.dims(), [1, 5, 64, 96]);
    }

    #[test]
    #[should_panic]
    fn mismatched_skip_shapes_fail_at_construction() {
        let device = Default::default();
        let decoder = FcnDecoderConfig::new(16, 32, 8, 2).init::<TestBackend>(&device);

        // Mid map is not half the finest map's resolution, so the first skip
        // addition cannot line up.
        decoder.forward(features([1, 16, 8, 12], [1, 32, 6, 6], [1, 8, 2, 3]));
    }

    #[test]
    fn exposes_one_penalty_per_kernel() {
        let device = Default::default();
        let decoder = FcnDecoderConfig::new(16, 32, 8, 2).init::<TestBackend>(&device);

        let penalties = decoder.l2_penalties();
        assert_eq!(penalties.len(), 6);
        for penalty in penalties {
            assert!(penalty.into_scalar() >= 0.0);
        }
    }
}
