use std::marker::PhantomData;

use burn::{prelude::*, tensor::activation::log_softmax};

/// Configuration to create a [pixel cross-entropy loss](PixelCrossEntropyLoss)
/// using the [init function](PixelCrossEntropyLossConfig::init).
#[derive(Config, Debug)]
pub struct PixelCrossEntropyLossConfig {
    /// Coefficient applied to the summed weight-regularization penalties
    /// before adding them to the cross entropy.
    #[config(default = 1e-3)]
    pub reg_coeff: f64,
}

impl PixelCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> PixelCrossEntropyLoss<B> {
        PixelCrossEntropyLoss {
            reg_coeff: self.reg_coeff,
            _b: PhantomData,
        }
    }
}

/// Mean per-pixel softmax cross entropy over flattened class scores, plus an
/// additive L2 penalty term.
///
/// Scores and labels are flattened identically to `[pixels, classes]`, so the
/// value is invariant to any pixel reordering applied to both.
#[derive(Module, Debug)]
pub struct PixelCrossEntropyLoss<B: Backend> {
    pub reg_coeff: f64,
    _b: PhantomData<B>,
}

/// Collapse a `[batch, classes, height, width]` score map into per-pixel
/// logit rows `[batch * height * width, classes]`.
pub fn flatten_scores<B: Backend>(scores: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch_size, num_classes, height, width] = scores.dims();
    scores
        .permute([0, 2, 3, 1])
        .reshape([batch_size * height * width, num_classes])
}

impl<B: Backend> PixelCrossEntropyLoss<B> {
    /// Compute the criterion on the input tensor.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]` (logits)
    /// - labels: `[batch_size, num_classes, height, width]` (one-hot)
    /// - penalties: scalar regularization terms, may be empty
    pub fn forward(
        &self,
        scores: Tensor<B, 4>,
        labels: Tensor<B, 4>,
        penalties: Vec<Tensor<B, 1>>,
    ) -> Tensor<B, 1> {
        Self::assertions(&scores, &labels);

        let logits = flatten_scores(scores);
        let targets = flatten_scores(labels);

        let cross_entropy = (targets * log_softmax(logits, 1))
            .sum_dim(1)
            .neg()
            .mean();

        match penalties.into_iter().reduce(|acc, term| acc + term) {
            Some(total) => cross_entropy + total.mul_scalar(self.reg_coeff),
            None => cross_entropy,
        }
    }

    fn assertions(scores: &Tensor<B, 4>, labels: &Tensor<B, 4>) {
        assert_eq!(
            scores.dims(),
            labels.dims(),
            "Score map and label tensor must agree in every dimension: {:?} vs {:?}",
            scores.dims(),
            labels.dims()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn empty_penalty_list_gives_plain_cross_entropy() {
        let device = Default::default();
        let loss = PixelCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        // All-zero logits: every pixel contributes exactly ln(num_classes).
        let scores = Tensor::zeros([1, 2, 2, 2], &device);
        let labels = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[1.0, 1.0], [1.0, 1.0]],
                [[0.0, 0.0], [0.0, 0.0]],
            ]],
            &device,
        );

        let value = scalar(loss.forward(scores, labels, vec![]));
        assert!((value - 2.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn regularization_is_additive() {
        let device = Default::default();
        let loss = PixelCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        let scores = Tensor::zeros([1, 2, 2, 2], &device);
        let labels = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[1.0, 1.0], [1.0, 1.0]],
                [[0.0, 0.0], [0.0, 0.0]],
            ]],
            &device,
        );
        let penalties = vec![
            Tensor::from_floats([2.0], &device),
            Tensor::from_floats([3.0], &device),
        ];

        let value = scalar(loss.forward(scores, labels, penalties));
        assert!((value - (2.0f32.ln() + 1e-3 * 5.0)).abs() < 1e-6);
    }

    #[test]
    fn loss_is_invariant_to_pixel_ordering() {
        let device = Default::default();
        let loss = PixelCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        let scores = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[1.0, -0.5], [2.0, 0.25]],
                [[0.5, 1.5], [-1.0, 0.75]],
            ]],
            &device,
        );
        let labels = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[1.0, 0.0], [0.0, 1.0]],
                [[0.0, 1.0], [1.0, 0.0]],
            ]],
            &device,
        );

        // Same pixels with the rows swapped in both tensors.
        let permuted_scores = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[2.0, 0.25], [1.0, -0.5]],
                [[-1.0, 0.75], [0.5, 1.5]],
            ]],
            &device,
        );
        let permuted_labels = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[0.0, 1.0], [1.0, 0.0]],
                [[1.0, 0.0], [0.0, 1.0]],
            ]],
            &device,
        );

        let original = scalar(loss.forward(scores, labels, vec![]));
        let permuted = scalar(loss.forward(permuted_scores, permuted_labels, vec![]));
        assert!((original - permuted).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "must agree in every dimension")]
    fn shape_mismatch_is_fatal() {
        let device = Default::default();
        let loss = PixelCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        let scores = Tensor::zeros([1, 2, 4, 4], &device);
        let labels = Tensor::zeros([1, 2, 4, 6], &device);
        loss.forward(scores, labels, vec![]);
    }
}
