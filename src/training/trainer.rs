use std::sync::Arc;

use burn::{
    data::dataloader::DataLoader,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use derive_new::new;

use crate::dataset::RoadBatch;
use crate::model::FcnModel;

use super::loss::PixelCrossEntropyLossConfig;

#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,

    #[config(default = 50)]
    pub epochs: usize,

    #[config(default = 5)]
    pub batch_size: usize,

    /// Supplied to the optimizer on every step, never baked into the model.
    #[config(default = 1e-4)]
    pub learning_rate: f64,

    #[config(default = "PixelCrossEntropyLossConfig::new()")]
    pub loss: PixelCrossEntropyLossConfig,
}

/// Losses observed during one pass over the training set.
#[derive(Clone, Debug, new)]
pub struct EpochReport {
    pub epoch: usize,
    pub batch_losses: Vec<f32>,
}

impl EpochReport {
    pub fn formatted_losses(&self) -> Vec<String> {
        self.batch_losses.iter().map(|l| format!("{l:.3}")).collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
}

impl TrainingSummary {
    pub fn total_steps(&self) -> usize {
        self.epochs.iter().map(|e| e.batch_losses.len()).sum()
    }
}

/// Fine-tune the model: `epochs` passes over the loader, one optimizer step
/// per batch at the fixed learning rate.
///
/// The loader owns ordering and shuffling; this loop consumes whatever
/// sequence it produces, one blocking step at a time. There is no recovery
/// path: a failing batch or step aborts the run.
pub fn train<B: AutodiffBackend>(
    mut model: FcnModel<B>,
    loader: Arc<dyn DataLoader<RoadBatch<B>>>,
    config: &TrainingConfig,
    device: &B::Device,
) -> (FcnModel<B>, TrainingSummary) {
    let mut optimizer = config.optimizer.init();
    let criterion = config.loss.init::<B>(device);
    let mut summary = TrainingSummary::default();

    for epoch in 0..config.epochs {
        let mut batch_losses = Vec::new();

        for batch in loader.iter() {
            let scores = model.forward(batch.images);
            let loss = criterion.forward(scores, batch.labels, model.l2_penalties());

            let loss_value: f32 = loss.clone().into_scalar().elem();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            tracing::debug!(epoch, step = batch_losses.len(), loss = loss_value);
            batch_losses.push(loss_value);
        }

        let report = EpochReport::new(epoch, batch_losses);
        println!("Epoch {} Loss {:?}", epoch + 1, report.formatted_losses());
        summary.epochs.push(report);
    }

    (model, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::DataLoaderBuilder;
    use burn::data::dataset::InMemDataset;

    use crate::dataset::{RoadBatcher, RoadSceneItem};
    use crate::model::{FcnModelConfig, VggEncoderConfig};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn runs_one_step_per_batch_and_reports_per_epoch() {
        let device = Default::default();
        let size = [32, 32];

        let items: Vec<RoadSceneItem> = (0..4)
            .map(|i| RoadSceneItem {
                image: vec![0.25 * i as f32; 3 * size[0] * size[1]],
                road: vec![i % 2 == 0; size[0] * size[1]],
            })
            .collect();

        let batcher = RoadBatcher::<TestBackend>::new(device, size);
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(1)
            .build(InMemDataset::new(items));

        let model = FcnModelConfig::new()
            .with_encoder(
                VggEncoderConfig::new()
                    .with_base_channels(2)
                    .with_classifier_channels(4),
            )
            .init::<TestBackend>(&Default::default());

        let config = TrainingConfig::new(AdamConfig::new()).with_epochs(2);
        let (_model, summary) = train(model, loader, &config, &Default::default());

        assert_eq!(summary.epochs.len(), 2);
        assert_eq!(summary.total_steps(), 8);
        for report in &summary.epochs {
            assert_eq!(report.batch_losses.len(), 4);
            assert!(report.batch_losses.iter().all(|l| l.is_finite()));
        }
    }
}
