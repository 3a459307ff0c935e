pub mod loss;
pub mod trainer;

pub use loss::{PixelCrossEntropyLoss, PixelCrossEntropyLossConfig, flatten_scores};
pub use trainer::{EpochReport, TrainingConfig, TrainingSummary, train};
