pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "dataset")]
pub mod inference;

#[cfg(feature = "training")]
pub mod training;

pub use model::{BackboneError, FcnDecoder, FcnDecoderConfig, FcnModel, FcnModelConfig};
pub use model::{VggEncoder, VggEncoderConfig};

#[cfg(feature = "dataset")]
pub use dataset::{RoadBatch, RoadBatcher, RoadDataset};

#[cfg(feature = "training")]
pub use training::{PixelCrossEntropyLoss, PixelCrossEntropyLossConfig, TrainingConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
