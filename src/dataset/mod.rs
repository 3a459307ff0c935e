mod batcher;
mod road;

pub use batcher::{NUM_CLASSES, RoadBatch, RoadBatcher};
pub use road::{DatasetError, RoadDataset, RoadSceneItem, RoadSceneRaw};
