use burn::{data::dataloader::batcher::Batcher, prelude::*};

use super::road::RoadSceneItem;

/// Number of label channels produced for every pixel: not-road and road.
pub const NUM_CLASSES: usize = 2;

#[derive(Clone)]
pub struct RoadBatcher<B: Backend> {
    device: B::Device,
    image_size: [usize; 2],
}

impl<B: Backend> RoadBatcher<B> {
    pub fn new(device: B::Device, image_size: [usize; 2]) -> Self {
        Self { device, image_size }
    }
}

/// A mini-batch ready for the network: images `[N, 3, H, W]` and one-hot
/// float labels `[N, 2, H, W]` with channel 0 = not-road, channel 1 = road.
#[derive(Clone, Debug)]
pub struct RoadBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 4>,
}

impl<B: Backend> Batcher<RoadSceneItem, RoadBatch<B>> for RoadBatcher<B> {
    fn batch(&self, items: Vec<RoadSceneItem>) -> RoadBatch<B> {
        let [height, width] = self.image_size;

        let mut images = Vec::with_capacity(items.len());
        let mut labels = Vec::with_capacity(items.len());

        for item in items {
            let mut image_data = Vec::with_capacity(3 * height * width);
            for c in 0..3 {
                for y in 0..height {
                    for x in 0..width {
                        let idx = (y * width + x) * 3 + c;
                        image_data.push(item.image.get(idx).copied().unwrap_or(0.0));
                    }
                }
            }

            let mut label_data = Vec::with_capacity(NUM_CLASSES * height * width);
            for class in 0..NUM_CLASSES {
                for idx in 0..height * width {
                    let road = item.road.get(idx).copied().unwrap_or(false);
                    let hot = (class == 1) == road;
                    label_data.push(if hot { 1.0f32 } else { 0.0 });
                }
            }

            images.push(Tensor::<B, 3>::from_data(
                TensorData::new(image_data, Shape::new([3, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));
            labels.push(Tensor::<B, 3>::from_data(
                TensorData::new(label_data, Shape::new([NUM_CLASSES, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));
        }

        RoadBatch {
            images: Tensor::stack::<4>(images, 0),
            labels: Tensor::stack::<4>(labels, 0),
        }
    }
}
