use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use burn::{prelude::*, tensor::activation::softmax};
use image::{Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;

use crate::model::FcnModel;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("test image directory does not exist: {0:?}")]
    MissingTestImages(PathBuf),
}

fn to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

    Tensor::<B, 3>::from_data(
        TensorData::new(data, Shape::new([height as usize, width as usize, 3]))
            .convert::<B::FloatElem>(),
        device,
    )
    // [H, W, C] -> [C, H, W]
    .permute([2, 0, 1])
    .unsqueeze::<4>()
}

/// Blend a half-transparent green onto every road pixel.
fn paint_road(image: &mut RgbImage, road: &[bool]) {
    for (pixel, &is_road) in image.pixels_mut().zip(road) {
        if is_road {
            let [r, g, b] = pixel.0;
            *pixel = Rgb([r / 2, g / 2 + 128, b / 2]);
        }
    }
}

/// Run the trained model over the held-out test frames and write road
/// overlays into a fresh timestamped directory under `runs_dir`.
///
/// Returns the directory the overlays were written to.
pub fn save_inference_samples<B: Backend>(
    runs_dir: &Path,
    data_dir: &Path,
    model: &FcnModel<B>,
    image_size: [usize; 2],
    device: &B::Device,
) -> Result<PathBuf, InferenceError> {
    let test_dir = data_dir.join("data_road/testing/image_2");
    if !test_dir.is_dir() {
        return Err(InferenceError::MissingTestImages(test_dir));
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs();
    let out_dir = runs_dir.join(stamp.to_string());
    std::fs::create_dir_all(&out_dir)?;

    let [height, width] = image_size;

    for entry in std::fs::read_dir(&test_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let mut frame = image::open(&path)?
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .into_rgb8();

        let scores = model.forward(to_tensor(&frame, device));
        let road_prob = softmax(scores, 1).slice([0..1, 1..2, 0..height, 0..width]);
        let road: Vec<bool> = road_prob
            .into_data()
            .to_vec::<f32>()
            .expect("road probabilities convert to f32")
            .into_iter()
            .map(|p| p > 0.5)
            .collect();

        paint_road(&mut frame, &road);

        let file_name = path.file_name().expect("read_dir entries have file names");
        frame.save(out_dir.join(file_name))?;
        tracing::debug!(file = ?file_name, "wrote inference overlay");
    }

    tracing::info!(dir = ?out_dir, "saved inference samples");
    Ok(out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_blends_only_road_pixels() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([200, 100, 50]));
        image.put_pixel(1, 0, Rgb([200, 100, 50]));

        paint_road(&mut image, &[true, false]);

        assert_eq!(image.get_pixel(0, 0).0, [100, 178, 25]);
        assert_eq!(image.get_pixel(1, 0).0, [200, 100, 50]);
    }

    #[test]
    fn missing_test_directory_is_fatal() {
        use crate::model::{FcnModelConfig, VggEncoderConfig};
        use burn::backend::NdArray;

        let device = Default::default();
        let model = FcnModelConfig::new()
            .with_encoder(
                VggEncoderConfig::new()
                    .with_base_channels(2)
                    .with_classifier_channels(4),
            )
            .init::<NdArray>(&device);

        let result = save_inference_samples(
            Path::new("/tmp/road-fcn-runs"),
            Path::new("/nonexistent/data"),
            &model,
            [32, 32],
            &device,
        );
        assert!(matches!(result, Err(InferenceError::MissingTestImages(_))));
    }
}
