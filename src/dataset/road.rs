use std::path::{Path, PathBuf};

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;

use burn::data::dataset::transform::{Mapper, MapperDataset};
use burn::data::dataset::{Dataset, InMemDataset};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: `{0}`")]
    IOError(String),

    #[error("no image/ground-truth pairs found under `{0}`")]
    NoSamples(PathBuf),
}

/// One KITTI road training sample on disk: the camera frame and its
/// road-area ground-truth image.
#[derive(Clone, Debug)]
pub struct RoadSceneRaw {
    pub image_path: PathBuf,
    pub gt_path: PathBuf,
}

/// A decoded sample, resized to the working resolution: RGB values in [0, 1]
/// in row-major HWC order, plus a per-pixel road flag.
#[derive(Clone, Debug)]
pub struct RoadSceneItem {
    pub image: Vec<f32>,
    pub road: Vec<bool>,
}

/// KITTI road ground truth marks background pixels pure red; every other
/// color is drivable road.
pub(crate) fn road_mask(gt: &RgbImage) -> Vec<bool> {
    gt.pixels()
        .map(|p| !(p.0[0] == 255 && p.0[1] == 0 && p.0[2] == 0))
        .collect()
}

struct DecodeRoadScene {
    image_size: [usize; 2],
}

impl Mapper<RoadSceneRaw, RoadSceneItem> for DecodeRoadScene {
    fn map(&self, item: &RoadSceneRaw) -> RoadSceneItem {
        let [height, width] = self.image_size;

        let image = image::open(&item.image_path)
            .unwrap_or_else(|e| panic!("unable to decode {:?}: {e}", item.image_path))
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .into_rgb8();

        // Nearest neighbour for labels so no new colors are invented.
        let gt = image::open(&item.gt_path)
            .unwrap_or_else(|e| panic!("unable to decode {:?}: {e}", item.gt_path))
            .resize_exact(width as u32, height as u32, FilterType::Nearest)
            .into_rgb8();

        RoadSceneItem {
            image: image.into_raw().iter().map(|&v| v as f32 / 255.0).collect(),
            road: road_mask(&gt),
        }
    }
}

type RoadDatasetMapper = MapperDataset<InMemDataset<RoadSceneRaw>, DecodeRoadScene, RoadSceneRaw>;

/// Lazy-decoding dataset over a KITTI `data_road/training` directory, with
/// `image_2/` camera frames paired against `gt_image_2/` road annotations.
pub struct RoadDataset {
    dataset: RoadDatasetMapper,
}

impl Dataset<RoadSceneItem> for RoadDataset {
    fn get(&self, index: usize) -> Option<RoadSceneItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

/// Derive the camera-frame file name belonging to a road ground-truth file,
/// e.g. `um_road_000042.png` -> `um_000042.png`.
pub(crate) fn image_name_for_gt(gt_name: &str) -> Option<String> {
    gt_name.contains("_road_").then(|| gt_name.replacen("_road", "", 1))
}

impl RoadDataset {
    pub fn from_kitti_root<P: AsRef<Path>>(
        root: P,
        image_size: [usize; 2],
    ) -> Result<Self, DatasetError> {
        let root = root.as_ref();
        let images_dir = root.join("image_2");
        let gt_dir = root.join("gt_image_2");

        for dir in [&images_dir, &gt_dir] {
            if !dir.is_dir() {
                return Err(DatasetError::IOError(format!(
                    "directory does not exist: {dir:?}"
                )));
            }
        }

        let mut items = Vec::new();
        let entries = std::fs::read_dir(&gt_dir).map_err(|e| DatasetError::IOError(e.to_string()))?;

        for entry in entries {
            let entry = entry.map_err(|e| DatasetError::IOError(e.to_string()))?;
            let gt_path = entry.path();

            let Some(gt_name) = gt_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(image_name) = image_name_for_gt(gt_name) else {
                continue;
            };

            let image_path = images_dir.join(image_name);
            if image_path.is_file() {
                items.push(RoadSceneRaw {
                    image_path,
                    gt_path,
                });
            }
        }

        if items.is_empty() {
            return Err(DatasetError::NoSamples(root.to_path_buf()));
        }

        items.sort_by(|a, b| a.image_path.cmp(&b.image_path));
        tracing::info!(samples = items.len(), root = ?root, "indexed road dataset");

        let dataset = InMemDataset::new(items);
        let mapper = DecodeRoadScene { image_size };

        Ok(Self {
            dataset: MapperDataset::new(dataset, mapper),
        })
    }
}
