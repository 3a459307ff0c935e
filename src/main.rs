use std::path::Path;

use anyhow::{Context, Result, ensure};

use burn::{
    backend::{Autodiff, Wgpu, wgpu::WgpuDevice},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::AdamConfig,
    prelude::*,
    record::CompactRecorder,
};

use road_fcn::inference::save_inference_samples;
use road_fcn::training::{TrainingConfig, train};
use road_fcn::dataset::NUM_CLASSES;
use road_fcn::{FcnModelConfig, RoadBatcher, RoadDataset};

/// KITTI road frames are cropped/resized to this working resolution.
const IMAGE_SHAPE: [usize; 2] = [160, 576];
const EPOCHS: usize = 50;
const BATCH_SIZE: usize = 5;
const LEARNING_RATE: f64 = 1e-4;
const SEED: u64 = 42;

const DATA_DIR: &str = "data";
const RUNS_DIR: &str = "runs";
const MODEL_NAME: &str = "road-fcn-kitti";

/// Warning to emit for a given resolved adapter, or `None` when a real GPU
/// is available. Absence of a GPU is never fatal.
fn cpu_fallback_warning(adapter: Option<(wgpu::DeviceType, String)>) -> Option<String> {
    match adapter {
        Some((device_type, _)) if device_type != wgpu::DeviceType::Cpu => None,
        Some((_, name)) => Some(format!(
            "only a CPU adapter is available ({name}); training will be slow"
        )),
        None => Some("no wgpu adapter found; training will run on the CPU".to_string()),
    }
}

/// Ask wgpu which adapter the default options resolve to, the same lazy
/// selection the backend performs, and warn when it is not a GPU.
fn probe_gpu() {
    let instance = wgpu::Instance::default();
    let adapter =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()));
    let adapter = adapter.map(|a| {
        let info = a.get_info();
        (info.device_type, info.name)
    });

    match cpu_fallback_warning(adapter) {
        Some(warning) => tracing::warn!("{warning}"),
        None => println!("GPU adapter found"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    println!("road-fcn {}", road_fcn::VERSION);

    probe_gpu();

    let device = WgpuDevice::default();
    MyAutodiffBackend::seed(SEED);

    let data_dir = Path::new(DATA_DIR);
    ensure!(
        data_dir.is_dir(),
        "data directory {DATA_DIR:?} does not exist; place the KITTI road dataset and the vgg backbone under it"
    );

    let training_dir = data_dir.join("data_road/training");
    println!("Loading training dataset from {}...", training_dir.display());
    let dataset = RoadDataset::from_kitti_root(&training_dir, IMAGE_SHAPE)
        .context("failed to load the KITTI road training set")?;

    let vgg_dir = data_dir.join("vgg");
    println!("Loading pretrained backbone from {}...", vgg_dir.display());
    let model = FcnModelConfig::new()
        .with_num_classes(NUM_CLASSES)
        .init_with_pretrained::<MyAutodiffBackend>(&vgg_dir, &device)
        .context("failed to load the pretrained backbone")?;

    let batcher = RoadBatcher::<MyAutodiffBackend>::new(device.clone(), IMAGE_SHAPE);
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(BATCH_SIZE)
        .shuffle(SEED)
        .build(dataset);

    let config = TrainingConfig::new(AdamConfig::new())
        .with_epochs(EPOCHS)
        .with_batch_size(BATCH_SIZE)
        .with_learning_rate(LEARNING_RATE);

    println!("Training....\n");
    let (model, summary) = train(model, loader, &config, &device);
    println!(
        "Finished {} optimizer steps over {} epochs",
        summary.total_steps(),
        summary.epochs.len()
    );

    std::fs::create_dir_all(RUNS_DIR)?;
    model
        .clone()
        .save_file(format!("{RUNS_DIR}/{MODEL_NAME}"), &CompactRecorder::new())
        .context("failed to save the trained checkpoint")?;
    println!("Saved checkpoint to {RUNS_DIR}/{MODEL_NAME}");

    // Dropout must be inert for inference, hence the valid() copy.
    let out_dir = save_inference_samples(
        Path::new(RUNS_DIR),
        data_dir,
        &model.valid(),
        IMAGE_SHAPE,
        &device,
    )
    .context("failed to write inference samples")?;
    println!("Wrote inference overlays to {}", out_dir.display());

    Ok(())
}
