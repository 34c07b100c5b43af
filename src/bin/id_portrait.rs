use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use id_portrait::api::portrait_api::{
    ExtractPortraitsResult, RustCropOptions, RustDetectorModelPaths, RustPortraitRuntimeConfig,
    RustSelectionMode, active_portrait_detector, extract_portraits_from_path,
    release_portrait_runtime,
};
use log::{info, warn};

/// Extract portrait crops from a scanned ID card image.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// ID card image (JPEG, PNG or WEBP).
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the portraits are written to.
    #[arg(short, long, default_value = "portraits")]
    output_dir: PathBuf,

    /// YOLO-face ONNX model; preferred when it loads.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// SeetaFace cascade model, used when no neural model is available.
    #[arg(long)]
    cascade_model: Option<PathBuf>,

    /// Minimum detector confidence (0-1).
    #[arg(long, default_value_t = 0.6)]
    min_confidence: f64,

    /// Extra border around each face, as a percentage of the face box.
    #[arg(long, default_value_t = 10.0)]
    margin: f64,

    /// Return only the largest face or all of them.
    #[arg(long, value_enum, default_value_t = Mode::Largest)]
    mode: Mode,

    /// Cap on the number of portraits in `all` mode.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    max_faces: u32,

    /// JPEG quality for written portraits (1-100).
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Skip writing the annotated detections image.
    #[arg(long)]
    no_overlay: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Largest,
    All,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if args.model.is_none() && args.cascade_model.is_none() {
        return Err(anyhow!(
            "no face detection model given; pass --model and/or --cascade-model"
        ));
    }

    let runtime = RustPortraitRuntimeConfig {
        model_paths: RustDetectorModelPaths {
            neural_model_path: path_string(args.model.as_deref()),
            cascade_model_path: path_string(args.cascade_model.as_deref()),
        },
        ..Default::default()
    };
    let options = RustCropOptions {
        min_confidence: args.min_confidence,
        margin_pct: args.margin,
        mode: match args.mode {
            Mode::Largest => RustSelectionMode::LargestOnly,
            Mode::All => RustSelectionMode::AllFaces,
        },
        max_faces: args.max_faces,
        jpeg_quality: args.jpeg_quality,
        render_overlay: !args.no_overlay,
    };

    let input = args.input.to_string_lossy().into_owned();
    let result = extract_portraits_from_path(input, options, runtime)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("failed to extract portraits from {}", args.input.display()))?;
    if let Some(backend) = active_portrait_detector() {
        info!("releasing {backend} detector runtime");
    }
    release_portrait_runtime().map_err(|e| anyhow!(e))?;

    write_outputs(&result, &args.output_dir)
}

fn write_outputs(result: &ExtractPortraitsResult, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    if let Some(overlay) = &result.overlay_jpeg {
        write_file(&output_dir.join("detections.jpg"), overlay)?;
    }

    if result.no_faces_found {
        warn!(
            "{}",
            result.message.as_deref().unwrap_or("No faces detected.")
        );
        return Ok(());
    }

    for (index, portrait) in result.portraits.iter().enumerate() {
        write_file(&output_dir.join(format!("portrait_{index}.jpg")), &portrait.jpeg)?;
    }
    if let Some(main) = result.main_portrait() {
        write_file(&output_dir.join("portrait_main.jpg"), &main.jpeg)?;
        info!(
            "main portrait at ({}, {}) {}x{}, score {:.2}",
            main.crop_box.x, main.crop_box.y, main.crop_box.width, main.crop_box.height, main.score
        );
    }

    info!(
        "{} wrote {} portrait(s) from {}x{} image to {}",
        result.detector,
        result.portraits.len(),
        result.decoded_image_size.width,
        result.decoded_image_size.height,
        output_dir.display()
    );
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn path_string(path: Option<&Path>) -> String {
    path.map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
}
