use clap::Parser;

use crate::plate_detection::plate_matcher::PlateRegistry;
use crate::{PlateReaderError, Result};

/// Class id the upstream detector assigns to licence plates.
pub const PLATE_CLASS_ID: i32 = 3;
/// Minimum similarity for a recognized text to count as a registry match.
pub const SIMILARITY_THRESHOLD: f64 = 0.35;
pub const KNOWN_PLATES: [&str; 3] = ["MC-RL04", "AB-1234", "XYZ-7890"];

/// Settings consumed by the detection pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub plate_class_id: i32,
    pub similarity_threshold: f64,
    pub registry: PlateRegistry,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plate_class_id: PLATE_CLASS_ID,
            similarity_threshold: SIMILARITY_THRESHOLD,
            registry: PlateRegistry::new(KNOWN_PLATES),
        }
    }
}

impl PipelineConfig {
    pub fn new(
        plate_class_id: i32,
        similarity_threshold: f64,
        registry: PlateRegistry,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(PlateReaderError::InvalidConfig(format!(
                "similarity threshold {similarity_threshold} is outside [0, 1]"
            )));
        }
        if registry.iter().any(|plate| plate.trim().is_empty()) {
            return Err(PlateReaderError::InvalidConfig(
                "known plates cannot be blank".to_string(),
            ));
        }

        Ok(Self {
            plate_class_id,
            similarity_threshold,
            registry,
        })
    }
}

/// Command line of the `plate_reader` binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "Reads licence plates from a video and matches them against known plates", long_about = None)]
pub struct Args {
    /// Video file or camera URL opened with OpenCV
    #[arg(long, value_name = "SOURCE")]
    pub video: String,

    /// Restart the video when it ends
    #[arg(long)]
    pub loop_video: bool,

    /// Frames per second read from the video
    #[arg(long, default_value_t = 20)]
    pub fps: u64,

    /// ONNX plate detector model
    #[arg(long, value_name = "FILE", default_value = "models/plate_best.onnx")]
    pub detector_model: String,

    /// Square input size of the detector network
    #[arg(long, default_value_t = 640)]
    pub detector_input_size: i32,

    /// Minimum objectness for a detector proposal
    #[arg(long, default_value_t = 0.4)]
    pub detector_confidence: f32,

    /// Run the detector on CUDA
    #[arg(long)]
    pub use_gpu: bool,

    /// Tesseract data directory
    #[arg(long, value_name = "DIR", default_value = "models")]
    pub tessdata: String,

    /// Tesseract language (traineddata name)
    #[arg(long, default_value = "eng")]
    pub ocr_language: String,

    /// Read the whole crop instead of cutting the plate frame off first
    #[arg(long)]
    pub ocr_no_trim: bool,

    /// Sharpen plate crops before reading them
    #[arg(long)]
    pub ocr_deblur: bool,

    /// Detector class id of licence plates
    #[arg(long, default_value_t = PLATE_CLASS_ID)]
    pub plate_class_id: i32,

    /// Similarity needed to report a match (0.0 - 1.0)
    #[arg(long, default_value_t = SIMILARITY_THRESHOLD)]
    pub threshold: f64,

    /// Known plate, may be repeated. Defaults to the built in registry
    #[arg(long = "known-plate", value_name = "PLATE")]
    pub known_plates: Vec<String>,

    /// Directory receiving the cropped plate images
    #[arg(long, value_name = "DIR")]
    pub crop_dir: Option<String>,

    /// Stop after this many seconds, 0 runs until Ctrl-C
    #[arg(long, default_value_t = 0)]
    pub run_for_secs: u64,

    /// Pyroscope server receiving CPU profiles
    #[arg(long, value_name = "URL")]
    pub pyroscope_url: Option<String>,
}

impl Args {
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let registry = if self.known_plates.is_empty() {
            PlateRegistry::new(KNOWN_PLATES)
        } else {
            PlateRegistry::new(self.known_plates.iter())
        };
        PipelineConfig::new(self.plate_class_id, self.threshold, registry)
    }
}
