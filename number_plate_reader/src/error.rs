use thiserror::Error;

use crate::plate_detection::BoundingBox;

#[derive(Debug, Error)]
pub enum PlateReaderError {
    #[error("cannot convert frame to 8-bit BGR: {0}")]
    FrameConversion(String),

    #[error("bounding box {bbox:?} does not overlap the {width}x{height} frame")]
    OutOfBounds {
        bbox: BoundingBox,
        width: i32,
        height: i32,
    },

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("no frame available for the detection batch")]
    NoFrameAvailable,

    #[error("cannot initialise tesseract for language '{language}': {reason}")]
    TesseractInit { language: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, PlateReaderError>;
