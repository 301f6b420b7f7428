//! Process wide counters for the plate reader graph.
//!
//! Counters are always incremented; they are only exported once
//! [`register_metrics`] has added them to [`REGISTRY`].

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::Result;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FRAMES_RECEIVED: IntCounter = counter(
        "plate_reader_frames_received_total",
        "Frames stored in the frame cache"
    );
    pub static ref FRAMES_REJECTED: IntCounter = counter(
        "plate_reader_frames_rejected_total",
        "Frames that could not be converted to BGR"
    );
    pub static ref BATCHES_RECEIVED: IntCounter = counter(
        "plate_reader_batches_received_total",
        "Detection batches handed to the pipeline"
    );
    pub static ref BATCHES_WITHOUT_FRAME: IntCounter = counter(
        "plate_reader_batches_without_frame_total",
        "Detection batches dropped because no frame was cached"
    );
    pub static ref REGIONS_CROPPED: IntCounter = counter(
        "plate_reader_regions_cropped_total",
        "Plate regions cropped from a frame"
    );
    pub static ref REGIONS_OUT_OF_BOUNDS: IntCounter = counter(
        "plate_reader_regions_out_of_bounds_total",
        "Plate detections whose box does not fit the frame"
    );
    pub static ref RECOGNITION_FAILURES: IntCounter = counter(
        "plate_reader_recognition_failures_total",
        "Text recognizer errors"
    );
    pub static ref PLATES_MATCHED: IntCounter = counter(
        "plate_reader_plates_matched_total",
        "Recognized plates that matched the registry"
    );
}

fn counter(name: &str, help: &str) -> IntCounter {
    // Names are static and valid, creation cannot fail.
    IntCounter::new(name, help).expect("valid metric name")
}

pub fn register_metrics() -> Result<()> {
    for metric in [
        &*FRAMES_RECEIVED,
        &*FRAMES_REJECTED,
        &*BATCHES_RECEIVED,
        &*BATCHES_WITHOUT_FRAME,
        &*REGIONS_CROPPED,
        &*REGIONS_OUT_OF_BOUNDS,
        &*RECOGNITION_FAILURES,
        &*PLATES_MATCHED,
    ] {
        REGISTRY.register(Box::new(metric.clone()))?;
    }
    Ok(())
}

/// Renders the registered counters in the prometheus text format.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
