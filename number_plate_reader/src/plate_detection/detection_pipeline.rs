use std::sync::Arc;

use opencv::prelude::Mat;
use tracing::{debug, error, info, warn};

use super::frame::Frame;
use super::frame_cache::FrameCache;
use super::plate_matcher::best_match;
use super::region_extractor;
use super::text_recognizer::TextRecognizer;
use super::{Detection, PlateEvent};
use crate::config::PipelineConfig;
use crate::metrics;
use crate::{PlateReaderError, Result};

/// Plate detections of a batch that were dropped, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkippedDetections {
    pub out_of_bounds: usize,
    pub extraction_errors: usize,
    pub recognition_failures: usize,
}

/// Outcome of one detection batch.
#[derive(Debug, Clone)]
pub enum BatchReport {
    /// Detections arrived before the first frame, nothing was processed.
    NoFrameAvailable,
    Processed {
        events: Vec<PlateEvent>,
        skipped: SkippedDetections,
    },
}

impl BatchReport {
    pub fn events(&self) -> &[PlateEvent] {
        match self {
            BatchReport::NoFrameAvailable => &[],
            BatchReport::Processed { events, .. } => events,
        }
    }

    pub fn into_events(self) -> Vec<PlateEvent> {
        match self {
            BatchReport::NoFrameAvailable => vec![],
            BatchReport::Processed { events, .. } => events,
        }
    }
}

/// Fuses the frame stream with the detection stream.
///
/// Frames only refresh the cache. Every detection batch is matched against
/// a single snapshot of the latest frame: plate detections are cropped,
/// read by the recognizer and scored against the registry. Failures stay
/// local to the detection that caused them.
pub struct DetectionPipeline {
    config: PipelineConfig,
    frames: FrameCache,
    recognizer: Box<dyn TextRecognizer>,
    latest_detections: Vec<Detection>,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            config,
            frames: FrameCache::new(),
            recognizer,
            latest_detections: vec![],
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn frame_cache(&self) -> &FrameCache {
        &self.frames
    }

    pub fn latest_detections(&self) -> &[Detection] {
        &self.latest_detections
    }

    /// Caches a new frame. A frame that cannot be converted leaves the
    /// cache untouched.
    pub fn on_frame(&self, image: Mat) -> Result<()> {
        match Frame::from_mat(image) {
            Ok(frame) => {
                debug!("Frame {}x{} cached", frame.width(), frame.height());
                self.frames.store(frame);
                metrics::FRAMES_RECEIVED.inc();
                Ok(())
            }
            Err(err) => {
                metrics::FRAMES_REJECTED.inc();
                Err(err)
            }
        }
    }

    pub fn on_detections(&mut self, detections: &[Detection]) -> BatchReport {
        metrics::BATCHES_RECEIVED.inc();
        self.latest_detections = detections.to_vec();

        let Some(frame) = self.frames.snapshot() else {
            warn!(
                "{}, dropping {} detections",
                PlateReaderError::NoFrameAvailable,
                detections.len()
            );
            metrics::BATCHES_WITHOUT_FRAME.inc();
            return BatchReport::NoFrameAvailable;
        };

        let mut events = vec![];
        let mut skipped = SkippedDetections::default();
        for (index, detection) in detections.iter().enumerate() {
            self.process_detection(&frame, index, detection, &mut events, &mut skipped);
        }

        BatchReport::Processed { events, skipped }
    }

    fn process_detection(
        &mut self,
        frame: &Arc<Frame>,
        index: usize,
        detection: &Detection,
        events: &mut Vec<PlateEvent>,
        skipped: &mut SkippedDetections,
    ) {
        if detection.class_id != self.config.plate_class_id {
            return;
        }

        let region = match region_extractor::extract(frame, &detection.bbox) {
            Ok(region) => region,
            Err(err @ PlateReaderError::OutOfBounds { .. }) => {
                warn!("Skipping detection {}: {}", index, err);
                metrics::REGIONS_OUT_OF_BOUNDS.inc();
                skipped.out_of_bounds += 1;
                return;
            }
            Err(err) => {
                error!("Cannot crop detection {}: {}", index, err);
                skipped.extraction_errors += 1;
                return;
            }
        };
        metrics::REGIONS_CROPPED.inc();

        let recognized = self.recognizer.recognize(&region);
        events.push(PlateEvent::CroppedRegion {
            detection_index: index,
            region,
        });

        let candidates = match recognized {
            Ok(candidates) => candidates,
            Err(err) => {
                error!("OCR failed on detection {}: {}", index, err);
                metrics::RECOGNITION_FAILURES.inc();
                skipped.recognition_failures += 1;
                return;
            }
        };
        let Some(candidate) = candidates.into_iter().next() else {
            debug!("No text on detection {}", index);
            return;
        };

        let result = best_match(&candidate.text, &self.config.registry);
        match result.matched_plate {
            Some(plate) if result.similarity >= self.config.similarity_threshold => {
                info!(
                    "OCR result {:?} matched {} ({:.2})",
                    candidate.text, plate, result.similarity
                );
                metrics::PLATES_MATCHED.inc();
                events.push(PlateEvent::MatchedPlate {
                    detection_index: index,
                    plate,
                    similarity: result.similarity,
                    recognized_text: candidate.text,
                });
            }
            _ => debug!(
                "OCR result {:?} below threshold ({:.2})",
                candidate.text, result.similarity
            ),
        }
    }
}
