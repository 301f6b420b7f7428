use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

use opencv::core::Vector;
use opencv::imgcodecs::imwrite;
use rusted_pipe::channels::read_channel::InputGenerator;
use rusted_pipe::channels::typed_read_channel::ReadChannel1;
use rusted_pipe::graph::processor::TerminalProcessor;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error, info};

use super::region_extractor::Region;
use super::PlateEvent;
use crate::Result;

/// Publishes plate events: matched plates go to stdout, cropped regions to
/// an optional directory of PNG files.
pub struct PlateEventSink {
    id: String,
    crop_dir: Option<PathBuf>,
}

impl PlateEventSink {
    pub fn new(crop_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &crop_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            id: "PlateEventSink".to_string(),
            crop_dir,
        })
    }

    /// Handles the events of one batch and returns the published plates.
    pub fn publish(&self, timestamp_ns: impl Display, events: &[PlateEvent]) -> Vec<String> {
        let mut published = vec![];
        for event in events {
            match event {
                PlateEvent::CroppedRegion {
                    detection_index,
                    region,
                } => self.publish_cropped_region(&timestamp_ns, *detection_index, region),
                PlateEvent::MatchedPlate { plate, .. } => {
                    println!("{plate}");
                    info!("Published matched number plate text: {}", plate);
                    published.push(plate.clone());
                }
            }
        }
        published
    }

    fn publish_cropped_region(
        &self,
        timestamp_ns: &dyn Display,
        detection_index: usize,
        region: &Region,
    ) {
        let Some(dir) = &self.crop_dir else {
            debug!(
                "Cropped region {}x{} for detection {} of batch {}",
                region.width(),
                region.height(),
                detection_index,
                timestamp_ns
            );
            return;
        };

        let path = dir.join(crop_file_name(timestamp_ns, detection_index));
        match imwrite(&path.to_string_lossy(), region.image(), &Vector::<i32>::new()) {
            Ok(true) => info!("Published cropped image {}", path.display()),
            Ok(false) => error!("OpenCV refused to write {}", path.display()),
            Err(err) => error!("Cannot write {}: {}", path.display(), err),
        }
    }
}

fn crop_file_name(timestamp_ns: &dyn Display, detection_index: usize) -> String {
    format!("plate_{timestamp_ns}_{detection_index}.png")
}

impl TerminalProcessor for PlateEventSink {
    type INPUT = ReadChannel1<Vec<PlateEvent>>;
    fn handle(
        &mut self,
        mut input: <Self::INPUT as InputGenerator>::INPUT,
    ) -> std::result::Result<(), RustedPipeError> {
        if let Some(events) = input.c1_owned() {
            self.publish(events.version.timestamp_ns, &events.data);
        }
        Ok(())
    }

    fn id(&self) -> &String {
        &self.id
    }
}
