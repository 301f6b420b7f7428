use std::fmt::Display;

use opencv::prelude::Mat;
use rusted_pipe::channels::read_channel::InputGenerator;
use rusted_pipe::channels::typed_read_channel::ReadChannel2;
use rusted_pipe::channels::typed_write_channel::WriteChannel1;
use rusted_pipe::graph::processor::Processor;
use rusted_pipe::graph::processor::ProcessorWriter;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error};

use super::detection_pipeline::{BatchReport, DetectionPipeline};
use super::{Detection, PlateEvent};

/// Graph node hosting the [`DetectionPipeline`].
///
/// Channel 1 carries frames, channel 2 detection batches. The node should
/// use a synchronizer that does not wait for both channels so each stream
/// is handled as it arrives.
pub struct PlateReaderNode {
    id: String,
    pipeline: DetectionPipeline,
}

impl PlateReaderNode {
    pub fn new(pipeline: DetectionPipeline) -> Self {
        Self {
            id: "PlateReader".to_string(),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    /// Caches `image` as the latest frame. A rejected image leaves the
    /// previous frame in place and returns false.
    fn accept_frame(&self, timestamp_ns: impl Display, image: Mat) -> bool {
        match self.pipeline.on_frame(image) {
            Ok(()) => {
                debug!("Frame {} cached", timestamp_ns);
                true
            }
            Err(err) => {
                error!("Frame {} rejected, keeping the previous one: {}", timestamp_ns, err);
                false
            }
        }
    }
}

unsafe impl Send for PlateReaderNode {}
unsafe impl Sync for PlateReaderNode {}

impl Processor for PlateReaderNode {
    type INPUT = ReadChannel2<Mat, Vec<Detection>>;
    type OUTPUT = WriteChannel1<Vec<PlateEvent>>;
    fn handle(
        &mut self,
        mut input: <Self::INPUT as InputGenerator>::INPUT,
        mut output: ProcessorWriter<Self::OUTPUT>,
    ) -> Result<(), RustedPipeError> {
        // Frames first, a batch delivered together with a frame reads it.
        if let Some(image) = input.c1_owned() {
            self.accept_frame(image.version.timestamp_ns, image.data);
        }

        let Some(detections) = input.c2_owned() else {
            return Ok(());
        };

        let report = self.pipeline.on_detections(&detections.data);
        if let BatchReport::Processed { skipped, .. } = &report {
            debug!(
                "Batch {} processed, skipped {:?}",
                detections.version.timestamp_ns, skipped
            );
        }

        let events = report.into_events();
        if events.is_empty() {
            return Ok(());
        }
        if output
            .writer
            .c1()
            .write(events, &detections.version)
            .is_err()
        {
            error!("Cannot forward plate events of batch {}", detections.version.timestamp_ns);
        }

        Ok(())
    }

    fn id(&self) -> &String {
        &self.id
    }
}
