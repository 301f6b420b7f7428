use std::time::Duration;
use std::time::Instant;

use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use rusted_pipe::channels::typed_write_channel::WriteChannel1;
use rusted_pipe::graph::processor::ProcessorWriter;
use rusted_pipe::graph::processor::SourceProcessor;
use rusted_pipe::DataVersion;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error, info};

use crate::{PlateReaderError, Result};

/// Source node reading BGR frames from a video file or camera URL.
pub struct VideoReader {
    source: String,
    capture: VideoCapture,
    fps_control: Instant,
    fps_wait: Duration,
    do_loop: bool,
}

fn open_capture(source: &str) -> Result<VideoCapture> {
    let capture = VideoCapture::from_file(source, CAP_ANY)?;
    if !capture.is_opened()? {
        return Err(PlateReaderError::InvalidConfig(format!(
            "cannot open video source {source}"
        )));
    }
    Ok(capture)
}

impl VideoReader {
    pub fn new(source: &str, fps: u64, do_loop: bool) -> Result<Self> {
        if fps == 0 {
            return Err(PlateReaderError::InvalidConfig(
                "fps must be positive".to_string(),
            ));
        }

        Ok(Self {
            source: source.to_string(),
            capture: open_capture(source)?,
            fps_control: Instant::now(),
            fps_wait: Duration::from_millis(1000 / fps),
            do_loop,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image)?;
        if grabbed && !image.empty() {
            return Ok(Some(image));
        }
        if !self.do_loop {
            return Ok(None);
        }

        info!("Restarting {}", self.source);
        self.capture = open_capture(&self.source)?;
        let grabbed = self.capture.read(&mut image)?;
        Ok((grabbed && !image.empty()).then_some(image))
    }
}

impl SourceProcessor for VideoReader {
    type OUTPUT = WriteChannel1<Mat>;
    fn handle(
        &mut self,
        mut output: ProcessorWriter<Self::OUTPUT>,
    ) -> std::result::Result<(), RustedPipeError> {
        let image = match self.read_frame() {
            Ok(Some(image)) => image,
            Ok(None) => return Err(RustedPipeError::EndOfStream()),
            Err(err) => {
                error!("Cannot read {}: {}", self.source, err);
                return Err(RustedPipeError::EndOfStream());
            }
        };

        let frame_ts = DataVersion::from_now();
        debug!("Frame {}", frame_ts.timestamp_ns);
        if output.writer.c1().write(image, &frame_ts).is_err() {
            error!("Cannot forward frame {}", frame_ts.timestamp_ns);
        }

        let elapsed = self.fps_control.elapsed();
        if self.fps_wait > elapsed {
            spin_sleep::sleep(self.fps_wait - elapsed);
        }

        self.fps_control = Instant::now();
        Ok(())
    }
}

unsafe impl Send for VideoReader {}
unsafe impl Sync for VideoReader {}
