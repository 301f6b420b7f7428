use opencv::core::Rect;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::core::CV_32F;
use opencv::dnn;
use opencv::dnn::blob_from_image;
use opencv::dnn::nms_boxes;
use opencv::dnn::Net;
use opencv::dnn::DNN_BACKEND_CUDA;
use opencv::dnn::DNN_BACKEND_OPENCV;
use opencv::dnn::DNN_TARGET_CPU;
use opencv::dnn::DNN_TARGET_CUDA;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::NetTrait;
use opencv::prelude::NetTraitConst;
use rusted_pipe::channels::read_channel::InputGenerator;
use rusted_pipe::channels::typed_read_channel::ReadChannel1;
use rusted_pipe::channels::typed_write_channel::WriteChannel1;
use rusted_pipe::graph::processor::Processor;
use rusted_pipe::graph::processor::ProcessorWriter;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error};

use super::{BoundingBox, Detection};
use crate::Result;

const CLASS_SCORE_THRESHOLD: f32 = 0.25;
const NMS_SCORE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.4;

/// One YOLOv5 proposal scaled to frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Proposal {
    confidence: f32,
    bbox: BoundingBox,
}

/// Turns a YOLOv5 proposal row `[cx, cy, w, h, objectness, plate_score]`
/// from network input space to frame space.
fn decode_proposal(
    row: [f32; 6],
    x_factor: f32,
    y_factor: f32,
    confidence_threshold: f32,
) -> Option<Proposal> {
    let [cx, cy, w, h, confidence, class_score] = row;
    if confidence <= confidence_threshold || class_score <= CLASS_SCORE_THRESHOLD {
        return None;
    }
    Some(Proposal {
        confidence,
        bbox: BoundingBox::new(cx * x_factor, cy * y_factor, w * x_factor, h * y_factor),
    })
}

/// Number of proposals of a three scale YOLOv5 head.
fn proposal_count(input_size: i32) -> i32 {
    [8, 16, 32]
        .iter()
        .map(|stride| 3 * (input_size / stride) * (input_size / stride))
        .sum()
}

/// Single class YOLOv5 plate detector. Every detection it emits is labelled
/// with the configured plate class id.
pub struct PlateDetector {
    id: String,
    classifier: Net,
    input_size: i32,
    confidence_threshold: f32,
    plate_class_id: i32,
}

impl PlateDetector {
    pub fn new(
        model: &str,
        input_size: i32,
        confidence_threshold: f32,
        plate_class_id: i32,
        use_gpu: bool,
    ) -> Result<Self> {
        let mut classifier = dnn::read_net_from_onnx(model)?;

        if use_gpu {
            classifier.set_preferable_backend(DNN_BACKEND_CUDA)?;
            classifier.set_preferable_target(DNN_TARGET_CUDA)?;
        } else {
            classifier.set_preferable_backend(DNN_BACKEND_OPENCV)?;
            classifier.set_preferable_target(DNN_TARGET_CPU)?;
        }

        Ok(Self {
            id: "PlateDetector".to_string(),
            classifier,
            input_size,
            confidence_threshold,
            plate_class_id,
        })
    }

    fn detect(&mut self, image: &Mat) -> Result<Vec<Detection>> {
        let mut blob = blob_from_image(
            image,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;
        self.classifier
            .set_input(&mut blob, "", 1.0, Scalar::default())?;

        let output_names = self.classifier.get_unconnected_out_layers_names()?;
        let mut outputs = Vector::<Mat>::default();
        self.classifier.forward(&mut outputs, &output_names)?;

        let x_factor = image.cols() as f32 / self.input_size as f32;
        let y_factor = image.rows() as f32 / self.input_size as f32;

        let mut proposals = vec![];
        for data in &outputs {
            for j in 0..proposal_count(self.input_size) {
                let mut row = [0f32; 6];
                for (k, value) in row.iter_mut().enumerate() {
                    *value = *data.at_3d::<f32>(0, j, k as i32)?;
                }
                proposals.extend(decode_proposal(
                    row,
                    x_factor,
                    y_factor,
                    self.confidence_threshold,
                ));
            }
        }

        let mut boxes = Vector::<Rect>::default();
        let mut confidences = Vector::<f32>::default();
        for proposal in &proposals {
            let [x1, y1, x2, y2] = proposal.bbox.corners();
            boxes.push(Rect::new(x1, y1, x2 - x1, y2 - y1));
            confidences.push(proposal.confidence);
        }

        let mut indices = Vector::<i32>::default();
        nms_boxes(
            &boxes,
            &confidences,
            NMS_SCORE_THRESHOLD,
            NMS_THRESHOLD,
            &mut indices,
            1.0,
            0,
        )?;

        Ok(indices
            .iter()
            .filter_map(|i| proposals.get(i as usize))
            .map(|proposal| Detection::new(self.plate_class_id, proposal.bbox))
            .collect())
    }
}

unsafe impl Send for PlateDetector {}
unsafe impl Sync for PlateDetector {}

impl Processor for PlateDetector {
    type INPUT = ReadChannel1<Mat>;
    type OUTPUT = WriteChannel1<Vec<Detection>>;
    fn handle(
        &mut self,
        input: <Self::INPUT as InputGenerator>::INPUT,
        mut output: ProcessorWriter<Self::OUTPUT>,
    ) -> std::result::Result<(), RustedPipeError> {
        let Some(image_packet) = input.c1() else {
            return Ok(());
        };

        let detections = match self.detect(&image_packet.data) {
            Ok(detections) => detections,
            Err(err) => {
                error!("Plate detection failed: {}", err);
                vec![]
            }
        };
        debug!(
            "Plate detection {}: {} plates",
            image_packet.version.timestamp_ns,
            detections.len()
        );

        if output
            .writer
            .c1()
            .write(detections, &image_packet.version)
            .is_err()
        {
            error!("Cannot forward detections {}", image_packet.version.timestamp_ns);
        }
        Ok(())
    }

    fn id(&self) -> &String {
        &self.id
    }
}
