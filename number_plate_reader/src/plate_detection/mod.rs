pub mod detection_pipeline;
pub mod event_sink;
pub mod frame;
pub mod frame_cache;
pub mod plate_detector;
pub mod plate_matcher;
pub mod plate_reader_node;
pub mod region_extractor;
pub mod text_recognizer;
pub mod video_reader;

use region_extractor::Region;

/// Axis aligned box expressed by its center and size, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }

    /// Rounded `[x1, y1, x2, y2]` corners, not clamped to any frame.
    pub fn corners(&self) -> [i32; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        [
            (self.center_x - half_w).round() as i32,
            (self.center_y - half_h).round() as i32,
            (self.center_x + half_w).round() as i32,
            (self.center_y + half_h).round() as i32,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: i32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: i32, bbox: BoundingBox) -> Self {
        Self { class_id, bbox }
    }
}

/// Output of the plate reader, one per cropped region or registry match.
#[derive(Debug, Clone)]
pub enum PlateEvent {
    CroppedRegion {
        detection_index: usize,
        region: Region,
    },
    MatchedPlate {
        detection_index: usize,
        plate: String,
        similarity: f64,
        recognized_text: String,
    },
}

impl PlateEvent {
    pub fn matched_plate(&self) -> Option<&str> {
        match self {
            PlateEvent::MatchedPlate { plate, .. } => Some(plate),
            PlateEvent::CroppedRegion { .. } => None,
        }
    }

    pub fn region(&self) -> Option<&Region> {
        match self {
            PlateEvent::CroppedRegion { region, .. } => Some(region),
            PlateEvent::MatchedPlate { .. } => None,
        }
    }
}
