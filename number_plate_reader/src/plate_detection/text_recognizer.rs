use std::ffi::CString;

use leptess::tesseract::TessApi;
use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::BORDER_DEFAULT;
use opencv::imgproc::cvt_color;
use opencv::imgproc::filter_2d;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tracing::debug;

use super::region_extractor::Region;
use crate::{PlateReaderError, Result};

const PLATE_CHARACTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";
/// Tesseract page segmentation mode for a single text line.
const SINGLE_LINE_SEGMENTATION: &str = "7";

#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub confidence: Option<f32>,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Extracts text candidates from a cropped plate, best candidate first.
pub trait TextRecognizer {
    fn recognize(&mut self, region: &Region) -> Result<Vec<TextCandidate>>;
}

/// Tesseract backed recognizer tuned for single line plates.
pub struct TesseractRecognizer {
    ocr: TessApi,
    trim_border: bool,
    deblur: bool,
}

impl TesseractRecognizer {
    pub fn new(data_path: &str, language: &str) -> Result<Self> {
        let init_error = |reason: String| PlateReaderError::TesseractInit {
            language: language.to_string(),
            reason,
        };

        let mut ocr =
            TessApi::new(Some(data_path), language).map_err(|err| init_error(format!("{err:?}")))?;
        set_variable(&mut ocr, "tessedit_char_whitelist", PLATE_CHARACTERS).map_err(init_error)?;
        set_variable(&mut ocr, "tessedit_pageseg_mode", SINGLE_LINE_SEGMENTATION)
            .map_err(init_error)?;

        Ok(Self {
            ocr,
            trim_border: true,
            deblur: false,
        })
    }

    /// Cut the plate frame and screws off the crop before reading it.
    pub fn with_trim_border(mut self, trim_border: bool) -> Self {
        self.trim_border = trim_border;
        self
    }

    /// Sharpen the crop before reading it.
    pub fn with_deblur(mut self, deblur: bool) -> Self {
        self.deblur = deblur;
        self
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, region: &Region) -> Result<Vec<TextCandidate>> {
        let mut grey = Mat::default();
        cvt_color(region.image(), &mut grey, COLOR_BGR2GRAY, 0)?;
        let plate = reshape_plate(&grey, self.trim_border, self.deblur)?;

        let cols = plate.cols();
        let rows = plate.rows();
        self.ocr
            .raw
            .set_image(plate.data_bytes()?, cols, rows, 1, cols)
            .map_err(|err| PlateReaderError::Recognition(format!("{err:?}")))?;
        let text = self
            .ocr
            .get_utf8_text()
            .map_err(|err| PlateReaderError::Recognition(format!("{err:?}")))?;
        let confidence = self.ocr.mean_text_conf() as f32 / 100.0;

        let text = text.trim();
        debug!("OCR {:?} ({:.2}) on {}x{} plate", text, confidence, cols, rows);
        if text.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![TextCandidate::new(text, Some(confidence))])
    }
}

/// Prepares a grey plate crop for Tesseract: optionally trims the plate
/// frame and sharpens the result. The returned image is contiguous.
fn reshape_plate(grey: &Mat, trim_border: bool, deblur: bool) -> Result<Mat> {
    let full = Rect::new(0, 0, grey.cols(), grey.rows());
    let rect = if trim_border { trimmed_rect(full) } else { full };

    let cropped = grey.apply_1(rect)?.try_clone()?;
    if !deblur {
        return Ok(cropped);
    }

    let kernel = Mat::from_slice_2d(&[
        [-1f32, -1f32, -1f32],
        [-1f32, 9f32, -1f32],
        [-1f32, -1f32, -1f32],
    ])?;
    let mut sharpened = Mat::default();
    filter_2d(
        &cropped,
        &mut sharpened,
        -1,
        &kernel,
        Point::new(-1, -1),
        0.0,
        BORDER_DEFAULT,
    )?;
    Ok(sharpened)
}

/// Drops the border of a plate crop, keeping the rect unchanged when the
/// trimmed one would be empty.
fn trimmed_rect(rect: Rect) -> Rect {
    let mut smaller = rect;
    smaller.x += (rect.width as f32 * 0.10) as i32;
    smaller.y += (rect.height as f32 * 0.12) as i32;
    smaller.width -= (rect.width as f32 * 0.12) as i32;
    smaller.height -= (rect.height as f32 * 0.24) as i32;

    if smaller.width <= 0 || smaller.height <= 0 {
        return rect;
    }
    // Keep the shifted rect inside the untrimmed one.
    smaller.width = smaller.width.min(rect.x + rect.width - smaller.x);
    smaller.height = smaller.height.min(rect.y + rect.height - smaller.y);
    smaller
}

fn set_variable(api: &mut TessApi, name: &str, value: &str) -> std::result::Result<(), String> {
    let name = CString::new(name).map_err(|err| err.to_string())?;
    let value = CString::new(value).map_err(|err| err.to_string())?;
    api.raw
        .set_variable(&name, &value)
        .map_err(|err| format!("{err:?}"))
}
