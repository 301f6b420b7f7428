use opencv::core::CV_8U;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_BGRA2BGR;
use opencv::imgproc::COLOR_GRAY2BGR;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::{PlateReaderError, Result};

/// A camera image in 8-bit, 3 channel BGR layout.
#[derive(Debug)]
pub struct Frame {
    image: Mat,
}

impl Frame {
    /// Wraps a decoded image, converting grey and BGRA input to BGR.
    pub fn from_mat(image: Mat) -> Result<Self> {
        if image.empty() {
            return Err(PlateReaderError::FrameConversion(
                "image is empty".to_string(),
            ));
        }
        if image.depth() != CV_8U {
            return Err(PlateReaderError::FrameConversion(format!(
                "unsupported depth {}",
                image.depth()
            )));
        }

        let image = match image.channels() {
            3 => image,
            1 => convert(&image, COLOR_GRAY2BGR)?,
            4 => convert(&image, COLOR_BGRA2BGR)?,
            channels => {
                return Err(PlateReaderError::FrameConversion(format!(
                    "unsupported channel count {channels}"
                )))
            }
        };

        Ok(Self { image })
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }
}

fn convert(image: &Mat, code: i32) -> Result<Mat> {
    let mut converted = Mat::default();
    cvt_color(image, &mut converted, code, 0)
        .map_err(|err| PlateReaderError::FrameConversion(err.message))?;
    Ok(converted)
}
