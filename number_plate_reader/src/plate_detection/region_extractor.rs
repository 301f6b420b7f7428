use opencv::core::Rect;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use super::frame::Frame;
use super::BoundingBox;
use crate::{PlateReaderError, Result};

/// Owned copy of a rectangular part of a frame.
#[derive(Debug, Clone)]
pub struct Region {
    image: Mat,
    bounds: Rect,
}

impl Region {
    pub fn image(&self) -> &Mat {
        &self.image
    }

    /// Position of the region inside the frame it was cropped from.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn width(&self) -> i32 {
        self.bounds.width
    }

    pub fn height(&self) -> i32 {
        self.bounds.height
    }
}

/// Crops `bbox` out of `frame`, clamping it to the frame borders.
pub fn extract(frame: &Frame, bbox: &BoundingBox) -> Result<Region> {
    let out_of_bounds = || PlateReaderError::OutOfBounds {
        bbox: *bbox,
        width: frame.width(),
        height: frame.height(),
    };

    if !bbox.is_finite() {
        return Err(out_of_bounds());
    }

    let [x1, y1, x2, y2] = bbox.corners();
    let x1 = x1.clamp(0, frame.width());
    let x2 = x2.clamp(0, frame.width());
    let y1 = y1.clamp(0, frame.height());
    let y2 = y2.clamp(0, frame.height());
    if x2 <= x1 || y2 <= y1 {
        return Err(out_of_bounds());
    }

    let bounds = Rect::new(x1, y1, x2 - x1, y2 - y1);
    // The ROI shares the frame buffer, copy it so the region owns its pixels.
    let image = frame.image().apply_1(bounds)?.try_clone()?;

    Ok(Region { image, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn pixel(x: i32, y: i32) -> Vec3b {
        Vec3b::from([x as u8, y as u8, (x + y) as u8])
    }

    fn patterned_frame(width: i32, height: i32) -> Frame {
        let mut image =
            Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap();
        for y in 0..height {
            for x in 0..width {
                *image.at_2d_mut::<Vec3b>(y, x).unwrap() = pixel(x, y);
            }
        }
        Frame::from_mat(image).unwrap()
    }

    #[test]
    fn inside_box_keeps_size_and_pixels() {
        let frame = patterned_frame(64, 48);
        let bbox = BoundingBox::new(30.0, 20.0, 16.0, 6.0);

        let region = extract(&frame, &bbox).unwrap();

        assert_eq!(region.bounds(), Rect::new(22, 17, 16, 6));
        assert_eq!(region.image().cols(), 16);
        assert_eq!(region.image().rows(), 6);
        for y in 0..6 {
            for x in 0..16 {
                assert_eq!(
                    *region.image().at_2d::<Vec3b>(y, x).unwrap(),
                    pixel(x + 22, y + 17)
                );
            }
        }
    }

    #[test]
    fn fractional_box_is_within_one_pixel() {
        let frame = patterned_frame(64, 48);
        let bbox = BoundingBox::new(31.3, 24.6, 10.4, 5.5);

        let region = extract(&frame, &bbox).unwrap();

        assert!((region.width() - 10).abs() <= 1);
        assert!((region.height() - 6).abs() <= 1);
    }

    #[test]
    fn box_crossing_the_border_is_clamped() {
        let frame = patterned_frame(64, 48);
        let bbox = BoundingBox::new(2.0, 46.0, 10.0, 10.0);

        let region = extract(&frame, &bbox).unwrap();

        assert_eq!(region.bounds(), Rect::new(0, 41, 7, 7));
        assert_eq!(*region.image().at_2d::<Vec3b>(0, 0).unwrap(), pixel(0, 41));
    }

    #[test]
    fn box_outside_the_frame_is_rejected() {
        let frame = patterned_frame(64, 48);

        for bbox in [
            BoundingBox::new(200.0, 20.0, 10.0, 10.0),
            BoundingBox::new(-20.0, 20.0, 10.0, 10.0),
            BoundingBox::new(30.0, 60.0, 10.0, 10.0),
        ] {
            assert!(matches!(
                extract(&frame, &bbox),
                Err(PlateReaderError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        let frame = patterned_frame(64, 48);

        for bbox in [
            BoundingBox::new(30.0, 20.0, 0.0, 10.0),
            BoundingBox::new(30.0, 20.0, 10.0, -4.0),
            BoundingBox::new(f32::NAN, 20.0, 10.0, 10.0),
            BoundingBox::new(30.0, 20.0, f32::INFINITY, 10.0),
        ] {
            assert!(matches!(
                extract(&frame, &bbox),
                Err(PlateReaderError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn region_is_contiguous() {
        let frame = patterned_frame(64, 48);
        let region = extract(&frame, &BoundingBox::new(30.0, 20.0, 16.0, 6.0)).unwrap();

        assert!(region.image().is_continuous());
        assert_eq!(region.image().data_bytes().unwrap().len(), 16 * 6 * 3);
    }
}
