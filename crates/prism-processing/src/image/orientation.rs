use image::DynamicImage;

/// Image orientation operations (rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotate clockwise by 90, 180 or 270 degrees. 0 leaves the image as is.
    pub fn rotate_by_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        }
    }

    /// Top-bottom flip
    pub fn flip(img: DynamicImage) -> DynamicImage {
        img.flipv()
    }

    /// Left-right mirror
    pub fn mirror(img: DynamicImage) -> DynamicImage {
        img.fliph()
    }
}
