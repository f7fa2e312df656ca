use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use prism_core::FilterSpec;

pub struct ImageFilters;

impl ImageFilters {
    /// Blur first, then color transforms
    pub fn apply(img: DynamicImage, filters: &FilterSpec) -> DynamicImage {
        let mut result = img;

        if filters.blur > 0 {
            result = Self::apply_blur(result, filters.blur as f32);
        }
        if filters.grayscale {
            result = Self::apply_grayscale(result);
        }
        if filters.sepia {
            result = Self::apply_sepia(result);
        }

        result
    }

    /// Gaussian blur with standard deviation `sigma` (must be positive)
    pub fn apply_blur(img: DynamicImage, sigma: f32) -> DynamicImage {
        let rgba = img.to_rgba8();
        DynamicImage::ImageRgba8(imageproc::filter::gaussian_blur_f32(&rgba, sigma))
    }

    pub fn apply_grayscale(img: DynamicImage) -> DynamicImage {
        img.grayscale()
    }

    pub fn apply_sepia(img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let rgba8 = img.to_rgba8();
        let mut sepia_img = RgbaImage::new(width, height);

        for (x, y, pixel) in rgba8.enumerate_pixels() {
            let Rgba([r, g, b, a]) = *pixel;
            let (r, g, b) = (r as f32, g as f32, b as f32);

            let tr = (0.393 * r + 0.769 * g + 0.189 * b).min(255.0) as u8;
            let tg = (0.349 * r + 0.686 * g + 0.168 * b).min(255.0) as u8;
            let tb = (0.272 * r + 0.534 * g + 0.131 * b).min(255.0) as u8;

            sepia_img.put_pixel(x, y, Rgba([tr, tg, tb, a]));
        }

        DynamicImage::ImageRgba8(sepia_img)
    }
}
