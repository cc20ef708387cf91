// THEORY:
// Binary masks are plain `GrayImage`s holding 0 (off) or 255 (on). Keeping them in
// the `image` buffer type means `imageproc` morphology and distance transforms apply
// directly, and a mask can be dumped to PNG for debugging without conversion.
//
// This module only builds and combines masks. It has no notion of pins or shafts.

pub mod mask {
    use crate::core_modules::pixel::pixel::Pixel;
    use image::{GrayImage, Luma, RgbImage};
    use imageproc::distance_transform::Norm;

    pub const ON: u8 = 255;
    pub const OFF: u8 = 0;

    /// Marks every pixel for which `predicate` holds.
    pub fn from_predicate<F>(image: &RgbImage, predicate: F) -> GrayImage
    where
        F: Fn(Pixel) -> bool,
    {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let pixel = Pixel::from(image.get_pixel(x, y));
            Luma([if predicate(pixel) { ON } else { OFF }])
        })
    }

    /// Rec. 601 grayscale conversion.
    pub fn grayscale(image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([Pixel::from(image.get_pixel(x, y)).gray()])
        })
    }

    /// Pixels strictly brighter than `level` are on.
    pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([if gray.get_pixel(x, y)[0] > level { ON } else { OFF }])
        })
    }

    /// Morphological opening with a (2r+1)x(2r+1) square.
    pub fn open(mask: &GrayImage, radius: u8) -> GrayImage {
        imageproc::morphology::open(mask, Norm::LInf, radius)
    }

    /// Morphological closing with a (2r+1)x(2r+1) square.
    pub fn close(mask: &GrayImage, radius: u8) -> GrayImage {
        imageproc::morphology::close(mask, Norm::LInf, radius)
    }

    /// Grows the mask by `radius` pixels in every direction (square structuring element).
    pub fn dilate(mask: &GrayImage, radius: u8) -> GrayImage {
        imageproc::morphology::dilate(mask, Norm::LInf, radius)
    }

    /// Pixels on in `a` and off in `b`.
    pub fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
        combine(a, b, |left, right| left && !right)
    }

    /// Pixels on in both masks.
    pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
        combine(a, b, |left, right| left && right)
    }

    fn combine<F>(a: &GrayImage, b: &GrayImage, op: F) -> GrayImage
    where
        F: Fn(bool, bool) -> bool,
    {
        GrayImage::from_fn(a.width(), a.height(), |x, y| {
            let left = a.get_pixel(x, y)[0] != OFF;
            let right = b.get_pixel_checked(x, y).is_some_and(|p| p[0] != OFF);
            Luma([if op(left, right) { ON } else { OFF }])
        })
    }

    #[inline]
    pub fn is_on(mask: &GrayImage, x: u32, y: u32) -> bool {
        mask.get_pixel(x, y)[0] != OFF
    }

    pub fn count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] != OFF).count()
    }
}
