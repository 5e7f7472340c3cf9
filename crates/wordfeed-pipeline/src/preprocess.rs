use image::GrayImage;
use ndarray::Array2;

/// Rescales an 8-bit grayscale image to `[-0.5, 0.5]` and prepends a
/// duplicate of its first row, so output height = input height + 1.
///
/// The extra row lifts corpus images to the canonical height downstream
/// consumers expect. Pure and deterministic; callers must pass a non-empty
/// image (the parser rejects empty decodes first).
pub fn normalize_and_pad(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);

    let mut out = Array2::zeros((height + 1, width));
    for (x, y, pixel) in image.enumerate_pixels() {
        out[[y as usize + 1, x as usize]] = f32::from(pixel[0]) / 255.0 - 0.5;
    }
    for x in 0..width {
        out[[0, x]] = out[[1, x]];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn rescales_full_pixel_range_to_centered_unit_interval() {
        let mut image = GrayImage::new(3, 1);
        image.put_pixel(0, 0, Luma([0]));
        image.put_pixel(1, 0, Luma([128]));
        image.put_pixel(2, 0, Luma([255]));

        let out = normalize_and_pad(&image);
        assert_eq!(out[[1, 0]], -0.5);
        assert!((out[[1, 1]] - (128.0 / 255.0 - 0.5)).abs() < 1e-6);
        assert_eq!(out[[1, 2]], 0.5);
    }

    #[test]
    fn prepends_duplicate_of_first_row() {
        let image = GrayImage::from_fn(4, 3, |x, y| Luma([(x + 10 * y) as u8]));
        let out = normalize_and_pad(&image);

        assert_eq!(out.dim(), (4, 4));
        for x in 0..4 {
            assert_eq!(out[[0, x]], out[[1, x]]);
        }
        // Later rows keep their own values.
        assert_ne!(out[[2, 0]], out[[1, 0]]);
    }

    #[test]
    fn identical_input_yields_identical_output() {
        let image = GrayImage::from_fn(5, 2, |x, y| Luma([(31 * x + 7 * y) as u8]));
        assert_eq!(normalize_and_pad(&image), normalize_and_pad(&image));
    }
}
