//! Image batch preparation.

use crate::common::*;
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use ndarray::{s, Array1, Array3, Array4};

/// Per channel means of the pre-trained backbone, RGB order.
pub const PIXEL_MEANS: [f32; 3] = [0.485, 0.456, 0.406];
/// Per channel standard deviations of the pre-trained backbone, RGB order.
pub const PIXEL_STDS: [f32; 3] = [0.229, 0.224, 0.225];

/// Stack HWC images into a zero padded `(N, max_h, max_w, 3)` batch.
///
/// Each image is placed at the top-left corner of its slot.
pub fn im_list_to_blob(images: &[Array3<f32>]) -> Result<Array4<f32>> {
    ensure!(!images.is_empty(), "cannot build a blob from an empty image list");
    for (index, image) in images.iter().enumerate() {
        let (_, _, channels) = image.dim();
        ensure!(
            channels == 3,
            "expect 3 channels, but the image at {} has {}",
            index,
            channels
        );
    }

    let max_h = images.iter().map(|image| image.dim().0).max().unwrap_or(0);
    let max_w = images.iter().map(|image| image.dim().1).max().unwrap_or(0);

    let mut blob = Array4::zeros((images.len(), max_h, max_w, 3));
    for (index, image) in images.iter().enumerate() {
        let (h, w, _) = image.dim();
        blob.slice_mut(s![index, ..h, ..w, ..]).assign(image);
    }
    Ok(blob)
}

/// Normalize an HWC image with values in `[0, 255]` and scale its shorter
/// side to `target_size`.
///
/// Returns the resized image and the scale factor. `max_size` is accepted
/// but does not bound the longer side.
pub fn prep_im_for_blob(
    image: &Array3<f32>,
    target_size: usize,
    _max_size: usize,
) -> Result<(Array3<f32>, f64)> {
    let (h, w, channels) = image.dim();
    ensure!(h > 0 && w > 0, "cannot resize an empty image");
    ensure!(channels == 3, "expect 3 channels, but get {}", channels);

    let means = Array1::from(PIXEL_MEANS.to_vec());
    let stds = Array1::from(PIXEL_STDS.to_vec());
    let normalized = (image / 255.0 - &means) / &stds;

    let scale = target_size as f64 / h.min(w) as f64;
    let resized = resize_linear(&normalized, scale)?;
    Ok((resized, scale))
}

/// Bilinear resize by `scale` on both axes.
///
/// Sample positions follow the half-pixel center convention without
/// antialiasing. The output size is `round(dim * scale)`.
pub fn resize_linear(image: &Array3<f32>, scale: f64) -> Result<Array3<f32>> {
    ensure!(
        scale.is_finite() && scale > 0.0,
        "invalid resize scale {}",
        scale
    );
    let (in_h, in_w, channels) = image.dim();
    ensure!(channels == 3, "expect 3 channels, but get {}", channels);
    let out_h = (in_h as f64 * scale).round() as usize;
    let out_w = (in_w as f64 * scale).round() as usize;
    ensure!(
        out_h > 0 && out_w > 0,
        "resizing {}x{} by {} gives an empty image",
        in_h,
        in_w,
        scale
    );

    let mut src = Image::new(in_w as u32, in_h as u32, PixelType::F32x3);
    src.buffer_mut()
        .chunks_exact_mut(4)
        .zip(image.iter())
        .for_each(|(bytes, value)| bytes.copy_from_slice(&value.to_ne_bytes()));

    let mut dst = Image::new(out_w as u32, out_h as u32, PixelType::F32x3);
    Resizer::new().resize(
        &src,
        &mut dst,
        &ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear)),
    )?;

    let values: Vec<f32> = dst
        .buffer()
        .chunks_exact(4)
        .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect();
    let resized = Array3::from_shape_vec((out_h, out_w, 3), values)?;
    Ok(resized)
}

/// Decode an image file into an RGB `f32` HWC array with values in `[0, 255]`.
pub fn load_image(path: impl AsRef<Path>) -> Result<Array3<f32>> {
    let path = path.as_ref();
    let image = image::io::Reader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| {
            format!(
                "failed to determine the image file format: {}",
                path.display()
            )
        })?
        .decode()
        .with_context(|| format!("failed to decode image file: {}", path.display()))?
        .to_rgb8();

    let (width, height) = image.dimensions();
    let pixels: Vec<f32> = image.into_raw().into_iter().map(f32::from).collect();
    let array = Array3::from_shape_vec((height as usize, width as usize, 3), pixels)?;
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn blob_pads_top_left() {
        let small = Array3::from_elem((2, 3, 3), 1.0);
        let large = Array3::from_elem((4, 2, 3), 2.0);
        let blob = im_list_to_blob(&[small, large]).unwrap();

        assert_eq!(blob.dim(), (2, 4, 3, 3));
        assert_eq!(blob[[0, 1, 2, 0]], 1.0);
        assert_eq!(blob[[0, 2, 0, 0]], 0.0);
        assert_eq!(blob[[1, 3, 1, 2]], 2.0);
        assert_eq!(blob[[1, 0, 2, 1]], 0.0);
    }

    #[test]
    fn blob_rejects_bad_input() {
        assert!(im_list_to_blob(&[]).is_err());
        assert!(im_list_to_blob(&[Array3::zeros((2, 2, 1))]).is_err());
    }

    #[test]
    fn half_pixel_resize() {
        let mut image = Array3::zeros((1, 2, 3));
        image[[0, 1, 0]] = 10.0;
        let resized = resize_linear(&image, 2.0).unwrap();

        assert_eq!(resized.dim(), (2, 4, 3));
        for (x, expect) in [0.0, 2.5, 7.5, 10.0].into_iter().enumerate() {
            assert_abs_diff_eq!(resized[[0, x, 0]], expect, epsilon = 1e-4);
            assert_abs_diff_eq!(resized[[1, x, 0]], expect, epsilon = 1e-4);
            assert_abs_diff_eq!(resized[[0, x, 1]], 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn prep_scales_shorter_side() {
        let image = Array3::from_elem((10, 20, 3), 255.0);
        let (prepped, scale) = prep_im_for_blob(&image, 30, 1000).unwrap();

        assert_abs_diff_eq!(scale, 3.0);
        assert_eq!(prepped.dim(), (30, 60, 3));
        for c in 0..3 {
            let expect = (1.0 - PIXEL_MEANS[c]) / PIXEL_STDS[c];
            assert_abs_diff_eq!(prepped[[15, 30, c]], expect, epsilon = 1e-5);
        }
    }

    #[test]
    fn load_rgb_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img001.png");
        let mut buffer = image::RgbImage::new(3, 2);
        buffer.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        buffer.save(&path).unwrap();

        let array = load_image(&path).unwrap();
        assert_eq!(array.dim(), (2, 3, 3));
        assert_eq!(array[[1, 2, 0]], 10.0);
        assert_eq!(array[[1, 2, 2]], 30.0);
        assert_eq!(array[[0, 0, 1]], 0.0);
    }
}
