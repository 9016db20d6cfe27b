//! Grayscale image primitives shared by the localizer and extractors.
//!
//! Everything operates on row-major `u8` luma buffers. Resizing uses
//! bilinear interpolation to preserve edge sharpness at descriptor scale.

use std::path::Path;

use thiserror::Error;

use crate::types::FaceRegion;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has zero dimensions")]
    ZeroDimensions,
}

/// A decoded single-channel intensity image.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self { data, width, height }
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    /// Copy out the pixels covered by `region`. The region must already be
    /// clamped to the frame bounds.
    pub fn crop(&self, region: &FaceRegion) -> GrayFrame {
        let mut out = Vec::with_capacity((region.width * region.height) as usize);
        for y in region.y..region.y + region.height {
            let row_start = (y * self.width + region.x) as usize;
            out.extend_from_slice(&self.data[row_start..row_start + region.width as usize]);
        }
        GrayFrame::new(out, region.width, region.height)
    }
}

/// Decode raw encoded image bytes (any format the `image` crate knows) into
/// a grayscale frame.
pub fn decode_gray(bytes: &[u8]) -> Result<GrayFrame, DecodeError> {
    let img = image::load_from_memory(bytes)?;
    luma_frame(img)
}

/// Decode an image file into a grayscale frame.
pub fn decode_gray_file(path: &Path) -> Result<GrayFrame, DecodeError> {
    let img = image::open(path)?;
    luma_frame(img)
}

fn luma_frame(img: image::DynamicImage) -> Result<GrayFrame, DecodeError> {
    let luma = img.to_luma8();
    let (width, height) = (luma.width(), luma.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions);
    }
    Ok(GrayFrame::new(luma.into_raw(), width, height))
}

/// Bilinear resize of a `u8` luma buffer.
pub fn resize_bilinear(src: &[u8], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<u8> {
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut resized = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

/// Bilinear resize of an `f32` buffer. Same arithmetic as [`resize_bilinear`]
/// without the final rounding, for gradient-magnitude maps.
pub fn resize_bilinear_f32(src: &[f32], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<f32> {
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut resized = vec![0.0f32; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0];
            let tr = src[y0 * width + x1];
            let bl = src[y1 * width + x0];
            let br = src[y1 * width + x1];

            resized[y * new_w + x] = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;
        }
    }

    resized
}

/// Histogram equalization over a luma buffer.
///
/// Maps intensities through the cumulative distribution so the output
/// spreads across the full [0, 255] range. A flat (single-intensity) input
/// is returned unchanged.
pub fn equalize_hist(src: &[u8]) -> Vec<u8> {
    let mut hist = [0u32; 256];
    for &px in src {
        hist[px as usize] += 1;
    }

    let total = src.len() as u32;
    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if cdf_min == total {
        // Single-intensity image: equalization is undefined, leave as-is.
        return src.to_vec();
    }

    let denom = (total - cdf_min) as f32;
    let mut lut = [0u8; 256];
    for i in 0..256 {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f32 / denom * 255.0;
        lut[i] = scaled.round().clamp(0.0, 255.0) as u8;
    }

    src.iter().map(|&px| lut[px as usize]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![128u8; 100 * 100];
        let out = resize_bilinear(&src, 100, 100, 64, 64);
        assert_eq!(out.len(), 64 * 64);
        assert!(out.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resize_downscale_dimensions() {
        let src = vec![0u8; 128 * 128];
        let out = resize_bilinear(&src, 128, 128, 32, 32);
        assert_eq!(out.len(), 32 * 32);
    }

    #[test]
    fn test_resize_f32_matches_constant() {
        let src = vec![3.5f32; 50 * 50];
        let out = resize_bilinear_f32(&src, 50, 50, 10, 10);
        assert!(out.iter().all(|&v| (v - 3.5).abs() < 1e-5));
    }

    #[test]
    fn test_equalize_flat_image_unchanged() {
        let src = vec![77u8; 64];
        assert_eq!(equalize_hist(&src), src);
    }

    #[test]
    fn test_equalize_two_level_stretches_to_extremes() {
        // Half dark, half bright: equalization pushes them to 0 and 255.
        let mut src = vec![100u8; 32];
        src.extend(vec![101u8; 32]);
        let out = equalize_hist(&src);
        assert_eq!(out[0], 0);
        assert_eq!(out[63], 255);
    }

    #[test]
    fn test_equalize_preserves_ordering() {
        let src: Vec<u8> = (0..=255).collect();
        let out = equalize_hist(&src);
        for w in out.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn test_crop_extracts_expected_pixels() {
        // 4x4 frame with row-major values 0..16
        let frame = GrayFrame::new((0..16).collect(), 4, 4);
        let region = FaceRegion { x: 1, y: 1, width: 2, height: 2 };
        let crop = frame.crop(&region);
        assert_eq!(crop.data, vec![5, 6, 9, 10]);
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
    }

    #[test]
    fn test_decode_gray_rejects_garbage() {
        assert!(decode_gray(b"not an image").is_err());
    }

    #[test]
    fn test_decode_gray_roundtrip_png() {
        let img = image::GrayImage::from_pixel(8, 6, image::Luma([200u8]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let frame = decode_gray(&bytes).unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 6);
        assert!(frame.data.iter().all(|&p| p == 200));
    }
}
