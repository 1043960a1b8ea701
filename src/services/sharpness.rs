//! Sharpness scoring via variance of the Laplacian
//!
//! A blurry photo has weak edges, so the Laplacian of its grayscale image
//! has low variance. The score is `ceil(variance * 10)`; higher is sharper.

use crate::error::{Error, Result};
use image::GrayImage;
use std::path::Path;

/// Decode a photo as 8-bit grayscale and score it. Decode failure is fatal
/// for the descriptor, not for the run.
pub fn sharpness_score(path: &Path) -> Result<i64> {
    let gray = image::open(path)
        .map_err(|e| Error::Descriptor(format!("{}: image decode failed: {}", path.display(), e)))?
        .into_luma8();
    Ok(score_gray(&gray))
}

/// Score an already-decoded grayscale image
pub fn score_gray(image: &GrayImage) -> i64 {
    (laplacian_variance(image) * 10.0).ceil() as i64
}

/// Population variance of the 4-neighbour Laplacian response, zero-padded
/// at the borders. The response is signed; clamping it would flatten the
/// very edges the score measures.
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    let pixel_count = (width as usize) * (height as usize);
    if pixel_count == 0 {
        return 0.0;
    }

    let sample = |x: i64, y: i64| -> f64 {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            0.0
        } else {
            image.get_pixel(x as u32, y as u32)[0] as f64
        }
    };

    let mut response = Vec::with_capacity(pixel_count);
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let laplacian = sample(x - 1, y)
                + sample(x + 1, y)
                + sample(x, y - 1)
                + sample(x, y + 1)
                - 4.0 * sample(x, y);
            response.push(laplacian);
        }
    }

    let mean = response.iter().sum::<f64>() / pixel_count as f64;
    response
        .iter()
        .map(|&r| (r - mean) * (r - mean))
        .sum::<f64>()
        / pixel_count as f64
}
