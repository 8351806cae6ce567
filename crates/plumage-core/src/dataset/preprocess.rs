//! Image to tensor conversion for batch sampling.
//!
//! - Resize: exact square, bilinear (`FilterType::Triangle`)
//! - Channel order: RGB
//! - Values: pixel / 255, in [0, 1]
//! - Layout: CHW [channels, height, width]

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array3;

/// Number of color channels (RGB).
pub const CHANNELS: usize = 3;

/// Resize an image to `size × size` and convert it to a CHW tensor in [0, 1].
pub fn image_to_tensor(image: &DynamicImage, size: u32) -> Array3<f32> {
    let resized = image.resize_exact(size, size, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let size = size as usize;
    let mut tensor = Array3::<f32>::zeros((CHANNELS, size, size));
    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        let (y, x) = (i / size, i % size);
        for (c, &val) in pixel.iter().enumerate() {
            tensor[[c, y, x]] = val as f32 / 255.0;
        }
    }
    tensor
}
