//! Bucket-based tile rendering.
//!
//! Divides a band of image rows into tiles (buckets) that can be rendered
//! independently and in parallel using rayon.

use crate::error::{RenderError, RenderResult};
use crate::renderer::render_seeded_pixel;
use crate::{Camera, Color, Hittable, ImageBuffer, RenderConfig};

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// X coordinate of bucket's top-left corner
    pub x: u32,
    /// Y coordinate of bucket's top-left corner, in image rows
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Index of this bucket in the render order
    pub index: usize,
}

impl Bucket {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self { x, y, width, height, index }
    }

    /// Get the total number of pixels in this bucket.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Default bucket size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Generate buckets covering rows `[y0, y0 + height)`, sorted in spiral
/// order from the band center.
///
/// Buckets closer to the center are rendered first, so the most
/// important part of the image shows up early.
pub fn generate_buckets(width: u32, y0: u32, height: u32, bucket_size: u32) -> Vec<Bucket> {
    let bucket_size = bucket_size.max(1);
    let mut buckets = Vec::new();
    let mut index = 0;

    // Generate grid of buckets
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let bw = bucket_size.min(width - x);
            let bh = bucket_size.min(height - y);
            buckets.push(Bucket::new(x, y0 + y, bw, bh, index));
            index += 1;
            x = x.saturating_add(bucket_size);
        }
        y = y.saturating_add(bucket_size);
    }

    sort_spiral(&mut buckets, width, y0, height);

    // Update indices after sorting
    for (i, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = i;
    }

    buckets
}

/// Sort buckets by distance from the band center.
fn sort_spiral(buckets: &mut [Bucket], width: u32, y0: u32, height: u32) {
    let center_x = f64::from(width) / 2.0;
    let center_y = f64::from(y0) + f64::from(height) / 2.0;

    let distance = |b: &Bucket| {
        let bx = f64::from(b.x) + f64::from(b.width) / 2.0;
        let by = f64::from(b.y) + f64::from(b.height) / 2.0;
        (bx - center_x).powi(2) + (by - center_y).powi(2)
    };

    buckets.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
}

/// Result of rendering a bucket.
#[derive(Debug, Clone)]
pub struct BucketResult {
    pub bucket: Bucket,
    /// Pixel colors in row-major order within the bucket
    pub pixels: Vec<Color>,
}

/// Render a single bucket.
///
/// A non-finite color is reported as a fault of `worker`.
pub fn render_bucket(
    bucket: &Bucket,
    camera: &Camera,
    world: &dyn Hittable,
    config: &RenderConfig,
    base_seed: u64,
    worker: usize,
) -> RenderResult<BucketResult> {
    let mut pixels = Vec::with_capacity(bucket.pixel_count());

    for y in bucket.y..bucket.y + bucket.height {
        for x in bucket.x..bucket.x + bucket.width {
            let color = render_seeded_pixel(camera, world, x, y, config, base_seed);
            if !color.is_finite() {
                return Err(RenderError::WorkerFault { worker, x, y });
            }
            pixels.push(color);
        }
    }

    Ok(BucketResult {
        bucket: *bucket,
        pixels,
    })
}

impl BucketResult {
    /// Copy the bucket into `image`, whose row 0 is image row `y0`.
    pub fn blit(&self, image: &mut ImageBuffer, y0: u32) {
        let b = &self.bucket;
        for (local_y, row) in self.pixels.chunks_exact(b.width as usize).enumerate() {
            let y = b.y - y0 + local_y as u32;
            for (local_x, color) in row.iter().enumerate() {
                image.set(b.x + local_x as u32, y, *color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_buckets_exact_fit() {
        let buckets = generate_buckets(128, 0, 128, 64);
        assert_eq!(buckets.len(), 4); // 2x2 grid

        // Total pixels should equal image size
        let total_pixels: usize = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 128 * 128);
    }

    #[test]
    fn test_generate_buckets_partial_fit() {
        let buckets = generate_buckets(100, 0, 100, 64);
        assert_eq!(buckets.len(), 4); // 2x2 grid with partial buckets

        let total_pixels: usize = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 100 * 100);
    }

    #[test]
    fn test_spiral_order() {
        let buckets = generate_buckets(192, 0, 192, 64);
        assert_eq!(buckets.len(), 9); // 3x3 grid

        // First bucket should be the center one
        let first = &buckets[0];
        assert_eq!(first.x, 64);
        assert_eq!(first.y, 64);
        assert_eq!(first.index, 0);
    }

    #[test]
    fn test_buckets_offset_by_band() {
        let buckets = generate_buckets(10, 20, 5, 4);
        assert!(buckets.iter().all(|b| b.y >= 20 && b.y + b.height <= 25));
        let total_pixels: usize = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 50);
    }

    #[test]
    fn test_blit_places_pixels() {
        let bucket = Bucket::new(1, 11, 2, 2, 0);
        let result = BucketResult {
            bucket,
            pixels: vec![
                Color::splat(1.0),
                Color::splat(2.0),
                Color::splat(3.0),
                Color::splat(4.0),
            ],
        };
        let mut image = ImageBuffer::new(4, 3);
        result.blit(&mut image, 10);

        assert_eq!(image.get(1, 1), Color::splat(1.0));
        assert_eq!(image.get(2, 1), Color::splat(2.0));
        assert_eq!(image.get(1, 2), Color::splat(3.0));
        assert_eq!(image.get(2, 2), Color::splat(4.0));
        assert_eq!(image.get(0, 0), Color::ZERO);
    }
}
