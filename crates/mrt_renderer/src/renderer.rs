//! Core path tracing: configuration, the path integrator and the image buffer.
//!
//! Implements Monte Carlo path tracing with:
//! - Iterative diffuse bounces with configurable depth
//! - Sky gradient as the only light source
//! - Anti-aliasing via multi-sampling

use std::time::Duration;

use crate::error::{narrow, ConfigError};
use crate::{Camera, Hittable};
use mrt_math::sampling::random_unit_vector;
use mrt_math::{Color, Interval, Point3, Ray};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Default fraction of light kept at every diffuse bounce.
pub const DEFAULT_REFLECTANCE: f64 = 0.7;
/// Default lower bound on hit distance, suppresses shadow acne.
pub const DEFAULT_EPSILON: f64 = 0.001;
/// Default polling period of the progress reporter.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(2);

/// How image rows are handed out to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Contiguous row bands fixed up front, one per worker.
    Static,
    /// Workers claim `chunk_rows` rows at a time from a shared cursor.
    Dynamic { chunk_rows: usize },
    /// Square tiles rendered center-out on a rayon pool.
    Tiles { tile_size: u32 },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Dynamic { chunk_rows: 1 }
    }
}

/// Render configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Samples per pixel for anti-aliasing
    pub samples_per_pixel: u32,
    /// Maximum ray bounce depth
    pub max_depth: u32,
    /// Number of worker threads
    pub workers: usize,
    pub schedule: Schedule,
    /// Fraction of light kept per diffuse bounce
    pub reflectance: f64,
    /// Lower bound on valid hit distances
    pub epsilon: f64,
    /// Square-root tone mapping on output
    pub gamma: bool,
    /// Base seed for per-pixel random streams; random when unset
    pub seed: Option<u64>,
    pub progress_interval: Duration,
    pub camera_center: Point3,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 400,
            height: 225,
            samples_per_pixel: 100,
            max_depth: 50,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            schedule: Schedule::default(),
            reflectance: DEFAULT_REFLECTANCE,
            epsilon: DEFAULT_EPSILON,
            gamma: true,
            seed: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            camera_center: Point3::ZERO,
        }
    }
}

impl RenderConfig {
    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set quality settings.
    pub fn with_quality(mut self, samples: u32, max_depth: u32) -> Self {
        self.samples_per_pixel = samples;
        self.max_depth = max_depth;
        self
    }

    pub fn with_workers(mut self, workers: usize, schedule: Schedule) -> Self {
        self.workers = workers;
        self.schedule = schedule;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations that cannot produce an image.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 {
            return Err(ConfigError::ZeroDimension("width"));
        }
        if self.height == 0 {
            return Err(ConfigError::ZeroDimension("height"));
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.samples_per_pixel == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        match self.schedule {
            Schedule::Dynamic { chunk_rows: 0 } => return Err(ConfigError::ZeroChunk("chunk rows")),
            Schedule::Tiles { tile_size: 0 } => return Err(ConfigError::ZeroChunk("tile size")),
            _ => {}
        }
        if let Schedule::Dynamic { chunk_rows } = self.schedule {
            // A chunk is handed out as one slice of chunk_rows * width pixels.
            chunk_rows
                .checked_mul(narrow::<usize, _>(self.width, "width")?)
                .ok_or_else(|| ConfigError::Overflow {
                    what: "chunk rows",
                    detail: format!("{chunk_rows} rows of {} pixels", self.width),
                })?;
        }
        for (name, value) in [("reflectance", self.reflectance), ("epsilon", self.epsilon)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidConstant { name, value });
            }
        }
        if !self.camera_center.is_finite() {
            return Err(ConfigError::InvalidConstant {
                name: "camera center",
                value: f64::NAN,
            });
        }
        // Gather buffers hold width * height * 3 doubles.
        self.pixel_count()?
            .checked_mul(3)
            .ok_or_else(|| ConfigError::Overflow {
                what: "image buffer",
                detail: format!("{}x{}x3 values", self.width, self.height),
            })?;
        Ok(())
    }

    /// Total pixel count, checked against `usize` overflow.
    pub fn pixel_count(&self) -> Result<usize, ConfigError> {
        let width: usize = narrow(self.width, "width")?;
        let height: usize = narrow(self.height, "height")?;
        width.checked_mul(height).ok_or_else(|| ConfigError::Overflow {
            what: "pixel count",
            detail: format!("{}x{}", self.width, self.height),
        })
    }

    /// Build the camera this configuration describes.
    pub fn camera(&self) -> Camera {
        Camera::with_center(self.width, self.height, self.camera_center)
    }
}

/// Compute the color seen by a ray.
///
/// Bounces are followed in a loop with the attenuation carried along, so
/// stack depth does not grow with `depth`. Running out of bounces returns
/// black; escaping the scene returns the attenuated sky.
pub fn ray_color(
    ray: &Ray,
    world: &dyn Hittable,
    depth: u32,
    config: &RenderConfig,
    rng: &mut dyn RngCore,
) -> Color {
    let mut ray = *ray;
    let mut attenuation = 1.0;

    for _ in 0..depth {
        match world.hit(&ray, Interval::new(config.epsilon, f64::INFINITY)) {
            Some(rec) => {
                let mut direction = rec.normal + random_unit_vector(rng);
                // Catch degenerate scatter direction
                if direction.length_squared() < 1e-16 {
                    direction = rec.normal;
                }
                ray = Ray::new(rec.point, direction);
                attenuation *= config.reflectance;
            }
            None => return attenuation * sky_gradient(&ray),
        }
    }

    Color::ZERO
}

/// Compute sky gradient background.
pub fn sky_gradient(ray: &Ray) -> Color {
    let unit_direction = ray.direction().normalize();
    let a = 0.5 * (unit_direction.y + 1.0);
    let white = Color::new(1.0, 1.0, 1.0);
    let blue = Color::new(0.5, 0.7, 1.0);
    white * (1.0 - a) + blue * a
}

/// Render a single pixel with multi-sampling.
pub fn render_pixel(
    camera: &Camera,
    world: &dyn Hittable,
    x: u32,
    y: u32,
    config: &RenderConfig,
    rng: &mut dyn RngCore,
) -> Color {
    let mut pixel_color = Color::ZERO;

    for _ in 0..config.samples_per_pixel {
        // Camera.get_ray already adds random offset for anti-aliasing
        let ray = camera.get_ray(x, y, rng);
        pixel_color += ray_color(&ray, world, config.max_depth, config, rng);
    }

    // Average the samples
    pixel_color / f64::from(config.samples_per_pixel)
}

/// Seed for the random stream of pixel (x, y).
///
/// Mixing the coordinates into the base seed makes each pixel's value
/// independent of which worker rendered it.
pub fn pixel_seed(base: u64, x: u32, y: u32) -> u64 {
    let mut z = base ^ ((u64::from(y) << 32) | u64::from(x));
    // splitmix64 finalizer
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Render pixel (x, y) with its own seeded generator.
pub fn render_seeded_pixel(
    camera: &Camera,
    world: &dyn Hittable,
    x: u32,
    y: u32,
    config: &RenderConfig,
    base_seed: u64,
) -> Color {
    let mut rng = StdRng::seed_from_u64(pixel_seed(base_seed, x, y));
    render_pixel(camera, world, x, y, config, &mut rng)
}

/// Row-major image buffer of linear colors.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![Color::ZERO; len],
        }
    }

    /// Get the pixel at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[self.index(x, y)]
    }

    /// Set the pixel at (x, y).
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        let index = self.index(x, y);
        self.pixels[index] = color;
    }

    /// The pixels of row `y`.
    pub fn row(&self, y: u32) -> &[Color] {
        let start = self.index(0, y);
        &self.pixels[start..start + self.width as usize]
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Flatten to `[r, g, b, r, g, b, ...]` in row-major order.
    pub fn to_flat(&self) -> Vec<f64> {
        self.pixels.iter().flat_map(|c| c.to_array()).collect()
    }

    /// Rebuild an image from a row-major `[r, g, b, ...]` buffer.
    ///
    /// Returns `None` if the buffer length is not `width * height * 3`.
    pub fn from_flat(width: u32, height: u32, values: &[f64]) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)?;
        if values.len() != expected {
            return None;
        }
        let pixels = values
            .chunks_exact(3)
            .map(|rgb| Color::new(rgb[0], rgb[1], rgb[2]))
            .collect();
        Some(Self {
            width,
            height,
            pixels,
        })
    }
}
