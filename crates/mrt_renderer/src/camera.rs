//! Camera for ray generation.

use mrt_math::sampling::sample_square;
use mrt_math::{Point3, Ray, Vec3};
use rand::RngCore;

/// Distance from the camera center to the viewport plane.
pub const FOCAL_LENGTH: f64 = 1.0;
/// World-space height of the viewport; width follows the aspect ratio.
pub const VIEWPORT_HEIGHT: f64 = 2.0;

/// Pinhole camera looking down -Z.
///
/// All derived values are computed once at construction, after which the
/// camera is read-only and can be shared by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    image_width: u32,
    image_height: u32,

    center: Point3,
    pixel00_loc: Point3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
}

impl Camera {
    /// Create a camera at the origin for an image of the given size.
    ///
    /// Dimensions of zero are raised to one so the viewport stays finite.
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self::with_center(image_width, image_height, Point3::ZERO)
    }

    /// Create a camera at `center`, still looking down -Z.
    pub fn with_center(image_width: u32, image_height: u32, center: Point3) -> Self {
        let image_width = image_width.max(1);
        let image_height = image_height.max(1);

        let viewport_width = VIEWPORT_HEIGHT * (f64::from(image_width) / f64::from(image_height));

        // Vectors across the horizontal and down the vertical viewport edges
        let viewport_u = Vec3::new(viewport_width, 0.0, 0.0);
        let viewport_v = Vec3::new(0.0, -VIEWPORT_HEIGHT, 0.0);

        let pixel_delta_u = viewport_u / f64::from(image_width);
        let pixel_delta_v = viewport_v / f64::from(image_height);

        let viewport_upper_left =
            center - Vec3::new(0.0, 0.0, FOCAL_LENGTH) - viewport_u / 2.0 - viewport_v / 2.0;
        let pixel00_loc = viewport_upper_left + 0.5 * (pixel_delta_u + pixel_delta_v);

        Self {
            image_width,
            image_height,
            center,
            pixel00_loc,
            pixel_delta_u,
            pixel_delta_v,
        }
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn center(&self) -> Point3 {
        self.center
    }

    /// World location of the center of pixel (0, 0).
    pub fn pixel00_loc(&self) -> Point3 {
        self.pixel00_loc
    }

    pub fn pixel_delta_u(&self) -> Vec3 {
        self.pixel_delta_u
    }

    pub fn pixel_delta_v(&self) -> Vec3 {
        self.pixel_delta_v
    }

    /// Generate a ray for pixel (i, j) through a jittered sample point.
    pub fn get_ray(&self, i: u32, j: u32, rng: &mut dyn RngCore) -> Ray {
        let offset = sample_square(rng);

        let pixel_sample = self.pixel00_loc
            + (f64::from(i) + offset.x) * self.pixel_delta_u
            + (f64::from(j) + offset.y) * self.pixel_delta_v;

        Ray::new(self.center, pixel_sample - self.center)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_camera_viewport() {
        let camera = Camera::new(400, 200);

        assert_eq!(camera.center(), Vec3::ZERO);
        assert!((camera.pixel_delta_u().x - 4.0 / 400.0).abs() < 1e-12);
        assert!((camera.pixel_delta_v().y + 2.0 / 200.0).abs() < 1e-12);

        // Pixel (0, 0) sits half a pixel in from the upper-left corner.
        let p = camera.pixel00_loc();
        assert!((p.x - (-2.0 + 0.005)).abs() < 1e-12);
        assert!((p.y - (1.0 - 0.005)).abs() < 1e-12);
        assert_eq!(p.z, -1.0);
    }

    #[test]
    fn test_camera_ray_direction() {
        let camera = Camera::new(100, 100);
        let mut rng = StdRng::seed_from_u64(42);

        // Center ray should point roughly towards -Z
        let ray = camera.get_ray(50, 50, &mut rng);
        assert!(ray.direction().z < 0.0);
        assert!(ray.direction().x.abs() < 0.05);
        assert!(ray.direction().y.abs() < 0.05);
    }

    #[test]
    fn test_jitter_stays_in_pixel_footprint() {
        let camera = Camera::new(10, 10);
        let mut rng = StdRng::seed_from_u64(5);
        let center = camera.pixel00_loc() + 3.0 * camera.pixel_delta_u() + 7.0 * camera.pixel_delta_v();

        for _ in 0..200 {
            let ray = camera.get_ray(3, 7, &mut rng);
            let target = ray.at(1.0);
            assert_eq!(target.z, -FOCAL_LENGTH);
            assert!((target.x - center.x).abs() <= 0.5 * camera.pixel_delta_u().x);
            assert!((target.y - center.y).abs() <= 0.5 * camera.pixel_delta_v().y.abs());
        }
    }

    #[test]
    fn test_camera_with_center() {
        let camera = Camera::with_center(8, 8, Point3::new(0.0, 0.0, 3.0));
        assert_eq!(camera.pixel00_loc().z, 2.0);
    }

    #[test]
    fn test_zero_dimensions_are_raised() {
        let camera = Camera::new(0, 0);
        assert_eq!(camera.image_width(), 1);
        assert_eq!(camera.image_height(), 1);
        assert!(camera.pixel00_loc().is_finite());
    }
}
