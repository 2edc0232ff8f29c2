//! Vector algebra, rays, intervals and sampling for the mrt path tracer.

// Double precision throughout; points and colors are the same triple type.
pub use glam::DVec3 as Vec3;

/// A location, as opposed to a direction.
pub type Point3 = Vec3;

/// Linear RGB, typically in [0, 1].
pub type Color = Vec3;

mod interval;
mod ray;
pub mod sampling;

pub use interval::Interval;
pub use ray::Ray;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_creation() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(a.dot(b), 32.0);
        assert!((Vec3::new(3.0, 0.0, 4.0).normalize().length() - 1.0).abs() < 1e-12);
    }
}
