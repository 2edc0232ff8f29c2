//! Scene construction: the built-in "HI" scene and JSON scene files.

use std::path::Path;

use anyhow::{Context, Result};
use mrt_math::Point3;
use mrt_renderer::{HittableList, Sphere};
use serde::Deserialize;

/// A scene as written in a JSON file.
///
/// ```json
/// { "camera": [0, 0, 0], "spheres": [{ "center": [0, 0, -1], "radius": 0.5 }] }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneDescription {
    /// Camera position; the camera always looks down -Z
    #[serde(default)]
    pub camera: Option<[f64; 3]>,
    pub spheres: Vec<SphereDescription>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SphereDescription {
    pub center: [f64; 3],
    pub radius: f64,
}

impl SceneDescription {
    pub fn camera_center(&self) -> Option<Point3> {
        self.camera.map(Point3::from_array)
    }

    pub fn build(&self) -> HittableList {
        self.spheres
            .iter()
            .map(|s| Sphere::new(Point3::from_array(s.center), s.radius))
            .collect()
    }
}

/// Load a scene description from a JSON file.
pub fn load(path: &Path) -> Result<SceneDescription> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene file {}", path.display()))?;
    parse(&text).with_context(|| format!("Failed to parse scene file {}", path.display()))
}

pub fn parse(text: &str) -> Result<SceneDescription> {
    Ok(serde_json::from_str(text)?)
}

/// Spheres spelling "HI" in front of the camera, standing on a large
/// ground sphere.
pub fn hi_scene() -> HittableList {
    let mut world = HittableList::new();
    let radius = 0.5;

    // H: two columns and a crossbar
    for y in -2..=2 {
        let y = f64::from(y);
        world.add(Sphere::new(Point3::new(-2.0, y, -4.0), radius));
        world.add(Sphere::new(Point3::new(0.0, y, -4.0), radius));
    }
    for x in [-1.0, 0.0] {
        world.add(Sphere::new(Point3::new(x, 0.0, -4.0), radius));
    }

    // I
    for y in -2..=2 {
        world.add(Sphere::new(Point3::new(2.0, f64::from(y), -4.0), radius));
    }

    // Ground
    world.add(Sphere::new(Point3::new(0.0, -103.0, -1.0), 100.0));
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrt_renderer::{Hittable, Interval, Ray, Vec3};

    #[test]
    fn test_hi_scene_contents() {
        let world = hi_scene();
        // 10 for H columns, 2 crossbar, 5 for I, 1 ground
        assert_eq!(world.len(), 18);
    }

    #[test]
    fn test_hi_scene_blocks_center_of_i() {
        let world = hi_scene();
        let ray = Ray::new(Point3::ZERO, Vec3::new(2.0, 0.0, -4.0));
        let rec = world.hit(&ray, Interval::new(0.001, f64::INFINITY)).unwrap();
        assert!((rec.point - Point3::new(2.0, 0.0, -4.0)).length() < 0.5 + 1e-9);
    }

    #[test]
    fn test_parse_scene() {
        let scene = parse(
            r#"{ "camera": [0, 1, 2], "spheres": [
                { "center": [0, 0, -1], "radius": 0.5 },
                { "center": [0, -100.5, -1], "radius": 100 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(scene.camera_center(), Some(Point3::new(0.0, 1.0, 2.0)));
        assert_eq!(scene.build().len(), 2);
    }

    #[test]
    fn test_camera_is_optional() {
        let scene = parse(r#"{ "spheres": [] }"#).unwrap();
        assert_eq!(scene.camera_center(), None);
        assert!(scene.build().is_empty());
    }

    #[test]
    fn test_malformed_scene_is_error() {
        assert!(parse(r#"{ "spheres": [{ "center": [0, 0] }] }"#).is_err());
    }
}
