//! Hittable trait, HitRecord, and the closed set of scene surfaces.

use crate::Sphere;
use mrt_math::{Interval, Point3, Ray, Vec3};

/// Record of a ray-object intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Point of intersection
    pub point: Point3,
    /// Unit surface normal, always pointing against the incoming ray
    pub normal: Vec3,
    /// Parameter t where the intersection occurs
    pub t: f64,
    /// Whether the ray hit the front face (outside) of the surface
    pub front_face: bool,
}

impl HitRecord {
    /// Build a record, orienting `outward_normal` against the ray.
    ///
    /// If the ray and outward normal point the same way the ray started
    /// inside the surface and the stored normal is flipped.
    pub fn new(ray: &Ray, t: f64, point: Point3, outward_normal: Vec3) -> Self {
        let front_face = ray.direction().dot(outward_normal) < 0.0;
        let normal = if front_face {
            outward_normal
        } else {
            -outward_normal
        };

        Self {
            point,
            normal,
            t,
            front_face,
        }
    }
}

/// Trait for objects that can be hit by rays.
pub trait Hittable: Send + Sync {
    /// Closest intersection with parameter strictly inside `ray_t`.
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<HitRecord>;
}

/// Every kind of surface a scene can hold.
///
/// The set is fixed for the duration of a render, so a sum type replaces
/// dynamic dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    Sphere(Sphere),
    List(HittableList),
}

impl Hittable for Surface {
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<HitRecord> {
        match self {
            Surface::Sphere(sphere) => sphere.hit(ray, ray_t),
            Surface::List(list) => list.hit(ray, ray_t),
        }
    }
}

impl From<Sphere> for Surface {
    fn from(sphere: Sphere) -> Self {
        Surface::Sphere(sphere)
    }
}

impl From<HittableList> for Surface {
    fn from(list: HittableList) -> Self {
        Surface::List(list)
    }
}

/// An ordered list of surfaces searched linearly for the closest hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HittableList {
    objects: Vec<Surface>,
}

impl HittableList {
    /// Create a new empty hittable list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to the list.
    pub fn add(&mut self, object: impl Into<Surface>) {
        self.objects.push(object.into());
    }

    /// Clear all objects from the list.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Get the number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[Surface] {
        &self.objects
    }
}

impl FromIterator<Sphere> for HittableList {
    fn from_iter<I: IntoIterator<Item = Sphere>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().map(Surface::from).collect(),
        }
    }
}

impl Hittable for HittableList {
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<HitRecord> {
        let mut closest: Option<HitRecord> = None;

        for object in &self.objects {
            // Only a strictly closer hit survives, so the first inserted
            // surface wins an exact tie.
            let window = closest.map_or(ray_t, |rec| ray_t.with_max(rec.t));
            if let Some(rec) = object.hit(ray, window) {
                closest = Some(rec);
            }
        }

        closest
    }
}
