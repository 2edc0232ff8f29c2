//! mrt renderer - parallel CPU path tracing
//!
//! A Monte Carlo path tracer for scenes of diffuse spheres under a sky
//! gradient. Rows (or tiles) of the image are rendered concurrently on
//! worker threads, and optionally across ranks that gather their bands
//! onto rank 0.

mod bucket;
mod camera;
mod distributed;
mod engine;
mod error;
mod gather;
mod hittable;
mod output;
mod partition;
mod progress;
mod renderer;
mod sphere;
mod tcp;

pub use bucket::{generate_buckets, render_bucket, Bucket, BucketResult, DEFAULT_TILE_SIZE};
pub use camera::{Camera, FOCAL_LENGTH, VIEWPORT_HEIGHT};
pub use distributed::{render_distributed, render_distributed_with_progress};
pub use engine::{render, render_rows, render_with_progress};
pub use error::{narrow, ConfigError, GatherError, RenderError, RenderResult};
pub use gather::{Communicator, GatherLayout, LocalGroup, Segment};
pub use hittable::{HitRecord, Hittable, HittableList, Surface};
pub use output::{color_to_rgb, encode_ppm, linear_to_gamma, write_ppm};
pub use partition::{static_partition, static_rows, RowCursor};
pub use progress::{report, stderr_bar, Progress};
pub use renderer::{
    pixel_seed, ray_color, render_pixel, render_seeded_pixel, sky_gradient, ImageBuffer,
    RenderConfig, Schedule, DEFAULT_EPSILON, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REFLECTANCE,
};
pub use sphere::Sphere;
pub use tcp::TcpGroup;

/// Re-export Vec3 and common math types from mrt_math
pub use mrt_math::{Color, Interval, Point3, Ray, Vec3};
