//! Parallel render engine.
//!
//! Every worker follows the same loop: claim work, render it into a slice
//! of the image that no other worker can reach, bump the progress counter,
//! and claim again until nothing is left. Three schedules decide how work
//! is claimed:
//!
//! - [`Schedule::Static`]: each worker gets one band from
//!   [`static_rows`], fixed before any thread starts.
//! - [`Schedule::Dynamic`]: workers fetch-and-add a shared [`RowCursor`]
//!   and take the next `chunk_rows` rows.
//! - [`Schedule::Tiles`]: buckets rendered center-out on a rayon pool and
//!   copied into the image once all have finished.
//!
//! Pixels are seeded from their coordinates, so with a fixed seed the
//! result does not depend on the schedule or the worker count.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, info};
use mrt_math::Interval;
use rayon::prelude::*;

use crate::bucket::{generate_buckets, render_bucket, BucketResult};
use crate::error::{narrow, ConfigError, RenderError, RenderResult};
use crate::partition::{static_rows, RowCursor};
use crate::progress::{report, Progress};
use crate::renderer::render_seeded_pixel;
use crate::{Camera, Color, Hittable, ImageBuffer, RenderConfig, Schedule};

/// Render the whole image on `config.workers` threads.
pub fn render(world: &dyn Hittable, config: &RenderConfig) -> RenderResult<ImageBuffer> {
    render_with_progress(world, config, &ProgressBar::hidden())
}

/// Render the whole image, mirroring progress onto `bar`.
pub fn render_with_progress(
    world: &dyn Hittable,
    config: &RenderConfig,
    bar: &ProgressBar,
) -> RenderResult<ImageBuffer> {
    config.validate()?;
    let height: usize = narrow(config.height, "height")?;
    render_rows(world, config, Interval::new(0, height), bar)
}

/// Render image rows `[rows.min, rows.max)` into a buffer holding just
/// those rows.
///
/// The full-image camera is used, so a band rendered here matches the same
/// rows of a full render with the same seed.
pub fn render_rows(
    world: &dyn Hittable,
    config: &RenderConfig,
    rows: Interval<usize>,
    bar: &ProgressBar,
) -> RenderResult<ImageBuffer> {
    config.validate()?;
    if rows.min > rows.max || rows.max > narrow::<usize, _>(config.height, "height")? {
        return Err(ConfigError::RowsOutOfRange {
            min: rows.min,
            max: rows.max,
            height: config.height,
        }
        .into());
    }

    let band_height: u32 = narrow(rows.len(), "band height")?;
    let first_row: u32 = narrow(rows.min, "first row")?;
    let mut image = ImageBuffer::new(config.width, band_height);
    if rows.is_empty() {
        bar.finish_and_clear();
        return Ok(image);
    }

    let job = Job {
        camera: config.camera(),
        world,
        config,
        base_seed: config.seed.unwrap_or_else(rand::random),
        first_row,
        width: config.width as usize,
        abort: AtomicBool::new(false),
    };

    info!(
        "Rendering rows {}..{} of {}x{} @ {} spp, depth {}, {} worker(s), {:?}",
        rows.min,
        rows.max,
        config.width,
        config.height,
        config.samples_per_pixel,
        config.max_depth,
        config.workers,
        config.schedule
    );
    let start = Instant::now();

    match config.schedule {
        Schedule::Static => job.run_static(&mut image.pixels, bar)?,
        Schedule::Dynamic { chunk_rows } => job.run_dynamic(&mut image.pixels, chunk_rows, bar)?,
        Schedule::Tiles { tile_size } => job.run_tiles(&mut image, tile_size, bar)?,
    }

    info!("Rendered {} rows in {:.2?}", rows.len(), start.elapsed());
    Ok(image)
}

/// A worker body, run on its own scoped thread.
type Task<'a> = Box<dyn FnOnce() -> RenderResult<()> + Send + 'a>;

/// Everything a worker reads. Shared by reference across threads.
struct Job<'a> {
    camera: Camera,
    world: &'a dyn Hittable,
    config: &'a RenderConfig,
    base_seed: u64,
    /// Image row of local row 0
    first_row: u32,
    width: usize,
    /// Raised by the first failing worker; others stop at their next claim.
    abort: AtomicBool,
}

impl Job<'_> {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Render local rows starting at `local_row` into `out`, which holds
    /// whole rows. Advances `progress` after each row.
    fn render_band(
        &self,
        worker: usize,
        local_row: usize,
        out: &mut [Color],
        progress: &Progress,
    ) -> RenderResult<()> {
        for (offset, row) in out.chunks_exact_mut(self.width).enumerate() {
            if self.aborted() {
                return Ok(());
            }
            let y = self.first_row + narrow::<u32, _>(local_row + offset, "row")?;
            for (x, pixel) in (0u32..).zip(row.iter_mut()) {
                let color =
                    render_seeded_pixel(&self.camera, self.world, x, y, self.config, self.base_seed);
                if !color.is_finite() {
                    self.abort.store(true, Ordering::Relaxed);
                    return Err(RenderError::WorkerFault { worker, x, y });
                }
                *pixel = color;
            }
            progress.advance(1);
        }
        Ok(())
    }

    fn run_static(&self, pixels: &mut [Color], bar: &ProgressBar) -> RenderResult<()> {
        let height = pixels.len() / self.width;
        let workers = self.config.workers;
        let progress = Progress::new(height);

        // Carve the buffer into one band per worker before any thread starts.
        let mut tasks: Vec<Task<'_>> = Vec::with_capacity(workers);
        let mut rest = pixels;
        for worker in 0..workers {
            let band = static_rows(worker, workers, height);
            let (out, tail) = std::mem::take(&mut rest).split_at_mut(band.len() * self.width);
            rest = tail;

            let progress = &progress;
            tasks.push(Box::new(move || {
                let result = self.render_band(worker, band.min, out, progress);
                debug!("Worker {worker} finished rows {}..{}", band.min, band.max);
                result
            }));
        }

        self.run_workers(tasks, &progress, bar)
    }

    fn run_dynamic(
        &self,
        pixels: &mut [Color],
        chunk_rows: usize,
        bar: &ProgressBar,
    ) -> RenderResult<()> {
        let height = pixels.len() / self.width;
        let progress = Progress::new(height);
        let cursor = RowCursor::new(height, chunk_rows);

        // One slot per chunk. The cursor hands each index out exactly once,
        // so every slot is taken by a single worker and never contended.
        let chunk_len = cursor
            .chunk_rows()
            .checked_mul(self.width)
            .ok_or_else(|| ConfigError::Overflow {
                what: "chunk rows",
                detail: format!("{} rows of {} pixels", cursor.chunk_rows(), self.width),
            })?;
        let slots: Vec<Mutex<Option<&mut [Color]>>> = pixels
            .chunks_mut(chunk_len)
            .map(|chunk| Mutex::new(Some(chunk)))
            .collect();

        let tasks: Vec<Task<'_>> = (0..self.config.workers)
            .map(|worker| {
                let (cursor, slots, progress) = (&cursor, &slots, &progress);
                Box::new(move || -> RenderResult<()> {
                    let mut chunks = 0usize;
                    while let Some(band) = cursor.claim() {
                        if self.aborted() {
                            break;
                        }
                        let chunk = cursor.chunk_index(band.min);
                        let out = slots[chunk]
                            .lock()
                            .ok()
                            .and_then(|mut slot| slot.take())
                            .ok_or(RenderError::ChunkUnavailable { chunk })?;
                        self.render_band(worker, band.min, out, progress)?;
                        chunks += 1;
                    }
                    debug!("Worker {worker} finished after {chunks} chunk(s)");
                    Ok(())
                }) as Task<'_>
            })
            .collect();

        self.run_workers(tasks, &progress, bar)
    }

    fn run_tiles(&self, image: &mut ImageBuffer, tile_size: u32, bar: &ProgressBar) -> RenderResult<()> {
        let buckets = generate_buckets(image.width, self.first_row, image.height, tile_size);
        let progress = Progress::new(image.pixels.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| RenderError::ThreadPool(e.to_string()))?;

        let results = std::thread::scope(|s| {
            s.spawn(|| report(&progress, bar, self.config.progress_interval));
            let _finish = progress.finish_on_drop();

            let render_all = || {
                pool.install(|| {
                    buckets
                        .par_iter()
                        .map(|bucket| -> RenderResult<BucketResult> {
                            let worker = rayon::current_thread_index().unwrap_or(0);
                            let result = render_bucket(
                                bucket,
                                &self.camera,
                                self.world,
                                self.config,
                                self.base_seed,
                                worker,
                            )?;
                            progress.advance(bucket.pixel_count());
                            Ok(result)
                        })
                        .collect::<RenderResult<Vec<BucketResult>>>()
                })
            };
            std::panic::catch_unwind(AssertUnwindSafe(render_all))
                .unwrap_or(Err(RenderError::PoolPanicked))
        })?;

        // Buckets are disjoint; copying them in is the whole reduction.
        for result in results {
            result.blit(image, self.first_row);
        }
        debug!("Blitted {} bucket(s)", buckets.len());
        Ok(())
    }

    /// Run each task on its own thread next to the progress reporter, join
    /// them all, and return the first failure.
    fn run_workers(
        &self,
        tasks: Vec<Task<'_>>,
        progress: &Progress,
        bar: &ProgressBar,
    ) -> RenderResult<()> {
        std::thread::scope(|s| {
            s.spawn(|| report(progress, bar, self.config.progress_interval));
            let _finish = progress.finish_on_drop();

            let handles: Vec<_> = tasks.into_iter().map(|task| s.spawn(task)).collect();

            let mut first_error = None;
            for (worker, handle) in handles.into_iter().enumerate() {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(RenderError::WorkerPanicked { worker }));
                if let Err(e) = outcome {
                    self.abort.store(true, Ordering::Relaxed);
                    first_error.get_or_insert(e);
                }
            }

            first_error.map_or(Ok(()), Err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::sky_gradient;
    use crate::{HittableList, Sphere};
    use mrt_math::{Point3, Ray, Vec3};

    fn unit_sphere_scene() -> HittableList {
        let mut world = HittableList::new();
        world.add(Sphere::new(Point3::ZERO, 1.0));
        world
    }

    fn small_config(workers: usize, schedule: Schedule) -> RenderConfig {
        RenderConfig::default()
            .with_resolution(24, 16)
            .with_quality(4, 4)
            .with_workers(workers, schedule)
            .with_seed(0xC0FFEE)
    }

    #[test]
    fn test_corners_are_sky_and_center_is_sphere() {
        let world = unit_sphere_scene();
        let mut config = RenderConfig::default()
            .with_resolution(32, 32)
            .with_quality(1, 1)
            .with_workers(4, Schedule::default());
        config.camera_center = Point3::new(0.0, 0.0, 3.0);

        let image = render(&world, &config).unwrap();
        assert_eq!((image.width, image.height), (32, 32));

        // One bounce: anything that hits the sphere is absorbed.
        assert_eq!(image.get(16, 16), Color::ZERO);
        assert_eq!(image.get(15, 15), Color::ZERO);

        // Corners see only sky; compare against the unjittered corner ray.
        let camera = config.camera();
        for (x, y) in [(0, 0), (31, 0), (0, 31), (31, 31)] {
            let through = camera.pixel00_loc()
                + f64::from(x) * camera.pixel_delta_u()
                + f64::from(y) * camera.pixel_delta_v();
            let sky = sky_gradient(&Ray::new(camera.center(), through - camera.center()));
            let pixel = image.get(x, y);
            assert!(pixel.x > 0.5 && pixel.z > 0.99, "corner ({x}, {y}) = {pixel}");
            assert!((pixel - sky).length() < 0.01, "corner ({x}, {y}) = {pixel}");
        }
    }

    #[test]
    fn test_worker_count_does_not_change_image() {
        let _ = env_logger::builder().is_test(true).try_init();
        let world = unit_sphere_scene();
        let mut one = small_config(1, Schedule::Static);
        one.camera_center = Point3::new(0.0, 0.0, 3.0);
        let reference = render(&world, &one).unwrap();

        for schedule in [
            Schedule::Static,
            Schedule::Dynamic { chunk_rows: 1 },
            Schedule::Dynamic { chunk_rows: 5 },
            Schedule::Tiles { tile_size: 7 },
        ] {
            let mut eight = small_config(8, schedule);
            eight.camera_center = one.camera_center;
            let image = render(&world, &eight).unwrap();
            assert_eq!((image.width, image.height), (reference.width, reference.height));
            assert_eq!(image.pixels, reference.pixels, "{schedule:?}");
        }
    }

    #[test]
    fn test_more_workers_than_rows() {
        let world = unit_sphere_scene();
        let config = RenderConfig::default()
            .with_resolution(5, 3)
            .with_quality(1, 2)
            .with_workers(16, Schedule::Static)
            .with_seed(1);
        let image = render(&world, &config).unwrap();
        assert_eq!(image.pixels.len(), 15);
        assert!(image.pixels.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_band_matches_full_render() {
        let world = unit_sphere_scene();
        let config = small_config(3, Schedule::Dynamic { chunk_rows: 2 });
        let full = render(&world, &config).unwrap();

        let band =
            render_rows(&world, &config, Interval::new(5, 11), &ProgressBar::hidden()).unwrap();
        assert_eq!(band.height, 6);
        for local in 0..6u32 {
            assert_eq!(band.row(local), full.row(local + 5));
        }
    }

    #[test]
    fn test_huge_chunk_renders_as_one_chunk() {
        let world = unit_sphere_scene();
        let one_row = small_config(2, Schedule::Dynamic { chunk_rows: 1 });
        let reference = render(&world, &one_row).unwrap();

        // Passes validation: chunk_rows * 24 still fits in usize.
        let config = small_config(2, Schedule::Dynamic { chunk_rows: usize::MAX / 24 });
        assert!(config.validate().is_ok());
        let image = render(&world, &config).unwrap();
        assert_eq!(image.pixels, reference.pixels);
    }

    #[test]
    fn test_rows_outside_image_rejected() {
        let world = unit_sphere_scene();
        let config = small_config(2, Schedule::Static);
        let bar = ProgressBar::hidden();

        for rows in [Interval::new(10, 17), Interval::new(20, 30), Interval::new(5, 3)] {
            assert!(matches!(
                render_rows(&world, &config, rows, &bar),
                Err(RenderError::Config(ConfigError::RowsOutOfRange { .. }))
            ));
        }
        // The last row is still inside.
        let last = render_rows(&world, &config, Interval::new(15, 16), &bar).unwrap();
        assert_eq!(last.height, 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_rendering() {
        let world = unit_sphere_scene();
        let config = RenderConfig::default().with_workers(0, Schedule::Static);
        assert!(matches!(
            render(&world, &config),
            Err(RenderError::Config(crate::ConfigError::ZeroWorkers))
        ));
    }

    /// Reports a hit with a NaN normal, which poisons the path.
    struct Poisoned;

    impl Hittable for Poisoned {
        fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<crate::HitRecord> {
            // Poisoned rays miss, so the NaN reaches the sky lookup.
            let live = ray.direction().is_finite() && ray_t.surrounds(1.0);
            live.then(|| crate::HitRecord {
                point: ray.at(1.0),
                normal: Vec3::splat(f64::NAN),
                t: 1.0,
                front_face: true,
            })
        }
    }

    #[test]
    fn test_worker_fault_fails_whole_render() {
        for schedule in [
            Schedule::Static,
            Schedule::Dynamic { chunk_rows: 1 },
            Schedule::Tiles { tile_size: 4 },
        ] {
            let config = small_config(4, schedule);
            match render(&Poisoned, &config) {
                Err(RenderError::WorkerFault { .. }) => {}
                other => panic!("{schedule:?}: expected worker fault, got {other:?}"),
            }
        }
    }

    struct Exploding;

    impl Hittable for Exploding {
        fn hit(&self, _ray: &Ray, _ray_t: Interval) -> Option<crate::HitRecord> {
            panic!("intersection blew up");
        }
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let config = small_config(2, Schedule::Static);
        assert!(matches!(
            render(&Exploding, &config),
            Err(RenderError::WorkerPanicked { .. })
        ));
    }
}
