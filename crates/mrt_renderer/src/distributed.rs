//! Rendering across ranks.
//!
//! Each rank renders its static band of rows on its own worker threads,
//! flattens the band, and gathers it onto rank 0, which reshapes the full
//! buffer into the final image.

use std::time::Instant;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::engine::render_rows;
use crate::error::{narrow, ConfigError, GatherError, RenderResult};
use crate::gather::{Communicator, GatherLayout};
use crate::{Hittable, ImageBuffer, RenderConfig};

/// Render `world` across the ranks of `comm`.
///
/// Rank 0 returns `Some(image)`; every other rank returns `None` once its
/// band has been delivered.
pub fn render_distributed(
    world: &dyn Hittable,
    config: &RenderConfig,
    comm: &dyn Communicator,
) -> RenderResult<Option<ImageBuffer>> {
    render_distributed_with_progress(world, config, comm, &ProgressBar::hidden())
}

/// [`render_distributed`], mirroring this rank's progress onto `bar`.
pub fn render_distributed_with_progress(
    world: &dyn Hittable,
    config: &RenderConfig,
    comm: &dyn Communicator,
    bar: &ProgressBar,
) -> RenderResult<Option<ImageBuffer>> {
    let (rank, size) = (comm.rank(), comm.size());
    let start = Instant::now();

    let (layout, band) = match render_own_band(world, config, rank, size, bar) {
        Ok(rendered) => rendered,
        Err(e) => {
            // Rank 0 would otherwise wait forever for this band.
            if let Err(notify) = comm.abort() {
                warn!("Rank {rank} could not report its failure: {notify}");
            }
            return Err(e);
        }
    };
    info!("Rank {rank} done in {:.2?}", start.elapsed());

    let Some(flat) = comm.gather(band.to_flat(), &layout)? else {
        return Ok(None);
    };

    let actual = flat.len();
    let image = ImageBuffer::from_flat(config.width, config.height, &flat).ok_or(
        GatherError::LengthMismatch {
            rank: 0,
            expected: layout.total_len(),
            actual,
        },
    )?;
    info!("Gathered {} rank(s) in {:.2?}", size, start.elapsed());
    Ok(Some(image))
}

fn render_own_band(
    world: &dyn Hittable,
    config: &RenderConfig,
    rank: usize,
    size: usize,
    bar: &ProgressBar,
) -> RenderResult<(GatherLayout, ImageBuffer)> {
    config.validate()?;
    if rank >= size {
        return Err(ConfigError::BadRank { rank, size }.into());
    }

    let height: usize = narrow(config.height, "height")?;
    let width: usize = narrow(config.width, "width")?;
    let layout = GatherLayout::new(size, height, width)?;
    let rows = layout
        .segment(rank)
        .map(|segment| segment.rows)
        .ok_or(ConfigError::BadRank { rank, size })?;

    info!("Rank {rank}/{size} rendering rows {}..{}", rows.min, rows.max);
    let band = render_rows(world, config, rows, bar)?;
    Ok((layout, band))
}
