//! mrt - render a sphere scene to a PPM image.

mod cli;
mod scene;

use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use mrt_renderer::{
    encode_ppm, render_distributed_with_progress, render_with_progress, stderr_bar, HittableList,
    ImageBuffer, LocalGroup, RenderConfig, TcpGroup,
};

use cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.into())
        .init();

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let (world, camera_center) = match &args.scene {
        Some(path) => {
            let description = scene::load(path)?;
            info!("Loaded {} sphere(s) from {}", description.spheres.len(), path.display());
            (description.build(), description.camera_center())
        }
        None => (scene::hi_scene(), None),
    };

    let mut config = args.render_config();
    if let Some(center) = camera_center {
        config.camera_center = center;
    }
    config.validate().context("Invalid render settings")?;

    let start = Instant::now();
    let Some(image) = render(args, &world, &config)? else {
        info!("Rank {} delivered its rows in {:.2?}", args.rank, start.elapsed());
        return Ok(());
    };
    info!("Done in {:.2?}", start.elapsed());

    // Encode fully before touching the destination so a failed render
    // never leaves a partial image behind.
    let bytes = encode_ppm(&image, config.gamma).context("Failed to encode image")?;
    write_image(args, &bytes)
}

fn progress_bar(args: &Args, rows: u32) -> ProgressBar {
    if args.no_progress {
        ProgressBar::hidden()
    } else {
        stderr_bar(u64::from(rows))
    }
}

/// Render with the rank setup the arguments ask for. Returns `None` on
/// ranks other than 0.
fn render(
    args: &Args,
    world: &HittableList,
    config: &RenderConfig,
) -> Result<Option<ImageBuffer>> {
    if args.ranks <= 1 {
        let bar = progress_bar(args, config.height);
        let image = render_with_progress(world, config, &bar).context("Render failed")?;
        return Ok(Some(image));
    }

    if args.local {
        return render_local_ranks(args, world, config).map(Some);
    }

    let Some(coordinator) = args.coordinator.as_deref() else {
        bail!("--ranks {} needs --coordinator or --local", args.ranks);
    };
    let bar = progress_bar(args, config.height);

    let image = if args.rank == 0 {
        let group = TcpGroup::coordinator(coordinator, args.ranks)
            .with_context(|| format!("Failed to listen on {coordinator}"))?;
        render_distributed_with_progress(world, config, &group, &bar)
    } else {
        let addr = resolve(coordinator)?;
        let group = TcpGroup::peer(args.rank, args.ranks, addr).context("Invalid rank")?;
        render_distributed_with_progress(world, config, &group, &bar)
    };
    image.with_context(|| format!("Rank {} failed", args.rank))
}

/// Simulate `args.ranks` ranks as threads of this process.
fn render_local_ranks(
    args: &Args,
    world: &HittableList,
    config: &RenderConfig,
) -> Result<ImageBuffer> {
    let bar = progress_bar(args, config.height);

    let results = std::thread::scope(|s| {
        let handles: Vec<_> = LocalGroup::new(args.ranks)
            .into_iter()
            .enumerate()
            .map(|(rank, member)| {
                // Only rank 0 draws its progress.
                let bar = if rank == 0 { bar.clone() } else { ProgressBar::hidden() };
                s.spawn(move || render_distributed_with_progress(world, config, &member, &bar))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Rank {rank} panicked"))
            })
            .collect::<Vec<_>>()
    });

    // A failed peer also fails the gather on rank 0; report the peer.
    let mut results = results.into_iter();
    let root = results.next().context("No ranks were started")?;
    for (rank, result) in (1..).zip(results) {
        result?.with_context(|| format!("Rank {rank} failed"))?;
    }
    root?
        .context("Rank 0 failed")?
        .context("Rank 0 returned no image")
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .with_context(|| format!("Invalid coordinator address {addr}"))?
        .next()
        .with_context(|| format!("Coordinator address {addr} did not resolve"))
}

fn write_image(args: &Args, bytes: &[u8]) -> Result<()> {
    match args.output.as_deref() {
        Some(path) if !args.writes_stdout() => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes).context("Failed to write image to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
