use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use mrt_renderer::{RenderConfig, Schedule, DEFAULT_TILE_SIZE};

/// Log levels selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// How rows are handed to worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleKind {
    /// One fixed band of rows per worker
    Static,
    /// Workers claim row chunks from a shared counter
    Dynamic,
    /// Square tiles, rendered center-out
    Tiles,
}

#[derive(Debug, Parser)]
#[command(name = "mrt")]
#[command(about = "Parallel Monte Carlo path tracer for sphere scenes")]
pub struct Args {
    /// Image width in pixels
    #[arg(long, default_value_t = 400)]
    pub width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = 225)]
    pub height: u32,

    /// Rays per pixel
    #[arg(long, short = 's', default_value_t = 100)]
    pub samples: u32,

    /// Maximum bounces per path
    #[arg(long, default_value_t = 50)]
    pub max_depth: u32,

    /// Worker threads per rank (defaults to available parallelism)
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,

    #[arg(long, value_enum, default_value_t = ScheduleKind::Dynamic)]
    pub schedule: ScheduleKind,

    /// Rows claimed at a time with the dynamic schedule
    #[arg(long, default_value_t = 1)]
    pub chunk_rows: usize,

    /// Tile edge length with the tiles schedule
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// Fix the random seed for reproducible images
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write linear values instead of gamma-corrected ones
    #[arg(long)]
    pub no_gamma: bool,

    /// JSON scene file (defaults to the built-in "HI" scene)
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Output PPM path; stdout when omitted or "-"
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Set the logging level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Number of ranks sharing the image
    #[arg(long, default_value_t = 1)]
    pub ranks: usize,

    /// This process's rank
    #[arg(long, default_value_t = 0)]
    pub rank: usize,

    /// Address rank 0 listens on and other ranks connect to
    #[arg(long)]
    pub coordinator: Option<String>,

    /// Run every rank as a thread of this process
    #[arg(long)]
    pub local: bool,
}

impl Args {
    pub fn schedule(&self) -> Schedule {
        match self.schedule {
            ScheduleKind::Static => Schedule::Static,
            ScheduleKind::Dynamic => Schedule::Dynamic {
                chunk_rows: self.chunk_rows,
            },
            ScheduleKind::Tiles => Schedule::Tiles {
                tile_size: self.tile_size,
            },
        }
    }

    /// Build the render configuration these arguments describe.
    pub fn render_config(&self) -> RenderConfig {
        let mut config = RenderConfig::default()
            .with_resolution(self.width, self.height)
            .with_quality(self.samples, self.max_depth);
        config.schedule = self.schedule();
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.seed = self.seed;
        config.gamma = !self.no_gamma;
        config
    }

    /// True when the image goes to stdout.
    pub fn writes_stdout(&self) -> bool {
        self.output
            .as_deref()
            .map_or(true, |path| path.as_os_str() == "-")
    }
}
