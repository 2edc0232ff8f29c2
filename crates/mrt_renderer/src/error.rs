//! Error types for configuration, rendering and gathering.

use thiserror::Error;

/// A render configuration that must be rejected before any worker starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("image {0} must be at least 1 pixel")]
    ZeroDimension(&'static str),

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("samples per pixel must be at least 1")]
    ZeroSamples,

    #[error("{0} must be at least 1")]
    ZeroChunk(&'static str),

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidConstant { name: &'static str, value: f64 },

    #[error("{what} overflows: {detail}")]
    Overflow { what: &'static str, detail: String },

    #[error("rank {rank} is out of range for {size} ranks")]
    BadRank { rank: usize, size: usize },

    #[error("rows {min}..{max} are not inside an image {height} rows tall")]
    RowsOutOfRange { min: usize, max: usize, height: u32 },
}

/// Failures while collecting partial images onto rank 0.
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rank {rank} sent {actual} values, expected {expected}")]
    LengthMismatch {
        rank: usize,
        expected: usize,
        actual: usize,
    },

    #[error("received payload from unknown rank {rank} (group size {size})")]
    UnknownRank { rank: usize, size: usize },

    #[error("rank {0} sent its payload twice")]
    DuplicateRank(usize),

    #[error("{0} rank(s) never delivered a payload")]
    MissingRanks(usize),

    #[error("peer disconnected: {0}")]
    Disconnected(String),

    #[error("rank {rank} failed to render its rows")]
    PeerFailed { rank: usize },
}

/// Fatal render failures. A render that fails never yields a partial image.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("worker {worker} produced a non-finite color at pixel ({x}, {y})")]
    WorkerFault { worker: usize, x: u32, y: u32 },

    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("a tile worker panicked")]
    PoolPanicked,

    #[error("row chunk {chunk} was claimed twice")]
    ChunkUnavailable { chunk: usize },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),

    #[error("gather failed: {0}")]
    Gather(#[from] GatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Convert between integer types, rejecting values that do not fit.
pub fn narrow<T, U>(value: U, what: &'static str) -> Result<T, ConfigError>
where
    T: TryFrom<U>,
    U: Copy + std::fmt::Display,
{
    T::try_from(value).map_err(|_| ConfigError::Overflow {
        what,
        detail: format!("{value} does not fit in {}", std::any::type_name::<T>()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_accepts_fitting_values() {
        let v: u32 = narrow(42usize, "width").unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn test_narrow_rejects_overflow() {
        let err = narrow::<u32, u64>(u64::from(u32::MAX) + 1, "width").unwrap_err();
        assert!(matches!(err, ConfigError::Overflow { what: "width", .. }));
    }

    #[test]
    fn test_error_messages() {
        let err = RenderError::from(ConfigError::ZeroWorkers);
        assert_eq!(
            err.to_string(),
            "invalid configuration: worker count must be at least 1"
        );
    }
}
