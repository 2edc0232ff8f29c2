//! Collecting per-rank row bands onto rank 0.
//!
//! Every rank derives the same [`GatherLayout`] from `(size, height, width)`
//! alone, so no counts or offsets ever travel over the wire. A payload is
//! the rank's band flattened to `rows * width * 3` doubles; rank 0 copies
//! each one to its segment of the full `height * width * 3` buffer.

use std::sync::mpsc::{self, Receiver, Sender};

use log::debug;
use mrt_math::Interval;

use crate::error::{ConfigError, GatherError};
use crate::partition::static_rows;

/// Doubles per pixel in a flattened payload.
pub const CHANNELS: usize = 3;

/// Where one rank's band lands in the gathered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub rank: usize,
    /// Image rows owned by the rank
    pub rows: Interval<usize>,
    /// Offset into the gathered buffer, in doubles
    pub offset: usize,
    /// Payload length, in doubles
    pub len: usize,
    pub byte_offset: usize,
    pub byte_len: usize,
}

impl Segment {
    /// Compute the segment of `rank` in a group of `size` ranks.
    ///
    /// A pure function of its arguments; all arithmetic is checked.
    pub fn new(
        rank: usize,
        size: usize,
        height: usize,
        width: usize,
    ) -> Result<Self, ConfigError> {
        if size == 0 || rank >= size {
            return Err(ConfigError::BadRank { rank, size });
        }
        let rows = static_rows(rank, size, height);
        let row_len = width.checked_mul(CHANNELS).ok_or_else(|| overflow(height, width))?;
        let offset = rows.min.checked_mul(row_len).ok_or_else(|| overflow(height, width))?;
        let len = rows.len().checked_mul(row_len).ok_or_else(|| overflow(height, width))?;

        let double = std::mem::size_of::<f64>();
        let byte_offset = offset.checked_mul(double).ok_or_else(|| overflow(height, width))?;
        let byte_len = len.checked_mul(double).ok_or_else(|| overflow(height, width))?;

        Ok(Self {
            rank,
            rows,
            offset,
            len,
            byte_offset,
            byte_len,
        })
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

fn overflow(height: usize, width: usize) -> ConfigError {
    ConfigError::Overflow {
        what: "gather buffer",
        detail: format!("{width}x{height}x{CHANNELS} doubles"),
    }
}

/// Segments of every rank, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherLayout {
    width: usize,
    height: usize,
    segments: Vec<Segment>,
}

impl GatherLayout {
    pub fn new(size: usize, height: usize, width: usize) -> Result<Self, ConfigError> {
        let segments = (0..size)
            .map(|rank| Segment::new(rank, size, height, width))
            .collect::<Result<Vec<_>, _>>()?;
        if segments.is_empty() {
            return Err(ConfigError::BadRank { rank: 0, size });
        }
        // Total length is checked once here so receivers can allocate it.
        height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or_else(|| overflow(height, width))?;
        Ok(Self {
            width,
            height,
            segments,
        })
    }

    pub fn size(&self) -> usize {
        self.segments.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn segment(&self, rank: usize) -> Option<&Segment> {
        self.segments.get(rank)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length of the gathered buffer, in doubles.
    pub fn total_len(&self) -> usize {
        self.height * self.width * CHANNELS
    }
}

/// A fixed group of ranks that can gather one payload per rank onto rank 0.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Contribute this rank's payload. Rank 0 gets the full buffer back;
    /// every other rank gets `None`.
    fn gather(
        &self,
        payload: Vec<f64>,
        layout: &GatherLayout,
    ) -> Result<Option<Vec<f64>>, GatherError>;

    /// Report that this rank failed before it could contribute, so rank 0
    /// stops waiting for it. A no-op on rank 0.
    fn abort(&self) -> Result<(), GatherError>;
}

/// Rank 0's view of a gather in progress.
pub(crate) struct Assembler<'a> {
    layout: &'a GatherLayout,
    buffer: Vec<f64>,
    received: Vec<bool>,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(layout: &'a GatherLayout) -> Self {
        Self {
            layout,
            buffer: vec![0.0; layout.total_len()],
            received: vec![false; layout.size()],
        }
    }

    /// Expected payload length for `rank`.
    pub(crate) fn expected_len(&self, rank: usize) -> Result<usize, GatherError> {
        self.layout
            .segment(rank)
            .map(|segment| segment.len)
            .ok_or(GatherError::UnknownRank {
                rank,
                size: self.layout.size(),
            })
    }

    /// Copy `payload` into the segment of `rank`.
    pub(crate) fn place(&mut self, rank: usize, payload: &[f64]) -> Result<(), GatherError> {
        let segment = *self.layout.segment(rank).ok_or(GatherError::UnknownRank {
            rank,
            size: self.layout.size(),
        })?;
        if self.received[rank] {
            return Err(GatherError::DuplicateRank(rank));
        }
        if payload.len() != segment.len {
            return Err(GatherError::LengthMismatch {
                rank,
                expected: segment.len,
                actual: payload.len(),
            });
        }
        self.buffer[segment.range()].copy_from_slice(payload);
        self.received[rank] = true;
        debug!("Gathered rows {}..{} from rank {rank}", segment.rows.min, segment.rows.max);
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<Vec<f64>, GatherError> {
        let missing = self.received.iter().filter(|&&seen| !seen).count();
        if missing > 0 {
            return Err(GatherError::MissingRanks(missing));
        }
        Ok(self.buffer)
    }
}

/// In-process group: one member per thread, payloads sent over a channel.
pub struct LocalGroup {
    rank: usize,
    size: usize,
    link: Link,
}

/// A rank and its band, or `None` when the rank failed.
type Message = (usize, Option<Vec<f64>>);

enum Link {
    Root(Receiver<Message>),
    Peer(Sender<Message>),
}

impl LocalGroup {
    /// Create all `size` members, in rank order.
    pub fn new(size: usize) -> Vec<LocalGroup> {
        let (tx, rx) = mpsc::channel();
        let mut members = Vec::with_capacity(size);
        if size == 0 {
            return members;
        }
        members.push(LocalGroup {
            rank: 0,
            size,
            link: Link::Root(rx),
        });
        for rank in 1..size {
            members.push(LocalGroup {
                rank,
                size,
                link: Link::Peer(tx.clone()),
            });
        }
        // Only peers hold senders, so the root sees a hangup once every
        // peer is gone.
        drop(tx);
        members
    }
}

impl LocalGroup {
    fn send(&self, tx: &Sender<Message>, part: Option<Vec<f64>>) -> Result<(), GatherError> {
        tx.send((self.rank, part))
            .map_err(|_| GatherError::Disconnected(format!("rank {} lost rank 0", self.rank)))
    }
}

impl Communicator for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn gather(
        &self,
        payload: Vec<f64>,
        layout: &GatherLayout,
    ) -> Result<Option<Vec<f64>>, GatherError> {
        match &self.link {
            Link::Peer(tx) => {
                self.send(tx, Some(payload))?;
                Ok(None)
            }
            Link::Root(rx) => {
                let mut assembler = Assembler::new(layout);
                assembler.place(0, &payload)?;
                for _ in 1..layout.size() {
                    match rx.recv() {
                        Ok((rank, Some(part))) => assembler.place(rank, &part)?,
                        Ok((rank, None)) => return Err(GatherError::PeerFailed { rank }),
                        // Every peer hung up; report who never arrived.
                        Err(_) => break,
                    }
                }
                assembler.finish().map(Some)
            }
        }
    }

    fn abort(&self) -> Result<(), GatherError> {
        match &self.link {
            Link::Peer(tx) => self.send(tx, None),
            Link::Root(_) => Ok(()),
        }
    }
}
