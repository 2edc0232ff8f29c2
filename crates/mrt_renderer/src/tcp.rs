//! Gathering bands over TCP.
//!
//! Rank 0 listens; every other rank opens one connection, sends a 16-byte
//! header (`rank`, `len` as little-endian u64, `len` counted in doubles)
//! followed by the payload, and closes. A rank that fails sends the header
//! alone with `len = u64::MAX`, so rank 0 stops instead of waiting for it.
//! Payload doubles are sent in native byte order, so all ranks must share
//! an architecture.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{ConfigError, GatherError};
use crate::gather::{Assembler, Communicator, GatherLayout};

/// Connection attempts a peer makes before giving up on rank 0.
pub const CONNECT_ATTEMPTS: u32 = 50;
/// Pause between connection attempts.
pub const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

const HEADER_LEN: usize = 16;

/// `len` value announcing that the sender failed and has no payload.
const FAILED: u64 = u64::MAX;

/// One member of a TCP gather group.
#[derive(Debug)]
pub struct TcpGroup {
    rank: usize,
    size: usize,
    role: Role,
}

#[derive(Debug)]
enum Role {
    Coordinator(TcpListener),
    Peer(SocketAddr),
}

impl TcpGroup {
    /// Bind rank 0 of a group of `size` ranks.
    pub fn coordinator(addr: impl ToSocketAddrs, size: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(
            "Rank 0 listening on {} for {} peer(s)",
            listener.local_addr()?,
            size.saturating_sub(1)
        );
        Ok(Self {
            rank: 0,
            size,
            role: Role::Coordinator(listener),
        })
    }

    /// A non-zero rank that will send its band to `coordinator`.
    pub fn peer(rank: usize, size: usize, coordinator: SocketAddr) -> Result<Self, ConfigError> {
        if rank == 0 || rank >= size {
            return Err(ConfigError::BadRank { rank, size });
        }
        Ok(Self {
            rank,
            size,
            role: Role::Peer(coordinator),
        })
    }

    /// Address the coordinator is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.role {
            Role::Coordinator(listener) => listener.local_addr().ok(),
            Role::Peer(_) => None,
        }
    }

    fn receive_all(
        &self,
        listener: &TcpListener,
        payload: &[f64],
        layout: &GatherLayout,
    ) -> Result<Vec<f64>, GatherError> {
        let mut assembler = Assembler::new(layout);
        assembler.place(0, payload)?;

        for _ in 1..layout.size() {
            let (mut stream, from) = listener.accept()?;
            let (rank, part) = read_part(&mut stream, &assembler)
                .map_err(|e| eof_as_disconnect(e, from))?;
            assembler.place(rank, &part)?;
        }

        assembler.finish()
    }

    /// Send `payload` to rank 0, or a failure notice when it is `None`.
    fn send(
        &self,
        coordinator: SocketAddr,
        payload: Option<&[f64]>,
    ) -> Result<(), GatherError> {
        let mut stream = connect(coordinator)?;

        let len = payload.map_or(FAILED, |values| values.len() as u64);
        let mut header = [0u8; HEADER_LEN];
        header[..8].copy_from_slice(&(self.rank as u64).to_le_bytes());
        header[8..].copy_from_slice(&len.to_le_bytes());

        stream.write_all(&header)?;
        if let Some(values) = payload {
            stream.write_all(bytemuck::cast_slice(values))?;
        }
        stream.flush()?;
        stream.shutdown(Shutdown::Write)?;
        match payload {
            Some(values) => {
                debug!("Rank {} sent {} values to {coordinator}", self.rank, values.len())
            }
            None => warn!("Rank {} reported failure to {coordinator}", self.rank),
        }
        Ok(())
    }
}

impl Communicator for TcpGroup {
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
        match &self.role {
            Role::Coordinator(listener) => self.receive_all(listener, &payload, layout).map(Some),
            Role::Peer(coordinator) => {
                self.send(*coordinator, Some(&payload))?;
                Ok(None)
            }
        }
    }

    fn abort(&self) -> Result<(), GatherError> {
        match &self.role {
            Role::Coordinator(_) => Ok(()),
            Role::Peer(coordinator) => self.send(*coordinator, None),
        }
    }
}

/// Read one header and payload, checking both against the layout before
/// allocating.
fn read_part(
    stream: &mut TcpStream,
    assembler: &Assembler<'_>,
) -> Result<(usize, Vec<f64>), GatherError> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header)?;

    let mut word = [0u8; 8];
    word.copy_from_slice(&header[..8]);
    let rank = u64::from_le_bytes(word);
    word.copy_from_slice(&header[8..]);
    let len = u64::from_le_bytes(word);

    let rank = usize::try_from(rank).unwrap_or(usize::MAX);
    let expected = assembler.expected_len(rank)?;
    if len == FAILED {
        return Err(GatherError::PeerFailed { rank });
    }
    if usize::try_from(len).ok() != Some(expected) {
        return Err(GatherError::LengthMismatch {
            rank,
            expected,
            actual: usize::try_from(len).unwrap_or(usize::MAX),
        });
    }

    let mut part = vec![0.0f64; expected];
    stream.read_exact(bytemuck::cast_slice_mut(part.as_mut_slice()))?;
    Ok((rank, part))
}

fn eof_as_disconnect(err: GatherError, from: SocketAddr) -> GatherError {
    match err {
        GatherError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            GatherError::Disconnected(format!("{from} closed mid-payload"))
        }
        other => other,
    }
}

fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                if attempt == 1 {
                    warn!("Rank 0 at {addr} not reachable yet ({e}), retrying");
                }
                attempt += 1;
                std::thread::sleep(CONNECT_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}
