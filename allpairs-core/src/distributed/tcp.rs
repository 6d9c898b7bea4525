//! TCP communicator for ranks running as separate processes
//!
//! Star topology: rank 0 (the coordinator) accepts one connection per peer
//! and relays every collective. Frames are bincode-encoded [`Frame`] values.
//!
//! ## Collectives
//!
//! - barrier: peers send `Barrier`, the coordinator answers everyone once
//!   all peers arrived
//! - broadcast: the coordinator sends `Payload` to every peer
//! - all-reduce: peers send `Payload`, the coordinator folds the minima and
//!   sends the result back (or `Abort` on a size mismatch)
//!
//! Every link encodes and decodes with a byte limit derived from
//! [`TransportConfig::max_vertices`], so a corrupt length prefix fails the
//! read instead of allocating.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use allpairs_common::{Error, Result, Weight};
use bincode::Options;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::comm::{min_into, Communicator, ROOT};
use crate::config::TransportConfig;

/// Bytes allowed on top of the payload cells (variant tag, length prefix)
const FRAME_OVERHEAD: u64 = 64;

/// Largest encoded frame: a full `max_vertices`² matrix payload
fn frame_limit(max_vertices: usize) -> u64 {
    let cells = (max_vertices as u64).saturating_mul(max_vertices as u64);
    cells
        .saturating_mul(std::mem::size_of::<Weight>() as u64)
        .saturating_add(FRAME_OVERHEAD)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Frame {
    Hello { rank: usize, world_size: usize },
    Barrier,
    Payload(Vec<Weight>),
    Abort(String),
}

#[derive(Debug)]
struct Link {
    peer_rank: usize,
    limit: u64,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Link {
    fn new(stream: TcpStream, peer_rank: usize, limit: u64) -> Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            peer_rank,
            limit,
            reader,
            writer: BufWriter::new(stream),
        })
    }

    fn wire(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(self.limit)
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        let wire = self.wire();
        wire.serialize_into(&mut self.writer, frame).map_err(|e| {
            Error::Communication(format!("send to rank {} failed: {e}", self.peer_rank))
        })?;
        self.writer.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Frame> {
        let wire = self.wire();
        wire.deserialize_from(&mut self.reader).map_err(|e| {
            Error::Communication(format!("receive from rank {} failed: {e}", self.peer_rank))
        })
    }

    fn expect_barrier(&mut self) -> Result<()> {
        match self.recv()? {
            Frame::Barrier => Ok(()),
            other => Err(unexpected(self.peer_rank, "Barrier", &other)),
        }
    }

    fn expect_payload(&mut self) -> Result<Vec<Weight>> {
        match self.recv()? {
            Frame::Payload(buffer) => Ok(buffer),
            Frame::Abort(reason) => Err(Error::Communication(format!(
                "rank {} aborted the collective: {reason}",
                self.peer_rank
            ))),
            other => Err(unexpected(self.peer_rank, "Payload", &other)),
        }
    }
}

fn unexpected(peer_rank: usize, wanted: &str, got: &Frame) -> Error {
    let kind = match got {
        Frame::Hello { .. } => "Hello",
        Frame::Barrier => "Barrier",
        Frame::Payload(_) => "Payload",
        Frame::Abort(_) => "Abort",
    };
    Error::Communication(format!(
        "protocol violation: expected {wanted} from rank {peer_rank}, got {kind}"
    ))
}

#[derive(Debug)]
enum Role {
    /// Links ordered by peer rank (1..world_size)
    Coordinator(Vec<Link>),
    Peer(Link),
}

#[derive(Debug)]
pub struct TcpCommunicator {
    rank: usize,
    world_size: usize,
    role: Mutex<Role>,
}

impl TcpCommunicator {
    /// Bind `addr` and wait for the other `world_size - 1` ranks
    pub fn coordinator<A: ToSocketAddrs>(
        addr: A,
        world_size: usize,
        transport: &TransportConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Self::coordinator_from_listener(listener, world_size, transport)
    }

    /// Accept peers on an already bound listener
    pub fn coordinator_from_listener(
        listener: TcpListener,
        world_size: usize,
        transport: &TransportConfig,
    ) -> Result<Self> {
        if world_size == 0 {
            return Err(Error::InvalidConfig("world size must be at least 1".to_string()));
        }
        info!(
            "Coordinator waiting for {} peers on {}",
            world_size - 1,
            listener.local_addr()?
        );

        let mut links: BTreeMap<usize, Link> = BTreeMap::new();
        while links.len() < world_size - 1 {
            let (stream, remote) = listener.accept()?;
            let mut link = Link::new(stream, usize::MAX, frame_limit(transport.max_vertices))?;
            let (rank, announced_world) = match link.recv()? {
                Frame::Hello { rank, world_size } => (rank, world_size),
                other => return Err(unexpected(link.peer_rank, "Hello", &other)),
            };
            if announced_world != world_size {
                return Err(Error::Communication(format!(
                    "rank {rank} at {remote} expects world size {announced_world}, coordinator has {world_size}"
                )));
            }
            if rank == ROOT || rank >= world_size {
                return Err(Error::Communication(format!(
                    "peer at {remote} announced invalid rank {rank}"
                )));
            }
            if links.contains_key(&rank) {
                return Err(Error::Communication(format!(
                    "rank {rank} connected twice (second from {remote})"
                )));
            }
            debug!("rank {rank} joined from {remote}");
            link.peer_rank = rank;
            links.insert(rank, link);
        }

        Ok(Self {
            rank: ROOT,
            world_size,
            role: Mutex::new(Role::Coordinator(links.into_values().collect())),
        })
    }

    /// Join the coordinator at `addr` as `rank`, retrying while it starts up
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        rank: usize,
        world_size: usize,
        transport: &TransportConfig,
    ) -> Result<Self> {
        if rank == ROOT || rank >= world_size {
            return Err(Error::InvalidConfig(format!(
                "peer rank must be in 1..{world_size}, got {rank}"
            )));
        }

        let addrs: Vec<_> = addr.to_socket_addrs()?.collect();
        let delay = Duration::from_millis(transport.retry_delay_ms);
        let mut attempt = 0u32;
        let stream = loop {
            match TcpStream::connect(&addrs[..]) {
                Ok(stream) => break stream,
                Err(e) if attempt < transport.connect_retries => {
                    attempt += 1;
                    debug!("rank {rank}: coordinator not reachable yet ({e}), retry {attempt}");
                    thread::sleep(delay);
                }
                Err(e) => {
                    warn!("rank {rank}: giving up after {attempt} retries");
                    return Err(Error::Io(e));
                }
            }
        };

        let mut link = Link::new(stream, ROOT, frame_limit(transport.max_vertices))?;
        link.send(&Frame::Hello { rank, world_size })?;
        info!("Rank {rank} connected to coordinator");

        Ok(Self {
            rank,
            world_size,
            role: Mutex::new(Role::Peer(link)),
        })
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn barrier(&self) -> Result<()> {
        match &mut *self.role.lock() {
            Role::Coordinator(links) => {
                for link in links.iter_mut() {
                    link.expect_barrier()?;
                }
                for link in links.iter_mut() {
                    link.send(&Frame::Barrier)?;
                }
            }
            Role::Peer(link) => {
                link.send(&Frame::Barrier)?;
                link.expect_barrier()?;
            }
        }
        Ok(())
    }

    fn broadcast_from_root(&self, buffer: &mut Vec<Weight>) -> Result<()> {
        match &mut *self.role.lock() {
            Role::Coordinator(links) => {
                let frame = Frame::Payload(buffer.clone());
                for link in links.iter_mut() {
                    link.send(&frame)?;
                }
            }
            Role::Peer(link) => {
                *buffer = link.expect_payload()?;
            }
        }
        Ok(())
    }

    fn all_reduce_min(&self, buffer: &mut [Weight]) -> Result<()> {
        match &mut *self.role.lock() {
            Role::Coordinator(links) => {
                let mut acc = buffer.to_vec();
                let mut mismatch = None;
                for link in links.iter_mut() {
                    let incoming = link.expect_payload()?;
                    if incoming.len() != acc.len() {
                        if mismatch.is_none() {
                            mismatch = Some((link.peer_rank, incoming.len()));
                        }
                        continue;
                    }
                    min_into(&mut acc, &incoming);
                }

                if let Some((rank, len)) = mismatch {
                    let reason = format!("rank {rank} sent {len} cells, expected {}", acc.len());
                    for link in links.iter_mut() {
                        link.send(&Frame::Abort(reason.clone()))?;
                    }
                    return Err(Error::DimensionMismatch {
                        expected: acc.len(),
                        actual: len,
                    });
                }

                let frame = Frame::Payload(acc);
                for link in links.iter_mut() {
                    link.send(&frame)?;
                }
                if let Frame::Payload(acc) = frame {
                    buffer.copy_from_slice(&acc);
                }
            }
            Role::Peer(link) => {
                link.send(&Frame::Payload(buffer.to_vec()))?;
                let reduced = link.expect_payload()?;
                if reduced.len() != buffer.len() {
                    return Err(Error::DimensionMismatch {
                        expected: buffer.len(),
                        actual: reduced.len(),
                    });
                }
                buffer.copy_from_slice(&reduced);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_retries() -> TransportConfig {
        TransportConfig {
            connect_retries: 100,
            retry_delay_ms: 20,
            ..TransportConfig::default()
        }
    }

    /// Coordinator on an ephemeral port plus `world_size - 1` peer threads
    fn with_cluster<T, F>(world_size: usize, body: F) -> Vec<T>
    where
        T: Send,
        F: Fn(TcpCommunicator) -> T + Sync,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::scope(|scope| {
            let body = &body;
            let peers: Vec<_> = (1..world_size)
                .map(|rank| {
                    scope.spawn(move || {
                        let comm =
                            TcpCommunicator::connect(addr, rank, world_size, &fast_retries())
                                .unwrap();
                        body(comm)
                    })
                })
                .collect();
            let root =
                TcpCommunicator::coordinator_from_listener(listener, world_size, &fast_retries())
                    .unwrap();
            let mut results = vec![body(root)];
            results.extend(peers.into_iter().map(|h| h.join().unwrap()));
            results
        })
    }

    #[test]
    fn collectives_over_loopback() {
        let results = with_cluster(3, |comm| {
            let mut seed = if comm.is_root() { vec![7, 8] } else { Vec::new() };
            comm.broadcast_from_root(&mut seed).unwrap();

            let mut local = vec![10 + comm.rank() as Weight, 5 - comm.rank() as Weight];
            comm.all_reduce_min(&mut local).unwrap();
            comm.barrier().unwrap();
            (comm.rank(), seed, local)
        });

        assert_eq!(results.len(), 3);
        for (_, seed, local) in results {
            assert_eq!(seed, vec![7, 8]);
            assert_eq!(local, vec![10, 3]);
        }
    }

    #[test]
    fn single_rank_needs_no_peers() {
        let results = with_cluster(1, |comm| {
            let mut buffer = vec![4, 2];
            comm.all_reduce_min(&mut buffer).unwrap();
            comm.barrier().unwrap();
            buffer
        });
        assert_eq!(results, vec![vec![4, 2]]);
    }

    #[test]
    fn size_mismatch_aborts_every_rank() {
        let results = with_cluster(2, |comm| {
            let mut buffer = vec![1; 3 + comm.rank()];
            comm.all_reduce_min(&mut buffer).is_err()
        });
        assert!(results.iter().all(|&failed| failed));
    }

    #[test]
    fn peer_rejects_root_rank() {
        let result = TcpCommunicator::connect("127.0.0.1:1", 0, 2, &fast_retries());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn frame_limit_covers_a_full_matrix() {
        assert_eq!(frame_limit(0), FRAME_OVERHEAD);
        assert_eq!(frame_limit(3), 9 * 8 + FRAME_OVERHEAD);
        assert_eq!(frame_limit(usize::MAX), u64::MAX);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = TransportConfig {
            max_vertices: 2,
            ..fast_retries()
        };

        thread::scope(|scope| {
            let peer = scope.spawn(move || {
                // Raw peer with no limit of its own
                let mut stream = TcpStream::connect(addr).unwrap();
                let wire = bincode::DefaultOptions::new().with_fixint_encoding();
                wire.serialize_into(&mut stream, &Frame::Hello { rank: 1, world_size: 2 })
                    .unwrap();
                wire.serialize_into(&mut stream, &Frame::Payload(vec![0; 100]))
                    .unwrap();
                stream
            });

            let root = TcpCommunicator::coordinator_from_listener(listener, 2, &transport).unwrap();
            let mut buffer = vec![0; 4];
            let err = root.all_reduce_min(&mut buffer).unwrap_err();
            assert!(matches!(err, Error::Communication(ref msg) if msg.contains("receive from rank 1")));
            drop(peer.join().unwrap());
        });
    }

    #[test]
    fn limit_trips_before_the_claimed_length_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = TransportConfig {
            max_vertices: 2,
            ..fast_retries()
        };

        thread::scope(|scope| {
            let peer = scope.spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                let wire = bincode::DefaultOptions::new().with_fixint_encoding();
                wire.serialize_into(&mut stream, &Frame::Hello { rank: 1, world_size: 2 })
                    .unwrap();
                // Payload tag claiming a million cells, followed by only 11 of them
                let mut frame = 2u32.to_le_bytes().to_vec();
                frame.extend_from_slice(&1_000_000u64.to_le_bytes());
                for _ in 0..11 {
                    frame.extend_from_slice(&0i64.to_le_bytes());
                }
                stream.write_all(&frame).unwrap();
                stream.flush().unwrap();
                // Held open so the read cannot end on EOF
                stream
            });

            let root = TcpCommunicator::coordinator_from_listener(listener, 2, &transport).unwrap();
            let mut buffer = vec![0; 4];
            assert!(matches!(
                root.all_reduce_min(&mut buffer),
                Err(Error::Communication(_))
            ));
            drop(peer.join().unwrap());
        });
    }
}
