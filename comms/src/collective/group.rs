use std::{io, net::SocketAddr, time::Duration};

use log::{debug, info};
use tokio::{
    io::{DuplexStream, ReadHalf, WriteHalf},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time,
};

use super::star::{Link, StarCollective};
use crate::msg::{Command, Msg};

const DUPLEX_BUF_SIZE: usize = 64 * 1024;
const CONNECT_ATTEMPTS: usize = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// A collective group member backed by in-memory pipes.
pub type LocalMember = StarCollective<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// A collective group member backed by TCP connections.
pub type TcpMember = StarCollective<OwnedReadHalf, OwnedWriteHalf>;

/// Builds every member of an in-process group connected through in-memory pipes.
///
/// # Arguments
/// * `world_size` - The amount of ranks in the group.
///
/// # Returns
/// The members ordered by rank, or an error if `world_size` is zero.
pub fn local_group(world_size: usize) -> io::Result<Vec<LocalMember>> {
    if world_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a collective group needs at least one rank",
        ));
    }

    let mut peers = Vec::with_capacity(world_size - 1);
    let mut leaves = Vec::with_capacity(world_size - 1);

    for rank in 1..world_size {
        let (hub_side, leaf_side) = tokio::io::duplex(DUPLEX_BUF_SIZE);

        let (rx, tx) = tokio::io::split(hub_side);
        let (rx, tx) = crate::channel(rx, tx);
        peers.push(Link { rx, tx });

        let (rx, tx) = tokio::io::split(leaf_side);
        let (rx, tx) = crate::channel(rx, tx);
        leaves.push(StarCollective::leaf(rank, world_size, Link { rx, tx }));
    }

    let mut members = Vec::with_capacity(world_size);
    members.push(StarCollective::hub(peers));
    members.extend(leaves);
    Ok(members)
}

/// Joins a group spread over several processes.
///
/// Rank 0 listens at `addr` and waits for every other rank to connect and introduce
/// itself, the rest connect to it retrying for a while in case the hub is not up yet.
///
/// # Arguments
/// * `addr` - The hub's address.
/// * `rank` - This process' rank.
/// * `world_size` - The amount of ranks in the group.
///
/// # Returns
/// This rank's member of the group.
///
/// # Errors
/// An `io::Error` on connection failures or when the ranks disagree on the topology.
pub async fn rendezvous(addr: SocketAddr, rank: usize, world_size: usize) -> io::Result<TcpMember> {
    if rank >= world_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("rank {rank} is out of range for a group of {world_size}"),
        ));
    }

    if rank == 0 {
        accept_leaves(addr, world_size).await
    } else {
        join_hub(addr, rank, world_size).await
    }
}

async fn accept_leaves(addr: SocketAddr, world_size: usize) -> io::Result<TcpMember> {
    let mut slots: Vec<Option<Link<_, _>>> = (1..world_size).map(|_| None).collect();
    if slots.is_empty() {
        return Ok(StarCollective::hub(Vec::new()));
    }

    let listener = TcpListener::bind(addr).await?;
    info!("waiting for {} worker(s) at {addr}", world_size - 1);

    let mut buf: Vec<u64> = Vec::new();
    let mut joined = 0;

    while joined < slots.len() {
        let (stream, peer_addr) = listener.accept().await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = crate::channel(rx, tx);

        let (rank, size) = match rx.recv_into(&mut buf).await? {
            Msg::Control(Command::Join { rank, world_size }) => (rank, world_size),
            other => return Err(bad_join(format!("expected join, got {}", other.kind()))),
        };

        if size != world_size {
            return Err(bad_join(format!(
                "rank {rank} believes the group has {size} ranks, expected {world_size}"
            )));
        }

        let slot = match rank.checked_sub(1).and_then(|i| slots.get_mut(i)) {
            Some(slot) if slot.is_none() => slot,
            Some(_) => return Err(bad_join(format!("rank {rank} joined twice"))),
            None => return Err(bad_join(format!("rank {rank} is not a valid worker rank"))),
        };

        *slot = Some(Link { rx, tx });
        joined += 1;
        debug!(rank = rank; "worker joined from {peer_addr}");
    }

    let peers = slots.into_iter().flatten().collect();
    Ok(StarCollective::hub(peers))
}

async fn join_hub(addr: SocketAddr, rank: usize, world_size: usize) -> io::Result<TcpMember> {
    let stream = connect(addr).await?;
    stream.set_nodelay(true)?;

    let (rx, tx) = stream.into_split();
    let (rx, mut tx) = crate::channel(rx, tx);
    tx.send(&Msg::Control(Command::Join { rank, world_size })).await?;

    info!(rank = rank; "joined the group at {addr}");
    Ok(StarCollective::leaf(rank, world_size, Link { rx, tx }))
}

async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!("connection attempt {attempt} to {addr} failed: {e}");
                attempt += 1;
                time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn bad_join(detail: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, detail)
}
