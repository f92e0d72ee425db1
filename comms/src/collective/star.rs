use std::io;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Collective, invalid_root};
use crate::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg, Payload},
};

/// Both halves of a connection to another rank.
pub(super) struct Link<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    pub(super) rx: FrameReceiver<R>,
    pub(super) tx: FrameSender<W>,
}

enum Role<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    /// Rank 0, holds one link per leaf ordered by rank (`peers[i]` is rank `i + 1`).
    Hub { peers: Vec<Link<R, W>> },
    /// Any other rank, only talks to the hub.
    Leaf { hub: Link<R, W> },
}

/// A collective group laid out as a star centered at rank 0.
///
/// The hub gathers the leaves' operands in rank order, reduces them and sends the result
/// back, so a reduction costs `2 * (world_size - 1)` messages and every rank observes the
/// exact same floating point sum.
pub struct StarCollective<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    rank: usize,
    world_size: usize,
    role: Role<R, W>,
    buf: Vec<u64>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> StarCollective<R, W> {
    /// Creates the hub end of the group.
    ///
    /// # Arguments
    /// * `peers` - One link per leaf, `peers[i]` must be connected to rank `i + 1`.
    pub(super) fn hub(peers: Vec<Link<R, W>>) -> Self {
        Self {
            rank: 0,
            world_size: peers.len() + 1,
            role: Role::Hub { peers },
            buf: Vec::new(),
        }
    }

    /// Creates a leaf end of the group.
    ///
    /// # Arguments
    /// * `rank` - This leaf's rank, must be in `1..world_size`.
    /// * `world_size` - The amount of ranks in the group.
    /// * `hub` - The link to rank 0.
    pub(super) fn leaf(rank: usize, world_size: usize, hub: Link<R, W>) -> Self {
        Self {
            rank,
            world_size,
            role: Role::Leaf { hub },
            buf: Vec::new(),
        }
    }
}

impl<R, W> Collective for StarCollective<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    async fn allreduce(&mut self, local: &[f64]) -> io::Result<Vec<f64>> {
        let Self { role, buf, .. } = self;

        match role {
            Role::Hub { peers } => {
                let mut acc = local.to_vec();
                let mut failure = None;

                // Every leaf's contribution is read even after a failure, so each leaf is
                // waiting on its reply when the abort goes out.
                for (i, peer) in peers.iter_mut().enumerate() {
                    let rank = i + 1;
                    let msg = match peer.rx.recv_into(buf).await {
                        Ok(msg) => msg,
                        Err(e) if failure.is_some() => {
                            debug!(rank = rank; "could not drain contribution: {e}");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    if failure.is_some() {
                        continue;
                    }

                    match msg {
                        Msg::Data(Payload::Contribution(nums)) if nums.len() == acc.len() => {
                            acc.iter_mut().zip(nums).for_each(|(a, x)| *a += x);
                        }
                        Msg::Data(Payload::Contribution(nums)) => {
                            failure = Some(format!(
                                "allreduce length mismatch: rank {rank} sent {}, hub holds {}",
                                nums.len(),
                                acc.len()
                            ));
                        }
                        other => {
                            failure = Some(format!(
                                "unexpected {} from rank {rank} in allreduce",
                                other.kind()
                            ));
                        }
                    }
                }

                if let Some(detail) = failure {
                    return Err(abort(peers.as_mut_slice(), detail).await);
                }

                let msg = Msg::Data(Payload::Reduced(&acc));
                for peer in peers.iter_mut() {
                    peer.tx.send(&msg).await?;
                }

                Ok(acc)
            }
            Role::Leaf { hub } => {
                hub.tx.send(&Msg::Data(Payload::Contribution(local))).await?;

                match hub.rx.recv_into(buf).await? {
                    Msg::Data(Payload::Reduced(nums)) => Ok(nums.to_vec()),
                    other => Err(unexpected(other, "allreduce")),
                }
            }
        }
    }

    async fn broadcast(&mut self, value: &[f64], root: usize) -> io::Result<Vec<f64>> {
        if root >= self.world_size {
            return Err(invalid_root(root, self.world_size));
        }

        let own_rank = self.rank;
        let Self { role, buf, .. } = self;

        match role {
            Role::Hub { peers } => {
                let value = if root == 0 {
                    value.to_vec()
                } else {
                    let received = match peers[root - 1].rx.recv_into(buf).await? {
                        Msg::Data(Payload::Broadcast(nums)) => Ok(nums.to_vec()),
                        other => Err(format!(
                            "unexpected {} from rank {root} in broadcast",
                            other.kind()
                        )),
                    };

                    match received {
                        Ok(value) => value,
                        Err(detail) => return Err(abort(peers.as_mut_slice(), detail).await),
                    }
                };

                let msg = Msg::Data(Payload::Broadcast(&value));
                for (i, peer) in peers.iter_mut().enumerate() {
                    if i + 1 != root {
                        peer.tx.send(&msg).await?;
                    }
                }

                Ok(value)
            }
            Role::Leaf { hub } if own_rank == root => {
                hub.tx.send(&Msg::Data(Payload::Broadcast(value))).await?;
                Ok(value.to_vec())
            }
            Role::Leaf { hub } => match hub.rx.recv_into(buf).await? {
                Msg::Data(Payload::Broadcast(nums)) => Ok(nums.to_vec()),
                other => Err(unexpected(other, "broadcast")),
            },
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        let msg = Msg::Control(Command::Disconnect);

        match &mut self.role {
            Role::Hub { peers } => {
                for peer in peers.iter_mut() {
                    peer.tx.send(&msg).await?;
                }
            }
            Role::Leaf { hub } => hub.tx.send(&msg).await?,
        }

        debug!(rank = self.rank; "left the collective group");
        Ok(())
    }
}

/// Tells every leaf the current collective failed and builds the hub's own error.
async fn abort<R, W>(peers: &mut [Link<R, W>], detail: String) -> io::Error
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    warn!("aborting collective: {detail}");

    let msg = Msg::Err(detail.as_str().into());
    for peer in peers.iter_mut() {
        if let Err(e) = peer.tx.send(&msg).await {
            debug!("could not notify peer of the abort: {e}");
        }
    }

    io::Error::new(io::ErrorKind::InvalidData, detail)
}

fn unexpected(msg: Msg<'_>, op: &str) -> io::Error {
    let detail = match msg {
        Msg::Err(detail) => format!("hub aborted {op}: {detail}"),
        other => format!("unexpected {} from hub in {op}", other.kind()),
    };

    io::Error::new(io::ErrorKind::InvalidData, detail)
}
