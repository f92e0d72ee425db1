//! Collective communication across a fixed group of ranks.
//!
//! Every rank of the group must issue the same sequence of collective calls, each call
//! acts as a barrier: nobody gets a result until every rank has contributed.

mod group;
mod solo;
mod star;

use std::io;

pub use group::{LocalMember, TcpMember, local_group, rendezvous};
pub use solo::Solo;
pub use star::StarCollective;

/// The two primitives the training coordinator needs from the communication substrate.
#[allow(unused)]
#[trait_variant::make(Collective: Send)]
pub trait CollectiveTemplate {
    /// The rank of the calling process inside the group.
    fn rank(&self) -> usize;

    /// The amount of ranks in the group.
    fn world_size(&self) -> usize;

    /// Sums `local` element-wise across every rank.
    ///
    /// # Arguments
    /// * `local` - This rank's operand, all ranks must pass the same length.
    ///
    /// # Returns
    /// The element-wise sum, identical on every rank.
    ///
    /// # Errors
    /// An `io::Error` if a link fails or the operand lengths disagree.
    async fn allreduce(&mut self, local: &[f64]) -> io::Result<Vec<f64>>;

    /// Distributes the value held by `root` to every rank.
    ///
    /// # Arguments
    /// * `value` - The value to send, only meaningful on `root`.
    /// * `root` - The rank whose value wins.
    ///
    /// # Returns
    /// `root`'s value.
    async fn broadcast(&mut self, value: &[f64], root: usize) -> io::Result<Vec<f64>>;

    /// Tells the other ranks this one is leaving the group.
    async fn shutdown(&mut self) -> io::Result<()>;
}

fn invalid_root(root: usize, world_size: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("broadcast root {root} is out of range for a group of {world_size}"),
    )
}
