use std::io;

use super::{Collective, invalid_root};

/// A group made of a single rank, every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct Solo;

impl Solo {
    pub fn new() -> Self {
        Self
    }
}

impl Collective for Solo {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    async fn allreduce(&mut self, local: &[f64]) -> io::Result<Vec<f64>> {
        Ok(local.to_vec())
    }

    async fn broadcast(&mut self, value: &[f64], root: usize) -> io::Result<Vec<f64>> {
        if root != 0 {
            return Err(invalid_root(root, 1));
        }

        Ok(value.to_vec())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}
