//! Hash function boundary for the trees
//!
//! Tree code only ever talks to [`Hasher`]; the concrete hash function is
//! picked by whoever constructs the tree.

use rollshrew_support::{sha256_fr, Fr};

pub trait Hasher: Clone + Send + Sync + 'static {
    /// Hash an arbitrary sequence of byte strings into one element.
    fn hash_inputs(&self, inputs: &[&[u8]]) -> Fr;

    /// Hash of an internal node from its two children.
    fn combine(&self, left: &Fr, right: &Fr) -> Fr {
        self.hash_inputs(&[left.as_bytes(), right.as_bytes()])
    }

    /// Value of an unfilled leaf slot.
    fn empty_leaf(&self) -> Fr {
        Fr::ZERO
    }

    /// Hashes of fully empty subtrees, indexed by height (0 = leaf).
    fn zero_hashes(&self, depth: u8) -> Vec<Fr> {
        let mut zeros = Vec::with_capacity(depth as usize + 1);
        zeros.push(self.empty_leaf());
        for height in 0..depth as usize {
            let below = zeros[height];
            zeros.push(self.combine(&below, &below));
        }
        zeros
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash_inputs(&self, inputs: &[&[u8]]) -> Fr {
        sha256_fr(inputs)
    }
}
