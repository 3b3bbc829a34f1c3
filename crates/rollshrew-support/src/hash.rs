//! Domain hashing helpers

use crate::fr::Fr;
use sha2::{Digest, Sha256};

/// Hash the concatenation of `inputs` with sha256.
pub fn sha256_fr(inputs: &[&[u8]]) -> Fr {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    Fr(hasher.finalize().into())
}
