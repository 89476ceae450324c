//! Block reference types for the two chains we track.

use std::fmt;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Compact identity of a block: its hash and height.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub hash: B256,
    pub number: u64,
}

impl BlockId {
    pub fn new(hash: B256, number: u64) -> Self {
        Self { hash, number }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.number, short_hash(&self.hash))
    }
}

/// Reference to an L1 (Bitcoin-side anchoring chain) block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct L1BlockRef {
    pub hash: B256,
    pub number: u64,
    pub parent_hash: B256,
    pub timestamp: u64,
}

impl L1BlockRef {
    pub fn id(&self) -> BlockId {
        BlockId::new(self.hash, self.number)
    }
}

impl fmt::Display for L1BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.number, short_hash(&self.hash))
    }
}

/// Reference to an L2 block, including the L1 origin it derives from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct L2BlockRef {
    pub hash: B256,
    pub number: u64,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub state_root: B256,
    pub l1_origin: BlockId,
}

impl L2BlockRef {
    pub fn id(&self) -> BlockId {
        BlockId::new(self.hash, self.number)
    }
}

impl fmt::Display for L2BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.number, short_hash(&self.hash))
    }
}

/// Shows the first and last two bytes of a hash, like `1a2b..c3d4`.
fn short_hash(hash: &B256) -> String {
    let bytes = hash.as_slice();
    format!(
        "{}..{}",
        hex::encode(&bytes[..2]),
        hex::encode(&bytes[30..])
    )
}
