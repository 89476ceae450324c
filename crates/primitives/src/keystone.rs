//! L2 keystones: the periodically-selected checkpoint blocks that get
//! anchored into Bitcoin for finality.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::block::L2BlockRef;

/// Current keystone record version.
pub const KEYSTONE_VERSION: u8 = 1;

/// A checkpoint record anchoring one L2 block into Bitcoin.
///
/// Immutable once constructed. The `hash` field is the checkpoint's own
/// identity (the hash of the keystone block itself).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct L2Keystone {
    pub version: u8,
    pub l1_block_number: u32,
    pub l2_block_number: u32,
    pub parent_hash: B256,
    pub prev_keystone_hash: B256,
    pub state_root: B256,
    pub hash: B256,
}

impl L2Keystone {
    /// Builds a keystone for `block` given the hash of the keystone
    /// preceding it.
    pub fn from_block_ref(block: &L2BlockRef, prev_keystone_hash: B256) -> Self {
        Self {
            version: KEYSTONE_VERSION,
            l1_block_number: block.l1_origin.number as u32,
            l2_block_number: block.number as u32,
            parent_hash: block.parent_hash,
            prev_keystone_hash,
            state_root: block.state_root,
            hash: block.hash,
        }
    }
}

/// Whether an L2 height falls on a keystone boundary.
pub fn is_keystone_height(height: u64, keystone_interval: u64) -> bool {
    height % keystone_interval == 0
}

/// Height of the keystone that provides Bitcoin finality for `height`.
///
/// A keystone block provides finality for itself; any other block is
/// finalized by the next keystone above it.
pub fn keystone_providing_finality(height: u64, keystone_interval: u64) -> u64 {
    if is_keystone_height(height, keystone_interval) {
        height
    } else {
        height + (keystone_interval - (height % keystone_interval))
    }
}
