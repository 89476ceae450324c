//! Bitcoin finality status for anchored keystones.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::keystone::L2Keystone;

/// Bitcoin finality status of one keystone, as tracked by the reward
/// service.
///
/// `btc_pub_height` is `-1` while the keystone has not yet been observed in
/// any Bitcoin block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct L2BtcFinality {
    pub l2_keystone: L2Keystone,
    pub btc_pub_height: i64,
    pub btc_pub_hash: Option<B256>,
    pub effective_confirmations: u32,
}

impl L2BtcFinality {
    /// Whether the keystone has been published to Bitcoin at all.
    pub fn is_published(&self) -> bool {
        self.btc_pub_height >= 0
    }
}
