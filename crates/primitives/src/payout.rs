//! PoP payout reward lines as reported by the reward-accounting service.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One miner's reward for publishing a keystone to Bitcoin.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PopPayout {
    pub miner_address: Address,
    pub amount: U256,
}

impl PopPayout {
    pub fn new(miner_address: Address, amount: U256) -> Self {
        Self {
            miner_address,
            amount,
        }
    }
}
