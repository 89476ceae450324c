//! Rollup parameters governing sequencing cadence, keystone placement and
//! PoP payout scheduling.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from params validation and loading.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("block_time must be nonzero")]
    ZeroBlockTime,

    #[error("keystone_interval must be nonzero")]
    ZeroKeystoneInterval,

    /// The rewarded block must itself be a keystone, which requires the
    /// delay to stay aligned to the keystone grid.
    #[error("pop_payout_delay {delay} is not a multiple of keystone_interval {interval}")]
    MisalignedPayoutDelay { delay: u64, interval: u64 },

    #[error("failed to read params file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse params file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Consensus-critical rollup parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RollupParams {
    /// Target seconds between L2 blocks.
    pub block_time: u64,

    /// Max seconds an L2 block's timestamp may run ahead of its L1 origin's
    /// before the sequencer must produce empty blocks.
    pub max_sequencer_drift: u64,

    /// L2 height interval between keystones.
    pub keystone_interval: u64,

    /// Blocks to wait after a keystone before paying out the PoP miners
    /// that anchored it, leaving a reorg safety margin.
    pub pop_payout_delay: u64,

    /// Unix timestamp of the network upgrade activation block, if one is
    /// scheduled. The activation block itself carries no pooled
    /// transactions.
    pub upgrade_time: Option<u64>,
}

impl RollupParams {
    /// Loads params from a TOML file and validates them.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let raw = fs::read_to_string(path)?;
        let params: Self = toml::from_str(&raw)?;
        params.check_well_formed()?;
        Ok(params)
    }

    /// Checks internal consistency of the parameter set.
    pub fn check_well_formed(&self) -> Result<(), ParamsError> {
        if self.block_time == 0 {
            return Err(ParamsError::ZeroBlockTime);
        }
        if self.keystone_interval == 0 {
            return Err(ParamsError::ZeroKeystoneInterval);
        }
        if self.pop_payout_delay % self.keystone_interval != 0 {
            return Err(ParamsError::MisalignedPayoutDelay {
                delay: self.pop_payout_delay,
                interval: self.keystone_interval,
            });
        }
        Ok(())
    }

    /// Whether a block with this timestamp is the upgrade activation block.
    pub fn is_upgrade_activation_block(&self, timestamp: u64) -> bool {
        self.upgrade_time == Some(timestamp)
    }
}
