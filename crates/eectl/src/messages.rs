//! Payload data passed across the engine boundary.

use alloy_primitives::{Bytes, B256};
use cairn_primitives::BlockId;

/// Attributes for a block the engine is asked to build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PayloadAttributes {
    /// Timestamp of the new block.
    pub timestamp: u64,

    /// When set, the engine must exclude pooled transactions and build an
    /// otherwise-empty block.
    pub no_tx_pool: bool,

    /// Transactions to force-include, in order. The PoP payout
    /// pseudo-transaction is appended here when the new block is a payout
    /// block.
    pub transactions: Vec<Bytes>,
}

/// Summary of a sealed execution payload, ready for publishing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecPayloadEnvelope {
    pub block: BlockId,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<Bytes>,
}
