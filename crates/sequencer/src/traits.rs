//! Collaborator seams the sequencer drives but does not own.

use std::time::SystemTime;

use alloy_primitives::B256;
use async_trait::async_trait;
use cairn_eectl::{EngineResult, PayloadAttributes};
use cairn_primitives::{BlockId, L1BlockRef, L2BlockRef};

/// Picks the L1 origin for new L2 blocks.
#[async_trait]
pub trait OriginSelector: Send + Sync {
    /// The L1 block the next L2 block (child of `l2_head`) should derive
    /// from.
    async fn find_l1_origin(&self, l2_head: &L2BlockRef) -> EngineResult<L1BlockRef>;
}

/// Builds payload attributes for a new block.
#[async_trait]
pub trait AttributesBuilder: Send + Sync {
    async fn prepare_payload_attributes(
        &self,
        l2_head: &L2BlockRef,
        epoch: BlockId,
    ) -> EngineResult<PayloadAttributes>;
}

/// Resolves L2 block references from chain data.
#[async_trait]
pub trait ChainLookup: Send + Sync {
    async fn l2_block_ref_by_number(&self, number: u64) -> EngineResult<L2BlockRef>;

    async fn l2_block_ref_by_hash(&self, hash: B256) -> EngineResult<L2BlockRef>;
}

/// View onto the async payload publisher.
///
/// A sealed payload can sit in the gossip stage before the engine reports
/// it; sequencing must account for it to avoid double-building.
pub trait PayloadGossip: Send + Sync {
    fn has_pending_payload(&self) -> bool;
}

/// For setups that publish synchronously and never hold a candidate.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoGossip;

impl PayloadGossip for NoGossip {
    fn has_pending_payload(&self) -> bool {
        false
    }
}

/// Time source, injectable so tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real wall clock.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
