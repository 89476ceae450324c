//! Bitcoin finality queries for arbitrary L2 blocks.
//!
//! A block's finality comes from the keystone that covers it; these
//! helpers resolve that keystone from chain data and query the reward
//! service for its Bitcoin publication status.

use alloy_primitives::B256;
use cairn_eectl::{EngineControl, EngineError};
use cairn_params::RollupParams;
use cairn_primitives::{keystone_providing_finality, L2BtcFinality, L2Keystone};
use cairn_reward_client::{ClientError, RewardServiceClient};
use thiserror::Error;

use crate::traits::ChainLookup;

#[derive(Debug, Error)]
pub enum FinalityError {
    /// The covering keystone does not exist yet.
    #[error("keystone {keystone} providing finality for block {block} not yet produced, L2 tip = {tip}")]
    KeystoneNotProduced { keystone: u64, block: u64, tip: u64 },

    /// The queried block hash is not on the canonical chain.
    #[error("block {hash} at height {number} is not on the canonical chain")]
    NotCanonical { hash: B256, number: u64 },

    #[error("chain lookup failed: {0}")]
    Chain(#[from] EngineError),

    #[error("reward service query failed: {0}")]
    Client(#[from] ClientError),
}

/// Queries Bitcoin finality for the L2 block at `block_number`.
pub async fn btc_finality_for_block_number(
    engine: &impl EngineControl,
    chain: &impl ChainLookup,
    reward_client: &impl RewardServiceClient,
    params: &RollupParams,
    block_number: u64,
) -> Result<Vec<L2BtcFinality>, FinalityError> {
    let keystone_height = keystone_providing_finality(block_number, params.keystone_interval);

    let tip = engine.unsafe_l2_head();
    if keystone_height > tip.number {
        return Err(FinalityError::KeystoneNotProduced {
            keystone: keystone_height,
            block: block_number,
            tip: tip.number,
        });
    }

    let keystone_block = chain.l2_block_ref_by_number(keystone_height).await?;

    // Genesis is its own keystone and has no predecessor.
    let prev_keystone_hash = if keystone_height >= params.keystone_interval {
        chain
            .l2_block_ref_by_number(keystone_height - params.keystone_interval)
            .await?
            .hash
    } else {
        B256::ZERO
    };

    let keystone = L2Keystone::from_block_ref(&keystone_block, prev_keystone_hash);

    Ok(reward_client
        .btc_finality_by_keystones(vec![keystone])
        .await?)
}

/// Queries Bitcoin finality for the L2 block with `block_hash`, verifying
/// the block is on the canonical chain first.
pub async fn btc_finality_for_block_hash(
    engine: &impl EngineControl,
    chain: &impl ChainLookup,
    reward_client: &impl RewardServiceClient,
    params: &RollupParams,
    block_hash: B256,
) -> Result<Vec<L2BtcFinality>, FinalityError> {
    let block = chain.l2_block_ref_by_hash(block_hash).await?;

    // Refetch by height: the hash must match what the canonical chain has
    // at the same index.
    let canonical = chain.l2_block_ref_by_number(block.number).await?;
    if canonical.hash != block_hash {
        return Err(FinalityError::NotCanonical {
            hash: block_hash,
            number: block.number,
        });
    }

    btc_finality_for_block_number(engine, chain, reward_client, params, block.number).await
}
