//! Mock collaborators and fixtures shared by the sequencer tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{B256, B64};
use alloy_rpc_types_engine::PayloadId;
use async_trait::async_trait;
use cairn_eectl::{
    BuildingState, EngineControl, EngineResult, ExecPayloadEnvelope, PayloadAttributes,
};
use cairn_params::RollupParams;
use cairn_primitives::{BlockId, L1BlockRef, L2BlockRef, L2BtcFinality, L2Keystone, PopPayout};
use cairn_reward_client::{ClientError, RewardServiceClient};
use mockall::mock;

use crate::traits::{AttributesBuilder, ChainLookup, Clock, OriginSelector};

mock! {
    pub Engine {}

    #[async_trait]
    impl EngineControl for Engine {
        fn unsafe_l2_head(&self) -> L2BlockRef;
        fn building_payload(&self) -> BuildingState;
        async fn start_payload(
            &self,
            parent: L2BlockRef,
            attrs: PayloadAttributes,
        ) -> EngineResult<PayloadId>;
        async fn confirm_payload(&self) -> EngineResult<ExecPayloadEnvelope>;
        async fn cancel_payload(&self, force: bool) -> EngineResult<()>;
    }
}

mock! {
    pub Origin {}

    #[async_trait]
    impl OriginSelector for Origin {
        async fn find_l1_origin(&self, l2_head: &L2BlockRef) -> EngineResult<L1BlockRef>;
    }
}

mock! {
    pub Attributes {}

    #[async_trait]
    impl AttributesBuilder for Attributes {
        async fn prepare_payload_attributes(
            &self,
            l2_head: &L2BlockRef,
            epoch: BlockId,
        ) -> EngineResult<PayloadAttributes>;
    }
}

mock! {
    pub Chain {}

    #[async_trait]
    impl ChainLookup for Chain {
        async fn l2_block_ref_by_number(&self, number: u64) -> EngineResult<L2BlockRef>;
        async fn l2_block_ref_by_hash(&self, hash: B256) -> EngineResult<L2BlockRef>;
    }
}

mock! {
    pub Reward {}

    #[async_trait]
    impl RewardServiceClient for Reward {
        async fn notify_keystone(&self, keystone: L2Keystone) -> Result<(), ClientError>;
        async fn get_pop_payouts(
            &self,
            keystone_for_payout: L2Keystone,
        ) -> Result<Vec<PopPayout>, ClientError>;
        async fn btc_finality_by_keystones(
            &self,
            keystones: Vec<L2Keystone>,
        ) -> Result<Vec<L2BtcFinality>, ClientError>;
        async fn btc_finality_by_recent_keystones(
            &self,
            num_recent_keystones: u32,
        ) -> Result<Vec<L2BtcFinality>, ClientError>;
    }
}

/// Clock pinned to a fixed instant.
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

pub const NOW_SECS: u64 = 1_700_000_000;

pub fn now_time() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(NOW_SECS)
}

pub fn test_params() -> RollupParams {
    RollupParams {
        block_time: 2,
        max_sequencer_drift: 600,
        keystone_interval: 25,
        pop_payout_delay: 200,
        upgrade_time: None,
    }
}

pub fn l2_head(number: u64, timestamp: u64) -> L2BlockRef {
    L2BlockRef {
        hash: B256::repeat_byte(0x11),
        number,
        parent_hash: B256::repeat_byte(0x10),
        timestamp,
        state_root: B256::repeat_byte(0x22),
        l1_origin: BlockId::new(B256::repeat_byte(0x33), 500),
    }
}

/// L1 origin whose hash matches the head's recorded origin.
pub fn same_origin(head: &L2BlockRef) -> L1BlockRef {
    L1BlockRef {
        hash: head.l1_origin.hash,
        number: head.l1_origin.number,
        parent_hash: B256::repeat_byte(0x32),
        timestamp: head.timestamp.saturating_sub(6),
    }
}

pub fn payload_id() -> PayloadId {
    PayloadId(B64::with_last_byte(1))
}
