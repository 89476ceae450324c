//! The engine control trait.

use alloy_rpc_types_engine::PayloadId;
use async_trait::async_trait;
use cairn_primitives::L2BlockRef;

use crate::{
    errors::EngineResult,
    messages::{ExecPayloadEnvelope, PayloadAttributes},
};

/// The engine's current build target, mirrored by the sequencer.
#[derive(Clone, Debug)]
pub struct BuildingState {
    /// Head block the job builds on.
    pub onto: L2BlockRef,

    /// Open build job id, if any.
    pub id: Option<PayloadId>,

    /// Whether the engine is busy advancing safe (non-sequencer) chain
    /// state. Sequencing must not race safe-head updates.
    pub safe: bool,
}

impl BuildingState {
    /// State with no open build job.
    pub fn idle(onto: L2BlockRef) -> Self {
        Self {
            onto,
            id: None,
            safe: false,
        }
    }
}

/// Control surface of the execution engine.
///
/// The sequencer maintains at most one open build job and treats this
/// purely as an interface; engine internals (forkchoice handling, payload
/// assembly) stay behind it.
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Current unsafe (sequencer-extended) L2 head.
    fn unsafe_l2_head(&self) -> L2BlockRef;

    /// Current build target.
    fn building_payload(&self) -> BuildingState;

    /// Starts a build job on top of `parent` with the given attributes.
    async fn start_payload(
        &self,
        parent: L2BlockRef,
        attrs: PayloadAttributes,
    ) -> EngineResult<PayloadId>;

    /// Seals the open build job, using the safety context captured when the
    /// job was started.
    async fn confirm_payload(&self) -> EngineResult<ExecPayloadEnvelope>;

    /// Cancels the open build job.
    async fn cancel_payload(&self, force: bool) -> EngineResult<()>;
}
