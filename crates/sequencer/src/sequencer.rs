//! The block-production state machine and its timing oracle.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::anyhow;
use cairn_common::metrics::{
    SEQUENCER_BLOCKS_SEALED_TOTAL, SEQUENCER_INCONSISTENT_ORIGIN_TOTAL, SEQUENCER_RESETS_TOTAL,
};
use cairn_eectl::{
    EngineControl, EngineError, EngineErrorKind, EngineResult, ExecPayloadEnvelope,
};
use cairn_params::RollupParams;
use cairn_pop_txfmt::PopPayoutTxData;
use cairn_primitives::{is_keystone_height, L2BlockRef, L2Keystone};
use cairn_reward_client::RewardServiceClient;
use tokio::time;
use tracing::*;

use crate::traits::{AttributesBuilder, ChainLookup, Clock, OriginSelector, PayloadGossip};

/// Margin reserved at the end of a block period to finish sealing a block
/// once building has started.
pub const SEALING_DURATION: Duration = Duration::from_millis(500);

/// Holdoff applied after a temporary or unclassified failure.
const TEMPORARY_BACKOFF: Duration = Duration::from_secs(1);

/// Cap on payload attribute preparation, which fetches L1 data.
const ATTRIBUTES_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// The sequencer starts and completes block-building jobs against the
/// execution engine, one at a time.
///
/// It owns its scheduling state (`next_action`); the build target itself is
/// mirrored from the engine, never held independently. Run it from a single
/// driving loop that alternates [`Sequencer::plan_next_sequencer_action`]
/// (sleep that long) and [`Sequencer::run_next_sequencer_action`].
#[expect(
    missing_debug_implementations,
    reason = "collaborators generally have no Debug impls"
)]
pub struct Sequencer<E, A, O, L, R, G> {
    params: Arc<RollupParams>,
    engine: E,
    attr_builder: A,
    origin_selector: O,
    chain: L,
    reward_client: R,
    gossip: G,
    clock: Arc<dyn Clock>,

    /// Earliest time the next sequencing action may run; used to implement
    /// backoff after failures.
    next_action: Option<SystemTime>,
}

impl<E, A, O, L, R, G> Sequencer<E, A, O, L, R, G>
where
    E: EngineControl,
    A: AttributesBuilder,
    O: OriginSelector,
    L: ChainLookup,
    R: RewardServiceClient,
    G: PayloadGossip,
{
    #[expect(clippy::too_many_arguments, reason = "construction-time wiring")]
    pub fn new(
        params: Arc<RollupParams>,
        engine: E,
        attr_builder: A,
        origin_selector: O,
        chain: L,
        reward_client: R,
        gossip: G,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            params,
            engine,
            attr_builder,
            origin_selector,
            chain,
            reward_client,
            gossip,
            clock,
            next_action: None,
        }
    }

    fn block_time(&self) -> Duration {
        Duration::from_secs(self.params.block_time)
    }

    /// Head reference the latest block is or was being built on.
    pub fn building_onto(&self) -> L2BlockRef {
        self.engine.building_payload().onto
    }

    /// Builds the PoP payout pseudo-transaction for the block at
    /// `new_block_height`, if that block is a payout block and any rewards
    /// are owed.
    async fn build_pop_payout_tx(
        &self,
        new_block_height: u64,
    ) -> EngineResult<Option<Vec<u8>>> {
        // Payouts land on keystone heights only.
        if !is_keystone_height(new_block_height, self.params.keystone_interval) {
            return Ok(None);
        }

        // Publications of the genesis block are not rewarded since genesis
        // cannot reorg; the first eligible keystone is the first one after
        // genesis, paid out `pop_payout_delay` blocks later.
        if new_block_height < self.params.pop_payout_delay + self.params.keystone_interval {
            info!(
                l2_block = %new_block_height,
                "not calculating PoP payout, not enough blocks for payouts to begin"
            );
            return Ok(None);
        }

        let payout_height = new_block_height - self.params.pop_payout_delay;
        let prev_keystone_height = payout_height - self.params.keystone_interval;

        let payout_block = self
            .chain
            .l2_block_ref_by_number(payout_height)
            .await
            .map_err(|err| {
                EngineError::critical(anyhow!("failed to retrieve PoP payout block: {err}"))
            })?;
        let prev_keystone_block = self
            .chain
            .l2_block_ref_by_number(prev_keystone_height)
            .await
            .map_err(|err| {
                EngineError::critical(anyhow!(
                    "failed to retrieve PoP payout block prev keystone: {err}"
                ))
            })?;

        let keystone = L2Keystone::from_block_ref(&payout_block, prev_keystone_block.hash);

        info!(
            block_containing_payout = %new_block_height,
            block_paid_out = %payout_height,
            payout_block_hash = %keystone.hash,
            "calculating PoP payout"
        );

        let payouts = self
            .reward_client
            .get_pop_payouts(keystone.clone())
            .await
            .map_err(|err| {
                EngineError::temporary(anyhow!(
                    "unable to fetch PoP payouts from reward service: {err}"
                ))
            })?;

        if payouts.is_empty() {
            info!(
                block_containing_payout = %new_block_height,
                block_paid_out = %payout_height,
                "no PoP payouts for block"
            );
            return Ok(None);
        }

        info!(
            payout_count = %payouts.len(),
            block_containing_payout = %new_block_height,
            block_paid_out = %payout_height,
            "received PoP payouts for block"
        );

        let record = PopPayoutTxData::from_payouts(payout_height, &payouts);
        let tx = record.encode().map_err(|err| {
            EngineError::critical(anyhow!("failed to encode PoP payout tx: {err}"))
        })?;

        Ok(Some(tx))
    }

    /// Initiates a block-building job on top of the current L2 head.
    pub async fn start_building_block(&mut self) -> EngineResult<()> {
        let l2_head = self.engine.unsafe_l2_head();

        let l1_origin = self
            .origin_selector
            .find_l1_origin(&l2_head)
            .await
            .inspect_err(|err| error!(%err, "error finding next L1 origin"))?;

        // The head must connect to the chosen origin: either the head
        // derives from the origin's parent, or from the origin itself.
        // Anything else means origin selection diverged from the chain's
        // actual ancestry and the engine must resync first.
        if !(l2_head.l1_origin.hash == l1_origin.parent_hash
            || l2_head.l1_origin.hash == l1_origin.hash)
        {
            SEQUENCER_INCONSISTENT_ORIGIN_TOTAL.inc();
            return Err(EngineError::reset(anyhow!(
                "cannot build new L2 block with L1 origin {} (parent L1 {}) on current L2 head {} with L1 origin {}",
                l1_origin,
                l1_origin.parent_hash,
                l2_head,
                l2_head.l1_origin.hash,
            )));
        }

        info!(parent = %l2_head, l1_origin = %l1_origin, "creating new block");

        let mut attrs = time::timeout(
            ATTRIBUTES_FETCH_TIMEOUT,
            self.attr_builder
                .prepare_payload_attributes(&l2_head, l1_origin.id()),
        )
        .await
        .map_err(|_| {
            EngineError::temporary(anyhow!("timed out preparing payload attributes"))
        })??;

        if let Some(payout_tx) = self.build_pop_payout_tx(l2_head.number + 1).await? {
            attrs.transactions.push(payout_tx.into());
        }

        // Past the drift threshold only deposited transactions may be
        // included, so the block is built without the tx pool.
        attrs.no_tx_pool = attrs.timestamp > l1_origin.timestamp + self.params.max_sequencer_drift;

        if self.params.is_upgrade_activation_block(attrs.timestamp) {
            attrs.no_tx_pool = true;
            info!("sequencing upgrade activation block");
        }

        debug!(
            num = %(l2_head.number + 1),
            time = %attrs.timestamp,
            origin = %l1_origin,
            origin_time = %l1_origin.timestamp,
            no_tx_pool = %attrs.no_tx_pool,
            "prepared attributes for new block"
        );

        self.engine.start_payload(l2_head, attrs).await?;
        Ok(())
    }

    /// Asks the engine to seal the block being built.
    ///
    /// The safe and finalized view captured at the start of the job is
    /// reused; the engine must not let it drift between start and
    /// completion.
    pub async fn complete_building_block(&mut self) -> EngineResult<ExecPayloadEnvelope> {
        self.engine.confirm_payload().await
    }

    /// Cancels the current open block-building job. Only one job is
    /// maintained at a time.
    pub async fn cancel_building_block(&mut self) {
        // Force-cancel: building can always continue later, and errors are
        // logged by the engine state.
        if let Err(err) = self.engine.cancel_payload(true).await {
            debug!(%err, "cancelling open build job reported an error");
        }
    }

    /// Desired delay until the next [`Self::run_next_sequencer_action`]
    /// call.
    pub fn plan_next_sequencer_action(&self) -> Duration {
        let building = self.engine.building_payload();

        // The engine advancing safe chain state changes the head we would
        // build on; give it a full block time to settle.
        if building.safe {
            warn!(onto = %building.onto, onto_time = %building.onto.timestamp,
                "delaying sequencing to not interrupt safe-head changes");
            return self.block_time();
        }

        let head = self.engine.unsafe_l2_head();
        let now = self.clock.now();

        // A scheduled holdoff (e.g. error backoff) is honored as long as
        // the head hasn't moved; a changed head needs a response now.
        if let Some(next_action) = self.next_action {
            if building.onto.hash == head.hash {
                if let Ok(delay) = next_action.duration_since(now) {
                    if delay > Duration::ZERO {
                        return delay;
                    }
                }
            }
        }

        let block_time = self.block_time();
        let payload_time = UNIX_EPOCH + Duration::from_secs(head.timestamp) + block_time;
        let remaining = payload_time
            .duration_since(now)
            .unwrap_or(Duration::ZERO);

        if building.id.is_some() && building.onto.hash == head.hash {
            // A consistent job is open: schedule sealing with margin before
            // the ideal payload time, or immediately if the margin is gone.
            remaining.saturating_sub(SEALING_DURATION)
        } else if remaining > block_time {
            // Too much slack; wait before starting the build.
            remaining - block_time
        } else {
            Duration::ZERO
        }
    }

    /// Starts new block-building work or seals existing work; best timed by
    /// first awaiting the delay from [`Self::plan_next_sequencer_action`].
    ///
    /// Returns the sealed payload when one was produced. Critical and reset
    /// failures are returned to the caller (the caller owns engine
    /// resynchronization); everything else is handled internally with
    /// backoff.
    pub async fn run_next_sequencer_action(
        &mut self,
    ) -> EngineResult<Option<ExecPayloadEnvelope>> {
        let building = self.engine.building_payload();

        if building.id.is_some() || self.gossip.has_pending_payload() {
            if building.safe {
                warn!(onto = %building.onto, onto_time = %building.onto.timestamp,
                    "avoiding sequencing to not interrupt safe-head changes");
                self.next_action = Some(self.clock.now() + self.block_time());
                return Ok(None);
            }

            match self.complete_building_block().await {
                Ok(envelope) => {
                    SEQUENCER_BLOCKS_SEALED_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                    info!(
                        block = %envelope.block,
                        time = %envelope.timestamp,
                        txs = %envelope.transactions.len(),
                        "sequencer successfully built a new block"
                    );
                    Ok(Some(envelope))
                }
                Err(err) => {
                    SEQUENCER_BLOCKS_SEALED_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    match err.kind() {
                        EngineErrorKind::Critical => Err(err),
                        EngineErrorKind::Reset => {
                            error!(%err, "sequencer failed to seal new block, requiring reset");
                            SEQUENCER_RESETS_TOTAL.inc();
                            // Hold off from sequencing for a full block.
                            self.next_action = Some(self.clock.now() + self.block_time());
                            self.cancel_building_block().await;
                            Err(err)
                        }
                        EngineErrorKind::Temporary => {
                            error!(%err, "sequencer failed temporarily to seal new block");
                            self.next_action = Some(self.clock.now() + TEMPORARY_BACKOFF);
                            // No cancel: the job may still finish, and
                            // abandoned work times out on its own.
                            Ok(None)
                        }
                        EngineErrorKind::Other => {
                            error!(%err, "sequencer failed to seal block with unclassified error");
                            self.next_action = Some(self.clock.now() + TEMPORARY_BACKOFF);
                            self.cancel_building_block().await;
                            Ok(None)
                        }
                    }
                }
            }
        } else {
            match self.start_building_block().await {
                Ok(()) => {
                    let building = self.engine.building_payload();
                    info!(
                        payload_id = ?building.id,
                        l2_parent_block = %building.onto,
                        l2_parent_block_time = %building.onto.timestamp,
                        "sequencer started building new block"
                    );
                    Ok(None)
                }
                Err(err) => match err.kind() {
                    EngineErrorKind::Critical => Err(err),
                    EngineErrorKind::Reset => {
                        error!(%err, "sequencer failed to start new block, requiring reset");
                        SEQUENCER_RESETS_TOTAL.inc();
                        self.next_action = Some(self.clock.now() + self.block_time());
                        Err(err)
                    }
                    EngineErrorKind::Temporary => {
                        error!(%err, "sequencer temporarily failed to start building new block");
                        self.next_action = Some(self.clock.now() + TEMPORARY_BACKOFF);
                        Ok(None)
                    }
                    EngineErrorKind::Other => {
                        error!(%err, "sequencer failed to start building new block with unclassified error");
                        self.next_action = Some(self.clock.now() + TEMPORARY_BACKOFF);
                        Ok(None)
                    }
                },
            }
        }
    }
}
