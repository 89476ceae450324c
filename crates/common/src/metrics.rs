//! Prometheus metrics for the sequencing and reward subsystems.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

lazy_static! {
    /// Counter for engine resets requested by the sequencer.
    pub static ref SEQUENCER_RESETS_TOTAL: IntCounter = register_int_counter!(
        "cairn_sequencer_resets_total",
        "Engine resets requested by the sequencer"
    )
    .unwrap();

    /// Counter for L1 origin selections inconsistent with the current head.
    pub static ref SEQUENCER_INCONSISTENT_ORIGIN_TOTAL: IntCounter = register_int_counter!(
        "cairn_sequencer_inconsistent_l1_origin_total",
        "L1 origin selections inconsistent with the L2 head's recorded origin"
    )
    .unwrap();

    /// Counter for sealed blocks
    /// Labels: status=[success|failed]
    pub static ref SEQUENCER_BLOCKS_SEALED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cairn_sequencer_blocks_sealed_total",
        "Blocks the sequencer asked the engine to seal",
        &["status"]
    )
    .unwrap();

    /// Counter for reward service RPC calls
    /// Labels: method=[notify_keystone|get_pop_payouts|...], status=[success|failed]
    pub static ref REWARD_RPC_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cairn_reward_rpc_calls_total",
        "RPC calls to the PoP reward service",
        &["method", "status"]
    )
    .unwrap();

    /// Counter for reward service reconnect attempts.
    pub static ref REWARD_CLIENT_RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        "cairn_reward_client_reconnects_total",
        "Reconnection attempts to the PoP reward service"
    )
    .unwrap();
}
