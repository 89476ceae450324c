//! The sequencer: decides when to start, seal or cancel block-building
//! jobs, injects PoP payout transactions into keystone payout blocks, and
//! classifies engine failures into retry/reset/fatal categories.

pub mod finality;
pub mod sequencer;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub use finality::{btc_finality_for_block_hash, btc_finality_for_block_number, FinalityError};
pub use sequencer::{Sequencer, SEALING_DURATION};
pub use traits::{
    AttributesBuilder, ChainLookup, Clock, NoGossip, OriginSelector, PayloadGossip, SystemClock,
};
