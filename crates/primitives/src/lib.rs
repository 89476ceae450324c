//! Core value types shared across the node: block references, keystones,
//! PoP payouts and Bitcoin finality records.

pub mod block;
pub mod finality;
pub mod keystone;
pub mod payout;

pub use block::{BlockId, L1BlockRef, L2BlockRef};
pub use finality::L2BtcFinality;
pub use keystone::{is_keystone_height, keystone_providing_finality, L2Keystone, KEYSTONE_VERSION};
pub use payout::PopPayout;
