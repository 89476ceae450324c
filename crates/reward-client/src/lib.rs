//! Client for the PoP reward-accounting service.
//!
//! The service is reached over a single authenticated duplex message
//! channel (produced by a [`transport::Connector`]); this crate multiplexes
//! request/response operations over it, hides reconnection, and answers the
//! service's keep-alive pings.

pub mod client;
pub mod errors;
pub mod transport;
pub mod wire;

pub use client::{
    new_reward_client, ClientConfig, NoopRewardClient, RewardClient, RewardClientTask,
    RewardServiceClient,
};
pub use errors::ClientError;
