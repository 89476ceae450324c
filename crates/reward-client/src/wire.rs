//! Wire envelope for the reward service protocol.
//!
//! Messages travel as JSON objects tagged by `command`, with a request id
//! used to correlate responses to outstanding requests. Responses to
//! distinct requests may arrive in any order.

use cairn_primitives::{L2BtcFinality, L2Keystone, PopPayout};
use serde::{Deserialize, Serialize};

/// One framed protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    #[serde(flatten)]
    pub msg: WireMessage,
}

/// Error reported by the service inside a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub timestamp: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub origin_timestamp: i64,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyKeystoneRequest {
    pub keystone: L2Keystone,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyKeystoneResponse {
    pub error: Option<WireError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopPayoutsRequest {
    pub keystone_for_payout: L2Keystone,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PopPayoutsResponse {
    pub payouts: Vec<PopPayout>,
    pub error: Option<WireError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BtcFinalityByKeystonesRequest {
    pub keystones: Vec<L2Keystone>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BtcFinalityByKeystonesResponse {
    pub finalities: Vec<L2BtcFinality>,
    pub error: Option<WireError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcFinalityByRecentKeystonesRequest {
    pub num_recent_keystones: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BtcFinalityByRecentKeystonesResponse {
    pub finalities: Vec<L2BtcFinality>,
    pub error: Option<WireError>,
}

/// Async notification of a keystone reaching a new Bitcoin finality state.
/// This client does not act on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcFinalityNotification {}

/// Async notification of a new Bitcoin block. This client does not act on
/// it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcNewBlockNotification {}

/// All recognized protocol messages. Anything else on the wire fails to
/// deserialize and ends the connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum WireMessage {
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    NotifyKeystoneRequest(NotifyKeystoneRequest),
    NotifyKeystoneResponse(NotifyKeystoneResponse),
    PopPayoutsRequest(PopPayoutsRequest),
    PopPayoutsResponse(PopPayoutsResponse),
    BtcFinalityByKeystonesRequest(BtcFinalityByKeystonesRequest),
    BtcFinalityByKeystonesResponse(BtcFinalityByKeystonesResponse),
    BtcFinalityByRecentKeystonesRequest(BtcFinalityByRecentKeystonesRequest),
    BtcFinalityByRecentKeystonesResponse(BtcFinalityByRecentKeystonesResponse),
    BtcFinalityNotification(BtcFinalityNotification),
    BtcNewBlockNotification(BtcNewBlockNotification),
}

impl WireMessage {
    /// The `command` tag this message serializes under.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::PingRequest(_) => "ping_request",
            Self::PingResponse(_) => "ping_response",
            Self::NotifyKeystoneRequest(_) => "notify_keystone_request",
            Self::NotifyKeystoneResponse(_) => "notify_keystone_response",
            Self::PopPayoutsRequest(_) => "pop_payouts_request",
            Self::PopPayoutsResponse(_) => "pop_payouts_response",
            Self::BtcFinalityByKeystonesRequest(_) => "btc_finality_by_keystones_request",
            Self::BtcFinalityByKeystonesResponse(_) => "btc_finality_by_keystones_response",
            Self::BtcFinalityByRecentKeystonesRequest(_) => {
                "btc_finality_by_recent_keystones_request"
            }
            Self::BtcFinalityByRecentKeystonesResponse(_) => {
                "btc_finality_by_recent_keystones_response"
            }
            Self::BtcFinalityNotification(_) => "btc_finality_notification",
            Self::BtcNewBlockNotification(_) => "btc_new_block_notification",
        }
    }

    /// Whether this message answers one of our outstanding requests.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::NotifyKeystoneResponse(_)
                | Self::PopPayoutsResponse(_)
                | Self::BtcFinalityByKeystonesResponse(_)
                | Self::BtcFinalityByRecentKeystonesResponse(_)
        )
    }
}
