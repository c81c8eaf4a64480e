use alloy::primitives::Address;

use crate::account::Network;

/// One guestbook entry as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub index: u64,
    pub text: String,
    pub author: Address,
    /// Block timestamp in unix seconds.
    pub posted_at: u64,
}

#[derive(Debug, Clone)]
pub struct NetworkStatus {
    pub network: Network,
    pub node_url: String,
    pub chain_id: u64,
    pub block_number: u64,
}
