//! The contract seam. The session only talks to the guestbook through this
//! trait, so it can run against the EVM client or an in-memory double.

use alloy::primitives::{Address, TxHash};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::network::Message;
use crate::normalize::RawError;

#[async_trait]
pub trait GuestbookClient: Send + Sync + 'static {
    /// Configured contract, `None` when unset or the zero address.
    fn contract(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64, RawError>;

    async fn message_count(&self) -> Result<u64, RawError>;

    async fn message(&self, index: u64) -> Result<Message, RawError>;

    /// Submit `postMessage(text)` signed by `signer`. Resolves once the node
    /// has accepted the transaction.
    async fn post_message(&self, signer: &PrivateKeySigner, text: &str) -> Result<TxHash, RawError>;

    /// Resolves when the transaction is mined successfully, rejects when it
    /// reverts or the receipt cannot be obtained. Never times out on its own.
    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), RawError>;
}
