//! The settlement and token contracts, split into the read side polled in the
//! background and the signing side used by user actions.

use {
    crate::domain::auction::{AllocationRecord, AuctionSnapshot, ClearingPrices},
    alloy::primitives::{Address, B256, Bytes, U256},
    bigdecimal::BigDecimal,
    thiserror::Error,
};

mod reader;
mod wallet;

pub use {reader::Ethereum, wallet::Wallet};

/// Deployed contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addresses {
    pub settlement: Address,
    pub token: Address,
}

/// The caller's bids as the settlement contract reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBids {
    /// Prices in bid index order.
    pub prices: Vec<BigDecimal>,
    pub count: u64,
}

/// Read-only view of the contracts.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuctionReading: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<AuctionSnapshot>;
    async fn clearing_prices(&self) -> anyhow::Result<ClearingPrices>;
    async fn user_bids(&self, bidder: Address) -> anyhow::Result<UserBids>;
    async fn allocation(&self, bidder: Address) -> anyhow::Result<AllocationRecord>;
    async fn balance(&self, owner: Address) -> anyhow::Result<BigDecimal>;
    /// Amount `spender` may transfer on behalf of `owner`, in base units.
    async fn allowance(&self, owner: Address, spender: Address) -> anyhow::Result<U256>;
}

/// The arguments of a `placeBid` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBid {
    /// Ciphertext handle of the quantity.
    pub handle: Bytes,
    pub proof: Bytes,
    pub total_cost: U256,
    pub quantity: U256,
}

/// A signing wallet. Every method waits until the transaction is included,
/// however long that takes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuctionWriting: Send + Sync {
    fn address(&self) -> Address;
    async fn approve(&self, spender: Address, amount: U256) -> Result<TxReceipt, TxError>;
    async fn place_bid(&self, bid: EncryptedBid) -> Result<TxReceipt, TxError>;
    async fn cancel_bid(&self, index: u64) -> Result<TxReceipt, TxError>;
    async fn claim(&self) -> Result<TxReceipt, TxError>;
    async fn finalize_prices(&self) -> Result<TxReceipt, TxError>;
}

/// An included, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("request declined by the signer")]
    Declined,
    #[error("transaction reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        hash: Option<B256>,
        reason: Option<String>,
    },
    #[error("{0}")]
    Other(String),
}
