use {
    super::{Addresses, AuctionWriting, EncryptedBid, TxError, TxReceipt},
    alloy::{
        contract::Error as ContractError,
        network::Ethereum as Network,
        primitives::{Address, U256},
        providers::{PendingTransactionBuilder, PendingTransactionError},
    },
    contracts::{ERC20, FHEAuction},
    ethrpc::{AlloyProvider, alloy::errors::RpcErrorExt},
};

/// Sends transactions signed by the bidder's key and waits for their
/// receipts.
#[derive(Clone)]
pub struct Wallet {
    address: Address,
    auction: FHEAuction::Instance,
    token: ERC20::Instance,
    place_bid_gas_limit: u64,
}

impl Wallet {
    /// `provider` must sign for `address`.
    pub fn new(
        provider: AlloyProvider,
        address: Address,
        addresses: Addresses,
        place_bid_gas_limit: u64,
    ) -> Self {
        Self {
            address,
            auction: FHEAuction::Instance::new(addresses.settlement, provider.clone()),
            token: ERC20::Instance::new(addresses.token, provider),
            place_bid_gas_limit,
        }
    }
}

#[async_trait::async_trait]
impl AuctionWriting for Wallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<TxReceipt, TxError> {
        let pending = self
            .token
            .approve(spender, amount)
            .from(self.address)
            .send()
            .await;
        confirm(pending).await
    }

    async fn place_bid(&self, bid: EncryptedBid) -> Result<TxReceipt, TxError> {
        // Gas estimation can't see through the encrypted input verification,
        // so the limit is fixed.
        let pending = self
            .auction
            .placeBid(bid.handle, bid.proof, bid.total_cost, bid.quantity)
            .from(self.address)
            .gas(self.place_bid_gas_limit)
            .send()
            .await;
        confirm(pending).await
    }

    async fn cancel_bid(&self, index: u64) -> Result<TxReceipt, TxError> {
        let pending = self
            .auction
            .cancelBid(U256::from(index))
            .from(self.address)
            .send()
            .await;
        confirm(pending).await
    }

    async fn claim(&self) -> Result<TxReceipt, TxError> {
        let pending = self
            .auction
            .claimTokensAndRefund()
            .from(self.address)
            .send()
            .await;
        confirm(pending).await
    }

    async fn finalize_prices(&self) -> Result<TxReceipt, TxError> {
        let pending = self
            .auction
            .finalizePrices()
            .from(self.address)
            .send()
            .await;
        confirm(pending).await
    }
}

/// Waits for the receipt of a sent transaction. There is no timeout; a
/// transaction that never gets included keeps the caller waiting.
async fn confirm(
    pending: Result<PendingTransactionBuilder<Network>, ContractError>,
) -> Result<TxReceipt, TxError> {
    let pending = pending.map_err(send_error)?;
    let hash = *pending.tx_hash();
    tracing::debug!(?hash, "waiting for transaction receipt");

    let receipt = pending.get_receipt().await.map_err(receipt_error)?;
    if !receipt.status() {
        return Err(TxError::Reverted {
            hash: Some(hash),
            reason: None,
        });
    }
    Ok(TxReceipt {
        hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
    })
}

fn send_error(err: ContractError) -> TxError {
    classify(&err).unwrap_or_else(|| TxError::Other(err.to_string()))
}

fn receipt_error(err: PendingTransactionError) -> TxError {
    classify(&err).unwrap_or_else(|| TxError::Other(err.to_string()))
}

fn classify(err: &impl RpcErrorExt) -> Option<TxError> {
    if err.is_user_rejection() {
        return Some(TxError::Declined);
    }
    err.revert_reason().map(|reason| TxError::Reverted {
        hash: None,
        reason: Some(reason),
    })
}
