//! Placing an encrypted bid.
//!
//! The steps run strictly in order and the first failure aborts the rest:
//!
//! 1. read the allowance granted to the settlement contract
//! 2. approve the configured ceiling if the allowance is short, and wait for
//!    the approval to be included
//! 3. encrypt the quantity for this contract and bidder
//! 4. place the bid and wait for it to be included
//! 5. remember the quantity under the new bid's index

use {
    crate::{
        domain::{
            bid::{BidRequest, PendingBidIntent},
            client::{Action, Client},
            error::{BidError, PreconditionError},
        },
        infra::{
            blockchain::{EncryptedBid, TxReceipt},
            fhe,
            observe,
            poller::Family,
        },
    },
    alloy::primitives::Address,
    bigdecimal::BigDecimal,
};

impl Client {
    /// Submits the bid described by `intent`. A second submission, or any
    /// other action, while one is in flight is rejected before it has any
    /// side effect.
    pub async fn submit_bid(&self, intent: &PendingBidIntent) -> Result<TxReceipt, BidError> {
        self.exclusive(Action::SubmitBid, || self.submit(intent))
            .await
    }

    async fn submit(&self, intent: &PendingBidIntent) -> Result<TxReceipt, BidError> {
        let status = self.encryptor.status();
        if !status.is_ready() {
            return Err(PreconditionError::EncryptionNotReady(status).into());
        }
        let wallet = self.wallet()?;
        let request = intent.validate().map_err(PreconditionError::from)?;
        let snapshot = self
            .view
            .snapshot()
            .ok_or(PreconditionError::AuctionUnknown)?;
        if snapshot.price_finalized {
            return Err(PreconditionError::AlreadyFinalized.into());
        }
        let bidder = wallet.address();
        observe::submitting_bid(&request);

        self.ensure_allowance(bidder, &request).await?;

        observe::encrypting_quantity();
        let encrypted = self
            .encryptor
            .encrypt_u32(self.config.settlement, bidder, request.quantity)
            .await?;
        let handle = encrypted
            .handles
            .into_iter()
            .next()
            .filter(|handle| !handle.is_empty())
            .ok_or(fhe::Error::Incomplete("no ciphertext handle returned"))?;
        if encrypted.input_proof.is_empty() {
            return Err(fhe::Error::Incomplete("no input proof returned").into());
        }

        let receipt = wallet
            .place_bid(EncryptedBid {
                handle,
                proof: encrypted.input_proof,
                total_cost: request.total_cost,
                quantity: request.quantity_wei,
            })
            .await
            .map_err(BidError::submission)?;

        let index = self.record_quantity(bidder, &request).await;
        observe::bid_placed(&receipt, index);
        self.triggers.refresh(Family::ClearingPrice);
        self.triggers.refresh(Family::Bids);
        self.triggers.refresh(Family::Balance);
        Ok(receipt)
    }

    async fn ensure_allowance(&self, bidder: Address, request: &BidRequest) -> Result<(), BidError> {
        let allowance = self
            .reader
            .allowance(bidder, self.config.settlement)
            .await
            .map_err(|err| BidError::Allowance(format!("{err:#}")))?;
        if allowance >= request.total_cost {
            return Ok(());
        }

        let amount = self.config.approval_ceiling.max(request.total_cost);
        observe::approval_requested(&allowance, &amount);
        self.wallet()?
            .approve(self.config.settlement, amount)
            .await
            .map_err(BidError::allowance)?;
        Ok(())
    }

    /// Remembers the quantity of the bid that was just included. The chain
    /// is asked for the bid count instead of trusting a local counter, so
    /// bids placed by other sessions don't shift the index. Returns the
    /// index, or `None` if the count could not be read, in which case the
    /// bid shows an unknown quantity.
    async fn record_quantity(&self, bidder: Address, request: &BidRequest) -> Option<u64> {
        let bids = match self.reader.user_bids(bidder).await {
            Ok(bids) => bids,
            Err(err) => {
                observe::bid_index_unknown(&err);
                return None;
            }
        };
        let index = bids.count.checked_sub(1)?;
        self.ledger
            .lock()
            .unwrap()
            .record(index, BigDecimal::from(request.quantity));
        Some(index)
    }
}
