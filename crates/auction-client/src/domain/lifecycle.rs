//! Actions on existing bids and on the auction outcome. The settlement
//! contract is the sole enforcer of ownership and once-only rules; the checks
//! here only avoid prompting the wallet for transactions that are known to
//! fail.

use crate::{
    domain::{
        auction::Phase,
        client::{Action, Client},
        error::{BidError, PreconditionError},
    },
    infra::{blockchain::TxReceipt, observe, poller::Family, time},
};

impl Client {
    /// Cancels the caller's bid at `index`.
    ///
    /// Afterwards every cached quantity is dropped, not just the one at
    /// `index`: the contract may compact or reuse indices, and a quantity
    /// must never be shown for a bid it doesn't belong to.
    pub async fn cancel_bid(&self, index: u64) -> Result<TxReceipt, BidError> {
        self.exclusive(Action::CancelBid, || self.cancel(index))
            .await
    }

    /// Claims the allocated tokens and the refund. Only allowed in the
    /// claiming phase and while the allocation is not known to be claimed.
    /// The allocation is refetched afterwards rather than marked as claimed.
    pub async fn claim(&self) -> Result<TxReceipt, BidError> {
        self.exclusive(Action::Claim, || self.claim_allocation())
            .await
    }

    /// Administrative: finalizes the clearing price on the settlement
    /// contract.
    pub async fn finalize_prices(&self) -> Result<TxReceipt, BidError> {
        self.exclusive(Action::FinalizePrices, || self.finalize())
            .await
    }

    async fn cancel(&self, index: u64) -> Result<TxReceipt, BidError> {
        let receipt = self
            .wallet()?
            .cancel_bid(index)
            .await
            .map_err(BidError::submission)?;
        self.ledger.lock().unwrap().invalidate();
        observe::ledger_invalidated(index);
        self.triggers.refresh(Family::Bids);
        self.triggers.refresh(Family::Balance);
        self.triggers.refresh(Family::ClearingPrice);
        Ok(receipt)
    }

    async fn claim_allocation(&self) -> Result<TxReceipt, BidError> {
        let wallet = self.wallet()?;
        let snapshot = self
            .view
            .snapshot()
            .ok_or(PreconditionError::AuctionUnknown)?;
        let phase = snapshot.phase(time::now());
        if phase != Phase::Claiming {
            return Err(PreconditionError::NotClaiming(phase).into());
        }
        if self
            .view
            .allocation()
            .is_some_and(|allocation| allocation.claimed)
        {
            return Err(PreconditionError::AlreadyClaimed.into());
        }

        let receipt = wallet.claim().await.map_err(BidError::submission)?;
        self.triggers.refresh(Family::Allocation);
        self.triggers.refresh(Family::Balance);
        Ok(receipt)
    }

    async fn finalize(&self) -> Result<TxReceipt, BidError> {
        let wallet = self.wallet()?;
        let snapshot = self
            .view
            .snapshot()
            .ok_or(PreconditionError::AuctionUnknown)?;
        if snapshot.price_finalized {
            return Err(PreconditionError::AlreadyFinalized.into());
        }

        let receipt = wallet
            .finalize_prices()
            .await
            .map_err(BidError::submission)?;
        self.triggers.refresh(Family::Snapshot);
        self.triggers.refresh(Family::ClearingPrice);
        self.triggers.refresh(Family::Allocation);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use {
        crate::{
            domain::{
                auction::Phase,
                bid::Quantity,
                client::testing::*,
                error::{BidError, PreconditionError},
            },
            infra::{
                blockchain::{MockAuctionReading, TxError},
                fhe::MockEncrypting,
                poller::Family,
            },
        },
        futures::FutureExt,
        std::sync::Arc,
    };

    #[tokio::test]
    async fn cancel_invalidates_all_cached_quantities() {
        let mut wallet = wallet();
        wallet
            .expect_cancel_bid()
            .times(1)
            .withf(|index| *index == 0)
            .returning(|_| Ok(receipt()));

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        {
            let mut ledger = setup.ledger.lock().unwrap();
            ledger.record(0, dec("10"));
            ledger.record(1, dec("20"));
        }

        setup.client.cancel_bid(0).await.unwrap();

        // The chain may still report a bid at index 0; its quantity is gone.
        let bids = setup
            .ledger
            .lock()
            .unwrap()
            .reconcile(&[dec("55"), dec("60")]);
        assert!(bids.iter().all(|bid| bid.quantity == Quantity::Unknown));
        assert!(setup.triggers.notified(Family::Bids).now_or_never().is_some());
    }

    #[tokio::test]
    async fn failed_cancel_keeps_cached_quantities() {
        let mut wallet = wallet();
        wallet.expect_cancel_bid().returning(|_| {
            Err(TxError::Reverted {
                hash: None,
                reason: Some("Not your bid".into()),
            })
        });

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        setup.ledger.lock().unwrap().record(0, dec("10"));

        let err = setup.client.cancel_bid(3).await.unwrap_err();
        assert!(matches!(err, BidError::Submission(reason) if reason == "Not your bid"));
        assert_eq!(setup.ledger.lock().unwrap().len(), 1);
        assert!(setup.triggers.notified(Family::Bids).now_or_never().is_none());
    }

    #[tokio::test]
    async fn claim_requires_claiming_phase() {
        let mut wallet = wallet();
        wallet.expect_claim().never();

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        let err = setup.client.claim().await.unwrap_err();
        assert!(matches!(
            err,
            BidError::Precondition(PreconditionError::AuctionUnknown)
        ));

        setup.publishers.snapshot.send_replace(Some(snapshot(false)));
        let err = setup.client.claim().await.unwrap_err();
        assert!(matches!(
            err,
            BidError::Precondition(PreconditionError::NotClaiming(Phase::Bidding))
        ));
    }

    #[tokio::test]
    async fn claim_refetches_allocation_instead_of_assuming_success() {
        let mut wallet = wallet();
        wallet.expect_claim().times(1).returning(|| Ok(receipt()));

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        setup
            .publishers
            .snapshot
            .send_replace(Some(claiming_snapshot()));
        setup.publishers.allocation.send_replace(Some(allocation(false)));

        setup.client.claim().await.unwrap();
        // Unchanged until the refresh reads it from the chain.
        assert_eq!(setup.client.view().allocation(), Some(allocation(false)));
        assert!(
            setup
                .triggers
                .notified(Family::Allocation)
                .now_or_never()
                .is_some()
        );
    }

    #[tokio::test]
    async fn claim_rejected_once_claimed() {
        let mut wallet = wallet();
        wallet.expect_claim().never();

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        // Finalized prices open claiming even before the claim start.
        setup.publishers.snapshot.send_replace(Some(snapshot(true)));
        setup.publishers.allocation.send_replace(Some(allocation(true)));

        let err = setup.client.claim().await.unwrap_err();
        assert!(matches!(
            err,
            BidError::Precondition(PreconditionError::AlreadyClaimed)
        ));
    }

    #[tokio::test]
    async fn finalize_prices() {
        let mut wallet = wallet();
        wallet
            .expect_finalize_prices()
            .times(1)
            .returning(|| Ok(receipt()));

        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        setup
            .publishers
            .snapshot
            .send_replace(Some(claiming_snapshot()));
        setup.client.finalize_prices().await.unwrap();
        for family in [Family::Snapshot, Family::ClearingPrice] {
            assert!(setup.triggers.notified(family).now_or_never().is_some());
        }

        setup.publishers.snapshot.send_replace(Some(snapshot(true)));
        let err = setup.client.finalize_prices().await.unwrap_err();
        assert!(matches!(
            err,
            BidError::Precondition(PreconditionError::AlreadyFinalized)
        ));
    }

    #[tokio::test]
    async fn actions_need_a_wallet() {
        let setup = client(MockAuctionReading::new(), None, MockEncrypting::new());
        for err in [
            setup.client.cancel_bid(0).await.unwrap_err(),
            setup.client.claim().await.unwrap_err(),
            setup.client.finalize_prices().await.unwrap_err(),
        ] {
            assert!(matches!(
                err,
                BidError::Precondition(PreconditionError::WalletNotConnected)
            ));
        }
    }

    #[tokio::test]
    async fn declined_cancel() {
        let mut wallet = wallet();
        wallet
            .expect_cancel_bid()
            .returning(|_| Err(TxError::Declined));
        let setup = client(
            MockAuctionReading::new(),
            Some(Arc::new(wallet)),
            MockEncrypting::new(),
        );
        setup.ledger.lock().unwrap().record(0, dec("10"));

        let err = setup.client.cancel_bid(0).await.unwrap_err();
        assert!(matches!(err, BidError::UserDeclined));
        assert!(!setup.ledger.lock().unwrap().is_empty());
        assert!(!setup.client.is_busy());
    }
}
