use {
    crate::{
        domain::{
            bid::{BidLedger, PendingBidIntent},
            error::{InputError, PreconditionError},
        },
        infra::{
            blockchain::{AuctionReading, AuctionWriting, TxReceipt},
            fhe::{self, Encrypting},
            observe,
            poller::{Triggers, View},
        },
    },
    alloy::primitives::{Address, U256},
    bigdecimal::BigDecimal,
    std::{
        fmt,
        sync::{
            Arc,
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    },
};

pub use crate::domain::error::BidError;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// The settlement contract, spender of the bidder's tokens.
    pub settlement: Address,
    /// Amount approved when the allowance does not cover a bid, so that
    /// further bids in the session need no approval.
    pub approval_ceiling: U256,
}

/// A user initiated action with on-chain side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SubmitBid,
    CancelBid,
    Claim,
    FinalizePrices,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubmitBid => "submit_bid",
            Self::CancelBid => "cancel_bid",
            Self::Claim => "claim",
            Self::FinalizePrices => "finalize_prices",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a bid would cost, shown before submitting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidPreview {
    pub total_cost: BigDecimal,
    /// Set when the last known balance does not cover the total cost. The
    /// bid can still be submitted.
    pub insufficient_balance: bool,
}

/// The bidder's side of the auction: user actions plus access to the
/// continuously refreshed view.
pub struct Client {
    pub(super) reader: Arc<dyn AuctionReading>,
    pub(super) wallet: Option<Arc<dyn AuctionWriting>>,
    pub(super) encryptor: Arc<dyn Encrypting>,
    pub(super) ledger: Arc<Mutex<BidLedger>>,
    pub(super) view: View,
    pub(super) triggers: Triggers,
    pub(super) config: Config,
    in_flight: AtomicBool,
}

impl Client {
    pub fn new(
        reader: Arc<dyn AuctionReading>,
        wallet: Option<Arc<dyn AuctionWriting>>,
        encryptor: Arc<dyn Encrypting>,
        ledger: Arc<Mutex<BidLedger>>,
        view: View,
        triggers: Triggers,
        config: Config,
    ) -> Self {
        Self {
            reader,
            wallet,
            encryptor,
            ledger,
            view,
            triggers,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn bidder(&self) -> Option<Address> {
        self.wallet.as_ref().map(|wallet| wallet.address())
    }

    pub fn encryption_status(&self) -> fhe::Status {
        self.encryptor.status()
    }

    /// Whether a user action is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn preview(&self, intent: &PendingBidIntent) -> Result<BidPreview, InputError> {
        let total_cost = intent.validate()?.total_cost();
        let insufficient_balance = self
            .view
            .balance()
            .is_some_and(|balance| balance < total_cost);
        Ok(BidPreview {
            total_cost,
            insufficient_balance,
        })
    }

    /// Runs `action` unless another one is in flight, and records its
    /// outcome. Only one action runs at a time because they share the
    /// bidder's allowance and nonce.
    pub(super) async fn exclusive<F>(
        &self,
        action: Action,
        run: impl FnOnce() -> F,
    ) -> Result<TxReceipt, BidError>
    where
        F: Future<Output = Result<TxReceipt, BidError>>,
    {
        let result = match self.acquire() {
            Ok(_guard) => {
                let _timer = observe::metrics::get().on_action_start(action.as_str());
                run().await
            }
            Err(err) => Err(err.into()),
        };
        observe::action(action, &result);
        result
    }

    fn acquire(&self) -> Result<impl Drop + use<'_>, PreconditionError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(PreconditionError::ActionInProgress);
        }
        Ok(scopeguard::guard(&self.in_flight, |in_flight| {
            in_flight.store(false, Ordering::SeqCst)
        }))
    }

    pub(super) fn wallet(&self) -> Result<&Arc<dyn AuctionWriting>, PreconditionError> {
        self.wallet
            .as_ref()
            .ok_or(PreconditionError::WalletNotConnected)
    }
}


#[cfg(test)]
mod tests {
    use {
        super::{testing::*, *},
        crate::infra::{blockchain::MockAuctionReading, fhe::MockEncrypting},
    };

    #[test]
    fn preview_warns_about_insufficient_balance() {
        let setup = client(MockAuctionReading::new(), None, MockEncrypting::new());
        let intent = PendingBidIntent::new("60", "100");

        // Without a known balance there is nothing to warn about.
        assert_eq!(
            setup.client.preview(&intent).unwrap(),
            BidPreview {
                total_cost: dec("6000"),
                insufficient_balance: false,
            }
        );

        setup.publishers.balance.send_replace(Some(dec("5999.99")));
        assert!(setup.client.preview(&intent).unwrap().insufficient_balance);

        setup.publishers.balance.send_replace(Some(dec("6000")));
        assert!(!setup.client.preview(&intent).unwrap().insufficient_balance);

        assert_eq!(
            setup.client.preview(&PendingBidIntent::default()),
            Err(InputError::MissingPrice)
        );
    }
}
