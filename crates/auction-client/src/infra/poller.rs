//! Background refresh of everything the client shows.
//!
//! Each data family runs in its own task: wait for the next tick of its
//! interval or an out of cycle trigger, fetch, publish. A family never runs
//! two refreshes at once, and a newer result always replaces the published
//! one as a whole. A failed refresh leaves the published value alone.

use {
    crate::{
        domain::{
            auction::{AllocationRecord, AuctionSnapshot, ClearingPrices, Countdown, Phase},
            bid::{BidLedger, BidRecord},
        },
        infra::{blockchain::AuctionReading, observe, time},
    },
    alloy::primitives::Address,
    anyhow::Result,
    bigdecimal::BigDecimal,
    std::{
        fmt,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::{
        sync::{Notify, futures::Notified, watch},
        task::JoinHandle,
        time::MissedTickBehavior,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Snapshot,
    Balance,
    Bids,
    Allocation,
    ClearingPrice,
    Countdown,
}

impl Family {
    pub const ALL: [Self; 6] = [
        Self::Snapshot,
        Self::Balance,
        Self::Bids,
        Self::Allocation,
        Self::ClearingPrice,
        Self::Countdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Balance => "balance",
            Self::Bids => "bids",
            Self::Allocation => "allocation",
            Self::ClearingPrice => "clearing_price",
            Self::Countdown => "countdown",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refresh period of every data family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub snapshot: Duration,
    pub balance: Duration,
    pub bids: Duration,
    pub allocation: Duration,
    pub clearing_price: Duration,
    /// Local clock arithmetic only, no network access.
    pub countdown: Duration,
}

impl Intervals {
    pub fn get(&self, family: Family) -> Duration {
        match family {
            Family::Snapshot => self.snapshot,
            Family::Balance => self.balance,
            Family::Bids => self.bids,
            Family::Allocation => self.allocation,
            Family::ClearingPrice => self.clearing_price,
            Family::Countdown => self.countdown,
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(5),
            balance: Duration::from_secs(5),
            bids: Duration::from_secs(5),
            allocation: Duration::from_secs(5),
            clearing_price: Duration::from_secs(3),
            countdown: Duration::from_secs(1),
        }
    }
}

/// Requests out of cycle refreshes. A request made while the family is busy
/// is kept and served right after the running refresh.
#[derive(Clone, Default)]
pub struct Triggers(Arc<[Notify; Family::ALL.len()]>);

impl Triggers {
    pub fn refresh(&self, family: Family) {
        self.0[family as usize].notify_one();
    }

    pub fn refresh_all(&self) {
        for family in Family::ALL {
            self.refresh(family);
        }
    }

    pub fn notified(&self, family: Family) -> Notified<'_> {
        self.0[family as usize].notified()
    }
}

/// The latest published value of every data family. `None` until the first
/// successful refresh.
#[derive(Clone)]
pub struct View {
    pub snapshot: watch::Receiver<Option<AuctionSnapshot>>,
    pub balance: watch::Receiver<Option<BigDecimal>>,
    pub bids: watch::Receiver<Option<Vec<BidRecord>>>,
    pub allocation: watch::Receiver<Option<AllocationRecord>>,
    pub clearing_prices: watch::Receiver<Option<ClearingPrices>>,
    pub countdown: watch::Receiver<Countdown>,
}

/// Sending halves of a [`View`].
pub struct Publishers {
    pub snapshot: watch::Sender<Option<AuctionSnapshot>>,
    pub balance: watch::Sender<Option<BigDecimal>>,
    pub bids: watch::Sender<Option<Vec<BidRecord>>>,
    pub allocation: watch::Sender<Option<AllocationRecord>>,
    pub clearing_prices: watch::Sender<Option<ClearingPrices>>,
    pub countdown: watch::Sender<Countdown>,
}

impl View {
    pub fn channel() -> (Publishers, Self) {
        let (snapshot, snapshot_rx) = watch::channel(None);
        let (balance, balance_rx) = watch::channel(None);
        let (bids, bids_rx) = watch::channel(None);
        let (allocation, allocation_rx) = watch::channel(None);
        let (clearing_prices, clearing_prices_rx) = watch::channel(None);
        let (countdown, countdown_rx) = watch::channel(Countdown::Unknown);
        (
            Publishers {
                snapshot,
                balance,
                bids,
                allocation,
                clearing_prices,
                countdown,
            },
            Self {
                snapshot: snapshot_rx,
                balance: balance_rx,
                bids: bids_rx,
                allocation: allocation_rx,
                clearing_prices: clearing_prices_rx,
                countdown: countdown_rx,
            },
        )
    }

    pub fn snapshot(&self) -> Option<AuctionSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.snapshot
            .borrow()
            .as_ref()
            .map(|snapshot| snapshot.phase(time::now()))
    }

    pub fn balance(&self) -> Option<BigDecimal> {
        self.balance.borrow().clone()
    }

    pub fn bids(&self) -> Option<Vec<BidRecord>> {
        self.bids.borrow().clone()
    }

    pub fn allocation(&self) -> Option<AllocationRecord> {
        self.allocation.borrow().clone()
    }

    /// Falls back to the prices in the snapshot until the clearing price
    /// family has published.
    pub fn clearing_prices(&self) -> Option<ClearingPrices> {
        self.clearing_prices
            .borrow()
            .clone()
            .or_else(|| self.snapshot().map(|snapshot| snapshot.clearing_prices()))
    }

    pub fn countdown(&self) -> Countdown {
        *self.countdown.borrow()
    }
}

/// Running refresh tasks. Dropping the poller stops all of them.
pub struct Poller {
    tasks: Vec<JoinHandle<()>>,
}

impl Poller {
    /// Starts refreshing every family. The families that are specific to a
    /// bidder only run when `bidder` is set.
    pub fn start(
        reader: Arc<dyn AuctionReading>,
        bidder: Option<Address>,
        ledger: Arc<Mutex<BidLedger>>,
        intervals: Intervals,
    ) -> (Self, View, Triggers) {
        let (publishers, view) = View::channel();
        let triggers = Triggers::default();

        let mut tasks = vec![
            spawn(
                Family::Snapshot,
                intervals.snapshot,
                triggers.clone(),
                SnapshotRefresh {
                    reader: reader.clone(),
                    sender: publishers.snapshot,
                    triggers: triggers.clone(),
                },
            ),
            spawn(
                Family::ClearingPrice,
                intervals.clearing_price,
                triggers.clone(),
                ClearingPriceRefresh {
                    reader: reader.clone(),
                    sender: publishers.clearing_prices,
                },
            ),
            spawn(
                Family::Countdown,
                intervals.countdown,
                triggers.clone(),
                CountdownRefresh {
                    snapshot: view.snapshot.clone(),
                    sender: publishers.countdown,
                },
            ),
        ];
        if let Some(bidder) = bidder {
            tasks.extend([
                spawn(
                    Family::Balance,
                    intervals.balance,
                    triggers.clone(),
                    BalanceRefresh {
                        reader: reader.clone(),
                        owner: bidder,
                        sender: publishers.balance,
                    },
                ),
                spawn(
                    Family::Bids,
                    intervals.bids,
                    triggers.clone(),
                    BidsRefresh {
                        reader: reader.clone(),
                        bidder,
                        ledger,
                        sender: publishers.bids,
                    },
                ),
                spawn(
                    Family::Allocation,
                    intervals.allocation,
                    triggers.clone(),
                    AllocationRefresh {
                        reader,
                        bidder,
                        snapshot: view.snapshot.clone(),
                        sender: publishers.allocation,
                    },
                ),
            ]);
        }

        (Self { tasks }, view, triggers)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
trait Refresh: Send + 'static {
    /// Fetches and publishes a new value.
    async fn refresh(&mut self) -> Result<()>;
}

fn spawn(
    family: Family,
    period: Duration,
    triggers: Triggers,
    mut task: impl Refresh,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => observe::polling(family),
                _ = triggers.notified(family) => observe::refresh_triggered(family),
            }
            if let Err(err) = task.refresh().await {
                observe::poll_failed(family, &err);
            }
        }
    })
}

struct SnapshotRefresh {
    reader: Arc<dyn AuctionReading>,
    sender: watch::Sender<Option<AuctionSnapshot>>,
    triggers: Triggers,
}

#[async_trait::async_trait]
impl Refresh for SnapshotRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let next = self.reader.snapshot().await?;
        let stale = self
            .sender
            .borrow()
            .as_ref()
            .and_then(|previous| previous.check_monotonic(&next).err());
        self.sender.send_replace(Some(next));
        if let Some(err) = stale {
            observe::stale_read(&err);
            self.triggers.refresh_all();
        }
        Ok(())
    }
}

struct ClearingPriceRefresh {
    reader: Arc<dyn AuctionReading>,
    sender: watch::Sender<Option<ClearingPrices>>,
}

#[async_trait::async_trait]
impl Refresh for ClearingPriceRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let prices = self.reader.clearing_prices().await?;
        self.sender.send_replace(Some(prices));
        Ok(())
    }
}

struct CountdownRefresh {
    snapshot: watch::Receiver<Option<AuctionSnapshot>>,
    sender: watch::Sender<Countdown>,
}

#[async_trait::async_trait]
impl Refresh for CountdownRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let auction_end = self
            .snapshot
            .borrow()
            .as_ref()
            .map(|snapshot| snapshot.auction_end);
        let countdown = Countdown::at(time::now(), auction_end);
        self.sender.send_if_modified(|current| {
            let modified = *current != countdown;
            *current = countdown;
            modified
        });
        Ok(())
    }
}

struct BalanceRefresh {
    reader: Arc<dyn AuctionReading>,
    owner: Address,
    sender: watch::Sender<Option<BigDecimal>>,
}

#[async_trait::async_trait]
impl Refresh for BalanceRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let balance = self.reader.balance(self.owner).await?;
        self.sender.send_replace(Some(balance));
        Ok(())
    }
}

struct BidsRefresh {
    reader: Arc<dyn AuctionReading>,
    bidder: Address,
    ledger: Arc<Mutex<BidLedger>>,
    sender: watch::Sender<Option<Vec<BidRecord>>>,
}

#[async_trait::async_trait]
impl Refresh for BidsRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let bids = self.reader.user_bids(self.bidder).await?;
        // Merged under the lock so a concurrent invalidation is either fully
        // reflected or picked up by the refresh it triggers.
        let records = self.ledger.lock().unwrap().reconcile(&bids.prices);
        self.sender.send_replace(Some(records));
        Ok(())
    }
}

struct AllocationRefresh {
    reader: Arc<dyn AuctionReading>,
    bidder: Address,
    snapshot: watch::Receiver<Option<AuctionSnapshot>>,
    sender: watch::Sender<Option<AllocationRecord>>,
}

#[async_trait::async_trait]
impl Refresh for AllocationRefresh {
    async fn refresh(&mut self) -> Result<()> {
        let phase = self
            .snapshot
            .borrow()
            .as_ref()
            .map(|snapshot| snapshot.phase(time::now()));
        if phase != Some(Phase::Claiming) {
            return Ok(());
        }
        let allocation = self.reader.allocation(self.bidder).await?;
        self.sender.send_replace(Some(allocation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::bid::Quantity,
            infra::blockchain::{MockAuctionReading, UserBids},
        },
        futures::FutureExt,
        std::{
            str::FromStr,
            sync::atomic::{AtomicUsize, Ordering},
        },
    };

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn snapshot(auction_end: u64, claim_start: u64, price_finalized: bool) -> AuctionSnapshot {
        AuctionSnapshot {
            auction_end,
            claim_start,
            price_finalized,
            clearing_price_indicative: dec("57"),
            clearing_price_final: dec("0"),
            token_supply: dec("1000000"),
            floor_price: dec("55"),
        }
    }

    fn prices() -> ClearingPrices {
        snapshot(0, 0, false).clearing_prices()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_previous_snapshot() {
        let now = time::now();
        let expected = snapshot(now + 100, now + 200, false);

        let mut reader = MockAuctionReading::new();
        let calls = Arc::new(AtomicUsize::new(0));
        reader.expect_snapshot().returning({
            let calls = calls.clone();
            let expected = expected.clone();
            move || match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(expected.clone()),
                _ => Err(anyhow::anyhow!("node unreachable")),
            }
        });
        reader
            .expect_clearing_prices()
            .returning(|| Ok(prices()));

        let (poller, mut view, _) = Poller::start(
            Arc::new(reader),
            None,
            Default::default(),
            Intervals::default(),
        );
        view.snapshot.wait_for(Option::is_some).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(view.snapshot(), Some(expected));
        assert_eq!(
            view.countdown(),
            Countdown::Remaining {
                days: 0,
                hours: 0,
                minutes: 1,
                seconds: 40
            }
        );
        drop(poller);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_interval_and_trigger() {
        let mut task = MockRefresh::new();
        let calls = Arc::new(AtomicUsize::new(0));
        task.expect_refresh().returning({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("failures don't stop the loop"))
            }
        });

        let triggers = Triggers::default();
        let handle = spawn(
            Family::Bids,
            Duration::from_secs(5),
            triggers.clone(),
            task,
        );

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        triggers.refresh(Family::Bids);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Triggers of other families are ignored.
        triggers.refresh(Family::Balance);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn stale_snapshot_forces_refresh_of_all_families() {
        let mut reader = MockAuctionReading::new();
        let calls = Arc::new(AtomicUsize::new(0));
        reader.expect_snapshot().returning({
            let calls = calls.clone();
            move || match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(snapshot(200, 300, false)),
                _ => Ok(snapshot(250, 300, false)),
            }
        });

        let (sender, receiver) = watch::channel(None);
        let triggers = Triggers::default();
        let mut refresh = SnapshotRefresh {
            reader: Arc::new(reader),
            sender,
            triggers: triggers.clone(),
        };

        refresh.refresh().await.unwrap();
        assert!(triggers.notified(Family::Bids).now_or_never().is_none());

        refresh.refresh().await.unwrap();
        // The newer snapshot still replaces the older one.
        assert_eq!(*receiver.borrow(), Some(snapshot(250, 300, false)));
        for family in Family::ALL {
            assert!(triggers.notified(family).now_or_never().is_some());
        }
    }

    #[tokio::test]
    async fn bids_merge_local_quantities() {
        let mut reader = MockAuctionReading::new();
        reader.expect_user_bids().returning(|_| {
            Ok(UserBids {
                prices: vec![dec("55.0"), dec("60.0")],
                count: 2,
            })
        });

        let ledger = Arc::new(Mutex::new(BidLedger::default()));
        ledger.lock().unwrap().record(0, dec("10"));
        let (sender, receiver) = watch::channel(None);
        let mut refresh = BidsRefresh {
            reader: Arc::new(reader),
            bidder: Address::ZERO,
            ledger: ledger.clone(),
            sender,
        };

        refresh.refresh().await.unwrap();
        let bids = receiver.borrow().clone().unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].quantity, Quantity::Known(dec("10")));
        assert_eq!(bids[1].quantity, Quantity::Unknown);

        ledger.lock().unwrap().invalidate();
        refresh.refresh().await.unwrap();
        let bids = receiver.borrow().clone().unwrap();
        assert_eq!(bids[0].quantity, Quantity::Unknown);
    }

    #[tokio::test]
    async fn allocation_only_fetched_while_claiming() {
        let now = time::now();
        let allocation = AllocationRecord {
            allocated_tokens: dec("100"),
            refund_due: dec("12.5"),
            claimed: false,
        };

        let mut reader = MockAuctionReading::new();
        reader.expect_allocation().times(1).returning({
            let allocation = allocation.clone();
            move |_| Ok(allocation.clone())
        });

        let (snapshot_sender, snapshot_receiver) =
            watch::channel(Some(snapshot(now + 100, now + 200, false)));
        let (sender, receiver) = watch::channel(None);
        let mut refresh = AllocationRefresh {
            reader: Arc::new(reader),
            bidder: Address::ZERO,
            snapshot: snapshot_receiver,
            sender,
        };

        refresh.refresh().await.unwrap();
        assert_eq!(*receiver.borrow(), None);

        snapshot_sender.send_replace(Some(snapshot(now + 100, now + 200, true)));
        refresh.refresh().await.unwrap();
        assert_eq!(*receiver.borrow(), Some(allocation));
    }
}
