//! The auction as seen from the client: a snapshot of the settlement
//! contract's public state, and everything derived from it and the local
//! clock.

use {
    crate::domain::error::StaleReadError,
    bigdecimal::{BigDecimal, RoundingMode, Zero},
    std::fmt,
};

/// Public settlement contract state, fetched fresh on every poll. A newer
/// snapshot always replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionSnapshot {
    /// Unix timestamp (seconds) at which bidding closes.
    pub auction_end: u64,
    /// Unix timestamp (seconds) from which allocations can be claimed.
    pub claim_start: u64,
    pub price_finalized: bool,
    pub clearing_price_indicative: BigDecimal,
    pub clearing_price_final: BigDecimal,
    pub token_supply: BigDecimal,
    pub floor_price: BigDecimal,
}

impl AuctionSnapshot {
    pub fn phase(&self, now: u64) -> Phase {
        Phase::resolve(now, self.auction_end, self.claim_start, self.price_finalized)
    }

    pub fn clearing_prices(&self) -> ClearingPrices {
        ClearingPrices {
            finalized: self.price_finalized,
            final_price: self.clearing_price_final.clone(),
            indicative: self.clearing_price_indicative.clone(),
            floor: self.floor_price.clone(),
        }
    }

    /// Checks that the fields which can only move forward did not move
    /// backwards between `self` and the `next` snapshot.
    pub fn check_monotonic(&self, next: &AuctionSnapshot) -> Result<(), StaleReadError> {
        if self.auction_end != next.auction_end {
            return Err(StaleReadError::AuctionEndChanged {
                previous: self.auction_end,
                current: next.auction_end,
            });
        }
        if self.claim_start != next.claim_start {
            return Err(StaleReadError::ClaimStartChanged {
                previous: self.claim_start,
                current: next.claim_start,
            });
        }
        if self.price_finalized && !next.price_finalized {
            return Err(StaleReadError::Unfinalized);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Bidding,
    Finalization,
    Claiming,
}

impl Phase {
    /// Derives the phase from the clock and the contract flags. The first
    /// matching rule wins:
    ///
    /// 1. finalized prices mean claiming is open, whatever the clock says
    /// 2. before the auction end bids are accepted
    /// 3. before the claim start the auction waits for finalization
    /// 4. claiming otherwise
    ///
    /// With `auction_end == claim_start` the finalization phase is never
    /// observed.
    pub fn resolve(now: u64, auction_end: u64, claim_start: u64, price_finalized: bool) -> Self {
        if price_finalized {
            Self::Claiming
        } else if now < auction_end {
            Self::Bidding
        } else if now < claim_start {
            Self::Finalization
        } else {
            Self::Claiming
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bidding => "bidding",
            Self::Finalization => "finalization",
            Self::Claiming => "claiming",
        })
    }
}

/// The clearing price related fields, polled more often than the rest of the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearingPrices {
    pub finalized: bool,
    pub final_price: BigDecimal,
    pub indicative: BigDecimal,
    pub floor: BigDecimal,
}

impl ClearingPrices {
    /// The price to show: the final price once it is set, the indicative
    /// price while it is non-zero and the floor price otherwise.
    pub fn displayed(&self) -> &BigDecimal {
        if self.finalized && !self.final_price.is_zero() {
            &self.final_price
        } else if !self.indicative.is_zero() {
            &self.indicative
        } else {
            &self.floor
        }
    }
}

impl fmt::Display for ClearingPrices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_cents(self.displayed()))
    }
}

/// Rounds an amount to two decimals for display.
pub fn to_cents(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

/// The caller's share of the auction outcome. Only meaningful once the
/// auction is in the claiming phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub allocated_tokens: BigDecimal,
    pub refund_due: BigDecimal,
    pub claimed: bool,
}

/// Time left until the auction end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Countdown {
    /// No snapshot has been fetched yet.
    #[default]
    Unknown,
    Ended,
    Remaining {
        days: u64,
        hours: u64,
        minutes: u64,
        seconds: u64,
    },
}

impl Countdown {
    pub fn at(now: u64, auction_end: Option<u64>) -> Self {
        let Some(auction_end) = auction_end else {
            return Self::Unknown;
        };
        match auction_end.checked_sub(now) {
            None | Some(0) => Self::Ended,
            Some(left) => Self::Remaining {
                days: left / 86_400,
                hours: left % 86_400 / 3_600,
                minutes: left % 3_600 / 60,
                seconds: left % 60,
            },
        }
    }

    pub fn has_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("--"),
            Self::Ended => f.write_str("Auction Ended"),
            Self::Remaining {
                days,
                hours,
                minutes,
                seconds,
            } => write!(f, "{days}d {hours}h {minutes}m {seconds}s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn snapshot() -> AuctionSnapshot {
        AuctionSnapshot {
            auction_end: 200,
            claim_start: 300,
            price_finalized: false,
            clearing_price_indicative: dec("0"),
            clearing_price_final: dec("0"),
            token_supply: dec("1000000"),
            floor_price: dec("55"),
        }
    }

    #[test]
    fn phase_priority() {
        assert_eq!(Phase::resolve(100, 200, 300, false), Phase::Bidding);
        assert_eq!(Phase::resolve(250, 200, 300, false), Phase::Finalization);
        assert_eq!(Phase::resolve(250, 200, 300, true), Phase::Claiming);
        assert_eq!(Phase::resolve(300, 200, 300, false), Phase::Claiming);
        // Finalized prices short-circuit the clock even during bidding.
        assert_eq!(Phase::resolve(100, 200, 300, true), Phase::Claiming);
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(Phase::resolve(199, 200, 300, false), Phase::Bidding);
        assert_eq!(Phase::resolve(200, 200, 300, false), Phase::Finalization);
        assert_eq!(Phase::resolve(299, 200, 300, false), Phase::Finalization);
    }

    #[test]
    fn finalization_unreachable_when_end_equals_claim_start() {
        for now in 0..400 {
            assert_ne!(Phase::resolve(now, 200, 200, false), Phase::Finalization);
        }
    }

    #[test]
    fn displayed_clearing_price() {
        let mut prices = snapshot().clearing_prices();
        assert_eq!(prices.to_string(), "55.00");

        prices.indicative = dec("57.125");
        assert_eq!(prices.to_string(), "57.13");

        // A final price only counts once the flag is set.
        prices.final_price = dec("58");
        assert_eq!(prices.displayed(), &dec("57.125"));
        prices.finalized = true;
        assert_eq!(prices.to_string(), "58.00");

        // A zero final price falls back to the indicative one.
        prices.final_price = dec("0");
        assert_eq!(prices.displayed(), &dec("57.125"));
    }

    #[test]
    fn monotonic_fields() {
        let previous = snapshot();
        let mut next = snapshot();
        next.clearing_price_indicative = dec("60");
        assert!(previous.check_monotonic(&next).is_ok());

        next.auction_end = 250;
        assert!(matches!(
            previous.check_monotonic(&next),
            Err(StaleReadError::AuctionEndChanged {
                previous: 200,
                current: 250
            })
        ));

        let mut next = snapshot();
        next.claim_start = 100;
        assert!(matches!(
            previous.check_monotonic(&next),
            Err(StaleReadError::ClaimStartChanged { .. })
        ));

        let finalized = AuctionSnapshot {
            price_finalized: true,
            ..snapshot()
        };
        assert!(matches!(
            finalized.check_monotonic(&snapshot()),
            Err(StaleReadError::Unfinalized)
        ));
        assert!(snapshot().check_monotonic(&finalized).is_ok());
    }

    #[test]
    fn countdown() {
        assert_eq!(Countdown::at(10, None), Countdown::Unknown);
        assert_eq!(Countdown::at(200, Some(200)).to_string(), "Auction Ended");
        assert!(Countdown::at(300, Some(200)).has_ended());
        assert_eq!(
            Countdown::at(0, Some(90_061)).to_string(),
            "1d 1h 1m 1s"
        );
        assert_eq!(Countdown::at(100, Some(159)).to_string(), "0d 0h 0m 59s");
    }
}
