//! Bids and the local cache of their quantities.
//!
//! Only the price of a bid is publicly readable from the settlement contract.
//! The quantity is encrypted, so the client that submitted a bid remembers it
//! locally, keyed by the bid's index, and merges it back into the price list
//! it reads from the chain.

use {
    crate::domain::error::InputError,
    alloy::primitives::U256,
    bigdecimal::{BigDecimal, Signed},
    std::{collections::HashMap, fmt, str::FromStr},
};

/// What the user typed for the bid being prepared. Destroyed on a successful
/// submission or when the user clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBidIntent {
    pub price: Option<String>,
    pub quantity: Option<String>,
}

impl PendingBidIntent {
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            price: Some(price.into()),
            quantity: Some(quantity.into()),
        }
    }

    pub fn validate(&self) -> Result<BidRequest, InputError> {
        let price = self
            .price
            .as_deref()
            .map(str::trim)
            .filter(|price| !price.is_empty())
            .ok_or(InputError::MissingPrice)?;
        let quantity = self
            .quantity
            .as_deref()
            .map(str::trim)
            .filter(|quantity| !quantity.is_empty())
            .ok_or(InputError::MissingQuantity)?;

        let price = BigDecimal::from_str(price)
            .ok()
            .filter(|price| price.is_positive() && fits_base_units(&price.normalized()))
            .ok_or_else(|| InputError::InvalidPrice(price.to_owned()))?;
        // The encryption provider takes a 32 bit unsigned integer.
        let quantity = quantity
            .parse::<u32>()
            .ok()
            .filter(|quantity| *quantity > 0)
            .ok_or_else(|| InputError::InvalidQuantity(quantity.to_owned()))?;

        BidRequest::new(price, quantity)
    }
}

/// Prices beyond this many integer digits can't be expressed in base units.
const MAX_INTEGER_DIGITS: i64 = 59;

/// Whether `price` is a whole number of base units that could fit a `U256`.
/// Only looks at the digit count and exponent, so absurd exponents are
/// rejected without ever being expanded.
fn fits_base_units(price: &BigDecimal) -> bool {
    let (_, scale) = price.as_bigint_and_exponent();
    let digits = i64::try_from(price.digits()).unwrap_or(i64::MAX);
    scale <= number::units::DECIMALS && digits.saturating_sub(scale) <= MAX_INTEGER_DIGITS
}

/// A validated bid, with the amounts the settlement contract expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRequest {
    pub price: BigDecimal,
    pub quantity: u32,
    /// `price * quantity` in token base units.
    pub total_cost: U256,
    /// `quantity` in token base units, used by the contract for accounting.
    pub quantity_wei: U256,
}

impl BidRequest {
    pub fn new(price: BigDecimal, quantity: u32) -> Result<Self, InputError> {
        let total_cost = number::units::to_wei(&(&price * BigDecimal::from(quantity)))
            .filter(|total_cost| !total_cost.is_zero())
            .ok_or(InputError::OutOfRange)?;
        let quantity_wei =
            number::units::to_wei(&BigDecimal::from(quantity)).ok_or(InputError::OutOfRange)?;
        Ok(Self {
            price,
            quantity,
            total_cost,
            quantity_wei,
        })
    }

    pub fn total_cost(&self) -> BigDecimal {
        &self.price * BigDecimal::from(self.quantity)
    }
}

/// The quantity of a bid as far as this client knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quantity {
    Known(BigDecimal),
    /// The bid was placed by another session or before a restart, so the
    /// quantity only exists as ciphertext.
    Unknown,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(quantity) => write!(f, "{quantity}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRecord {
    /// Position in the caller's on-chain bid list.
    pub index: u64,
    /// Authoritative, read from the chain.
    pub price: BigDecimal,
    /// Best effort, from the local cache.
    pub quantity: Quantity,
}

/// Merges the on-chain bid prices with the locally remembered quantities.
///
/// The position in `prices` is the bid index. The result has exactly one
/// record per on-chain price, in order.
pub fn reconcile(prices: &[BigDecimal], quantities: &HashMap<u64, BigDecimal>) -> Vec<BidRecord> {
    (0u64..)
        .zip(prices)
        .map(|(index, price)| BidRecord {
            index,
            price: price.clone(),
            quantity: quantities
                .get(&index)
                .cloned()
                .map_or(Quantity::Unknown, Quantity::Known),
        })
        .collect()
}

/// Quantities of the bids submitted in this session, keyed by bid index.
#[derive(Debug, Default)]
pub struct BidLedger {
    quantities: HashMap<u64, BigDecimal>,
}

impl BidLedger {
    pub fn record(&mut self, index: u64, quantity: BigDecimal) {
        self.quantities.insert(index, quantity);
    }

    /// Forgets every cached quantity. Used after a cancellation because the
    /// contract may reuse or shift indices, and a stale quantity must not be
    /// attributed to a different bid.
    pub fn invalidate(&mut self) {
        self.quantities.clear();
    }

    pub fn reconcile(&self, prices: &[BigDecimal]) -> Vec<BidRecord> {
        reconcile(prices, &self.quantities)
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }
}
