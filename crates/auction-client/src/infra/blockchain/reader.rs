use {
    super::{Addresses, AuctionReading, UserBids},
    crate::domain::auction::{AllocationRecord, AuctionSnapshot, ClearingPrices},
    alloy::primitives::{Address, U256},
    anyhow::{Context, Result},
    bigdecimal::BigDecimal,
    contracts::{ERC20, FHEAuction},
    ethrpc::AlloyProvider,
    number::units::from_wei,
    std::future::IntoFuture,
};

/// Reads the auction through a node connection. Stateless apart from the
/// contract bindings.
#[derive(Clone)]
pub struct Ethereum {
    auction: FHEAuction::Instance,
    token: ERC20::Instance,
}

impl Ethereum {
    pub fn new(provider: AlloyProvider, addresses: Addresses) -> Self {
        Self {
            auction: FHEAuction::Instance::new(addresses.settlement, provider.clone()),
            token: ERC20::Instance::new(addresses.token, provider),
        }
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow::anyhow!("{field} {value} out of range"))
}

#[async_trait::async_trait]
impl AuctionReading for Ethereum {
    async fn snapshot(&self) -> Result<AuctionSnapshot> {
        let auction_end = self.auction.auctionEnd();
        let claim_start = self.auction.claimStart();
        let price_finalized = self.auction.priceFinalized();
        let indicative = self.auction.indicativeClearingPrice();
        let final_price = self.auction.clearingPrice();
        let token_supply = self.auction.tokenSupply();
        let floor_price = self.auction.floorPrice();

        let (
            auction_end,
            claim_start,
            price_finalized,
            indicative,
            final_price,
            token_supply,
            floor_price,
        ) = futures::try_join!(
            auction_end.call().into_future(),
            claim_start.call().into_future(),
            price_finalized.call().into_future(),
            indicative.call().into_future(),
            final_price.call().into_future(),
            token_supply.call().into_future(),
            floor_price.call().into_future(),
        )
        .context("failed to read auction state")?;

        Ok(AuctionSnapshot {
            auction_end: to_u64(auction_end, "auction end")?,
            claim_start: to_u64(claim_start, "claim start")?,
            price_finalized,
            clearing_price_indicative: from_wei(&indicative),
            clearing_price_final: from_wei(&final_price),
            token_supply: from_wei(&token_supply),
            floor_price: from_wei(&floor_price),
        })
    }

    async fn clearing_prices(&self) -> Result<ClearingPrices> {
        let finalized = self.auction.priceFinalized();
        let final_price = self.auction.clearingPrice();
        let indicative = self.auction.indicativeClearingPrice();
        let floor = self.auction.floorPrice();

        let (finalized, final_price, indicative, floor) = futures::try_join!(
            finalized.call().into_future(),
            final_price.call().into_future(),
            indicative.call().into_future(),
            floor.call().into_future(),
        )
        .context("failed to read clearing price")?;

        Ok(ClearingPrices {
            finalized,
            final_price: from_wei(&final_price),
            indicative: from_wei(&indicative),
            floor: from_wei(&floor),
        })
    }

    async fn user_bids(&self, bidder: Address) -> Result<UserBids> {
        let bids = self
            .auction
            .getUserBids(bidder)
            .call()
            .await
            .context("failed to read user bids")?;
        Ok(UserBids {
            prices: bids.prices.iter().map(from_wei).collect(),
            count: to_u64(bids.bidCount, "bid count")?,
        })
    }

    async fn allocation(&self, bidder: Address) -> Result<AllocationRecord> {
        let allocation = self
            .auction
            .getUserAllocation(bidder)
            .call()
            .await
            .context("failed to read user allocation")?;
        Ok(AllocationRecord {
            allocated_tokens: from_wei(&allocation.allocation),
            refund_due: from_wei(&allocation.refund),
            claimed: allocation.hasClaimed,
        })
    }

    async fn balance(&self, owner: Address) -> Result<BigDecimal> {
        let balance = self
            .token
            .balanceOf(owner)
            .call()
            .await
            .context("failed to read token balance")?;
        Ok(from_wei(&balance))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        self.token
            .allowance(owner, spender)
            .call()
            .await
            .context("failed to read token allowance")
    }
}
