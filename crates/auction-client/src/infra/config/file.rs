use {
    crate::{
        domain,
        infra::{blockchain, fhe, poller},
    },
    alloy::primitives::Address,
    anyhow::{Context, Result},
    bigdecimal::BigDecimal,
    contracts::networks,
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
    std::{collections::HashMap, path::Path, str::FromStr, time::Duration},
    tokio::fs,
    url::Url,
};

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct Config {
    /// Tokens approved to the settlement contract whenever the allowance does
    /// not cover a bid.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_approval_ceiling")]
    approval_ceiling: BigDecimal,

    #[serde(default = "default_place_bid_gas_limit")]
    place_bid_gas_limit: u64,

    contracts: Contracts,

    encryption: Encryption,

    #[serde(default)]
    polling: Polling,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct Contracts {
    settlement: Address,
    token: Address,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct Encryption {
    relayer_url: Url,

    #[serde(default = "default_rpc_url")]
    rpc_url: Url,

    #[serde(default = "default_chain_id")]
    chain_id: u64,

    /// Chains whose node serves encryption requests itself, keyed by chain
    /// id.
    #[serde_as(as = "HashMap<DisplayFromStr, _>")]
    #[serde(default = "default_mock_chains")]
    mock_chains: HashMap<u64, Url>,

    #[serde(with = "humantime_serde", default = "default_retry_interval")]
    retry_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct Polling {
    #[serde(with = "humantime_serde")]
    snapshot: Duration,
    #[serde(with = "humantime_serde")]
    balance: Duration,
    #[serde(with = "humantime_serde")]
    bids: Duration,
    #[serde(with = "humantime_serde")]
    allocation: Duration,
    #[serde(with = "humantime_serde")]
    clearing_price: Duration,
    #[serde(with = "humantime_serde")]
    countdown: Duration,
}

impl Default for Polling {
    fn default() -> Self {
        let poller::Intervals {
            snapshot,
            balance,
            bids,
            allocation,
            clearing_price,
            countdown,
        } = poller::Intervals::default();
        Self {
            snapshot,
            balance,
            bids,
            allocation,
            clearing_price,
            countdown,
        }
    }
}

fn default_approval_ceiling() -> BigDecimal {
    BigDecimal::from(1_000_000)
}

fn default_place_bid_gas_limit() -> u64 {
    3_000_000
}

fn default_rpc_url() -> Url {
    "https://ethereum-sepolia-rpc.publicnode.com".parse().unwrap()
}

fn default_chain_id() -> u64 {
    networks::SEPOLIA
}

fn default_mock_chains() -> HashMap<u64, Url> {
    HashMap::from([(networks::LOCAL, "http://localhost:8545".parse().unwrap())])
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(10)
}

/// Load the client configuration from a TOML file.
pub async fn load(path: &Path) -> Result<super::Config> {
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("I/O error while reading {path:?}"))?;
    parse(&data).with_context(|| format!("invalid configuration in {path:?}"))
}

fn parse(data: &str) -> Result<super::Config> {
    let config: Config = toml::de::from_str(data)?;

    let approval_ceiling = number::units::to_wei(&config.approval_ceiling)
        .filter(|ceiling| !ceiling.is_zero())
        .with_context(|| {
            format!(
                "approval-ceiling {} is not a positive token amount",
                config.approval_ceiling
            )
        })?;

    Ok(super::Config {
        contracts: blockchain::Addresses {
            settlement: config.contracts.settlement,
            token: config.contracts.token,
        },
        encryption: fhe::Config {
            relayer_url: config.encryption.relayer_url,
            rpc_url: config.encryption.rpc_url,
            chain_id: config.encryption.chain_id,
            mock_chains: config.encryption.mock_chains,
            retry_interval: config.encryption.retry_interval,
        },
        intervals: poller::Intervals {
            snapshot: config.polling.snapshot,
            balance: config.polling.balance,
            bids: config.polling.bids,
            allocation: config.polling.allocation,
            clearing_price: config.polling.clearing_price,
            countdown: config.polling.countdown,
        },
        client: domain::client::Config {
            settlement: config.contracts.settlement,
            approval_ceiling,
        },
        place_bid_gas_limit: config.place_bid_gas_limit,
    })
}

impl FromStr for super::Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy::primitives::{U256, address},
        maplit::hashmap,
        std::io::Write,
    };

    const MINIMAL: &str = r#"
        [contracts]
        settlement = "0x5e77e7e1e5e77e7e1e5e77e7e1e5e77e7e1e5e77"
        token = "0x70ce070ce070ce070ce070ce070ce070ce070ce0"

        [encryption]
        relayer-url = "https://relayer.example.com"
    "#;

    #[tokio::test]
    async fn loads_minimal_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load(file.path()).await.unwrap();

        assert_eq!(
            config.contracts.settlement,
            address!("0x5e77e7e1e5e77e7e1e5e77e7e1e5e77e7e1e5e77")
        );
        assert_eq!(config.client.settlement, config.contracts.settlement);
        assert_eq!(config.encryption.chain_id, 11155111);
        assert_eq!(
            config.encryption.rpc_url.as_str(),
            "https://ethereum-sepolia-rpc.publicnode.com/"
        );
        assert_eq!(
            config.encryption.mock_chains,
            hashmap! { 31337 => "http://localhost:8545".parse().unwrap() }
        );
        assert_eq!(config.intervals, poller::Intervals::default());
        assert_eq!(
            config.client.approval_ceiling,
            U256::from(1_000_000u64) * U256::from(10u64).pow(U256::from(18))
        );
        assert_eq!(config.place_bid_gas_limit, 3_000_000);
    }

    #[test]
    fn overrides() {
        let config: super::super::Config = format!(
            r#"
            approval-ceiling = "2500.5"
            place-bid-gas-limit = 5000000
            {MINIMAL}
            [encryption.mock-chains]
            1337 = "http://127.0.0.1:8545"

            [polling]
            clearing-price = "500ms"
            countdown = "2s"
            "#
        )
        .parse()
        .unwrap();

        assert_eq!(
            config.client.approval_ceiling,
            U256::from(2_500_500_000_000_000_000_000u128)
        );
        assert_eq!(config.place_bid_gas_limit, 5_000_000);
        assert_eq!(
            config.encryption.mock_chains,
            hashmap! { 1337 => "http://127.0.0.1:8545".parse().unwrap() }
        );
        assert_eq!(config.intervals.clearing_price, Duration::from_millis(500));
        assert_eq!(config.intervals.countdown, Duration::from_secs(2));
        assert_eq!(config.intervals.snapshot, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_files() {
        // Unknown keys.
        assert!(format!("{MINIMAL}\nslippage = 1").parse::<super::super::Config>().is_err());
        // Missing contracts.
        assert!(
            "[encryption]\nrelayer-url = \"https://relayer.example.com\""
                .parse::<super::super::Config>()
                .is_err()
        );
        // Non-positive ceiling.
        assert!(
            format!("approval-ceiling = \"0\"\n{MINIMAL}")
                .parse::<super::super::Config>()
                .is_err()
        );
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.toml")).await.unwrap_err();
        assert!(format!("{err:#}").contains("I/O error"));
    }
}
