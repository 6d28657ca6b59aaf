//! Client side of the FHE encryption provider. Plaintext bid quantities are
//! turned into ciphertext handles plus a proof of correct encryption that is
//! bound to one contract and one account.

use {
    crate::{infra::observe, util::http},
    alloy::{
        primitives::{Address, Bytes},
        providers::Provider,
    },
    std::{collections::HashMap, fmt, sync::Arc, time::Duration},
    thiserror::Error,
    tokio::{sync::watch, task::JoinHandle},
    url::Url,
};

mod dto;

const RESPONSE_SIZE_LIMIT: usize = 10_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Encryption service for public networks.
    pub relayer_url: Url,
    /// Node used to verify the network before the provider reports ready.
    pub rpc_url: Url,
    pub chain_id: u64,
    /// Local development chains whose node serves encryption requests itself.
    pub mock_chains: HashMap<u64, Url>,
    /// Delay before a failed initialization is attempted again.
    pub retry_interval: Duration,
}

impl Config {
    /// A mock chain entry for the configured chain wins over the relayer.
    fn endpoint(&self) -> &Url {
        self.mock_chains
            .get(&self.chain_id)
            .unwrap_or(&self.relayer_url)
    }

    fn rpc(&self) -> &Url {
        self.mock_chains.get(&self.chain_id).unwrap_or(&self.rpc_url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

impl Status {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Ciphertext handles and the proof covering them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<Bytes>,
    pub input_proof: Bytes,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider is not ready ({0})")]
    NotReady(Status),
    #[error("node reports chain {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("node error: {0}")]
    Node(String),
    #[error("{0} cannot be used as a base url")]
    InvalidUrl(Url),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex in response: {0}")]
    Hex(#[from] const_hex::FromHexError),
    #[error("incomplete result: {0}")]
    Incomplete(&'static str),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Encrypting: Send + Sync {
    fn status(&self) -> Status;

    /// Encrypts a single 32 bit value for use by `account` in calls to
    /// `contract`.
    async fn encrypt_u32(
        &self,
        contract: Address,
        account: Address,
        value: u32,
    ) -> Result<EncryptedInput, Error>;
}

/// HTTP client of the encryption relayer.
pub struct Relayer {
    client: reqwest::Client,
    config: Config,
    status: watch::Sender<Status>,
}

impl Relayer {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            status: watch::Sender::new(Status::Idle),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Initializes the provider in the background, retrying until it
    /// succeeds.
    pub fn spawn_initialization(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.status.send_replace(Status::Loading);
                observe::encryption_initializing(self.config.endpoint(), self.config.chain_id);
                match self.initialize().await {
                    Ok(()) => {
                        observe::encryption_ready();
                        self.status.send_replace(Status::Ready);
                        return;
                    }
                    Err(err) => {
                        observe::encryption_failed(&err, self.config.retry_interval);
                        self.status.send_replace(Status::Failed(err.to_string()));
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        })
    }

    async fn initialize(&self) -> Result<(), Error> {
        let provider = ethrpc::alloy::provider(self.config.rpc());
        let actual = provider
            .get_chain_id()
            .await
            .map_err(|err| Error::Node(err.to_string()))?;
        if actual != self.config.chain_id {
            return Err(Error::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }

        let url = self.url(&["v1", "keyurl"])?;
        let body = http::send(RESPONSE_SIZE_LIMIT, self.client.get(url)).await?;
        let keys: serde_json::Value = serde_json::from_str(&body)?;
        tracing::debug!(?keys, "fetched encryption key info");
        Ok(())
    }

    /// Starts an encrypted input for `account` calling `contract`.
    pub fn create_encrypted_input(
        &self,
        contract: Address,
        account: Address,
    ) -> Result<InputBuilder<'_>, Error> {
        let status = self.status.borrow().clone();
        if !status.is_ready() {
            return Err(Error::NotReady(status));
        }
        Ok(InputBuilder {
            relayer: self,
            contract,
            account,
            bits: Vec::new(),
            values: Vec::new(),
        })
    }

    fn url(&self, path: &[&str]) -> Result<Url, Error> {
        let mut url = self.config.endpoint().clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.config.endpoint().clone()))?
            .pop_if_empty()
            .extend(path);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Encrypting for Relayer {
    fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    async fn encrypt_u32(
        &self,
        contract: Address,
        account: Address,
        value: u32,
    ) -> Result<EncryptedInput, Error> {
        let mut input = self.create_encrypted_input(contract, account)?;
        input.add32(value);
        input.encrypt().await
    }
}

/// Collects plaintext values to be encrypted together.
pub struct InputBuilder<'a> {
    relayer: &'a Relayer,
    contract: Address,
    account: Address,
    bits: Vec<u8>,
    values: Vec<String>,
}

impl InputBuilder<'_> {
    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.bits.push(32);
        self.values.push(value.to_string());
        self
    }

    pub async fn encrypt(self) -> Result<EncryptedInput, Error> {
        let request = dto::InputProofRequest {
            contract_address: self.contract,
            user_address: self.account,
            contract_chain_id: self.relayer.config.chain_id,
            bits: self.bits,
            values: self.values,
        };
        let url = self.relayer.url(&["v1", "input-proof"])?;
        let body = http::send(
            RESPONSE_SIZE_LIMIT,
            self.relayer.client.post(url).json(&request),
        )
        .await?;
        let response: dto::InputProofResponse = serde_json::from_str(&body)?;
        Ok(response.decode()?)
    }
}
