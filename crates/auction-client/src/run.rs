#[cfg(unix)]
use tokio::signal::unix::{self, SignalKind};
use {
    crate::{
        domain::{
            bid::{BidLedger, PendingBidIntent},
            client::Client,
        },
        infra::{
            self,
            blockchain::{self, AuctionReading, AuctionWriting},
            cli,
            config,
            fhe,
            observe,
            poller::Poller,
            session::{Dashboard, Session},
        },
    },
    anyhow::{Context, Result},
    clap::Parser,
    std::{
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::io::BufReader,
};

pub async fn start(args: impl Iterator<Item = String>) -> Result<()> {
    let args = cli::Args::parse_from(args);
    observe::init(&::observe::Config::new(
        &args.log,
        args.stderr_threshold.or(Some(tracing::Level::TRACE)),
        args.use_json_logs,
    ));
    tracing::info!("running auction client with\n{args}");
    let config = config::file::load(&args.config).await?;
    run(args, config).await
}

/// Wires up the client and executes the requested command. Returns when the
/// command is done or the process is asked to shut down; either way all
/// background tasks are stopped.
pub async fn run(args: cli::Args, config: infra::Config) -> Result<()> {
    let metrics = args.metrics_address.map(::observe::metrics::serve_metrics);

    let reader: Arc<dyn AuctionReading> = Arc::new(blockchain::Ethereum::new(
        ethrpc::alloy::provider(&args.ethrpc),
        config.contracts,
    ));
    let wallet = args.private_key.map(|signer| {
        let address = signer.address();
        Arc::new(blockchain::Wallet::new(
            ethrpc::alloy::provider_with_signer(&args.ethrpc, signer),
            address,
            config.contracts,
            config.place_bid_gas_limit,
        )) as Arc<dyn AuctionWriting>
    });

    let relayer = Arc::new(fhe::Relayer::new(config.encryption));
    let encryption = relayer.clone().spawn_initialization();
    let ledger = Arc::new(Mutex::new(BidLedger::default()));
    let (poller, view, triggers) = Poller::start(
        reader.clone(),
        wallet.as_ref().map(|wallet| wallet.address()),
        ledger.clone(),
        config.intervals,
    );
    let client = Arc::new(Client::new(
        reader,
        wallet,
        relayer.clone(),
        ledger,
        view,
        triggers,
        config.client,
    ));

    let result = tokio::select! {
        result = execute(args.command, &client, &relayer, args.ready_timeout) => result,
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal");
            Ok(())
        }
    };

    drop(poller);
    encryption.abort();
    if let Some(metrics) = metrics {
        metrics.abort();
    }
    result
}

async fn execute(
    command: cli::Command,
    client: &Arc<Client>,
    relayer: &fhe::Relayer,
    ready_timeout: Duration,
) -> Result<()> {
    match command {
        cli::Command::Session => {
            Session::new(client.clone())
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
        cli::Command::Watch => watch(client).await?,
        cli::Command::Status => {
            loaded(client, ready_timeout).await?;
            println!("{}", Dashboard::capture(client));
        }
        cli::Command::Bid { price, quantity } => {
            loaded(client, ready_timeout).await?;
            tokio::time::timeout(ready_timeout, relayer.subscribe().wait_for(fhe::Status::is_ready))
                .await
                .context("timed out waiting for the encryption provider")??;
            let receipt = client
                .submit_bid(&PendingBidIntent::new(price, quantity))
                .await?;
            println!("bid placed in tx {}", receipt.hash);
        }
        cli::Command::Cancel { index } => {
            loaded(client, ready_timeout).await?;
            let receipt = client.cancel_bid(index).await?;
            println!("bid #{index} cancelled in tx {}", receipt.hash);
        }
        cli::Command::Claim => {
            loaded(client, ready_timeout).await?;
            let receipt = client.claim().await?;
            println!("claimed in tx {}", receipt.hash);
        }
        cli::Command::Finalize => {
            loaded(client, ready_timeout).await?;
            let receipt = client.finalize_prices().await?;
            println!("prices finalized in tx {}", receipt.hash);
        }
    }
    Ok(())
}

/// Waits for the first snapshot, and for the bidder's balance and bids when
/// a wallet is connected.
async fn loaded(client: &Client, timeout: Duration) -> Result<()> {
    let mut view = client.view().clone();
    let bidder = client.bidder().is_some();
    tokio::time::timeout(timeout, async {
        view.snapshot.wait_for(Option::is_some).await?;
        if bidder {
            view.balance.wait_for(Option::is_some).await?;
            view.bids.wait_for(Option::is_some).await?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("timed out waiting for the auction state")?
}

/// Prints the dashboard whenever something on it meaningfully changes.
async fn watch(client: &Client) -> Result<()> {
    let mut view = client.view().clone();
    let mut last: Option<Dashboard> = None;
    loop {
        let dashboard = Dashboard::capture(client);
        if last
            .as_ref()
            .is_none_or(|last| dashboard.differs_from(last))
        {
            println!("{dashboard}");
            last = Some(dashboard);
        }
        tokio::select! {
            result = view.snapshot.changed() => result?,
            result = view.clearing_prices.changed() => result?,
            result = view.bids.changed() => result?,
            result = view.allocation.changed() => result?,
            result = view.countdown.changed() => result?,
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Intercept main signals for graceful shutdown.
    let mut interrupt = unix::signal(SignalKind::interrupt()).unwrap();
    let mut terminate = unix::signal(SignalKind::terminate()).unwrap();
    tokio::select! {
        _ = interrupt.recv() => (),
        _ = terminate.recv() => (),
    };
}

#[cfg(windows)]
async fn shutdown_signal() {
    // We don't support signal handling on Windows.
    std::future::pending().await
}
