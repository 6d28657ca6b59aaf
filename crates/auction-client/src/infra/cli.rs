//! CLI arguments for the `auction-client` binary.

use {
    alloy::signers::local::PrivateKeySigner,
    clap::{Parser, Subcommand},
    std::{
        fmt::{self, Display, Formatter},
        net::SocketAddr,
        path::PathBuf,
        time::Duration,
    },
    url::Url,
};

/// Bid in a sealed-bid Dutch token auction.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// The log filter.
    #[clap(long, env, default_value = "warn,auction_client=info,observe=info")]
    pub log: String,

    /// At which log level logs should be printed to stderr instead of stdout.
    /// By default all logs go to stderr, leaving stdout to command output.
    #[clap(long, env)]
    pub stderr_threshold: Option<tracing::Level>,

    /// Whether to use JSON format for the logs.
    #[clap(long, env, default_value = "false")]
    pub use_json_logs: bool,

    /// The node RPC API endpoint.
    #[clap(long, env)]
    pub ethrpc: Url,

    /// Key of the bidder account. Without it the auction can be watched but
    /// not acted on.
    #[clap(long, env, hide_env_values = true)]
    pub private_key: Option<PrivateKeySigner>,

    /// Path to the client configuration file. This file should be in TOML
    /// format.
    #[clap(long, env)]
    pub config: PathBuf,

    /// Serve Prometheus metrics on this address.
    #[clap(long, env)]
    pub metrics_address: Option<SocketAddr>,

    /// How long one-shot commands wait for the first auction snapshot and
    /// for the encryption provider.
    #[clap(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub ready_timeout: Duration,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive session: live dashboard plus bid entry.
    Session,
    /// Print the auction state whenever it changes.
    Watch,
    /// Print the auction state once.
    Status,
    /// Place a bid.
    Bid {
        /// Price per token.
        price: String,
        /// Number of whole tokens.
        quantity: String,
    },
    /// Cancel one of your bids.
    Cancel {
        /// Index of the bid, as shown by `status`.
        index: u64,
    },
    /// Claim the allocated tokens and the refund.
    Claim,
    /// Finalize the clearing price. Administrative.
    Finalize,
}

impl Display for Args {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log,
            stderr_threshold,
            use_json_logs,
            ethrpc,
            private_key,
            config,
            metrics_address,
            ready_timeout,
            command,
        } = self;

        writeln!(f, "log: {log}")?;
        writeln!(f, "stderr_threshold: {stderr_threshold:?}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        writeln!(f, "ethrpc: {ethrpc}")?;
        writeln!(
            f,
            "private_key: {}",
            match private_key {
                Some(signer) => format!("SECRET (account {})", signer.address()),
                None => "None".to_string(),
            }
        )?;
        writeln!(f, "config: {}", config.display())?;
        writeln!(f, "metrics_address: {metrics_address:?}")?;
        writeln!(f, "ready_timeout: {ready_timeout:?}")?;
        writeln!(f, "command: {command:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(
            ["auction-client", "--ethrpc", "http://localhost:8545", "--config", "client.toml"]
                .into_iter()
                .chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn parses_commands() {
        let args = parse(&["bid", "60", "100"]);
        assert_eq!(
            args.command,
            Command::Bid {
                price: "60".to_string(),
                quantity: "100".to_string(),
            }
        );
        assert_eq!(args.ready_timeout, Duration::from_secs(30));
        assert!(args.private_key.is_none());

        let args = parse(&["--ready-timeout", "2m", "cancel", "3"]);
        assert_eq!(args.command, Command::Cancel { index: 3 });
        assert_eq!(args.ready_timeout, Duration::from_secs(120));
    }

    #[test]
    fn display_redacts_private_key() {
        let args = parse(&["--private-key", KEY, "status"]);
        let address = args.private_key.as_ref().unwrap().address();

        let displayed = args.to_string();
        assert!(!displayed.contains(KEY.trim_start_matches("0x")));
        assert!(displayed.contains("SECRET"));
        assert!(displayed.contains(&address.to_string()));
    }
}
