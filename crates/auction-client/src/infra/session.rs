//! Terminal front end: a dashboard of the polled state and line based
//! commands for bidding.
//!
//! Actions run as their own tasks so that polling and further commands are
//! not blocked while a transaction is pending. Their results come back as
//! notifications.

use {
    crate::{
        domain::{
            auction::{AllocationRecord, ClearingPrices, Countdown, Phase, to_cents},
            bid::{BidRecord, PendingBidIntent},
            client::{Action, Client},
            error::BidError,
        },
        infra::{blockchain::TxReceipt, fhe},
    },
    alloy::primitives::Address,
    bigdecimal::BigDecimal,
    std::{
        fmt::{self, Display, Formatter, Write as _},
        str::FromStr,
        sync::Arc,
    },
    thiserror::Error,
    tokio::{
        io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
        sync::mpsc,
    },
};

const HELP: &str = "\
commands:
  status             show the auction dashboard
  bids               list your bids
  price <p>          set the price per token of the next bid
  quantity <q>       set the number of tokens of the next bid
  preview            show the cost of the next bid
  clear              forget the next bid
  submit             place the next bid
  bid <p> <q>        set and place the next bid
  cancel <i>         cancel your bid with index i
  claim              claim allocated tokens and refund
  finalize           finalize the clearing price (admin)
  help               show this message
  quit               leave the session";

/// Everything shown to the user at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub phase: Option<Phase>,
    pub countdown: Countdown,
    pub token_supply: Option<BigDecimal>,
    pub clearing_prices: Option<ClearingPrices>,
    pub bidder: Option<Address>,
    pub balance: Option<BigDecimal>,
    pub bids: Option<Vec<BidRecord>>,
    pub allocation: Option<AllocationRecord>,
    pub encryption: fhe::Status,
    pub busy: bool,
}

impl Dashboard {
    pub fn capture(client: &Client) -> Self {
        let view = client.view();
        Self {
            phase: view.phase(),
            countdown: view.countdown(),
            token_supply: view.snapshot().map(|snapshot| snapshot.token_supply),
            clearing_prices: view.clearing_prices(),
            bidder: client.bidder(),
            balance: view.balance(),
            bids: view.bids(),
            allocation: view.allocation(),
            encryption: client.encryption_status(),
            busy: client.is_busy(),
        }
    }

    /// Whether anything worth reprinting the dashboard for changed. The
    /// running countdown only counts once it reaches the end.
    pub fn differs_from(&self, other: &Self) -> bool {
        self.phase != other.phase
            || self.clearing_prices != other.clearing_prices
            || self.bids != other.bids
            || self.allocation != other.allocation
            || self.countdown.has_ended() != other.countdown.has_ended()
    }

    fn bids(&self) -> String {
        match &self.bids {
            None if self.bidder.is_none() => "  (no wallet connected)".to_string(),
            None => "  --".to_string(),
            Some(bids) if bids.is_empty() => "  (none)".to_string(),
            Some(bids) => bids
                .iter()
                .map(|bid| {
                    format!(
                        "  #{:<3} price {:>12}  quantity {}",
                        bid.index,
                        to_cents(&bid.price),
                        bid.quantity
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Display for Dashboard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let unknown = || "--".to_string();

        writeln!(
            f,
            "phase:          {}",
            self.phase.map_or_else(unknown, |phase| phase.to_string())
        )?;
        writeln!(f, "time left:      {}", self.countdown)?;
        writeln!(
            f,
            "for sale:       {}",
            self.token_supply
                .as_ref()
                .map_or_else(unknown, |supply| format!("{} tokens", to_cents(supply)))
        )?;
        match &self.clearing_prices {
            Some(prices) => {
                writeln!(f, "clearing price: {prices}")?;
                writeln!(f, "floor price:    {}", to_cents(&prices.floor))?;
            }
            None => writeln!(f, "clearing price: --")?,
        }
        writeln!(
            f,
            "account:        {}",
            self.bidder.map_or_else(unknown, |bidder| bidder.to_string())
        )?;
        writeln!(
            f,
            "balance:        {}",
            self.balance
                .as_ref()
                .map_or_else(unknown, |balance| to_cents(balance).to_string())
        )?;
        writeln!(f, "encryption:     {}", self.encryption)?;
        writeln!(f, "bids:\n{}", self.bids())?;
        if let Some(allocation) = &self.allocation {
            writeln!(
                f,
                "allocation:     {} tokens, refund {}{}",
                allocation.allocated_tokens,
                to_cents(&allocation.refund_due),
                if allocation.claimed { " (claimed)" } else { "" }
            )?;
        }
        if self.busy {
            writeln!(f, "processing...")?;
        }
        Ok(())
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Status,
    Bids,
    Price(String),
    Quantity(String),
    Preview,
    Clear,
    Submit,
    Bid { price: String, quantity: String },
    Cancel(u64),
    Claim,
    Finalize,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command {0:?}, type `help` for a list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Input {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let args = words.collect::<Vec<_>>();
        let input = match (command, args.as_slice()) {
            ("status", []) => Self::Status,
            ("bids", []) => Self::Bids,
            ("price", [price]) => Self::Price(price.to_string()),
            ("price", _) => return Err(ParseError::Usage("price <p>")),
            ("quantity", [quantity]) => Self::Quantity(quantity.to_string()),
            ("quantity", _) => return Err(ParseError::Usage("quantity <q>")),
            ("preview", []) => Self::Preview,
            ("clear", []) => Self::Clear,
            ("submit", []) => Self::Submit,
            ("bid", [price, quantity]) => Self::Bid {
                price: price.to_string(),
                quantity: quantity.to_string(),
            },
            ("bid", _) => return Err(ParseError::Usage("bid <p> <q>")),
            ("cancel", [index]) => Self::Cancel(
                index
                    .parse()
                    .map_err(|_| ParseError::Usage("cancel <i>"))?,
            ),
            ("cancel", _) => return Err(ParseError::Usage("cancel <i>")),
            ("claim", []) => Self::Claim,
            ("finalize", []) => Self::Finalize,
            ("help", _) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(ParseError::Unknown(line.trim().to_string())),
        };
        Ok(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Result of an action task.
#[derive(Debug)]
struct Outcome {
    action: Action,
    /// The intent a bid submission was started with.
    submitted: Option<PendingBidIntent>,
    result: Result<TxReceipt, BidError>,
}

pub struct Session {
    client: Arc<Client>,
    intent: PendingBidIntent,
    sender: mpsc::UnboundedSender<Outcome>,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
}

impl Session {
    pub fn new(client: Arc<Client>) -> Self {
        let (sender, outcomes) = mpsc::unbounded_channel();
        Self {
            client,
            intent: PendingBidIntent::default(),
            sender,
            outcomes,
        }
    }

    /// Reads commands from `input` until it ends or the user quits. Replies,
    /// action results and phase changes are written to `output`.
    pub async fn run(
        mut self,
        input: impl AsyncBufRead + Unpin,
        mut output: impl AsyncWrite + Unpin,
    ) -> io::Result<()> {
        let mut lines = input.lines();
        let mut snapshot = self.client.view().snapshot.clone();
        let mut phase = self.client.view().phase();

        let dashboard = Dashboard::capture(&self.client);
        write_block(&mut output, &format!("{dashboard}\n{HELP}")).await?;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (reply, flow) = self.handle(&line);
                    write_block(&mut output, &reply).await?;
                    if flow == Flow::Quit {
                        break;
                    }
                }
                Some(outcome) = self.outcomes.recv() => {
                    let notification = self.complete(outcome);
                    write_block(&mut output, &notification).await?;
                }
                Ok(()) = snapshot.changed() => {
                    let current = self.client.view().phase();
                    if current != phase {
                        phase = current;
                        if let Some(phase) = phase {
                            write_block(&mut output, &format!("auction is now in the {phase} phase")).await?;
                        }
                    }
                }
            }
        }
        output.flush().await
    }

    /// Executes one command line and returns the reply.
    fn handle(&mut self, line: &str) -> (String, Flow) {
        let input = match line.parse::<Input>() {
            Ok(input) => input,
            Err(err) => return (err.to_string(), Flow::Continue),
        };
        let reply = match input {
            Input::Status => Dashboard::capture(&self.client).to_string(),
            Input::Bids => Dashboard::capture(&self.client).bids(),
            Input::Price(price) => {
                self.intent.price = Some(price);
                self.preview()
            }
            Input::Quantity(quantity) => {
                self.intent.quantity = Some(quantity);
                self.preview()
            }
            Input::Preview => self.preview(),
            Input::Clear => {
                self.intent = PendingBidIntent::default();
                "bid cleared".to_string()
            }
            Input::Submit => self.submit(),
            Input::Bid { price, quantity } => {
                self.intent = PendingBidIntent::new(price, quantity);
                self.submit()
            }
            Input::Cancel(index) => {
                self.spawn(Action::CancelBid, None, move |client| async move {
                    client.cancel_bid(index).await
                });
                format!("cancelling bid #{index}...")
            }
            Input::Claim => {
                self.spawn(Action::Claim, None, |client| async move {
                    client.claim().await
                });
                "claiming...".to_string()
            }
            Input::Finalize => {
                self.spawn(Action::FinalizePrices, None, |client| async move {
                    client.finalize_prices().await
                });
                "finalizing prices...".to_string()
            }
            Input::Help => HELP.to_string(),
            Input::Quit => return ("bye".to_string(), Flow::Quit),
        };
        (reply, Flow::Continue)
    }

    fn preview(&self) -> String {
        let mut reply = format!(
            "next bid: price {}, quantity {}",
            self.intent.price.as_deref().unwrap_or("--"),
            self.intent.quantity.as_deref().unwrap_or("--"),
        );
        match self.client.preview(&self.intent) {
            Ok(preview) => {
                let _ = write!(reply, "\ntotal cost: {}", to_cents(&preview.total_cost));
                if preview.insufficient_balance {
                    reply.push_str("\nwarning: your token balance does not cover this bid");
                }
            }
            Err(err) if self.intent.price.is_some() && self.intent.quantity.is_some() => {
                let _ = write!(reply, "\n{err}");
            }
            Err(_) => (),
        }
        reply
    }

    fn submit(&self) -> String {
        let intent = self.intent.clone();
        self.spawn(
            Action::SubmitBid,
            Some(intent.clone()),
            |client| async move { client.submit_bid(&intent).await },
        );
        "submitting bid...".to_string()
    }

    fn spawn<F>(
        &self,
        action: Action,
        submitted: Option<PendingBidIntent>,
        run: impl FnOnce(Arc<Client>) -> F,
    ) where
        F: Future<Output = Result<TxReceipt, BidError>> + Send + 'static,
    {
        let sender = self.sender.clone();
        let task = run(self.client.clone());
        tokio::spawn(async move {
            let result = task.await;
            // The receiver is gone once the session ended.
            let _ = sender.send(Outcome {
                action,
                submitted,
                result,
            });
        });
    }

    /// Turns the result of an action into a notification. A confirmed bid
    /// clears the intent it was submitted with, unless the user already
    /// started editing a new one.
    fn complete(&mut self, outcome: Outcome) -> String {
        let Outcome {
            action,
            submitted,
            result,
        } = outcome;
        match result {
            Ok(receipt) => {
                if submitted.is_some_and(|submitted| submitted == self.intent) {
                    self.intent = PendingBidIntent::default();
                }
                format!(
                    "{action} confirmed in block {} (tx {})",
                    receipt
                        .block_number
                        .map_or_else(|| "?".to_string(), |block| block.to_string()),
                    receipt.hash
                )
            }
            Err(BidError::UserDeclined) => format!("{action} declined in wallet"),
            Err(err) => format!("{action} failed: {err}"),
        }
    }
}

async fn write_block(output: &mut (impl AsyncWrite + Unpin), text: &str) -> io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::{
                bid::Quantity,
                client::testing::{self, dec},
            },
            infra::{
                blockchain::{MockAuctionReading, UserBids},
                fhe::MockEncrypting,
            },
        },
        alloy::primitives::U256,
        std::sync::Arc,
    };

    #[test]
    fn parses_commands() {
        assert_eq!("status".parse(), Ok(Input::Status));
        assert_eq!("  price   60.5 ".parse(), Ok(Input::Price("60.5".into())));
        assert_eq!(
            "bid 60 100".parse(),
            Ok(Input::Bid {
                price: "60".into(),
                quantity: "100".into()
            })
        );
        assert_eq!("cancel 2".parse(), Ok(Input::Cancel(2)));
        assert_eq!(
            "cancel two".parse::<Input>(),
            Err(ParseError::Usage("cancel <i>"))
        );
        assert_eq!("bid 60".parse::<Input>(), Err(ParseError::Usage("bid <p> <q>")));
        assert_eq!(
            "sell 1".parse::<Input>(),
            Err(ParseError::Unknown("sell 1".into()))
        );
    }

    #[test]
    fn dashboard_reprints_on_meaningful_changes_only() {
        let dashboard = Dashboard {
            phase: Some(Phase::Bidding),
            countdown: Countdown::at(0, Some(100)),
            token_supply: Some(dec("1000000")),
            clearing_prices: None,
            bidder: None,
            balance: None,
            bids: None,
            allocation: None,
            encryption: fhe::Status::Ready,
            busy: false,
        };

        let ticked = Dashboard {
            countdown: Countdown::at(1, Some(100)),
            balance: Some(dec("10")),
            ..dashboard.clone()
        };
        assert!(!ticked.differs_from(&dashboard));
        assert!(dashboard.to_string().contains("for sale:       1000000.00 tokens"));

        let ended = Dashboard {
            countdown: Countdown::Ended,
            ..dashboard.clone()
        };
        assert!(ended.differs_from(&dashboard));

        let with_bids = Dashboard {
            bids: Some(vec![BidRecord {
                index: 0,
                price: dec("60"),
                quantity: Quantity::Unknown,
            }]),
            ..dashboard.clone()
        };
        assert!(with_bids.differs_from(&dashboard));
        assert!(with_bids.to_string().contains("quantity unknown"));
    }

    #[tokio::test]
    async fn preview_and_clear() {
        let setup = testing::client(MockAuctionReading::new(), None, MockEncrypting::new());
        setup.publishers.balance.send_replace(Some(dec("100")));
        let mut session = Session::new(Arc::new(setup.client));

        let (reply, _) = session.handle("price 60");
        assert!(!reply.contains("total cost"));
        let (reply, _) = session.handle("quantity 100");
        assert!(reply.contains("total cost: 6000.00"));
        assert!(reply.contains("warning"));

        let (reply, _) = session.handle("quantity 1.5");
        assert!(reply.contains("invalid bid quantity"));

        session.handle("clear");
        assert_eq!(session.intent, PendingBidIntent::default());
        assert_eq!(session.handle("quit").1, Flow::Quit);
    }

    #[tokio::test]
    async fn confirmed_bid_clears_unchanged_intent() {
        let mut reader = MockAuctionReading::new();
        reader
            .expect_allowance()
            .returning(|_, _| Ok(U256::MAX));
        reader.expect_user_bids().returning(|_| {
            Ok(UserBids {
                prices: vec![dec("60")],
                count: 1,
            })
        });
        let mut wallet = testing::wallet();
        wallet
            .expect_place_bid()
            .times(2)
            .returning(|_| Ok(testing::receipt()));
        let mut encryptor = testing::ready_encryptor();
        encryptor.expect_encrypt_u32().returning(|_, _, _| {
            Ok(fhe::EncryptedInput {
                handles: vec![vec![1; 32].into()],
                input_proof: vec![2; 64].into(),
            })
        });

        let setup = testing::client(reader, Some(Arc::new(wallet)), encryptor);
        setup
            .publishers
            .snapshot
            .send_replace(Some(testing::snapshot(false)));
        let mut session = Session::new(Arc::new(setup.client));

        assert_eq!(session.handle("bid 60 100").0, "submitting bid...");
        let outcome = session.outcomes.recv().await.unwrap();
        assert!(session.complete(outcome).contains("submit_bid confirmed"));
        assert_eq!(session.intent, PendingBidIntent::default());

        // Editing while the bid is pending keeps the new input.
        session.handle("bid 61 5");
        session.handle("price 62");
        let outcome = session.outcomes.recv().await.unwrap();
        session.complete(outcome);
        assert_eq!(session.intent, PendingBidIntent::new("62", "5"));
    }

    #[tokio::test]
    async fn failed_action_is_reported() {
        let setup = testing::client(MockAuctionReading::new(), None, MockEncrypting::new());
        let mut session = Session::new(Arc::new(setup.client));

        session.handle("claim");
        let outcome = session.outcomes.recv().await.unwrap();
        assert_eq!(session.complete(outcome), "claim failed: no wallet connected");
    }

    #[tokio::test]
    async fn runs_until_quit() {
        let setup = testing::client(
            MockAuctionReading::new(),
            None,
            testing::ready_encryptor(),
        );
        let session = Session::new(Arc::new(setup.client));

        let mut output = Vec::new();
        session
            .run(&b"help\n\nprice 60\nquit\nstatus\n"[..], &mut output)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("next bid: price 60, quantity --"));
        assert!(output.ends_with("bye\n"));
    }
}
