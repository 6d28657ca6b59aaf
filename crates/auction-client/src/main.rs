#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    auction_client::start(std::env::args()).await
}
