pub mod errors;

use {
    crate::AlloyProvider,
    alloy::{
        network::EthereumWallet,
        providers::{Provider, ProviderBuilder},
        rpc::client::ClientBuilder,
        signers::local::PrivateKeySigner,
    },
    url::Url,
};

/// A read-only provider for the node at `url`.
pub fn provider(url: &Url) -> AlloyProvider {
    let rpc = ClientBuilder::default().http(url.clone());
    ProviderBuilder::new().connect_client(rpc).erased()
}

/// A provider that fills, signs and sends transactions on behalf of
/// `signer`. Reads go through the same connection.
pub fn provider_with_signer(url: &Url, signer: PrivateKeySigner) -> AlloyProvider {
    let rpc = ClientBuilder::default().http(url.clone());
    let wallet = EthereumWallet::new(signer);

    ProviderBuilder::new()
        .wallet(wallet)
        .connect_client(rpc)
        .erased()
}
