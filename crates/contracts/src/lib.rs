//! Bindings for the contracts the auction client talks to.
//!
//! Each contract gets a module named after it which re-exports everything
//! `alloy::sol!` generates and adds an `Instance` alias bound to the erased
//! provider used throughout the workspace.

pub mod networks {
    pub const SEPOLIA: u64 = 11155111;
    /// Hardhat/anvil local development chain.
    pub const LOCAL: u64 = 31337;
}

#[macro_export]
macro_rules! bindings {
    ($contract:ident { $($body:tt)* }) => {
        paste::paste! {
            // Generate the main bindings in a private module. That allows
            // us to re-export all items in our own module while also adding
            // some items ourselves.
            #[allow(non_snake_case)]
            mod [<$contract Private>] {
                alloy::sol! {
                    #[allow(missing_docs)]
                    #[sol(rpc)]
                    interface $contract {
                        $($body)*
                    }
                }
            }

            #[allow(non_snake_case)]
            pub mod $contract {
                pub use super::[<$contract Private>]::$contract::*;
                pub type Instance = [<$contract Instance>]<alloy::providers::DynProvider>;
            }
        }
    };
}

bindings!(FHEAuction {
    function placeBid(bytes calldata encryptedAmount, bytes calldata inputProof, uint256 totalAmount, uint256 tokenQuantity) external;
    function cancelBid(uint256 bidIndex) external;
    function claimTokensAndRefund() external;
    function finalizePrices() external;
    function getUserBids(address user) external view returns (uint256[] memory prices, uint256 bidCount);
    function getUserAllocation(address user) external view returns (uint256 allocation, uint256 refund, bool hasClaimed);
    function auctionEnd() external view returns (uint256);
    function claimStart() external view returns (uint256);
    function clearingPrice() external view returns (uint256);
    function indicativeClearingPrice() external view returns (uint256);
    function priceFinalized() external view returns (bool);
    function floorPrice() external view returns (uint256);
    function tokenSupply() external view returns (uint256);
});

bindings!(ERC20 {
    function balanceOf(address account) external view returns (uint256);
    function approve(address spender, uint256 amount) external returns (bool);
    function allowance(address owner, address spender) external view returns (uint256);
});
