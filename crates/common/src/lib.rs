//! Shared primitives for the spout faucet client.

pub mod types;
pub mod utils;

pub use types::{Address, AmountParseError, TokenAmount, TxHash, TOKEN_DECIMALS};
