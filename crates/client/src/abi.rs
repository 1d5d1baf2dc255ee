//! Faucet contract ABI

use ethabi::{ParamType, Token};
use spout_common::{Address, TokenAmount};
use thiserror::Error;

/// Selector of the standard `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// The call returned no data, which is what a call to an address
    /// without code looks like.
    #[error("call returned no data")]
    EmptyReturn,

    #[error("failed to decode return data: {0}")]
    Decode(String),

    #[error("value does not fit in 128 bits")]
    Overflow,
}

/// Calls understood by the faucet contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaucetCall {
    RequestTokens(TokenAmount),
    GetRemainingAllowance(Address),
    GetFaucetBalance,
    TryAutoMint,
    /// Owner only; ignores the cooldown
    ForceAutoMint,
    TimeUntilNextAutoMint,
    MaxTokensPerDay,
    LastAutoMintTime,
    Owner,
    UsdcToken,
}

impl FaucetCall {
    pub fn name(&self) -> &'static str {
        match self {
            FaucetCall::RequestTokens(_) => "requestTokens",
            FaucetCall::GetRemainingAllowance(_) => "getRemainingAllowance",
            FaucetCall::GetFaucetBalance => "getFaucetBalance",
            FaucetCall::TryAutoMint => "tryAutoMint",
            FaucetCall::ForceAutoMint => "forceAutoMint",
            FaucetCall::TimeUntilNextAutoMint => "timeUntilNextAutoMint",
            FaucetCall::MaxTokensPerDay => "maxTokensPerDay",
            FaucetCall::LastAutoMintTime => "lastAutoMintTime",
            FaucetCall::Owner => "owner",
            FaucetCall::UsdcToken => "usdcToken",
        }
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            FaucetCall::RequestTokens(amount) => {
                vec![Token::Uint(ethabi::Uint::from(amount.base_units()))]
            }
            FaucetCall::GetRemainingAllowance(user) => {
                vec![Token::Address(ethabi::Address::from(user.0))]
            }
            _ => Vec::new(),
        }
    }

    fn param_types(&self) -> Vec<ParamType> {
        match self {
            FaucetCall::RequestTokens(_) => vec![ParamType::Uint(256)],
            FaucetCall::GetRemainingAllowance(_) => vec![ParamType::Address],
            _ => Vec::new(),
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        ethabi::short_signature(self.name(), &self.param_types())
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.selector().to_vec();
        data.extend(ethabi::encode(&self.tokens()));
        data
    }
}

fn decode_single(kind: ParamType, data: &[u8]) -> Result<Token, AbiError> {
    if data.is_empty() {
        return Err(AbiError::EmptyReturn);
    }
    ethabi::decode(&[kind], data)
        .map_err(|e| AbiError::Decode(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| AbiError::Decode("no value returned".to_string()))
}

/// Decodes a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<u128, AbiError> {
    match decode_single(ParamType::Uint(256), data)? {
        Token::Uint(value) if value.bits() <= 128 => Ok(value.low_u128()),
        Token::Uint(_) => Err(AbiError::Overflow),
        other => Err(AbiError::Decode(format!("expected uint256, got {:?}", other))),
    }
}

/// Decodes a single `address` return value.
pub fn decode_address(data: &[u8]) -> Result<Address, AbiError> {
    match decode_single(ParamType::Address, data)? {
        Token::Address(value) => Ok(Address(value.0)),
        other => Err(AbiError::Decode(format!("expected address, got {:?}", other))),
    }
}

/// Extracts the reason from an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    match ethabi::decode(&[ParamType::String], &data[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}
