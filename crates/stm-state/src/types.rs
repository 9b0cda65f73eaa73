//! Actor record types
//!
//! Defines the values stored in a state tree:
//! - Actor ID addresses
//! - Token balances and chain epochs
//! - The actor record itself

use crate::cid::Cid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Actor ID address, rendered as `f0<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Create an ID address
    #[inline]
    #[must_use]
    pub const fn new_id(id: u64) -> Self {
        Self(id)
    }

    /// Numeric actor id
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }

    /// Canonical byte encoding (big-endian id)
    #[inline]
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f0{}", self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("f0")
            .or_else(|| s.strip_prefix("t0"))
            .ok_or_else(|| AddressError(s.to_string()))?;
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| AddressError(s.to_string()))
    }
}

/// Address parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid actor address: {0:?}")]
pub struct AddressError(String);

/// Token balance in atto units
///
/// Serialized as a decimal string so large balances survive JSON encoding.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    /// Zero balance
    pub const ZERO: Self = Self(0);

    /// Create from atto units
    #[inline]
    #[must_use]
    pub const fn from_atto(atto: u128) -> Self {
        Self(atto)
    }

    /// Balance in atto units
    #[inline]
    #[must_use]
    pub const fn atto(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TokenAmount> for String {
    fn from(amount: TokenAmount) -> Self {
        amount.0.to_string()
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(Self)
    }
}

/// Chain epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainEpoch(pub i64);

impl fmt::Display for ChainEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An actor record as stored in the state tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRecord {
    /// Actor code (type tag)
    pub code: Cid,
    /// Root of the actor's state
    pub head: Cid,
    /// Call sequence number
    pub call_seq_num: u64,
    /// Balance held by the actor
    pub balance: TokenAmount,
}

impl ActorRecord {
    /// Create a record
    #[inline]
    #[must_use]
    pub const fn new(code: Cid, head: Cid, call_seq_num: u64, balance: TokenAmount) -> Self {
        Self {
            code,
            head,
            call_seq_num,
            balance,
        }
    }
}
