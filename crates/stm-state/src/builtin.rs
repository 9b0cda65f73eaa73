//! Builtin actor code table
//!
//! Every builtin actor kind has one code per actors version. Codes are
//! derived deterministically from `fil/<version>/<name>`.

use crate::cid::Cid;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Actors schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorsVersion {
    V2,
    V3,
}

impl ActorsVersion {
    /// Numeric version
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

impl fmt::Display for ActorsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Builtin actor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorKind {
    Account,
    Cron,
    Init,
    Multisig,
    PaymentChannel,
    Reward,
    StorageMarket,
    StorageMiner,
    StoragePower,
    System,
    VerifiedRegistry,
}

impl ActorKind {
    /// All builtin kinds
    pub const ALL: [ActorKind; 11] = [
        Self::Account,
        Self::Cron,
        Self::Init,
        Self::Multisig,
        Self::PaymentChannel,
        Self::Reward,
        Self::StorageMarket,
        Self::StorageMiner,
        Self::StoragePower,
        Self::System,
        Self::VerifiedRegistry,
    ];

    /// Canonical actor name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Cron => "cron",
            Self::Init => "init",
            Self::Multisig => "multisig",
            Self::PaymentChannel => "paymentchannel",
            Self::Reward => "reward",
            Self::StorageMarket => "storagemarket",
            Self::StorageMiner => "storageminer",
            Self::StoragePower => "storagepower",
            Self::System => "system",
            Self::VerifiedRegistry => "verifiedregistry",
        }
    }

    /// Code of this kind in the given actors version
    #[must_use]
    pub fn code(self, version: ActorsVersion) -> Cid {
        Cid::compute(format!("fil/{}/{}", version.number(), self.name()).as_bytes())
    }
}

static CODE_TABLE: Lazy<HashMap<Cid, (ActorsVersion, ActorKind)>> = Lazy::new(|| {
    [ActorsVersion::V2, ActorsVersion::V3]
        .into_iter()
        .flat_map(|v| ActorKind::ALL.into_iter().map(move |k| (k.code(v), (v, k))))
        .collect()
});

/// Resolve a code to its version and kind
#[must_use]
pub fn lookup(code: &Cid) -> Option<(ActorsVersion, ActorKind)> {
    CODE_TABLE.get(code).copied()
}

/// Human-readable name of the actor kind behind a code
#[must_use]
pub fn actor_name_by_code(code: &Cid) -> &'static str {
    lookup(code).map_or("<unknown>", |(_, kind)| kind.name())
}

/// Complete set of builtin codes for a version
#[must_use]
pub fn codes(version: ActorsVersion) -> HashSet<Cid> {
    ActorKind::ALL.iter().map(|k| k.code(version)).collect()
}
