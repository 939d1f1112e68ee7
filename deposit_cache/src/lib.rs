pub use crate::{
    config::DepositCacheConfig, deposit_cache::DepositCache,
    deposit_container::DepositContainer, finalized_deposits::FinalizedDeposits,
    snapshot::DepositCacheSnapshot,
};

mod config;
mod deposit_cache;
mod deposit_container;
mod finalized_deposits;
mod snapshot;
