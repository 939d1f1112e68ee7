use deposit_tree::DepositTreeSnapshot;
use serde::{Deserialize, Serialize};
use types::primitives::DepositIndex;

use crate::deposit_container::DepositContainer;

/// Everything needed to resume a deposit cache without replaying the execution chain.
///
/// Only deposits that have not been finalized are kept as containers.
/// Finalized ones are represented by the roots of their subtrees in `tree`.
#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepositCacheSnapshot {
    pub merkle_trie_index: Option<DepositIndex>,
    pub tree: Option<DepositTreeSnapshot>,
    pub deposits: Vec<DepositContainer>,
}
