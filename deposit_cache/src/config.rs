use typenum::Unsigned as _;
use types::consts::DepositContractTreeDepth;

use crate::snapshot::DepositCacheSnapshot;

#[derive(Clone, Debug)]
pub struct DepositCacheConfig {
    pub deposit_contract_tree_depth: usize,
    pub default_snapshot: Option<DepositCacheSnapshot>,
}

impl Default for DepositCacheConfig {
    fn default() -> Self {
        Self {
            deposit_contract_tree_depth: DepositContractTreeDepth::USIZE,
            default_snapshot: None,
        }
    }
}
