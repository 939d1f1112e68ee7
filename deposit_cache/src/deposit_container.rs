use serde::{Deserialize, Serialize};
use types::{
    containers::Deposit,
    primitives::{DepositIndex, ExecutionBlockNumber, H256},
};

/// A deposit as observed in the logs of the deposit contract.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepositContainer {
    pub deposit: Deposit,
    #[serde(with = "serde_utils::string_or_native")]
    pub eth1_block_height: ExecutionBlockNumber,
    #[serde(with = "serde_utils::string_or_native")]
    pub index: DepositIndex,
    // Root of the deposit contract after this deposit was added.
    pub deposit_root: H256,
}

impl DepositContainer {
    #[must_use]
    pub fn leaf(&self) -> H256 {
        self.deposit.data.hash_tree_root()
    }
}
