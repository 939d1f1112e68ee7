use deposit_tree::{DepositTree, FinalizedExecutionBlock};
use types::primitives::DepositIndex;

/// Deposits that can no longer be reverted on the execution chain.
///
/// `merkle_trie_index` is the index of the last deposit folded into `deposit_tree`.
/// It is `None` until the first finalization.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct FinalizedDeposits {
    deposit_tree: DepositTree,
    merkle_trie_index: Option<DepositIndex>,
    execution_block: Option<FinalizedExecutionBlock>,
}

impl FinalizedDeposits {
    pub(crate) const fn new(
        deposit_tree: DepositTree,
        merkle_trie_index: Option<DepositIndex>,
        execution_block: Option<FinalizedExecutionBlock>,
    ) -> Self {
        Self {
            deposit_tree,
            merkle_trie_index,
            execution_block,
        }
    }

    #[must_use]
    pub const fn deposit_tree(&self) -> &DepositTree {
        &self.deposit_tree
    }

    #[must_use]
    pub const fn merkle_trie_index(&self) -> Option<DepositIndex> {
        self.merkle_trie_index
    }

    /// The execution block whose finality triggered the latest finalization.
    #[must_use]
    pub const fn execution_block(&self) -> Option<FinalizedExecutionBlock> {
        self.execution_block
    }

    pub(crate) fn is_stale(&self, eth1_deposit_index: DepositIndex) -> bool {
        self.merkle_trie_index
            .is_some_and(|merkle_trie_index| eth1_deposit_index <= merkle_trie_index)
    }
}
