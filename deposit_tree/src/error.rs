use thiserror::Error;
use types::primitives::{DepositIndex, H256};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("deposit index {index} is out of bounds (deposit count: {deposit_count})")]
    InvalidIndex {
        index: DepositIndex,
        deposit_count: DepositIndex,
    },
    #[error("deposit tree of depth {depth} cannot hold more than {capacity} deposits")]
    CapacityExceeded {
        depth: usize,
        capacity: DepositIndex,
    },
    #[error("deposit tree depth {depth} exceeds maximum of {max_depth}")]
    DepthTooLarge { depth: usize, max_depth: usize },
    #[error("deposit {index} is inside a finalized subtree and cannot be proven")]
    FinalizedLeaf { index: DepositIndex },
    #[error("attempted to push a leaf into a finalized subtree")]
    FinalizedNodePushed,
    #[error("attempted to push a leaf into an occupied position")]
    LeafReached,
    #[error("attempted to finalize an empty subtree")]
    ZeroNodeFinalized,
    #[error("deposit tree node at height {height} does not match the shape of the tree")]
    Malformed { height: usize },
    #[error("invalid deposit tree snapshot: {0}")]
    InvalidSnapshot(#[from] InvalidSnapshot),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum InvalidSnapshot {
    #[error("snapshot has fewer finalized hashes than its deposit count {deposit_count} requires")]
    MissingHashes { deposit_count: DepositIndex },
    #[error("snapshot has more finalized hashes than its deposit count {deposit_count} requires")]
    ExtraHashes { deposit_count: DepositIndex },
    #[error("snapshot deposit count {deposit_count} exceeds tree capacity {capacity}")]
    CountExceedsCapacity {
        deposit_count: DepositIndex,
        capacity: DepositIndex,
    },
    #[error("snapshot deposit root {recorded:?} does not match computed root {computed:?}")]
    RootMismatch { recorded: H256, computed: H256 },
}
