pub use crate::{
    deposit_tree::{DepositTree, MAX_TREE_DEPTH},
    error::{Error, InvalidSnapshot},
    merkle_tree::{merkle_root_from_branch, verify_merkle_proof, MerkleTree},
    snapshot::{DepositTreeSnapshot, FinalizedExecutionBlock},
};

mod deposit_tree;
mod error;
mod merkle_tree;
mod snapshot;

#[cfg(test)]
mod reference;
