use serde::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

use crate::primitives::{Gwei, PublicKeyBytes, SignatureBytes, H256};

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Deposit {
    // Sibling hashes in bottom-up order followed by the deposit count chunk.
    // Empty once pruned.
    pub proof: Vec<H256>,
    pub data: DepositData,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize, TreeHash)]
#[serde(deny_unknown_fields)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    #[serde(with = "serde_utils::string_or_native")]
    pub amount: Gwei,
    pub signature: SignatureBytes,
}
