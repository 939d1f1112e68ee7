use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType, BYTES_PER_CHUNK};

pub use ethereum_types::H256;

pub type DepositIndex = u64;
pub type ExecutionBlockHash = H256;
pub type ExecutionBlockNumber = u64;
pub type Gwei = u64;
pub type UnixSeconds = u64;

pub const PUBLIC_KEY_SIZE: usize = 48;
pub const SIGNATURE_SIZE: usize = 96;

construct_fixed_hash! {
    pub struct PublicKeyBytes(PUBLIC_KEY_SIZE);
}

construct_fixed_hash! {
    pub struct SignatureBytes(SIGNATURE_SIZE);
}

impl_fixed_hash_serde!(PublicKeyBytes, PUBLIC_KEY_SIZE);
impl_fixed_hash_serde!(SignatureBytes, SIGNATURE_SIZE);

// Both are SSZ byte vectors. Hashing the bytes directly avoids going through `FixedVector<u8, N>`.
macro_rules! impl_tree_hash_for_byte_vector {
    ($type: ty, $size: expr) => {
        impl TreeHash for $type {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("byte vectors are hashed as a whole and never packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("byte vectors are hashed as a whole and never packed")
            }

            fn tree_hash_root(&self) -> Hash256 {
                tree_hash::merkle_root(self.as_bytes(), $size.div_ceil(BYTES_PER_CHUNK))
            }
        }
    };
}

impl_tree_hash_for_byte_vector!(PublicKeyBytes, PUBLIC_KEY_SIZE);
impl_tree_hash_for_byte_vector!(SignatureBytes, SIGNATURE_SIZE);
