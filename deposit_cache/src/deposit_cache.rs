use std::collections::{hash_map::Entry, BTreeSet, HashMap};

use anyhow::{ensure, Result};
use deposit_tree::{DepositTree, FinalizedExecutionBlock};
use features::Feature;
use log::{debug, info};
use parking_lot::RwLock;
use thiserror::Error;
use types::{
    containers::Deposit,
    primitives::{
        DepositIndex, ExecutionBlockHash, ExecutionBlockNumber, PublicKeyBytes, UnixSeconds, H256,
    },
};

use crate::{
    config::DepositCacheConfig, deposit_container::DepositContainer,
    finalized_deposits::FinalizedDeposits, snapshot::DepositCacheSnapshot,
};

#[derive(Debug, Error)]
enum Error {
    #[error(
        "deposit {index} needed to finalize deposits up to {target} is missing from the cache"
    )]
    MissingDeposit {
        index: DepositIndex,
        target: DepositIndex,
    },
    #[error(
        "snapshot merkle trie index {merkle_trie_index:?} \
         does not match finalized deposit count {deposit_count}"
    )]
    SnapshotIndexMismatch {
        merkle_trie_index: Option<DepositIndex>,
        deposit_count: DepositIndex,
    },
}

#[derive(Default)]
struct State {
    // Sorted by index. Deposits arrive in index order, so this is also sorted by block height.
    deposits: Vec<DepositContainer>,
    // The first deposit observed for each public key.
    deposits_by_pubkey: HashMap<PublicKeyBytes, DepositContainer>,
    // Entries of `deposits_by_pubkey` that still have a proof, ordered by deposit index.
    unpruned_first_deposits: BTreeSet<(DepositIndex, PublicKeyBytes)>,
    // Proofs of deposits with indices up to this one have been discarded.
    proofs_pruned_until: Option<DepositIndex>,
    finalized_deposits: FinalizedDeposits,
}

impl State {
    fn container(&self, index: DepositIndex) -> Option<&DepositContainer> {
        self.deposits
            .binary_search_by_key(&index, |container| container.index)
            .ok()
            .and_then(|position| self.deposits.get(position))
    }

    fn replace_deposits(&mut self, deposits: Vec<DepositContainer>) {
        self.deposits_by_pubkey.clear();
        self.unpruned_first_deposits.clear();
        self.proofs_pruned_until = None;

        for container in &deposits {
            self.record_first_deposit(container);
        }

        self.deposits = deposits;
    }

    fn record_first_deposit(&mut self, container: &DepositContainer) {
        let pubkey = container.deposit.data.pubkey;

        if let Entry::Vacant(entry) = self.deposits_by_pubkey.entry(pubkey) {
            if !container.deposit.is_proof_pruned() {
                self.unpruned_first_deposits.insert((container.index, pubkey));
            }

            entry.insert(container.clone());
        }
    }
}

/// Deposits observed on the deposit contract along with the finalized part of its tree.
///
/// All operations go through a single lock and are bounded by the depth of the tree or the number
/// of cached deposits. Queries return owned copies, so no guard outlives a call.
pub struct DepositCache {
    state: RwLock<State>,
}

impl DepositCache {
    pub fn new(config: DepositCacheConfig) -> Result<Self> {
        let DepositCacheConfig {
            deposit_contract_tree_depth,
            default_snapshot,
        } = config;

        if let Some(snapshot) = default_snapshot {
            return Self::from_snapshot(deposit_contract_tree_depth, snapshot);
        }

        let deposit_tree = DepositTree::with_depth(deposit_contract_tree_depth)?;

        Ok(Self {
            state: RwLock::new(State {
                finalized_deposits: FinalizedDeposits::new(deposit_tree, None, None),
                ..State::default()
            }),
        })
    }

    pub fn from_snapshot(depth: usize, snapshot: DepositCacheSnapshot) -> Result<Self> {
        let DepositCacheSnapshot {
            merkle_trie_index,
            tree,
            deposits,
        } = snapshot;

        let (deposit_tree, execution_block) = match tree {
            Some(tree_snapshot) => (
                DepositTree::from_snapshot(&tree_snapshot, depth)?,
                Some(tree_snapshot.execution_block),
            ),
            None => (DepositTree::with_depth(depth)?, None),
        };

        let deposit_count = deposit_tree.deposit_count();

        ensure!(
            merkle_trie_index == deposit_count.checked_sub(1),
            Error::SnapshotIndexMismatch {
                merkle_trie_index,
                deposit_count,
            },
        );

        info!(
            "restored deposit cache from snapshot \
             (merkle_trie_index: {merkle_trie_index:?}, unfinalized deposits: {})",
            deposits.len(),
        );

        let mut state = State {
            finalized_deposits: FinalizedDeposits::new(
                deposit_tree,
                merkle_trie_index,
                execution_block,
            ),
            ..State::default()
        };

        state.replace_deposits(deposits);

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Captures the finalized tree and the deposits that have not been finalized yet.
    pub fn snapshot(&self) -> Result<DepositCacheSnapshot> {
        let state = self.state.read();
        let finalized_deposits = &state.finalized_deposits;
        let merkle_trie_index = finalized_deposits.merkle_trie_index();

        let tree = finalized_deposits
            .execution_block()
            .map(|block| {
                finalized_deposits
                    .deposit_tree()
                    .snapshot(block.block_hash, block.block_height, block.block_timestamp)
            })
            .transpose()?;

        let deposits = state
            .deposits
            .iter()
            .filter(|container| is_after(container.index, merkle_trie_index))
            .cloned()
            .collect();

        Ok(DepositCacheSnapshot {
            merkle_trie_index,
            tree,
            deposits,
        })
    }

    /// Returns deposits in index order, optionally only those included up to block `up_to`.
    #[must_use]
    pub fn all_deposits(&self, up_to: Option<ExecutionBlockNumber>) -> Vec<Deposit> {
        self.state
            .read()
            .deposits
            .iter()
            .filter(|container| is_at_or_before(container.eth1_block_height, up_to))
            .map(|container| container.deposit.clone())
            .collect()
    }

    #[must_use]
    pub fn all_deposit_containers(&self) -> Vec<DepositContainer> {
        self.state.read().deposits.clone()
    }

    /// Number of deposits made to the contract as far as the cache knows.
    ///
    /// Finalized deposits are counted even if their containers are gone after a restore.
    #[must_use]
    pub fn deposit_count(&self) -> DepositIndex {
        let state = self.state.read();

        let cached = state
            .deposits
            .last()
            .map_or(0, |container| container.index + 1);

        cached.max(state.finalized_deposits.deposit_tree().deposit_count())
    }

    /// Returns the deposit count and deposit root as of block `height`.
    ///
    /// If several deposits were included in the same block, the last one determines the result.
    /// Heights before the first cached deposit are answered from the finalized deposits,
    /// whose containers may have been dropped when restoring from a snapshot.
    #[must_use]
    pub fn deposits_number_and_root_at_height(
        &self,
        height: ExecutionBlockNumber,
    ) -> (DepositIndex, H256) {
        let state = self.state.read();

        let position = state
            .deposits
            .partition_point(|container| container.eth1_block_height <= height);

        if let Some(container) = position
            .checked_sub(1)
            .and_then(|last| state.deposits.get(last))
        {
            return (container.index + 1, container.deposit_root);
        }

        match state.finalized_deposits.execution_block() {
            Some(block) if block.block_height <= height => {
                (block.deposit_count, block.deposit_root)
            }
            _ => (0, H256::zero()),
        }
    }

    /// Returns the first deposit ever observed for `pubkey` and the block it was included in.
    #[must_use]
    pub fn deposit_by_pubkey(
        &self,
        pubkey: PublicKeyBytes,
    ) -> Option<(Deposit, ExecutionBlockNumber)> {
        self.state
            .read()
            .deposits_by_pubkey
            .get(&pubkey)
            .map(|container| (container.deposit.clone(), container.eth1_block_height))
    }

    pub fn insert_deposit(
        &self,
        deposit: Deposit,
        eth1_block_height: ExecutionBlockNumber,
        index: DepositIndex,
        deposit_root: H256,
    ) {
        let mut container = DepositContainer {
            deposit,
            eth1_block_height,
            index,
            deposit_root,
        };

        let mut state = self.state.write();

        // Proofs at or below an index that has already been pruned up to are not kept.
        if !is_after(index, state.proofs_pruned_until) {
            container.deposit.proof = vec![];
        }

        state.record_first_deposit(&container);

        match state
            .deposits
            .binary_search_by_key(&index, |container| container.index)
        {
            Ok(_) => {
                features::log!(
                    DebugEth1,
                    "ignoring deposit {index} because it is already cached",
                );
            }
            Err(position) => {
                features::log!(
                    DebugEth1,
                    "caching deposit {index} from block {eth1_block_height}",
                );

                state.deposits.insert(position, container);
            }
        }
    }

    /// Replaces all cached deposits. `containers` must be sorted by index.
    pub fn insert_deposit_containers(&self, containers: Vec<DepositContainer>) {
        self.state.write().replace_deposits(containers);
    }

    /// Returns deposits with indices above `last_finalized_index`,
    /// optionally only those included up to block `up_to`.
    #[must_use]
    pub fn non_finalized_deposits(
        &self,
        last_finalized_index: Option<DepositIndex>,
        up_to: Option<ExecutionBlockNumber>,
    ) -> Vec<Deposit> {
        self.state
            .read()
            .deposits
            .iter()
            .filter(|container| is_after(container.index, last_finalized_index))
            .filter(|container| is_at_or_before(container.eth1_block_height, up_to))
            .map(|container| container.deposit.clone())
            .collect()
    }

    /// Folds deposits up to `eth1_deposit_index` into the finalized deposit tree.
    ///
    /// Finalization never moves backwards. Indices at or below the current `merkle_trie_index`
    /// are ignored because finality notices are delivered again after restarts.
    /// If the cache does not contain `eth1_deposit_index` yet, deposits are only finalized up to
    /// the last cached one.
    pub fn insert_finalized_deposits(
        &self,
        eth1_deposit_index: DepositIndex,
        execution_block_hash: ExecutionBlockHash,
        execution_block_timestamp: UnixSeconds,
    ) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let finalized_deposits = &state.finalized_deposits;

        if finalized_deposits.is_stale(eth1_deposit_index) {
            debug!(
                "ignoring stale deposit finalization \
                 (eth1_deposit_index: {eth1_deposit_index}, merkle_trie_index: {:?})",
                finalized_deposits.merkle_trie_index(),
            );

            return Ok(());
        }

        let Some(last_index) = state.deposits.last().map(|container| container.index) else {
            debug!("no deposits to finalize (eth1_deposit_index: {eth1_deposit_index})");
            return Ok(());
        };

        let target = eth1_deposit_index.min(last_index);

        if finalized_deposits.is_stale(target) {
            return Ok(());
        }

        let mut deposit_tree = finalized_deposits.deposit_tree().clone();

        // Leaves already in the tree, for example one restored from a snapshot, are not pushed again.
        for index in deposit_tree.deposit_count()..=target {
            let container = state
                .container(index)
                .ok_or(Error::MissingDeposit { index, target })?;

            deposit_tree.push(container.leaf())?;
        }

        deposit_tree.finalize(target)?;

        let deposit_root = deposit_tree.root();

        let last_finalized = state.container(target).ok_or(Error::MissingDeposit {
            index: target,
            target,
        })?;

        if Feature::VerifyDepositRoots.is_enabled() && last_finalized.deposit_root != deposit_root {
            Feature::VerifyDepositRoots.warn(format_args!(
                "deposit root mismatch at index {target} \
                 (computed: {deposit_root:?}, recorded: {:?})",
                last_finalized.deposit_root,
            ));
        }

        let execution_block = FinalizedExecutionBlock {
            deposit_root,
            deposit_count: target + 1,
            block_hash: execution_block_hash,
            block_height: last_finalized.eth1_block_height,
            block_timestamp: execution_block_timestamp,
        };

        state.finalized_deposits =
            FinalizedDeposits::new(deposit_tree, Some(target), Some(execution_block));

        info!(
            "finalized deposits up to index {target} \
             (deposit root: {deposit_root:?}, execution block: {execution_block_hash:?})",
        );

        Ok(())
    }

    /// Returns a copy of the finalized deposits.
    #[must_use]
    pub fn finalized_deposits(&self) -> FinalizedDeposits {
        self.state.read().finalized_deposits.clone()
    }

    /// Builds a tree containing the finalized deposits and every non-finalized deposit included
    /// up to block `up_to`, which block producers use to prove pending deposits.
    pub fn pending_deposit_tree(
        &self,
        up_to: Option<ExecutionBlockNumber>,
    ) -> Result<DepositTree> {
        let state = self.state.read();
        let mut deposit_tree = state.finalized_deposits.deposit_tree().clone();
        let first_pending = deposit_tree.deposit_count();

        let pending = state
            .deposits
            .iter()
            .filter(|container| container.index >= first_pending)
            .filter(|container| is_at_or_before(container.eth1_block_height, up_to));

        for container in pending {
            let index = deposit_tree.deposit_count();

            ensure!(
                container.index == index,
                Error::MissingDeposit {
                    index,
                    target: container.index,
                },
            );

            deposit_tree.push(container.leaf())?;
        }

        Ok(deposit_tree)
    }

    /// Discards proofs of deposits with indices up to and including `until_index`.
    ///
    /// An index past the last cached deposit prunes every proof.
    /// Only deposits above the previous bound are visited.
    pub fn prune_proofs(&self, until_index: DepositIndex) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let previous_bound = state.proofs_pruned_until;

        let start = state
            .deposits
            .partition_point(|container| !is_after(container.index, previous_bound));

        let end = state
            .deposits
            .partition_point(|container| container.index <= until_index);

        let mut pruned = 0_usize;

        for container in state.deposits.get_mut(start..end).into_iter().flatten() {
            if !container.deposit.is_proof_pruned() {
                container.deposit.proof = vec![];
                pruned += 1;
            }
        }

        let first_deposits = match until_index.checked_add(1) {
            Some(next_index) => {
                let unpruned = state
                    .unpruned_first_deposits
                    .split_off(&(next_index, PublicKeyBytes::zero()));

                core::mem::replace(&mut state.unpruned_first_deposits, unpruned)
            }
            None => core::mem::take(&mut state.unpruned_first_deposits),
        };

        for (_, pubkey) in first_deposits {
            if let Some(container) = state.deposits_by_pubkey.get_mut(&pubkey) {
                container.deposit.proof = vec![];
            }
        }

        state.proofs_pruned_until = previous_bound.max(Some(until_index));

        debug!("pruned {pruned} deposit proofs up to index {until_index}");
    }
}

fn is_after(index: DepositIndex, bound: Option<DepositIndex>) -> bool {
    bound.is_none_or(|bound| index > bound)
}

fn is_at_or_before(height: ExecutionBlockNumber, up_to: Option<ExecutionBlockNumber>) -> bool {
    up_to.is_none_or(|up_to| height <= up_to)
}

#[cfg(test)]
mod tests {
    use deposit_tree::verify_merkle_proof;
    use itertools::Itertools as _;
    use log::Level;
    use static_assertions::assert_impl_all;
    use test_case::test_case;
    use types::containers::DepositData;

    use super::*;

    assert_impl_all!(DepositCache: Send, Sync);

    const DEPTH: usize = 32;

    fn deposit(pubkey_byte: u8, amount: u64) -> Deposit {
        Deposit {
            proof: vec![H256::repeat_byte(0xff); DEPTH + 1],
            data: DepositData {
                pubkey: PublicKeyBytes::repeat_byte(pubkey_byte),
                withdrawal_credentials: H256::repeat_byte(pubkey_byte),
                amount,
                ..DepositData::default()
            },
        }
    }

    // Deposit roots are filled in with the actual contract roots so that they can be compared.
    fn containers(heights: &[ExecutionBlockNumber]) -> Vec<DepositContainer> {
        let mut deposit_tree = DepositTree::default();

        heights
            .iter()
            .copied()
            .zip(0..)
            .map(|(eth1_block_height, index)| {
                let deposit = deposit(u8::try_from(index).expect("tests use few deposits"), 32);

                deposit_tree
                    .push(deposit.data.hash_tree_root())
                    .expect("tree has room for every test deposit");

                DepositContainer {
                    deposit,
                    eth1_block_height,
                    index,
                    deposit_root: deposit_tree.root(),
                }
            })
            .collect()
    }

    fn cache_with(heights: &[ExecutionBlockNumber]) -> DepositCache {
        let cache = DepositCache::new(DepositCacheConfig::default()).expect("depth is valid");

        for container in containers(heights) {
            cache.insert_deposit(
                container.deposit,
                container.eth1_block_height,
                container.index,
                container.deposit_root,
            );
        }

        cache
    }

    fn indices(cache: &DepositCache) -> Vec<DepositIndex> {
        cache
            .all_deposit_containers()
            .into_iter()
            .map(|container| container.index)
            .collect()
    }

    fn root_of_first(cache: &DepositCache, count: DepositIndex) -> H256 {
        cache
            .all_deposit_containers()
            .into_iter()
            .find(|container| container.index + 1 == count)
            .expect("container should be cached")
            .deposit_root
    }

    #[test]
    fn new_cache_is_empty() -> Result<()> {
        let cache = DepositCache::new(DepositCacheConfig::default())?;

        assert!(cache.all_deposits(None).is_empty());
        assert_eq!(cache.deposit_count(), 0);
        assert_eq!(cache.finalized_deposits().merkle_trie_index(), None);
        assert_eq!(cache.finalized_deposits().execution_block(), None);

        Ok(())
    }

    #[test]
    fn new_rejects_depth_larger_than_supported() {
        let config = DepositCacheConfig {
            deposit_contract_tree_depth: 33,
            default_snapshot: None,
        };

        let error = DepositCache::new(config)
            .err()
            .expect("depth 33 should be rejected");

        assert!(matches!(
            error.downcast_ref::<deposit_tree::Error>(),
            Some(deposit_tree::Error::DepthTooLarge { depth: 33, .. }),
        ));
    }

    #[test]
    fn insert_deposit_keeps_deposits_sorted_by_index() {
        let cache = DepositCache::new(DepositCacheConfig::default()).expect("depth is valid");

        for index in [3, 1, 0, 2] {
            cache.insert_deposit(deposit(index, 32), 10, index.into(), H256::zero());
        }

        assert_eq!(indices(&cache), [0, 1, 2, 3]);
        assert_eq!(cache.deposit_count(), 4);
    }

    #[test]
    fn insert_deposit_ignores_index_that_is_already_cached() {
        let cache = cache_with(&[10, 11]);
        let before = cache.all_deposit_containers();

        cache.insert_deposit(deposit(0xaa, 1), 99, 1, H256::repeat_byte(1));

        assert_eq!(cache.all_deposit_containers(), before);

        // The public key has not been seen before, so it is still indexed.
        assert_eq!(
            cache.deposit_by_pubkey(PublicKeyBytes::repeat_byte(0xaa)),
            Some((deposit(0xaa, 1), 99)),
        );
    }

    #[test]
    fn insert_deposit_containers_replaces_cached_deposits() {
        let cache = cache_with(&[10, 11, 12]);
        let replacement = containers(&[20, 21]);

        cache.insert_deposit_containers(replacement.clone());

        assert_eq!(cache.all_deposit_containers(), replacement);
        assert_eq!(cache.deposit_by_pubkey(PublicKeyBytes::repeat_byte(2)), None);

        cache.insert_deposit_containers(vec![]);

        assert!(cache.all_deposit_containers().is_empty());
        assert_eq!(cache.deposit_by_pubkey(PublicKeyBytes::repeat_byte(0)), None);
    }

    #[test_case(None => 7)]
    #[test_case(Some(9) => 0)]
    #[test_case(Some(10) => 3)]
    #[test_case(Some(11) => 5)]
    #[test_case(Some(12) => 7)]
    #[test_case(Some(1000) => 7)]
    fn all_deposits_up_to_height(up_to: Option<ExecutionBlockNumber>) -> usize {
        cache_with(&[10, 10, 10, 11, 11, 12, 12])
            .all_deposits(up_to)
            .len()
    }

    #[test]
    fn deposits_number_and_root_at_height_uses_last_deposit_at_or_before_height() {
        let cache = cache_with(&[8, 9, 11]);

        assert_eq!(
            cache.deposits_number_and_root_at_height(10),
            (2, root_of_first(&cache, 2)),
        );
        assert_eq!(
            cache.deposits_number_and_root_at_height(11),
            (3, root_of_first(&cache, 3)),
        );
        assert_eq!(cache.deposits_number_and_root_at_height(7), (0, H256::zero()));
    }

    #[test]
    fn deposits_number_and_root_at_height_uses_last_of_several_deposits_in_one_block() {
        let cache = cache_with(&[5, 5, 5, 6]);

        assert_eq!(
            cache.deposits_number_and_root_at_height(5),
            (3, root_of_first(&cache, 3)),
        );
    }

    #[test]
    fn deposit_by_pubkey_returns_first_deposit_for_key() {
        let cache = DepositCache::new(DepositCacheConfig::default()).expect("depth is valid");
        let first = deposit(7, 32);
        let second = deposit(7, 1);

        cache.insert_deposit(first.clone(), 10, 0, H256::zero());
        cache.insert_deposit(second, 11, 1, H256::zero());

        assert_eq!(
            cache.deposit_by_pubkey(PublicKeyBytes::repeat_byte(7)),
            Some((first, 10)),
        );
        assert_eq!(cache.deposit_by_pubkey(PublicKeyBytes::repeat_byte(8)), None);
    }

    #[test_case(None, None => vec![0, 1, 2, 3, 4])]
    #[test_case(Some(1), None => vec![2, 3, 4])]
    #[test_case(Some(1), Some(12) => vec![2, 3])]
    #[test_case(None, Some(10) => vec![0, 1])]
    #[test_case(Some(4), None => Vec::<u64>::new())]
    fn non_finalized_deposits_filters_by_index_and_height(
        last_finalized_index: Option<DepositIndex>,
        up_to: Option<ExecutionBlockNumber>,
    ) -> Vec<u64> {
        cache_with(&[10, 10, 11, 12, 13])
            .non_finalized_deposits(last_finalized_index, up_to)
            .into_iter()
            .map(|deposit| u64::from(deposit.data.pubkey[0]))
            .collect()
    }

    #[test]
    fn prune_proofs_discards_proofs_up_to_index() {
        let cache = cache_with(&[10, 11, 12, 13]);

        cache.prune_proofs(1);

        let pruned = cache
            .all_deposits(None)
            .iter()
            .map(Deposit::is_proof_pruned)
            .collect_vec();

        assert_eq!(pruned, [true, true, false, false]);

        let (first, _) = cache
            .deposit_by_pubkey(PublicKeyBytes::repeat_byte(0))
            .expect("deposit 0 should be cached");

        assert!(first.is_proof_pruned());
    }

    #[test]
    fn prune_proofs_is_idempotent() {
        let cache = cache_with(&[10, 11, 12]);

        cache.prune_proofs(2);
        let once = cache.all_deposit_containers();
        cache.prune_proofs(2);

        assert_eq!(cache.all_deposit_containers(), once);
        assert!(once.iter().all(|container| container.deposit.is_proof_pruned()));
    }

    #[test]
    fn prune_proofs_past_last_deposit_prunes_everything() {
        let cache = cache_with(&[10, 11, 12]);

        cache.prune_proofs(1000);

        assert!(cache
            .all_deposits(None)
            .iter()
            .all(Deposit::is_proof_pruned));
    }

    #[test]
    fn prune_proofs_in_steps_prunes_every_deposit_up_to_latest_index() {
        let cache = cache_with(&[10, 11, 12, 13, 14]);

        cache.prune_proofs(1);
        cache.prune_proofs(3);

        let pruned = cache
            .all_deposits(None)
            .iter()
            .map(Deposit::is_proof_pruned)
            .collect_vec();

        assert_eq!(pruned, [true, true, true, true, false]);

        for (pubkey_byte, expected) in [(2, true), (3, true), (4, false)] {
            let (first, _) = cache
                .deposit_by_pubkey(PublicKeyBytes::repeat_byte(pubkey_byte))
                .expect("deposit should be cached");

            assert_eq!(first.is_proof_pruned(), expected);
        }
    }

    #[test]
    fn insert_deposit_below_pruned_index_drops_proof() {
        let cache = DepositCache::new(DepositCacheConfig::default()).expect("depth is valid");

        for index in [0, 2, 3] {
            cache.insert_deposit(deposit(index, 32), 10, index.into(), H256::zero());
        }

        cache.prune_proofs(2);
        cache.insert_deposit(deposit(1, 32), 10, 1, H256::zero());
        cache.insert_deposit(deposit(4, 32), 11, 4, H256::zero());

        let pruned = cache
            .all_deposits(None)
            .iter()
            .map(Deposit::is_proof_pruned)
            .collect_vec();

        assert_eq!(pruned, [true, true, true, false, false]);

        let (late, _) = cache
            .deposit_by_pubkey(PublicKeyBytes::repeat_byte(1))
            .expect("deposit 1 should be cached");

        assert!(late.is_proof_pruned());
    }

    #[test]
    fn insert_deposit_containers_resets_pruned_index() {
        let cache = cache_with(&[10, 11, 12]);

        cache.prune_proofs(2);
        cache.insert_deposit_containers(containers(&[20, 21, 22]));
        cache.prune_proofs(0);

        let pruned = cache
            .all_deposits(None)
            .iter()
            .map(Deposit::is_proof_pruned)
            .collect_vec();

        assert_eq!(pruned, [true, false, false]);

        let (second, _) = cache
            .deposit_by_pubkey(PublicKeyBytes::repeat_byte(1))
            .expect("deposit 1 should be cached");

        assert!(!second.is_proof_pruned());
    }

    #[test]
    fn prune_proofs_on_empty_cache_does_nothing() {
        let cache = cache_with(&[]);

        cache.prune_proofs(5);

        assert!(cache.all_deposits(None).is_empty());
    }

    #[test]
    fn insert_finalized_deposits_folds_deposits_into_tree() -> Result<()> {
        let cache = cache_with(&[10, 11, 12, 13, 14]);
        let block_hash = ExecutionBlockHash::repeat_byte(0xbb);

        cache.insert_finalized_deposits(2, block_hash, 1_000)?;

        let finalized_deposits = cache.finalized_deposits();
        let expected_root = root_of_first(&cache, 3);

        assert_eq!(finalized_deposits.merkle_trie_index(), Some(2));
        assert_eq!(finalized_deposits.deposit_tree().deposit_count(), 3);
        assert_eq!(finalized_deposits.deposit_tree().finalized_count(), 3);
        assert_eq!(finalized_deposits.deposit_tree().root(), expected_root);
        assert_eq!(
            finalized_deposits.execution_block(),
            Some(FinalizedExecutionBlock {
                deposit_root: expected_root,
                deposit_count: 3,
                block_hash,
                block_height: 12,
                block_timestamp: 1_000,
            }),
        );

        // Containers are kept until they are pruned explicitly.
        assert_eq!(cache.all_deposits(None).len(), 5);

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_never_moves_backwards() -> Result<()> {
        let cache = cache_with(&[10, 11, 12, 13, 14]);

        cache.insert_finalized_deposits(3, ExecutionBlockHash::repeat_byte(1), 1)?;
        let after_first = cache.finalized_deposits();

        cache.insert_finalized_deposits(1, ExecutionBlockHash::repeat_byte(2), 2)?;
        cache.insert_finalized_deposits(3, ExecutionBlockHash::repeat_byte(3), 3)?;

        assert_eq!(cache.finalized_deposits(), after_first);

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_in_steps_matches_single_finalization() -> Result<()> {
        let stepwise = cache_with(&[10, 11, 12, 13, 14, 15]);
        let direct = cache_with(&[10, 11, 12, 13, 14, 15]);

        stepwise.insert_finalized_deposits(1, ExecutionBlockHash::zero(), 0)?;
        stepwise.insert_finalized_deposits(4, ExecutionBlockHash::zero(), 0)?;
        direct.insert_finalized_deposits(4, ExecutionBlockHash::zero(), 0)?;

        assert_eq!(
            stepwise.finalized_deposits().deposit_tree().root(),
            direct.finalized_deposits().deposit_tree().root(),
        );
        assert_eq!(stepwise.finalized_deposits(), direct.finalized_deposits());

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_past_last_deposit_finalizes_all_cached_deposits() -> Result<()> {
        let cache = cache_with(&[10, 11, 12]);

        cache.insert_finalized_deposits(100, ExecutionBlockHash::zero(), 0)?;

        assert_eq!(cache.finalized_deposits().merkle_trie_index(), Some(2));

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_on_empty_cache_does_nothing() -> Result<()> {
        let cache = cache_with(&[]);

        cache.insert_finalized_deposits(0, ExecutionBlockHash::zero(), 0)?;

        assert_eq!(cache.finalized_deposits().merkle_trie_index(), None);

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_fails_on_gap_and_keeps_state() {
        let cache = cache_with(&[]);
        let mut containers = containers(&[10, 11, 12, 13]);

        containers.remove(1);
        cache.insert_deposit_containers(containers);

        let error = cache
            .insert_finalized_deposits(3, ExecutionBlockHash::zero(), 0)
            .expect_err("deposit 1 is missing");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::MissingDeposit {
                index: 1,
                target: 3,
            }),
        ));
        assert_eq!(cache.finalized_deposits().merkle_trie_index(), None);
        assert_eq!(cache.finalized_deposits().deposit_tree().deposit_count(), 0);
    }

    #[test]
    fn pending_deposit_tree_proves_non_finalized_deposits() -> Result<()> {
        let cache = cache_with(&[10, 11, 12, 13, 14]);

        cache.insert_finalized_deposits(1, ExecutionBlockHash::zero(), 0)?;

        let deposit_tree = cache.pending_deposit_tree(Some(13))?;
        let root = deposit_tree.root();

        assert_eq!(deposit_tree.deposit_count(), 4);
        assert_eq!(root, root_of_first(&cache, 4));

        for container in cache.all_deposit_containers().into_iter().skip(2).take(2) {
            let proof = deposit_tree.proof(container.index)?;

            assert!(verify_merkle_proof(
                container.leaf(),
                &proof,
                DEPTH + 1,
                container.index,
                root,
            ));
        }

        Ok(())
    }

    #[test]
    fn snapshot_round_trip_resumes_finalization() -> Result<()> {
        let original = cache_with(&[10, 11, 12, 13, 14, 15]);
        let block_hash = ExecutionBlockHash::repeat_byte(0xcc);

        original.insert_finalized_deposits(2, block_hash, 1_234)?;

        let snapshot = original.snapshot()?;

        assert_eq!(snapshot.merkle_trie_index, Some(2));
        assert_eq!(
            snapshot.deposits.iter().map(|container| container.index).collect_vec(),
            [3, 4, 5],
        );

        let restored = DepositCache::new(DepositCacheConfig {
            default_snapshot: Some(snapshot),
            ..DepositCacheConfig::default()
        })?;

        assert_eq!(
            restored.finalized_deposits().deposit_tree().root(),
            original.finalized_deposits().deposit_tree().root(),
        );
        assert_eq!(
            restored.finalized_deposits().execution_block(),
            original.finalized_deposits().execution_block(),
        );

        original.insert_finalized_deposits(4, block_hash, 1_300)?;
        restored.insert_finalized_deposits(4, block_hash, 1_300)?;

        assert_eq!(
            restored.finalized_deposits().deposit_tree().root(),
            original.finalized_deposits().deposit_tree().root(),
        );
        assert_eq!(
            restored.pending_deposit_tree(None)?.root(),
            original.pending_deposit_tree(None)?.root(),
        );

        Ok(())
    }

    #[test]
    fn restored_cache_answers_from_finalized_deposits() -> Result<()> {
        let cache = cache_with(&[10, 11, 12]);

        cache.insert_finalized_deposits(2, ExecutionBlockHash::repeat_byte(0xdd), 1_500)?;

        let root = root_of_first(&cache, 3);
        let restored = DepositCache::from_snapshot(DEPTH, cache.snapshot()?)?;

        assert!(restored.all_deposit_containers().is_empty());
        assert_eq!(restored.deposit_count(), 3);
        assert_eq!(restored.deposits_number_and_root_at_height(12), (3, root));
        assert_eq!(restored.deposits_number_and_root_at_height(20), (3, root));
        assert_eq!(
            restored.deposits_number_and_root_at_height(11),
            (0, H256::zero()),
        );

        Ok(())
    }

    #[test]
    fn restored_cache_prefers_pending_deposits_over_finalized_deposits() -> Result<()> {
        let cache = cache_with(&[10, 11, 12, 15, 16]);

        cache.insert_finalized_deposits(2, ExecutionBlockHash::repeat_byte(0xdd), 1_500)?;

        let restored = DepositCache::from_snapshot(DEPTH, cache.snapshot()?)?;

        assert_eq!(restored.deposit_count(), 5);

        for height in [12, 14, 15, 16, 100] {
            assert_eq!(
                restored.deposits_number_and_root_at_height(height),
                cache.deposits_number_and_root_at_height(height),
            );
        }

        Ok(())
    }

    #[test]
    fn snapshot_of_unfinalized_cache_has_no_tree() -> Result<()> {
        let snapshot = cache_with(&[10, 11]).snapshot()?;

        assert_eq!(snapshot.merkle_trie_index, None);
        assert_eq!(snapshot.tree, None);
        assert_eq!(snapshot.deposits.len(), 2);

        Ok(())
    }

    #[test]
    fn from_snapshot_rejects_inconsistent_merkle_trie_index() -> Result<()> {
        let cache = cache_with(&[10, 11, 12]);

        cache.insert_finalized_deposits(1, ExecutionBlockHash::zero(), 0)?;

        let snapshot = DepositCacheSnapshot {
            merkle_trie_index: Some(5),
            ..cache.snapshot()?
        };

        let error = DepositCache::from_snapshot(DEPTH, snapshot)
            .err()
            .expect("snapshot should be rejected");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::SnapshotIndexMismatch {
                merkle_trie_index: Some(5),
                deposit_count: 2,
            }),
        ));

        Ok(())
    }

    #[test]
    fn insert_finalized_deposits_warns_about_deposit_root_mismatch() -> Result<()> {
        testing_logger::setup();
        Feature::VerifyDepositRoots.enable();

        let cache = cache_with(&[]);
        let mut containers = containers(&[10, 11]);

        containers[1].deposit_root = H256::repeat_byte(0xee);
        cache.insert_deposit_containers(containers);
        cache.insert_finalized_deposits(1, ExecutionBlockHash::zero(), 0)?;

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| {
                log.level == Level::Warn
                    && log
                        .body
                        .starts_with("[VerifyDepositRoots] deposit root mismatch at index 1")
            }));
        });

        Ok(())
    }
}
