//! Rebase orchestration: works out which transactions should be pending once
//! the chain tip moves from `old_tip` to `new_tip`.
//!
//! The result is a candidate list only. [`Mempool::rebase_to_block`] is the
//! gate that decides which candidates actually survive against the new tip.
//!
//! [`Mempool::rebase_to_block`]: crate::mempool::Mempool::rebase_to_block

use crate::blockchain::{find_common_ancestor, BlockId, ChainFork};
use crate::error::ChainError;
use crate::persistence::Persistence;
use crate::transaction::{Transaction, TxId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidate pending list for a tip change, with the fork it was derived from.
#[derive(Debug, Clone)]
pub struct RebasePlan {
    pub fork: ChainFork,
    /// Orphaned transactions in confirmation order, then the still-pending
    /// ones in admission order.
    pub transactions: Vec<Transaction>,
    /// Pending transactions dropped because the new branch confirmed them.
    pub confirmed: usize,
    /// Transactions returned from rolled-back blocks.
    pub orphaned: usize,
}

pub struct MempoolRebaser {
    storage: Arc<dyn Persistence>,
}

impl MempoolRebaser {
    pub fn new(storage: Arc<dyn Persistence>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &dyn Persistence {
        self.storage.as_ref()
    }

    /// Candidate pending transactions after moving from `old_tip` to
    /// `new_tip`, for pending transactions known by id.
    pub fn rebase_mempool(
        &self,
        old_tip: &BlockId,
        new_tip: &BlockId,
        pending_ids: &[TxId],
    ) -> Result<Vec<Transaction>, ChainError> {
        let pending = self.fetch_pending(pending_ids)?;
        Ok(self.plan(old_tip, new_tip, pending)?.transactions)
    }

    /// Same as [`rebase_mempool`](Self::rebase_mempool) for pending
    /// transactions the caller already holds.
    pub fn rebase_transactions(
        &self,
        old_tip: &BlockId,
        new_tip: &BlockId,
        pending: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, ChainError> {
        Ok(self.plan(old_tip, new_tip, pending)?.transactions)
    }

    pub fn plan(
        &self,
        old_tip: &BlockId,
        new_tip: &BlockId,
        pending: Vec<Transaction>,
    ) -> Result<RebasePlan, ChainError> {
        let fork = find_common_ancestor(self.storage(), old_tip, new_tip)?;

        let orphaned_ids = self.transaction_ids_in_blocks(&fork.old_branch)?;
        let confirmed_ids: HashSet<TxId> = self
            .transaction_ids_in_blocks(&fork.new_branch)?
            .into_iter()
            .collect();

        let mut seen = HashSet::with_capacity(pending.len() + orphaned_ids.len());
        let mut transactions = Vec::with_capacity(pending.len() + orphaned_ids.len());

        // Orphans first; pending transactions may spend their outputs.
        let mut orphaned = 0;
        for txid in orphaned_ids {
            if confirmed_ids.contains(&txid) || seen.contains(&txid) {
                continue;
            }
            let tx = self.storage.fetch_transaction(&txid)?;
            if tx.is_coinbase() {
                continue;
            }
            seen.insert(txid);
            transactions.push(tx);
            orphaned += 1;
        }

        let mut confirmed = 0;
        for tx in pending {
            let txid = tx.hash();
            if confirmed_ids.contains(&txid) {
                confirmed += 1;
                continue;
            }
            if seen.insert(txid) {
                transactions.push(tx);
            }
        }

        info!(
            ancestor = %hex::encode(fork.ancestor),
            rolled_back = fork.old_branch.len(),
            applied = fork.new_branch.len(),
            confirmed,
            orphaned,
            candidates = transactions.len(),
            "planned mempool rebase"
        );

        Ok(RebasePlan {
            fork,
            transactions,
            confirmed,
            orphaned,
        })
    }

    /// Transaction ids of `blocks`, block by block in the given order.
    pub fn transaction_ids_in_blocks(&self, blocks: &[BlockId]) -> Result<Vec<TxId>, ChainError> {
        let mut txids = Vec::new();
        for block in blocks {
            txids.extend(self.storage.fetch_transaction_ids_in_block(block)?);
        }
        Ok(txids)
    }

    /// Looks up pending transactions by id. Ids the store does not know are
    /// skipped: they cannot be revalidated without their contents.
    fn fetch_pending(&self, ids: &[TxId]) -> Result<Vec<Transaction>, ChainError> {
        let mut transactions = Vec::with_capacity(ids.len());
        for txid in ids {
            match self.storage.fetch_transaction(txid) {
                Ok(tx) => transactions.push(tx),
                Err(e) if e.is_not_found() => {
                    warn!(tx = %hex::encode(txid), "pending transaction unknown to storage, dropping");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(requested = ids.len(), found = transactions.len(), "fetched pending transactions");
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{connect_block, Block, UtxoSet};
    use crate::mempool::Mempool;
    use crate::persistence::InMemoryPersistence;
    use crate::transaction::TransactionOutput;

    struct Fixture {
        storage: Arc<InMemoryPersistence>,
        genesis: Block,
        funding: Transaction,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryPersistence::new());
        let funding = Transaction::coinbase(
            vec![
                TransactionOutput::new(10, "alice"),
                TransactionOutput::new(10, "alice"),
                TransactionOutput::new(10, "alice"),
            ],
            0,
        );
        let genesis = Block::genesis(vec![funding.hash()]);
        connect_block(storage.as_ref(), &genesis, std::slice::from_ref(&funding)).unwrap();
        Fixture { storage, genesis, funding }
    }

    fn spend(funding: &Transaction, index: u32, to: &str) -> Transaction {
        Transaction::new(vec![funding.outpoint(index)], vec![TransactionOutput::new(10, to)])
    }

    fn mine(storage: &InMemoryPersistence, parent: &Block, txs: &[Transaction], nonce: u64) -> Block {
        let block = Block::new(Some(parent.hash()), txs.iter().map(|t| t.hash()).collect()).with_nonce(nonce);
        connect_block(storage, &block, txs).unwrap();
        block
    }

    #[test]
    fn test_linear_advance_drops_confirmed() {
        let f = fixture();
        let tx1 = spend(&f.funding, 0, "bob");
        let tx2 = spend(&f.funding, 1, "carol");
        f.storage.save_transaction(&tx2).unwrap();
        let b1 = mine(&f.storage, &f.genesis, std::slice::from_ref(&tx1), 1);

        let rebaser = MempoolRebaser::new(f.storage.clone());
        let result = rebaser
            .rebase_mempool(&f.genesis.hash(), &b1.hash(), &[tx1.hash(), tx2.hash()])
            .unwrap();

        assert_eq!(result, vec![tx2]);
    }

    #[test]
    fn test_reorg_readmits_orphans_before_pending() {
        let f = fixture();
        let tx1 = spend(&f.funding, 0, "bob");
        let tx2 = spend(&f.funding, 1, "carol");
        let tx3 = spend(&f.funding, 2, "dave");

        let a1 = mine(&f.storage, &f.genesis, std::slice::from_ref(&tx1), 1);
        let a2 = mine(&f.storage, &a1, std::slice::from_ref(&tx2), 2);
        let b1 = mine(&f.storage, &f.genesis, std::slice::from_ref(&tx1), 3);

        let rebaser = MempoolRebaser::new(f.storage.clone());
        let plan = rebaser.plan(&a2.hash(), &b1.hash(), vec![tx3.clone()]).unwrap();

        assert_eq!(plan.fork.ancestor, f.genesis.hash());
        assert_eq!(plan.fork.old_branch, vec![a1.hash(), a2.hash()]);
        // tx1 is reconfirmed on the new branch and must not come back.
        assert_eq!(plan.transactions, vec![tx2, tx3]);
        assert_eq!(plan.orphaned, 1);
        assert_eq!(plan.confirmed, 0);
    }

    #[test]
    fn test_pending_child_of_orphan_survives_rebase() {
        let f = fixture();
        let tx1 = spend(&f.funding, 0, "bob");
        let child = Transaction::new(vec![tx1.outpoint(0)], vec![TransactionOutput::new(10, "carol")]);
        let a1 = mine(&f.storage, &f.genesis, std::slice::from_ref(&tx1), 1);
        let b1 = mine(&f.storage, &f.genesis, &[], 2);

        let rebaser = MempoolRebaser::new(f.storage.clone());
        let candidates = rebaser
            .rebase_transactions(&a1.hash(), &b1.hash(), vec![child.clone()])
            .unwrap();
        assert_eq!(candidates, vec![tx1.clone(), child.clone()]);

        let mut mempool = Mempool::new(a1.hash(), UtxoSet::new()).with_candidates(candidates);
        assert!(mempool.rebase_to_block(f.storage.as_ref(), b1.hash()));
        assert_eq!(mempool.transactions(), &[tx1, child]);
    }

    #[test]
    fn test_orphaned_coinbase_not_readmitted() {
        let f = fixture();
        let reward = Transaction::coinbase(vec![TransactionOutput::new(50, "miner")], 1);
        let a1 = mine(&f.storage, &f.genesis, std::slice::from_ref(&reward), 1);
        let b1 = mine(&f.storage, &f.genesis, &[], 2);

        let rebaser = MempoolRebaser::new(f.storage.clone());
        let result = rebaser.rebase_transactions(&a1.hash(), &b1.hash(), Vec::new()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_duplicate_pending_collapsed() {
        let f = fixture();
        let tx = spend(&f.funding, 0, "bob");
        let rebaser = MempoolRebaser::new(f.storage.clone());
        let result = rebaser
            .rebase_transactions(&f.genesis.hash(), &f.genesis.hash(), vec![tx.clone(), tx.clone()])
            .unwrap();
        assert_eq!(result, vec![tx]);
    }

    #[test]
    fn test_unknown_pending_ids_skipped() {
        let f = fixture();
        let rebaser = MempoolRebaser::new(f.storage.clone());
        let result = rebaser
            .rebase_mempool(&f.genesis.hash(), &f.genesis.hash(), &[[0x77; 32]])
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_disjoint_tips_fail() {
        let f = fixture();
        let other_root = Block::genesis(Vec::new()).with_nonce(99);
        f.storage.save_block(&other_root).unwrap();

        let rebaser = MempoolRebaser::new(f.storage.clone());
        let result = rebaser.rebase_transactions(&f.genesis.hash(), &other_root.hash(), Vec::new());
        assert!(matches!(result, Err(ChainError::NoCommonAncestor { .. })));
    }
}
