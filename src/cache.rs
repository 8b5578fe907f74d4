//! Caching layer for frequently accessed chain data
//!
//! Ancestry walks fetch the same parent links over and over, and rebases
//! fetch the same transactions for every tip change. Both are keyed by
//! content id and never change once stored, so an LRU in front of the
//! backend needs no invalidation:
//! - Block parent links (default 1000 entries)
//! - Transactions (default 5000 entries)
use crate::blockchain::{Block, BlockId, Sha256Hash, UtxoSet};
use crate::error::ChainError;
use crate::persistence::{Object, Persistence};
use crate::transaction::{Transaction, TxId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub const DEFAULT_BLOCK_CAPACITY: usize = 1000;
pub const DEFAULT_TRANSACTION_CAPACITY: usize = 5000;

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Read-through LRU wrapper around any [`Persistence`] backend.
pub struct CachedPersistence {
    inner: Arc<dyn Persistence>,
    parents: Mutex<LruCache<BlockId, Option<BlockId>>>,
    transactions: Mutex<LruCache<TxId, Transaction>>,
    hits: Mutex<(u64, u64)>,
}

impl CachedPersistence {
    pub fn new(inner: Arc<dyn Persistence>, block_capacity: usize, transaction_capacity: usize) -> Self {
        Self {
            inner,
            parents: Mutex::new(LruCache::new(capacity(block_capacity))),
            transactions: Mutex::new(LruCache::new(capacity(transaction_capacity))),
            hits: Mutex::new((0, 0)),
        }
    }

    pub fn new_default(inner: Arc<dyn Persistence>) -> Self {
        Self::new(inner, DEFAULT_BLOCK_CAPACITY, DEFAULT_TRANSACTION_CAPACITY)
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        *self.hits.lock()
    }

    pub fn cached_blocks(&self) -> usize {
        self.parents.lock().len()
    }

    pub fn cached_transactions(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn clear(&self) {
        self.parents.lock().clear();
        self.transactions.lock().clear();
    }

    fn record(&self, hit: bool) {
        let mut stats = self.hits.lock();
        if hit {
            stats.0 += 1;
        } else {
            stats.1 += 1;
        }
    }
}

impl Persistence for CachedPersistence {
    fn fetch_object(&self, id: &Sha256Hash) -> Result<Object, ChainError> {
        self.inner.fetch_object(id)
    }

    fn fetch_utxo_snapshot(&self, block_id: &BlockId) -> Result<UtxoSet, ChainError> {
        self.inner.fetch_utxo_snapshot(block_id)
    }

    fn fetch_transaction(&self, id: &TxId) -> Result<Transaction, ChainError> {
        if let Some(tx) = self.transactions.lock().get(id).cloned() {
            self.record(true);
            return Ok(tx);
        }
        self.record(false);
        let tx = self.inner.fetch_transaction(id)?;
        self.transactions.lock().put(*id, tx.clone());
        Ok(tx)
    }

    fn fetch_block_parent(&self, id: &BlockId) -> Result<Option<BlockId>, ChainError> {
        if let Some(parent) = self.parents.lock().get(id).copied() {
            self.record(true);
            return Ok(parent);
        }
        self.record(false);
        // Misses are not cached: the block may be stored later.
        let parent = self.inner.fetch_block_parent(id)?;
        self.parents.lock().put(*id, parent);
        Ok(parent)
    }

    fn fetch_transaction_ids_in_block(&self, block_id: &BlockId) -> Result<Vec<TxId>, ChainError> {
        self.inner.fetch_transaction_ids_in_block(block_id)
    }

    fn save_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        self.inner.save_transaction(tx)
    }

    fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        self.inner.save_block(block)?;
        self.parents.lock().put(block.hash(), block.parent());
        Ok(())
    }

    fn save_utxo_snapshot(&self, block_id: &BlockId, utxo: &UtxoSet) -> Result<(), ChainError> {
        self.inner.save_utxo_snapshot(block_id, utxo)
    }

    fn save_connected_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        utxo: &UtxoSet,
    ) -> Result<(), ChainError> {
        self.inner.save_connected_block(block, transactions, utxo)?;
        self.parents.lock().put(block.hash(), block.parent());
        Ok(())
    }
}
