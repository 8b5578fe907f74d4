//! Pending transactions held against a private UTXO snapshot.
//!
//! The working snapshot is the confirmed UTXO set of the base block plus the
//! effects of every pending transaction, applied in admission order. A pending
//! transaction may therefore spend outputs of an earlier pending one.

use crate::blockchain::{BlockId, UtxoSet};
use crate::error::ChainError;
use crate::persistence::Persistence;
use crate::transaction::{Transaction, TxId};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Default maximum number of pending transactions.
pub const DEFAULT_MAX_TRANSACTIONS: usize = 5_000;

#[derive(Debug, Clone)]
pub struct Mempool {
    base_block_id: BlockId,
    utxo: UtxoSet,
    /// Admission order; later entries may depend on earlier ones.
    transactions: Vec<Transaction>,
    ids: HashSet<TxId>,
    max_transactions: usize,
}

impl Mempool {
    /// An empty mempool on top of `base_block_id`, whose confirmed UTXO set is
    /// `utxo`.
    pub fn new(base_block_id: BlockId, utxo: UtxoSet) -> Self {
        Self::with_capacity(base_block_id, utxo, DEFAULT_MAX_TRANSACTIONS)
    }

    pub fn with_capacity(base_block_id: BlockId, utxo: UtxoSet, max_transactions: usize) -> Self {
        Mempool {
            base_block_id,
            utxo,
            transactions: Vec::new(),
            ids: HashSet::new(),
            max_transactions,
        }
    }

    /// Loads the base block's snapshot from storage.
    pub fn load(storage: &dyn Persistence, base_block_id: BlockId, max_transactions: usize) -> Result<Self, ChainError> {
        let utxo = storage.fetch_utxo_snapshot(&base_block_id)?;
        Ok(Self::with_capacity(base_block_id, utxo, max_transactions))
    }

    pub fn base_block_id(&self) -> BlockId {
        self.base_block_id
    }

    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transaction_ids(&self) -> Vec<TxId> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.ids.contains(txid)
    }

    pub fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    /// Admits `tx` if every input is spendable from the working snapshot.
    /// On error nothing changes.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.validate_for_mempool()?;

        let txid = tx.hash();
        if self.ids.contains(&txid) {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} already in mempool",
                hex::encode(txid)
            )));
        }
        if self.transactions.len() >= self.max_transactions {
            return Err(ChainError::MempoolFull);
        }

        self.utxo.apply_transaction(&tx)?;
        self.ids.insert(txid);
        self.transactions.push(tx);
        Ok(())
    }

    pub fn try_add_tx(&mut self, tx: Transaction) -> bool {
        let txid = tx.hash_str();
        match self.add_transaction(tx) {
            Ok(()) => {
                debug!(tx = %txid, pending = self.transactions.len(), "admitted transaction");
                true
            }
            Err(e) => {
                debug!(tx = %txid, reason = %e, "rejected transaction");
                false
            }
        }
    }

    /// Rebases onto `new_base` using its stored snapshot.
    ///
    /// Returns false and leaves the mempool untouched when storage has no
    /// snapshot for `new_base` or the lookup fails.
    pub fn rebase_to_block(&mut self, storage: &dyn Persistence, new_base: BlockId) -> bool {
        match storage.fetch_utxo_snapshot(&new_base) {
            Ok(snapshot) => {
                self.rebase_onto(new_base, snapshot);
                true
            }
            Err(e) => {
                warn!(block = %hex::encode(new_base), error = %e, "cannot rebase mempool");
                false
            }
        }
    }

    /// Replaces base and snapshot, then re-validates the pending transactions
    /// in their original order. Each survivor is applied before the next one
    /// is checked. Returns the evicted transactions.
    ///
    /// The capacity limit is not applied here: orphaned transactions handed
    /// back by a reorg are kept even if that overfills the pool.
    pub fn rebase_onto(&mut self, new_base: BlockId, snapshot: UtxoSet) -> Vec<Transaction> {
        self.base_block_id = new_base;
        self.utxo = snapshot;
        self.ids.clear();

        let pending = std::mem::take(&mut self.transactions);
        let mut evicted = Vec::new();
        for tx in pending {
            let txid = tx.hash();
            if self.ids.contains(&txid) {
                continue;
            }
            match self.utxo.apply_transaction(&tx) {
                Ok(_) => {
                    self.ids.insert(txid);
                    self.transactions.push(tx);
                }
                Err(e) => {
                    debug!(tx = %hex::encode(txid), reason = %e, "evicted on rebase");
                    evicted.push(tx);
                }
            }
        }
        evicted
    }

    /// A copy of this mempool whose pending list is `candidates`. The copy
    /// still sits on the old snapshot; rebase it before use.
    pub fn with_candidates(&self, candidates: Vec<Transaction>) -> Mempool {
        let ids = candidates.iter().map(|tx| tx.hash()).collect();
        Mempool {
            base_block_id: self.base_block_id,
            utxo: self.utxo.clone(),
            transactions: candidates,
            ids,
            max_transactions: self.max_transactions,
        }
    }
}
