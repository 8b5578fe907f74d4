use crate::blockchain::BlockId;
use crate::config::Config;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::persistence::Persistence;
use crate::rebase::MempoolRebaser;
use crate::transaction::{Transaction, TxId};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one tip change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseSummary {
    pub ancestor: BlockId,
    pub new_base: BlockId,
    pub rolled_back: usize,
    pub applied: usize,
    /// Pending transactions the new branch confirmed.
    pub confirmed: usize,
    /// Transactions returned from rolled-back blocks (before revalidation).
    pub orphaned: usize,
    /// Candidates that failed revalidation against the new tip.
    pub evicted: usize,
    pub pending: usize,
}

/// The mempool as seen by the networking layer.
///
/// Mutations (`submit_transaction`, `on_chain_tip_changed`) are serialized by
/// `writer`. Storage I/O for a tip change runs on a private copy with only
/// `writer` held, and the result is swapped in under a short write lock, so
/// readers never wait on storage and never see a half-applied state.
pub struct Node {
    storage: Arc<dyn Persistence>,
    rebaser: MempoolRebaser,
    mempool: RwLock<Mempool>,
    writer: Mutex<()>,
}

impl Node {
    /// A node whose mempool starts empty on top of `tip`.
    pub fn new(storage: Arc<dyn Persistence>, tip: BlockId, max_transactions: usize) -> Result<Self, ChainError> {
        let mempool = Mempool::load(storage.as_ref(), tip, max_transactions)?;
        info!(tip = %hex::encode(tip), max_transactions, "mempool ready");
        Ok(Self {
            rebaser: MempoolRebaser::new(storage.clone()),
            storage,
            mempool: RwLock::new(mempool),
            writer: Mutex::new(()),
        })
    }

    pub fn from_config(config: &Config, storage: Arc<dyn Persistence>, tip: BlockId) -> Result<Self, ChainError> {
        Self::new(storage, tip, config.mempool.max_transactions)
    }

    pub fn storage(&self) -> &dyn Persistence {
        self.storage.as_ref()
    }

    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        let _writer = self.writer.lock();
        self.mempool.write().try_add_tx(tx)
    }

    /// Moves the mempool from `old_tip` to `new_tip`.
    ///
    /// If `old_tip` is not the mempool's base, the move is made from the base
    /// instead and a warning is logged.
    ///
    /// On any error the mempool is left exactly as it was. A
    /// `NoCommonAncestor` error means the stored chain is inconsistent; the
    /// caller should stop rather than keep serving this mempool.
    pub fn on_chain_tip_changed(&self, old_tip: BlockId, new_tip: BlockId) -> Result<RebaseSummary, ChainError> {
        let _writer = self.writer.lock();

        let current = self.mempool.read().clone();
        // Pending transactions were validated against the base, not old_tip.
        let base = current.base_block_id();
        if base != old_tip {
            warn!(
                base = %hex::encode(base),
                old_tip = %hex::encode(old_tip),
                "tip change does not start from the mempool base, rebasing from the base"
            );
        }

        let plan = match self.rebaser.plan(&base, &new_tip, current.transactions().to_vec()) {
            Ok(plan) => plan,
            Err(e @ ChainError::NoCommonAncestor { .. }) => {
                error!(error = %e, "chain state inconsistent, mempool left untouched");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "mempool rebase failed, mempool left untouched");
                return Err(e);
            }
        };

        let snapshot = self.storage.fetch_utxo_snapshot(&new_tip)?;
        let mut next = current.with_candidates(plan.transactions);
        let evicted = next.rebase_onto(new_tip, snapshot);

        let summary = RebaseSummary {
            ancestor: plan.fork.ancestor,
            new_base: new_tip,
            rolled_back: plan.fork.old_branch.len(),
            applied: plan.fork.new_branch.len(),
            confirmed: plan.confirmed,
            orphaned: plan.orphaned,
            evicted: evicted.len(),
            pending: next.len(),
        };

        *self.mempool.write() = next;
        info!(
            new_base = %hex::encode(new_tip),
            pending = summary.pending,
            evicted = summary.evicted,
            "mempool rebased"
        );
        Ok(summary)
    }

    pub fn list_pending(&self) -> Vec<Transaction> {
        self.mempool.read().transactions().to_vec()
    }

    pub fn len(&self) -> usize {
        self.mempool.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mempool.read().is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.mempool.read().contains(txid)
    }

    pub fn base_block_id(&self) -> BlockId {
        self.mempool.read().base_block_id()
    }

    /// Consistent copy of the whole mempool state.
    pub fn snapshot(&self) -> Mempool {
        self.mempool.read().clone()
    }
}
