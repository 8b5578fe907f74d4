use crate::blockchain::core::state::UtxoSet;
use crate::blockchain::core::validation::validate_no_double_spend;
use crate::error::ChainError;
use crate::persistence::Persistence;
use crate::transaction::{Transaction, TxId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

pub type Sha256Hash = [u8; 32];

/// Content-derived block identifier
pub type BlockId = Sha256Hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Back-reference to the parent; `None` only for genesis.
    pub previous_hash: Option<BlockId>,
    pub merkle_root: Sha256Hash,
    #[serde(default)]
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> BlockId {
        let mut hasher = Sha256::new();
        match &self.previous_hash {
            Some(parent) => {
                hasher.update([1u8]);
                hasher.update(parent);
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.merkle_root);
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}

/// A block as the mempool engine sees it: a parent link and the ordered ids
/// of the transactions it confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transaction_ids: Vec<TxId>,
}

impl Block {
    pub fn new(previous_hash: Option<BlockId>, transaction_ids: Vec<TxId>) -> Self {
        let merkle_root = Block::calculate_merkle_root(&transaction_ids);
        Block {
            header: BlockHeader {
                previous_hash,
                merkle_root,
                nonce: 0,
            },
            transaction_ids,
        }
    }

    pub fn genesis(transaction_ids: Vec<TxId>) -> Self {
        Block::new(None, transaction_ids)
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.header.nonce = nonce;
        self
    }

    pub fn hash(&self) -> BlockId {
        self.header.hash()
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.header.previous_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.header.previous_hash.is_none()
    }

    pub fn calculate_merkle_root(transaction_ids: &[TxId]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for txid in transaction_ids {
            hasher.update(txid);
        }
        hasher.finalize().into()
    }
}

/// Builds a block's UTXO snapshot from its parent's and stores the block, its
/// transactions and the snapshot.
///
/// `transactions` must be the block's transactions in block order. Nothing is
/// written unless every transaction applies cleanly.
pub fn connect_block(
    storage: &dyn Persistence,
    block: &Block,
    transactions: &[Transaction],
) -> Result<UtxoSet, ChainError> {
    if transactions.len() != block.transaction_ids.len() {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} lists {} transactions but {} were supplied",
            hex::encode(block.hash()),
            block.transaction_ids.len(),
            transactions.len()
        )));
    }

    for (expected, tx) in block.transaction_ids.iter().zip(transactions) {
        if *expected != tx.hash() {
            return Err(ChainError::InvalidBlock(format!(
                "Transaction mismatch. Expected {}, but got {}.",
                hex::encode(expected),
                tx.hash_str()
            )));
        }
    }

    if Block::calculate_merkle_root(&block.transaction_ids) != block.header.merkle_root {
        return Err(ChainError::InvalidBlock(format!(
            "Merkle root mismatch in block {}",
            hex::encode(block.hash())
        )));
    }

    validate_no_double_spend(transactions)?;

    let mut state = match block.parent() {
        Some(parent) => storage.fetch_utxo_snapshot(&parent)?,
        None => UtxoSet::new(),
    };

    for tx in transactions {
        tx.validate()?;
        state.apply_transaction(tx)?;
    }

    storage.save_connected_block(block, transactions, &state)?;
    debug!(
        block = %hex::encode(block.hash()),
        txs = transactions.len(),
        utxos = state.len(),
        "connected block"
    );

    Ok(state)
}
