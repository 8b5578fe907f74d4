/// Transaction types for the mempool engine
use crate::blockchain::Sha256Hash;
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Content-derived transaction identifier
pub type TxId = Sha256Hash;

/// Reference to one output of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: TxId,
    pub index: u32,
}

impl Outpoint {
    pub fn new(txid: TxId, index: u32) -> Self {
        Outpoint { txid, index }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

/// A spendable unit of value. `pubkey` is the spending condition; it is
/// carried but never evaluated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub pubkey: String,
}

impl TransactionOutput {
    pub fn new(value: u64, pubkey: impl Into<String>) -> Self {
        TransactionOutput {
            value,
            pubkey: pubkey.into(),
        }
    }
}

/// An immutable transaction: the outpoints it consumes and the outputs it
/// creates. Output `i` becomes spendable as `Outpoint(self.hash(), i)`.
///
/// A transaction without inputs is a coinbase; `nonce` keeps two coinbases
/// paying the same outputs apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    inputs: Vec<Outpoint>,
    outputs: Vec<TransactionOutput>,
    #[serde(default)]
    nonce: u64,
}

impl Transaction {
    pub fn new(inputs: Vec<Outpoint>, outputs: Vec<TransactionOutput>) -> Self {
        Transaction {
            inputs,
            outputs,
            nonce: 0,
        }
    }

    pub fn coinbase(outputs: Vec<TransactionOutput>, nonce: u64) -> Self {
        Transaction {
            inputs: Vec::new(),
            outputs,
            nonce,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn inputs(&self) -> &[Outpoint] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Outpoint of this transaction's `index`-th output.
    pub fn outpoint(&self, index: u32) -> Outpoint {
        Outpoint::new(self.hash(), index)
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    /// Calculate the hash of this transaction
    pub fn hash(&self) -> TxId {
        let mut hasher = Sha256::new();
        hasher.update("transaction".as_bytes());
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.txid);
            hasher.update(input.index.to_le_bytes());
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update((output.pubkey.len() as u64).to_le_bytes());
            hasher.update(output.pubkey.as_bytes());
        }
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(self)
            .map_err(|e| ChainError::InvalidTransaction(format!("Serialization failed: {}", e)))?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}
