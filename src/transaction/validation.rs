/// Stateless validation separated from type definitions
use crate::error::ChainError;
use crate::transaction::types::Transaction;
use std::collections::HashSet;

impl Transaction {
    /// Checks that need no UTXO state: size bound and no outpoint named twice.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.validate_size()?;

        let mut seen = HashSet::with_capacity(self.inputs().len());
        for input in self.inputs() {
            if !seen.insert(*input) {
                return Err(ChainError::DuplicateInput(*input));
            }
        }
        Ok(())
    }

    /// Mempool admission gate before UTXO membership is looked at.
    /// Coinbase transactions only ever enter the chain inside a block.
    pub fn validate_for_mempool(&self) -> Result<(), ChainError> {
        if self.is_coinbase() {
            return Err(ChainError::InvalidTransaction(format!(
                "Coinbase transaction {} cannot enter the mempool",
                self.hash_str()
            )));
        }
        self.validate()
    }
}
