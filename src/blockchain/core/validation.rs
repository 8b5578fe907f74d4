use crate::error::ChainError;
use crate::transaction::Transaction;

pub fn validate_no_double_spend(transactions: &[Transaction]) -> Result<(), ChainError> {
    let mut seen_inputs = std::collections::HashMap::new();
    for tx in transactions {
        for input in tx.inputs() {
            if let Some(conflicting_tx_hash) = seen_inputs.get(input) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "UTXO {} is spent by both {} and {}",
                    input,
                    hex::encode(conflicting_tx_hash),
                    tx.hash_str()
                )));
            }
            seen_inputs.insert(*input, tx.hash());
        }
    }
    Ok(())
}
