use crate::error::ChainError;
use crate::transaction::{Outpoint, Transaction, TransactionOutput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of a serialized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub outpoint: Outpoint,
    pub output: TransactionOutput,
}

/// Spendable outputs keyed by outpoint.
///
/// Serialized as a list of entries sorted by outpoint, so equal sets always
/// produce equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UtxoEntry>", into = "Vec<UtxoEntry>")]
pub struct UtxoSet {
    utxos: HashMap<Outpoint, TransactionOutput>,
}

/// Outputs consumed by one `apply_transaction` call, in input order.
/// Hand it back to `undo_transaction` to reverse the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentOutputs(pub Vec<UtxoEntry>);

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn contains(&self, outpoint: &Outpoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &Outpoint) -> Option<&TransactionOutput> {
        self.utxos.get(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Outpoint, &TransactionOutput)> {
        self.utxos.iter()
    }

    pub fn insert(&mut self, outpoint: Outpoint, output: TransactionOutput) {
        self.utxos.insert(outpoint, output);
    }

    pub fn remove(&mut self, outpoint: &Outpoint) -> Result<TransactionOutput, ChainError> {
        self.utxos
            .remove(outpoint)
            .ok_or(ChainError::OutpointNotFound(*outpoint))
    }

    /// Errors on the first input of `tx` that cannot be spent from this set.
    pub fn check_inputs(&self, tx: &Transaction) -> Result<(), ChainError> {
        let mut seen = std::collections::HashSet::with_capacity(tx.inputs().len());
        for input in tx.inputs() {
            if !self.contains(input) {
                return Err(ChainError::MissingInput(*input));
            }
            if !seen.insert(*input) {
                return Err(ChainError::DuplicateInput(*input));
            }
        }
        Ok(())
    }

    /// Spends every input of `tx` and adds its outputs as `(tx.hash(), index)`.
    ///
    /// All inputs are checked before anything is touched; on error the set is
    /// unchanged.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<SpentOutputs, ChainError> {
        self.check_inputs(tx)?;

        let mut spent = Vec::with_capacity(tx.inputs().len());
        for input in tx.inputs() {
            let output = self.remove(input)?;
            spent.push(UtxoEntry {
                outpoint: *input,
                output,
            });
        }

        let txid = tx.hash();
        for (index, output) in tx.outputs().iter().enumerate() {
            self.insert(Outpoint::new(txid, index as u32), output.clone());
        }

        Ok(SpentOutputs(spent))
    }

    /// Reverses a prior `apply_transaction` of the same transaction.
    pub fn undo_transaction(
        &mut self,
        tx: &Transaction,
        spent: SpentOutputs,
    ) -> Result<(), ChainError> {
        let txid = tx.hash();
        for index in 0..tx.outputs().len() {
            let outpoint = Outpoint::new(txid, index as u32);
            if !self.contains(&outpoint) {
                // An output already spent further down the chain cannot be undone.
                return Err(ChainError::OutpointNotFound(outpoint));
            }
        }
        for index in 0..tx.outputs().len() {
            self.remove(&Outpoint::new(txid, index as u32))?;
        }
        for entry in spent.0 {
            self.insert(entry.outpoint, entry.output);
        }
        Ok(())
    }

    /// Sum of all output values, saturating at `u64::MAX`.
    pub fn total_value(&self) -> u64 {
        self.utxos
            .values()
            .fold(0u64, |total, output| total.saturating_add(output.value))
    }
}

impl From<Vec<UtxoEntry>> for UtxoSet {
    fn from(entries: Vec<UtxoEntry>) -> Self {
        UtxoSet {
            utxos: entries.into_iter().map(|e| (e.outpoint, e.output)).collect(),
        }
    }
}

impl From<UtxoSet> for Vec<UtxoEntry> {
    fn from(set: UtxoSet) -> Self {
        let mut entries: Vec<UtxoEntry> = set
            .utxos
            .into_iter()
            .map(|(outpoint, output)| UtxoEntry { outpoint, output })
            .collect();
        entries.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        entries
    }
}

impl FromIterator<(Outpoint, TransactionOutput)> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = (Outpoint, TransactionOutput)>>(iter: I) -> Self {
        UtxoSet {
            utxos: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> (UtxoSet, Outpoint) {
        let op = Outpoint::new([7u8; 32], 0);
        let mut set = UtxoSet::new();
        set.insert(op, TransactionOutput::new(100, "alice"));
        (set, op)
    }

    #[test]
    fn test_apply_spends_inputs_and_adds_outputs() {
        let (mut set, op) = funded();
        let tx = Transaction::new(
            vec![op],
            vec![TransactionOutput::new(60, "bob"), TransactionOutput::new(40, "alice")],
        );

        set.apply_transaction(&tx).unwrap();

        assert!(!set.contains(&op));
        assert_eq!(set.get(&tx.outpoint(0)).unwrap().value, 60);
        assert_eq!(set.get(&tx.outpoint(1)).unwrap().pubkey, "alice");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_apply_is_atomic_on_missing_input() {
        let (mut set, op) = funded();
        let missing = Outpoint::new([8u8; 32], 0);
        let tx = Transaction::new(vec![op, missing], vec![TransactionOutput::new(1, "bob")]);
        let before = set.clone();

        let result = set.apply_transaction(&tx);

        assert_eq!(result, Err(ChainError::MissingInput(missing)));
        assert_eq!(set, before);
    }

    #[test]
    fn test_apply_is_atomic_on_duplicate_input() {
        let (mut set, op) = funded();
        let tx = Transaction::new(vec![op, op], vec![TransactionOutput::new(200, "bob")]);
        let before = set.clone();

        assert_eq!(set.apply_transaction(&tx), Err(ChainError::DuplicateInput(op)));
        assert_eq!(set, before);
    }

    #[test]
    fn test_remove_missing_outpoint() {
        let mut set = UtxoSet::new();
        let op = Outpoint::new([1u8; 32], 4);
        assert_eq!(set.remove(&op), Err(ChainError::OutpointNotFound(op)));
    }

    #[test]
    fn test_undo_restores_previous_state() {
        let (mut set, op) = funded();
        let before = set.clone();
        let tx = Transaction::new(vec![op], vec![TransactionOutput::new(100, "bob")]);

        let spent = set.apply_transaction(&tx).unwrap();
        set.undo_transaction(&tx, spent).unwrap();

        assert_eq!(set, before);
    }

    #[test]
    fn test_undo_refuses_when_output_already_spent() {
        let (mut set, op) = funded();
        let tx = Transaction::new(vec![op], vec![TransactionOutput::new(100, "bob")]);
        let child = Transaction::new(vec![tx.outpoint(0)], vec![TransactionOutput::new(100, "carol")]);

        let spent = set.apply_transaction(&tx).unwrap();
        set.apply_transaction(&child).unwrap();
        let before = set.clone();

        assert_eq!(
            set.undo_transaction(&tx, spent),
            Err(ChainError::OutpointNotFound(tx.outpoint(0)))
        );
        assert_eq!(set, before);
    }

    #[test]
    fn test_json_snapshot_is_order_independent() {
        let a: UtxoSet = vec![
            (Outpoint::new([2u8; 32], 0), TransactionOutput::new(1, "x")),
            (Outpoint::new([1u8; 32], 5), TransactionOutput::new(2, "y")),
        ]
        .into_iter()
        .collect();
        let b: UtxoSet = vec![
            (Outpoint::new([1u8; 32], 5), TransactionOutput::new(2, "y")),
            (Outpoint::new([2u8; 32], 0), TransactionOutput::new(1, "x")),
        ]
        .into_iter()
        .collect();

        let json_a = serde_json::to_string(&a).unwrap();
        assert_eq!(json_a, serde_json::to_string(&b).unwrap());
        let back: UtxoSet = serde_json::from_str(&json_a).unwrap();
        assert_eq!(back, a);
        assert_eq!(back.total_value(), 3);
    }

    #[test]
    fn test_total_value_saturates() {
        let set: UtxoSet = vec![
            (Outpoint::new([1u8; 32], 0), TransactionOutput::new(u64::MAX, "x")),
            (Outpoint::new([2u8; 32], 0), TransactionOutput::new(5, "y")),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.total_value(), u64::MAX);
    }
}
