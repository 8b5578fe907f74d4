//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
// validation module kept internal; only types are re-exported publicly

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;

    fn funding_tx() -> Transaction {
        Transaction::coinbase(vec![TransactionOutput::new(50, "alice")], 0)
    }

    #[test]
    fn test_hash_is_content_derived() {
        let a = funding_tx();
        let b = funding_tx();
        assert_eq!(a.hash(), b.hash());

        let c = funding_tx().with_nonce(1);
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_hash_depends_on_inputs_and_outputs() {
        let parent = funding_tx();
        let spend = Transaction::new(
            vec![parent.outpoint(0)],
            vec![TransactionOutput::new(50, "bob")],
        );
        let other_recipient = Transaction::new(
            vec![parent.outpoint(0)],
            vec![TransactionOutput::new(50, "carol")],
        );
        let other_input = Transaction::new(
            vec![parent.outpoint(1)],
            vec![TransactionOutput::new(50, "bob")],
        );

        assert_ne!(spend.hash(), other_recipient.hash());
        assert_ne!(spend.hash(), other_input.hash());
    }

    #[test]
    fn test_outpoint_equality_is_structural() {
        let txid = funding_tx().hash();
        assert_eq!(Outpoint::new(txid, 0), Outpoint::new(txid, 0));
        assert_ne!(Outpoint::new(txid, 0), Outpoint::new(txid, 1));

        let mut set = std::collections::HashSet::new();
        set.insert(Outpoint::new(txid, 0));
        assert!(set.contains(&Outpoint::new(txid, 0)));
    }

    #[test]
    fn test_outpoint_display() {
        let op = Outpoint::new([0xab; 32], 3);
        assert_eq!(op.to_string(), format!("{}:3", "ab".repeat(32)));
    }

    #[test]
    fn test_coinbase_detection() {
        assert!(funding_tx().is_coinbase());
        let spend = Transaction::new(
            vec![funding_tx().outpoint(0)],
            vec![TransactionOutput::new(10, "bob")],
        );
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn test_coinbase_rejected_for_mempool() {
        let result = funding_tx().validate_for_mempool();
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let op = funding_tx().outpoint(0);
        let tx = Transaction::new(vec![op, op], vec![TransactionOutput::new(100, "bob")]);
        assert_eq!(tx.validate(), Err(ChainError::DuplicateInput(op)));
    }

    #[test]
    fn test_oversized_transaction_rejected() {
        let huge = "x".repeat(MAX_TRANSACTION_SIZE + 1);
        let tx = Transaction::new(
            vec![funding_tx().outpoint(0)],
            vec![TransactionOutput::new(1, huge)],
        );
        match tx.validate_for_mempool() {
            Err(ChainError::InvalidTransaction(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected InvalidTransaction error, got {:?}", other),
        }
    }

    #[test]
    fn test_serde_roundtrip_keeps_id() {
        let tx = Transaction::new(
            vec![funding_tx().outpoint(0)],
            vec![TransactionOutput::new(20, "bob"), TransactionOutput::new(30, "alice")],
        );
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.hash(), back.hash());
    }
}
