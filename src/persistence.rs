//! Storage accessor: content-addressed lookups of blocks, transactions and
//! per-block UTXO snapshots.

use crate::blockchain::{Block, BlockId, Sha256Hash, UtxoSet};
use crate::error::ChainError;
use crate::transaction::{Transaction, TxId};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Anything stored under a content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Object {
    Block(Block),
    Transaction(Transaction),
}

impl Object {
    pub fn id(&self) -> Sha256Hash {
        match self {
            Object::Block(block) => block.hash(),
            Object::Transaction(tx) => tx.hash(),
        }
    }
}

/// Abstraction for storage backends.
///
/// Reads are pure. A missing key is reported as `ChainError::NotFound`;
/// backend failures as `ChainError::Database`.
pub trait Persistence: Send + Sync {
    fn fetch_object(&self, id: &Sha256Hash) -> Result<Object, ChainError>;
    fn fetch_utxo_snapshot(&self, block_id: &BlockId) -> Result<UtxoSet, ChainError>;
    fn fetch_transaction(&self, id: &TxId) -> Result<Transaction, ChainError>;
    /// `Ok(None)` for genesis.
    fn fetch_block_parent(&self, id: &BlockId) -> Result<Option<BlockId>, ChainError>;
    fn fetch_transaction_ids_in_block(&self, block_id: &BlockId) -> Result<Vec<TxId>, ChainError>;

    fn save_transaction(&self, tx: &Transaction) -> Result<(), ChainError>;
    fn save_block(&self, block: &Block) -> Result<(), ChainError>;
    fn save_utxo_snapshot(&self, block_id: &BlockId, utxo: &UtxoSet) -> Result<(), ChainError>;

    /// Stores a block together with its transactions and resulting snapshot.
    /// Backends that can should make this atomic.
    fn save_connected_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        utxo: &UtxoSet,
    ) -> Result<(), ChainError> {
        for tx in transactions {
            self.save_transaction(tx)?;
        }
        self.save_block(block)?;
        self.save_utxo_snapshot(&block.hash(), utxo)
    }
}

fn to_hash(bytes: Vec<u8>) -> Result<Sha256Hash, ChainError> {
    if bytes.len() != 32 {
        return Err(ChainError::Database(format!(
            "Expected a 32-byte id, found {} bytes",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, ChainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, ChainError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                id BLOB PRIMARY KEY,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blocks (
                id BLOB PRIMARY KEY,
                parent_id BLOB
            );
            CREATE TABLE IF NOT EXISTS block_transactions (
                block_id BLOB NOT NULL,
                position INTEGER NOT NULL,
                txid BLOB NOT NULL,
                PRIMARY KEY (block_id, position)
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id BLOB PRIMARY KEY,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS utxos (
                block_id BLOB PRIMARY KEY,
                utxo TEXT NOT NULL
            );",
        )
        .map_err(|e| ChainError::Database(format!("Failed to create tables: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn insert_object(conn: &Connection, object: &Object) -> Result<(), ChainError> {
        let data = serde_json::to_string(object)?;
        conn.execute(
            "INSERT OR REPLACE INTO objects (id, data) VALUES (?1, ?2)",
            params![object.id().to_vec(), data],
        )
        .map_err(|e| ChainError::Database(format!("Failed to save object: {}", e)))?;
        Ok(())
    }

    fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<(), ChainError> {
        let data = serde_json::to_string(tx)?;
        conn.execute(
            "INSERT OR REPLACE INTO transactions (id, data) VALUES (?1, ?2)",
            params![tx.hash().to_vec(), data],
        )
        .map_err(|e| ChainError::Database(format!("Failed to save transaction: {}", e)))?;
        Self::insert_object(conn, &Object::Transaction(tx.clone()))
    }

    fn insert_block(conn: &Connection, block: &Block) -> Result<(), ChainError> {
        let id = block.hash().to_vec();
        conn.execute(
            "INSERT OR REPLACE INTO blocks (id, parent_id) VALUES (?1, ?2)",
            params![id, block.parent().map(|p| p.to_vec())],
        )
        .map_err(|e| ChainError::Database(format!("Failed to save block: {}", e)))?;

        conn.execute("DELETE FROM block_transactions WHERE block_id = ?1", params![id])
            .map_err(|e| ChainError::Database(format!("Failed to clear block transactions: {}", e)))?;
        for (position, txid) in block.transaction_ids.iter().enumerate() {
            conn.execute(
                "INSERT INTO block_transactions (block_id, position, txid) VALUES (?1, ?2, ?3)",
                params![id, position as i64, txid.to_vec()],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save block transaction: {}", e)))?;
        }

        Self::insert_object(conn, &Object::Block(block.clone()))
    }

    fn insert_utxo_snapshot(conn: &Connection, block_id: &BlockId, utxo: &UtxoSet) -> Result<(), ChainError> {
        let data = serde_json::to_string(utxo)?;
        conn.execute(
            "INSERT OR REPLACE INTO utxos (block_id, utxo) VALUES (?1, ?2)",
            params![block_id.to_vec(), data],
        )
        .map_err(|e| ChainError::Database(format!("Failed to save UTXO snapshot: {}", e)))?;
        Ok(())
    }
}

impl Persistence for Database {
    fn fetch_object(&self, id: &Sha256Hash) -> Result<Object, ChainError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row("SELECT data FROM objects WHERE id = ?1", params![id.to_vec()], |row| row.get(0))
            .optional()
            .map_err(|e| ChainError::Database(format!("Failed to query object: {}", e)))?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(ChainError::not_found("object", id)),
        }
    }

    fn fetch_utxo_snapshot(&self, block_id: &BlockId) -> Result<UtxoSet, ChainError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT utxo FROM utxos WHERE block_id = ?1",
                params![block_id.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::Database(format!("Failed to query UTXO snapshot: {}", e)))?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(ChainError::not_found("utxo snapshot", block_id)),
        }
    }

    fn fetch_transaction(&self, id: &TxId) -> Result<Transaction, ChainError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM transactions WHERE id = ?1",
                params![id.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::Database(format!("Failed to query transaction: {}", e)))?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(ChainError::not_found("transaction", id)),
        }
    }

    fn fetch_block_parent(&self, id: &BlockId) -> Result<Option<BlockId>, ChainError> {
        let conn = self.conn.lock();
        let row: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT parent_id FROM blocks WHERE id = ?1",
                params![id.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::Database(format!("Failed to query block: {}", e)))?;

        match row {
            Some(Some(parent)) => Ok(Some(to_hash(parent)?)),
            Some(None) => Ok(None),
            None => Err(ChainError::not_found("block", id)),
        }
    }

    fn fetch_transaction_ids_in_block(&self, block_id: &BlockId) -> Result<Vec<TxId>, ChainError> {
        let conn = self.conn.lock();
        let known: Option<i64> = conn
            .query_row("SELECT 1 FROM blocks WHERE id = ?1", params![block_id.to_vec()], |row| row.get(0))
            .optional()
            .map_err(|e| ChainError::Database(format!("Failed to query block: {}", e)))?;
        if known.is_none() {
            return Err(ChainError::not_found("block", block_id));
        }

        let mut stmt = conn
            .prepare("SELECT txid FROM block_transactions WHERE block_id = ?1 ORDER BY position ASC")
            .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params![block_id.to_vec()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| ChainError::Database(format!("Failed to query block transactions: {}", e)))?;

        let mut txids = Vec::new();
        for row in rows {
            let bytes = row.map_err(|e| ChainError::Database(format!("Failed to read row: {}", e)))?;
            txids.push(to_hash(bytes)?);
        }
        Ok(txids)
    }

    fn save_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        let mut conn = self.conn.lock();
        let db_tx = conn
            .transaction()
            .map_err(|e| ChainError::Database(format!("Failed to start transaction: {}", e)))?;
        Database::insert_transaction(&db_tx, tx)?;
        db_tx
            .commit()
            .map_err(|e| ChainError::Database(format!("Failed to commit transaction: {}", e)))
    }

    fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut conn = self.conn.lock();
        let db_tx = conn
            .transaction()
            .map_err(|e| ChainError::Database(format!("Failed to start transaction: {}", e)))?;
        Database::insert_block(&db_tx, block)?;
        db_tx
            .commit()
            .map_err(|e| ChainError::Database(format!("Failed to commit transaction: {}", e)))
    }

    fn save_utxo_snapshot(&self, block_id: &BlockId, utxo: &UtxoSet) -> Result<(), ChainError> {
        let conn = self.conn.lock();
        Database::insert_utxo_snapshot(&conn, block_id, utxo)
    }

    /// Atomically saves a block with its transactions and snapshot.
    fn save_connected_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        utxo: &UtxoSet,
    ) -> Result<(), ChainError> {
        let mut conn = self.conn.lock();
        let db_tx = conn
            .transaction()
            .map_err(|e| ChainError::Database(format!("Failed to start transaction: {}", e)))?;

        for tx in transactions {
            Database::insert_transaction(&db_tx, tx)?;
        }
        Database::insert_block(&db_tx, block)?;
        Database::insert_utxo_snapshot(&db_tx, &block.hash(), utxo)?;

        // Commit all changes atomically
        db_tx
            .commit()
            .map_err(|e| ChainError::Database(format!("Failed to commit transaction: {}", e)))
    }
}

#[derive(Default)]
struct MemoryTables {
    blocks: HashMap<BlockId, Block>,
    transactions: HashMap<TxId, Transaction>,
    utxos: HashMap<BlockId, UtxoSet>,
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    tables: Arc<RwLock<MemoryTables>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.tables.read().blocks.len()
    }
}

impl Persistence for InMemoryPersistence {
    fn fetch_object(&self, id: &Sha256Hash) -> Result<Object, ChainError> {
        let tables = self.tables.read();
        if let Some(block) = tables.blocks.get(id) {
            return Ok(Object::Block(block.clone()));
        }
        tables
            .transactions
            .get(id)
            .map(|tx| Object::Transaction(tx.clone()))
            .ok_or_else(|| ChainError::not_found("object", id))
    }

    fn fetch_utxo_snapshot(&self, block_id: &BlockId) -> Result<UtxoSet, ChainError> {
        self.tables
            .read()
            .utxos
            .get(block_id)
            .cloned()
            .ok_or_else(|| ChainError::not_found("utxo snapshot", block_id))
    }

    fn fetch_transaction(&self, id: &TxId) -> Result<Transaction, ChainError> {
        self.tables
            .read()
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::not_found("transaction", id))
    }

    fn fetch_block_parent(&self, id: &BlockId) -> Result<Option<BlockId>, ChainError> {
        self.tables
            .read()
            .blocks
            .get(id)
            .map(|block| block.parent())
            .ok_or_else(|| ChainError::not_found("block", id))
    }

    fn fetch_transaction_ids_in_block(&self, block_id: &BlockId) -> Result<Vec<TxId>, ChainError> {
        self.tables
            .read()
            .blocks
            .get(block_id)
            .map(|block| block.transaction_ids.clone())
            .ok_or_else(|| ChainError::not_found("block", block_id))
    }

    fn save_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        self.tables.write().transactions.insert(tx.hash(), tx.clone());
        Ok(())
    }

    fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        self.tables.write().blocks.insert(block.hash(), block.clone());
        Ok(())
    }

    fn save_utxo_snapshot(&self, block_id: &BlockId, utxo: &UtxoSet) -> Result<(), ChainError> {
        self.tables.write().utxos.insert(*block_id, utxo.clone());
        Ok(())
    }

    fn save_connected_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        utxo: &UtxoSet,
    ) -> Result<(), ChainError> {
        let mut tables = self.tables.write();
        for tx in transactions {
            tables.transactions.insert(tx.hash(), tx.clone());
        }
        let id = block.hash();
        tables.blocks.insert(id, block.clone());
        tables.utxos.insert(id, utxo.clone());
        Ok(())
    }
}
