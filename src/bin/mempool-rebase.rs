#![forbid(unsafe_code)]
//! Operator tool: inspect ancestry, snapshots and mempool rebases against a
//! SQLite chain store.

use clap::{Parser, Subcommand};
use mempool_rebase::blockchain::{find_common_ancestor, BlockId, UtxoSet};
use mempool_rebase::cache::CachedPersistence;
use mempool_rebase::config::load_config;
use mempool_rebase::mempool::Mempool;
use mempool_rebase::persistence::{Database, Object, Persistence};
use mempool_rebase::rebase::MempoolRebaser;
use mempool_rebase::transaction::TxId;
use std::sync::Arc;
use tracing::info;

fn parse_id(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex id: {}", e))?;
    if bytes.len() != 32 {
        return Err(format!("id must be 32 bytes, got {}", bytes.len()));
    }
    let mut id = [0u8; 32];
    id.copy_from_slice(&bytes);
    Ok(id)
}

#[derive(Parser)]
#[command(name = "mempool-rebase", version, about = "Inspect chain ancestry and mempool rebases")]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Overrides database.path from the configuration
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lowest common ancestor of two tips and the blocks on each side
    Ancestor {
        #[arg(value_parser = parse_id)]
        old_tip: BlockId,
        #[arg(value_parser = parse_id)]
        new_tip: BlockId,
    },
    /// Pending set after moving from OLD_TIP to NEW_TIP
    Rebase {
        #[arg(value_parser = parse_id)]
        old_tip: BlockId,
        #[arg(value_parser = parse_id)]
        new_tip: BlockId,
        /// Ids of the currently pending transactions, in admission order
        #[arg(value_parser = parse_id)]
        pending: Vec<TxId>,
    },
    /// UTXO snapshot stored for a block
    Utxo {
        #[arg(value_parser = parse_id)]
        block: BlockId,
    },
    /// Raw stored object (block or transaction) as JSON
    Object {
        #[arg(value_parser = parse_id)]
        id: BlockId,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.logging.tracing_level()?)
        .with_writer(std::io::stderr)
        .init();

    let db: Arc<dyn Persistence> = Arc::new(Database::open(&config.database.path)?);
    let storage: Arc<dyn Persistence> = if config.cache.enabled {
        Arc::new(CachedPersistence::new(
            db,
            config.cache.block_capacity,
            config.cache.transaction_capacity,
        ))
    } else {
        db
    };
    info!(path = %config.database.path, "opened chain store");

    match cli.command {
        Command::Ancestor { old_tip, new_tip } => {
            let fork = find_common_ancestor(storage.as_ref(), &old_tip, &new_tip)?;
            println!("ancestor {}", hex::encode(fork.ancestor));
            for id in &fork.old_branch {
                println!("  - {}", hex::encode(id));
            }
            for id in &fork.new_branch {
                println!("  + {}", hex::encode(id));
            }
        }
        Command::Rebase {
            old_tip,
            new_tip,
            pending,
        } => {
            let rebaser = MempoolRebaser::new(storage.clone());
            let candidates = rebaser.rebase_mempool(&old_tip, &new_tip, &pending)?;
            let snapshot = storage.fetch_utxo_snapshot(&new_tip)?;
            let mut mempool = Mempool::with_capacity(new_tip, UtxoSet::new(), config.mempool.max_transactions)
                .with_candidates(candidates);
            let evicted = mempool.rebase_onto(new_tip, snapshot);

            for tx in mempool.transactions() {
                println!("keep  {}", tx.hash_str());
            }
            for tx in &evicted {
                println!("evict {}", tx.hash_str());
            }
        }
        Command::Utxo { block } => {
            let snapshot = storage.fetch_utxo_snapshot(&block)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            println!("# {} outputs, total value {}", snapshot.len(), snapshot.total_value());
        }
        Command::Object { id } => {
            let object: Object = storage.fetch_object(&id)?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
    }

    Ok(())
}
