//! Mempool rebase engine - keeps pending transactions valid across chain tip changes
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Chain Model
//! - [`blockchain`] - Blocks, UTXO snapshots, ancestry resolution
//! - [`transaction`] - Transaction and outpoint types
//!
//! ## Mempool
//! - [`mempool`] - Pending transactions against a private UTXO snapshot
//! - [`rebase`] - Candidate pending set after a tip change
//! - [`node`] - Locked facade consumed by the networking layer
//!
//! ## Storage
//! - [`persistence`] - Storage accessor trait, SQLite and in-memory backends
//! - [`cache`] - LRU read-through cache over any backend
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Chain Model
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Mempool
// ============================================================================
pub mod mempool;
pub mod node;
pub mod rebase;

// ============================================================================
// Storage
// ============================================================================
pub mod cache;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
