// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// block types, UTXO state, ancestry resolution and block validation.

pub mod core;
pub use core::*;
