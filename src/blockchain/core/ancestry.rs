//! Lowest-common-ancestor search over the block tree held in storage.
//!
//! Both tips are walked toward genesis one parent at a time, alternating
//! sides. Each side remembers the ids it has visited; the first id one side
//! reaches that the other has already seen is the lowest common ancestor.

use crate::blockchain::core::chain::BlockId;
use crate::error::ChainError;
use crate::persistence::Persistence;
use std::collections::HashMap;
use tracing::{debug, error};

/// Result of resolving two tips against each other.
///
/// `old_branch` / `new_branch` hold the blocks after `ancestor` up to and
/// including the respective tip, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFork {
    pub ancestor: BlockId,
    pub old_branch: Vec<BlockId>,
    pub new_branch: Vec<BlockId>,
}

impl ChainFork {
    /// One tip is an ancestor of (or equal to) the other.
    pub fn is_linear(&self) -> bool {
        self.old_branch.is_empty() || self.new_branch.is_empty()
    }
}

/// One side of the walk.
struct Walk {
    /// Visited ids, tip first.
    path: Vec<BlockId>,
    depth_of: HashMap<BlockId, usize>,
    at_genesis: bool,
}

impl Walk {
    fn new(tip: BlockId) -> Self {
        let mut depth_of = HashMap::new();
        depth_of.insert(tip, 0);
        Walk {
            path: vec![tip],
            depth_of,
            at_genesis: false,
        }
    }

    fn head(&self) -> BlockId {
        self.path[self.path.len() - 1]
    }

    /// Moves one block toward genesis. Returns the newly visited id, or
    /// `None` once the walk sits on genesis.
    fn step(&mut self, storage: &dyn Persistence) -> Result<Option<BlockId>, ChainError> {
        if self.at_genesis {
            return Ok(None);
        }
        match storage.fetch_block_parent(&self.head())? {
            Some(parent) => {
                if self.depth_of.contains_key(&parent) {
                    return Err(ChainError::InvalidBlock(format!(
                        "Parent cycle detected at block {}",
                        hex::encode(parent)
                    )));
                }
                self.depth_of.insert(parent, self.path.len());
                self.path.push(parent);
                Ok(Some(parent))
            }
            None => {
                self.at_genesis = true;
                Ok(None)
            }
        }
    }

    /// Blocks strictly below `depth`, oldest first.
    fn branch_below(&self, depth: usize) -> Vec<BlockId> {
        self.path[..depth].iter().rev().copied().collect()
    }
}

/// Finds the lowest common ancestor of `old_tip` and `new_tip`.
///
/// Unknown blocks surface as `NotFound`. Two walks that both end at genesis
/// without meeting mean the store holds more than one root, which is reported
/// as `NoCommonAncestor`.
pub fn find_common_ancestor(
    storage: &dyn Persistence,
    old_tip: &BlockId,
    new_tip: &BlockId,
) -> Result<ChainFork, ChainError> {
    let mut old = Walk::new(*old_tip);
    let mut new = Walk::new(*new_tip);

    // Both tips must exist even when they are equal.
    storage.fetch_block_parent(old_tip)?;
    if old_tip != new_tip {
        storage.fetch_block_parent(new_tip)?;
    }

    // (depth on the old walk, depth on the new walk) of the meeting block.
    let meeting = if old_tip == new_tip {
        Some((0, 0))
    } else {
        loop {
            if let Some(id) = old.step(storage)? {
                if let Some(&depth) = new.depth_of.get(&id) {
                    break Some((old.path.len() - 1, depth));
                }
            }
            if let Some(id) = new.step(storage)? {
                if let Some(&depth) = old.depth_of.get(&id) {
                    break Some((depth, new.path.len() - 1));
                }
            }
            if old.at_genesis && new.at_genesis {
                break None;
            }
        }
    };

    let (old_depth, new_depth) = match meeting {
        Some(found) => found,
        None => {
            error!(
                old_tip = %hex::encode(old_tip),
                new_tip = %hex::encode(new_tip),
                "chain tips share no ancestor"
            );
            return Err(ChainError::NoCommonAncestor {
                tip_a: hex::encode(old_tip),
                tip_b: hex::encode(new_tip),
            });
        }
    };

    let fork = ChainFork {
        ancestor: old.path[old_depth],
        old_branch: old.branch_below(old_depth),
        new_branch: new.branch_below(new_depth),
    };
    debug!(
        ancestor = %hex::encode(fork.ancestor),
        rolled_back = fork.old_branch.len(),
        applied = fork.new_branch.len(),
        "resolved common ancestor"
    );
    Ok(fork)
}
