//! A binary Merkle tree over content hashes.
//!
//! The miner commits the statechain blocks of one mainchain block by
//! Merkle-rooting their hashes. Callers supply leaves in the order they
//! want committed; the miner always sorts ascending first, so parallel and
//! sequential mining produce identical roots.

use caravel_types::hashing;
use caravel_types::mainchain::EMPTY_MERKLE_ROOT;
use serde::{Deserialize, Serialize};

/// The kind tag for trees over statechain block hashes.
pub const STATECHAIN_BLOCKS_KIND: &str = "statechainBlocks";

/// A fully materialized binary Merkle tree.
///
/// `levels[0]` holds the leaf hashes; each higher level hashes adjacent
/// pairs, promoting an odd trailing node unchanged. The root of a single
/// leaf is that leaf; the root of no leaves is the zero hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MerkleTree {
    /// What the leaves are hashes of.
    pub kind: String,
    /// Node hashes per level, leaves first.
    pub levels: Vec<Vec<String>>,
    /// The bound root hash.
    pub root: String,
}

/// Hashes two sibling node hashes into their parent.
fn hash_pair(left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len());
    joined.push_str(left);
    joined.push_str(right);
    hashing::hash_to_hex_string(joined.as_bytes())
}

/// Builds a tree over `hashes` in the order supplied.
pub fn build_from_hashes(hashes: &[String], kind: &str) -> MerkleTree {
    if hashes.is_empty() {
        return MerkleTree {
            kind: kind.to_string(),
            levels: Vec::new(),
            root: EMPTY_MERKLE_ROOT.to_string(),
        };
    }

    let mut levels: Vec<Vec<String>> = vec![hashes.to_vec()];
    while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
        let next = {
            let level = &levels[levels.len() - 1];
            let mut next = Vec::with_capacity(level.len() / 2 + 1);
            for pair in level.chunks(2) {
                match pair {
                    [left, right] => next.push(hash_pair(left, right)),
                    [odd] => next.push(odd.clone()),
                    _ => {}
                }
            }
            next
        };
        levels.push(next);
    }

    let root = levels
        .last()
        .and_then(|l| l.first())
        .cloned()
        .unwrap_or_else(|| EMPTY_MERKLE_ROOT.to_string());
    MerkleTree {
        kind: kind.to_string(),
        levels,
        root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| hashing::hash_to_hex_string(format!("leaf-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn empty_tree_roots_to_zero_hash() {
        let tree = build_from_hashes(&[], STATECHAIN_BLOCKS_KIND);
        assert_eq!(tree.root, EMPTY_MERKLE_ROOT);
        assert!(tree.levels.is_empty());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        let tree = build_from_hashes(&l, STATECHAIN_BLOCKS_KIND);
        assert_eq!(tree.root, l[0]);
    }

    #[test]
    fn odd_trailing_leaf_is_promoted() {
        let l = leaves(3);
        let tree = build_from_hashes(&l, STATECHAIN_BLOCKS_KIND);
        // Level 1: hash(l0, l1), l2 promoted; root: hash of those two.
        assert_eq!(tree.levels.len(), 3);
        assert_eq!(tree.levels[1][1], l[2]);
        assert_eq!(tree.root, hash_pair(&tree.levels[1][0], &l[2]));
    }

    #[test]
    fn root_depends_on_leaf_order() {
        let l = leaves(4);
        let mut reversed = l.clone();
        reversed.reverse();
        assert_ne!(
            build_from_hashes(&l, STATECHAIN_BLOCKS_KIND).root,
            build_from_hashes(&reversed, STATECHAIN_BLOCKS_KIND).root
        );
    }

    #[test]
    fn sorted_input_makes_the_commitment_deterministic() {
        let mut a = leaves(5);
        let mut b = a.clone();
        b.reverse();
        a.sort();
        b.sort();
        assert_eq!(
            build_from_hashes(&a, STATECHAIN_BLOCKS_KIND).root,
            build_from_hashes(&b, STATECHAIN_BLOCKS_KIND).root
        );
    }
}
