//! The diff entity: one textual patch between two state snapshots.

use crate::codec;
use crate::error::EntityError;
use crate::hashing;
use serde::{Deserialize, Serialize};

/// A textual unified patch carrying the change between two state snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// The unified-format patch text.
    pub data: String,
    /// The canonical hash, once bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_hash: Option<String>,
}

impl Diff {
    /// Creates an unhashed diff around `data`.
    pub fn new(data: String) -> Self {
        Self {
            data,
            diff_hash: None,
        }
    }

    /// Computes the canonical hash over the patch text.
    pub fn calc_hash(&self) -> Result<String, EntityError> {
        let unbound = Self {
            data: self.data.clone(),
            diff_hash: None,
        };
        Ok(hashing::hash_to_hex_string(&codec::to_canonical_json(
            &unbound,
        )?))
    }

    /// Binds the canonical hash onto the diff.
    pub fn set_hash(&mut self) -> Result<(), EntityError> {
        self.diff_hash = Some(self.calc_hash()?);
        Ok(())
    }

    /// Returns the bound hash, or computes the canonical hash if unbound.
    pub fn hash(&self) -> Result<String, EntityError> {
        match &self.diff_hash {
            Some(h) => Ok(h.clone()),
            None => self.calc_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_binds_over_data_only() {
        let mut d = Diff::new("--- a\n+++ b\n".to_string());
        d.set_hash().unwrap();
        assert_eq!(d.diff_hash.clone().unwrap(), d.calc_hash().unwrap());

        let unbound = Diff::new("--- a\n+++ b\n".to_string());
        assert_eq!(unbound.hash().unwrap(), d.hash().unwrap());
    }

    #[test]
    fn hex_framing_round_trips() {
        let mut d = Diff::new("@@ -1 +1 @@\n-a\n+b\n".to_string());
        d.set_hash().unwrap();
        let s = codec::serialize_string(&d).unwrap();
        assert_eq!(codec::deserialize_string::<Diff>(&s).unwrap(), d);
    }
}
