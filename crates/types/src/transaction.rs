//! The signed transaction entity.
//!
//! A transaction targets a container image by hash and names a method with a
//! JSON payload. The transaction hash is bound over the canonical JSON with
//! both the hash and signature fields elided, so the signature can cover the
//! hash without chasing its own tail: `sign` binds the hash first, then
//! signs the raw 32-byte digest.

use crate::codec;
use crate::error::EntityError;
use crate::hashing;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// The only method interpreted by the mining core. Its payload is a JSON
/// array of strings: the invoked function name followed by its arguments.
pub const INVOKE_METHOD: &str = "c3_invokeMethod";

/// An Ed25519 signature framed as its two 32-byte halves, hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxSig {
    /// The first half of the 64-byte signature.
    pub r: String,
    /// The second half of the 64-byte signature.
    pub s: String,
}

/// The invocation fed to the sandbox: the parsed head and tail of an
/// invoke-method payload, re-serialized as `{"method":..,"params":..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodCall {
    /// The function name inside the container.
    pub method: String,
    /// The positional string arguments.
    pub params: Vec<String>,
}

/// A signed state-transition request against one container image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The content hash of the container image this transaction targets.
    pub image_hash: String,
    /// The method name. Only [`INVOKE_METHOD`] drives the sandbox.
    pub method: String,
    /// The opaque JSON payload; for invoke transactions, an array of strings.
    pub payload: serde_json::Value,
    /// The sender address: hex-encoded Ed25519 public key.
    pub from: String,
    /// The signature over the bound transaction hash, if signed.
    #[serde(rename = "txSig", skip_serializing_if = "Option::is_none")]
    pub sig: Option<TxSig>,
    /// The canonical hash, once bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl Transaction {
    /// Creates an unhashed, unsigned transaction.
    pub fn new(image_hash: &str, method: &str, payload: serde_json::Value, from: &str) -> Self {
        Self {
            image_hash: image_hash.to_string(),
            method: method.to_string(),
            payload,
            from: from.to_string(),
            sig: None,
            tx_hash: None,
        }
    }

    /// Computes the canonical hash: SHA-256 over the canonical JSON with the
    /// hash and signature fields elided.
    pub fn calc_hash(&self) -> Result<String, EntityError> {
        let unbound = Self {
            sig: None,
            tx_hash: None,
            ..self.clone()
        };
        Ok(hashing::hash_to_hex_string(&codec::to_canonical_json(
            &unbound,
        )?))
    }

    /// Binds the canonical hash onto the transaction.
    pub fn set_hash(&mut self) -> Result<(), EntityError> {
        self.tx_hash = Some(self.calc_hash()?);
        Ok(())
    }

    /// Returns the bound hash, or computes the canonical hash if unbound.
    pub fn hash(&self) -> Result<String, EntityError> {
        match &self.tx_hash {
            Some(h) => Ok(h.clone()),
            None => self.calc_hash(),
        }
    }

    /// Signs the bound hash with `key`, binding the hash first if needed.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), EntityError> {
        if self.tx_hash.is_none() {
            self.set_hash()?;
        }
        let digest = self.hash_digest()?;
        let sig = key.sign(&digest);
        let bytes = sig.to_bytes();
        self.sig = Some(TxSig {
            r: hex::encode(&bytes[..32]),
            s: hex::encode(&bytes[32..]),
        });
        Ok(())
    }

    /// Verifies that the bound hash matches the canonical hash and that the
    /// signature over it checks out against the `from` address.
    pub fn verify(&self) -> Result<(), EntityError> {
        let bound = self.tx_hash.clone().ok_or(EntityError::MissingHash)?;
        let expected = self.calc_hash()?;
        if bound != expected {
            return Err(EntityError::HashMismatch {
                expected,
                got: bound,
            });
        }

        let sig = self.sig.as_ref().ok_or(EntityError::MissingSignature)?;
        let mut raw = [0u8; 64];
        hex::decode_to_slice(format!("{}{}", sig.r, sig.s), &mut raw)
            .map_err(|_| EntityError::InvalidSignature)?;
        let signature = Signature::from_bytes(&raw);

        let key = verifying_key_from_address(&self.from)?;
        key.verify(&self.hash_digest()?, &signature)
            .map_err(|_| EntityError::InvalidSignature)
    }

    /// Parses an invoke payload into its function name and argument vector.
    pub fn parse_invoke_payload(&self) -> Result<MethodCall, EntityError> {
        let parsed: Vec<String> = serde_json::from_value(self.payload.clone())
            .map_err(|e| EntityError::InvalidPayload(e.to_string()))?;
        let (method, params) = parsed
            .split_first()
            .ok_or_else(|| EntityError::InvalidPayload("empty invoke payload".to_string()))?;
        Ok(MethodCall {
            method: method.clone(),
            params: params.to_vec(),
        })
    }

    fn hash_digest(&self) -> Result<[u8; 32], EntityError> {
        let hash = self.hash()?;
        let mut digest = [0u8; 32];
        hex::decode_to_slice(&hash, &mut digest).map_err(|_| EntityError::InvalidHex(hash))?;
        Ok(digest)
    }
}

/// Derives the transaction `from` address for a public key.
pub fn address_from_key(key: &VerifyingKey) -> String {
    hex::encode(key.to_bytes())
}

/// Decodes a transaction `from` address back into a public key.
pub fn verifying_key_from_address(address: &str) -> Result<VerifyingKey, EntityError> {
    let mut raw = [0u8; 32];
    hex::decode_to_slice(address, &mut raw)
        .map_err(|_| EntityError::InvalidAddress(address.to_string()))?;
    VerifyingKey::from_bytes(&raw).map_err(|_| EntityError::InvalidAddress(address.to_string()))
}
