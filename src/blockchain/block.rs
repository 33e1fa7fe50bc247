use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A single block in the ledger holding one transaction payload.
///
/// Fields are public on purpose: tampering (mutating `payload` behind the
/// chain's back) is a first-class scenario here, not an accident to prevent.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub index: u64,
    #[serde(serialize_with = "timestamp_as_string")]
    pub timestamp: DateTime<Utc>, // captured at construction, opaque
    #[serde(rename = "tx")]
    pub payload: String,
    #[serde(rename = "previousHash")]
    pub previous_hash: String, // content-addressed parent pointer, "" for genesis
    #[serde(serialize_with = "nonce_as_number")]
    pub nonce: BigUint,
    pub difficulty: u32,
}

impl Block {
    /// Create a new block (not mined yet, parent pointer unset).
    /// The chain sets `previous_hash` and mines the block on append.
    pub fn new(index: u64, payload: String, difficulty: u32) -> Self {
        Self {
            index,
            timestamp: Utc::now(),
            payload,
            previous_hash: String::new(),
            nonce: BigUint::zero(),
            difficulty,
        }
    }

    /// Compute the SHA-256 hash of this block over all six fields,
    /// concatenated in their display form. Returns the lowercase hex
    /// encoding of the 32-byte digest (64 characters).
    pub fn hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}{}",
            self.index,
            self.timestamp_string(),
            self.payload,
            self.previous_hash,
            self.nonce,
            self.difficulty
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Perform Proof-of-Work: increment `nonce` from its current value until
    /// the block's hash carries `difficulty` leading hex zeros, and return
    /// the accepted hash.
    ///
    /// The search is exhaustive and unbounded; expected cost is
    /// 16^difficulty attempts. A difficulty of 0 accepts the current nonce
    /// immediately.
    pub fn proof_of_work(&mut self) -> String {
        let mut hash = self.hash();
        while !meets_difficulty(&hash, self.difficulty) {
            self.nonce += 1u32;
            hash = self.hash();
        }
        hash
    }

    /// The timestamp rendering used both as hash input and for display.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

/// Check a hash against a difficulty: its first `difficulty` characters must
/// all be '0'. A difficulty beyond the hash length can never be satisfied
/// and fails cleanly rather than slicing out of range.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let prefix = difficulty as usize;
    hash.len() >= prefix && hash.as_bytes()[..prefix].iter().all(|&b| b == b'0')
}

fn timestamp_as_string<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

/// Serialize the nonce as an arbitrary-precision JSON number so very large
/// search results never truncate to a fixed-width integer.
fn nonce_as_number<S: Serializer>(nonce: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    let number: serde_json::Number = nonce
        .to_string()
        .parse()
        .map_err(serde::ser::Error::custom)?;
    number.serialize(serializer)
}
