use std::time::Instant;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::HASH_RATE_ROUNDS;
use super::block::{Block, meets_difficulty};

/// First inconsistency found when validating a chain, lowest index wins.
/// A failed validation is a normal outcome, not a panic: callers branch on it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainFault {
    #[error("invalid proof of work at block {index}: hash does not begin with {difficulty} zero(s)")]
    InvalidProofOfWork { index: usize, difficulty: u32 },

    #[error("broken parent link at block {index}: previousHash does not match the predecessor")]
    BrokenParentLink { index: usize },

    #[error("stale chain head hash: cached hash does not match the last block")]
    StaleChainHash,
}

/// In-memory ledger: an ordered run of blocks chained by hash pointers, plus
/// a cached hash of the head block.
#[derive(Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    chain_hash: String, // hash of the most recently appended/repaired block
    hash_rate: u64,     // measured hashes/second, informational only
}

impl Chain {
    /// Create an empty chain. The caller appends the genesis block.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            chain_hash: String::new(),
            hash_rate: 0,
        }
    }

    /// Append a block: point it at the current chain head (empty string for
    /// the genesis block), mine it, and cache its hash as the new head.
    pub fn add_block(&mut self, mut block: Block) -> &Block {
        block.previous_hash = self.chain_hash.clone();
        self.chain_hash = block.proof_of_work();
        self.blocks.push(block);
        self.blocks.last().expect("block was just pushed")
    }

    /// Validate the whole chain in index order and report the first
    /// violation: every block's own proof-of-work, every parent link, and
    /// finally the cached head hash.
    pub fn validate(&self) -> Result<(), ChainFault> {
        for (i, block) in self.blocks.iter().enumerate() {
            let hash = block.hash();
            if !meets_difficulty(&hash, block.difficulty) {
                return Err(ChainFault::InvalidProofOfWork {
                    index: i,
                    difficulty: block.difficulty,
                });
            }
            if i > 0 && block.previous_hash != self.blocks[i - 1].hash() {
                return Err(ChainFault::BrokenParentLink { index: i });
            }
        }
        if let Some(last) = self.blocks.last() {
            if self.chain_hash != last.hash() {
                return Err(ChainFault::StaleChainHash);
            }
        }
        Ok(())
    }

    /// Repair the chain in place after tampering: re-mine the genesis block
    /// against its empty parent pointer, then walk the rest of the chain
    /// re-linking each block to its predecessor's fresh hash and re-running
    /// its proof-of-work. Payloads, indices, timestamps and difficulties are
    /// never touched, and nonces are not reset: each search continues from
    /// the residual value left by the previous mining run.
    ///
    /// Afterwards `validate()` always reports success.
    pub fn repair(&mut self) {
        if self.blocks.is_empty() {
            return;
        }
        let genesis = &mut self.blocks[0];
        genesis.previous_hash.clear();
        self.chain_hash = genesis.proof_of_work();

        for i in 1..self.blocks.len() {
            let parent_hash = self.blocks[i - 1].hash();
            let block = &mut self.blocks[i];
            block.previous_hash = parent_hash;
            self.chain_hash = block.proof_of_work();
        }
    }

    /// Measure this machine's hash throughput: a fixed number of throwaway
    /// digests over a constant input, divided by elapsed wall-clock time.
    /// Shares no state with the block list.
    pub fn compute_hash_rate(&mut self) {
        let start = Instant::now();
        for _ in 0..HASH_RATE_ROUNDS {
            let mut hasher = Sha256::new();
            hasher.update(b"00000000");
            let _ = hasher.finalize();
        }
        let elapsed = start.elapsed().as_secs_f64();
        self.hash_rate = (f64::from(HASH_RATE_ROUNDS) / elapsed) as u64;
    }

    pub fn hash_rate(&self) -> u64 {
        self.hash_rate
    }

    /// Cached hash of the chain head; empty string while the chain is empty.
    pub fn chain_hash(&self) -> &str {
        &self.chain_hash
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Bounds-checked block access.
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Mutable bounds-checked access, used by the corruption scenario to
    /// rewrite a payload behind the chain's back.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of all blocks' difficulties.
    pub fn total_difficulty(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.difficulty)).sum()
    }

    /// Expected number of hash attempts to mine the whole chain from
    /// scratch: sum over blocks of 16^difficulty.
    pub fn total_expected_hashes(&self) -> f64 {
        self.blocks
            .iter()
            .map(|b| 16f64.powi(b.difficulty as i32))
            .sum()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain renders as the ordered sequence of its block records.
impl Serialize for Chain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.blocks.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::{Chain, ChainFault};
    use crate::blockchain::Block;
    use num_bigint::BigUint;

    fn chain_of(payloads: &[&str], difficulty: u32) -> Chain {
        let mut chain = Chain::new();
        for (i, payload) in payloads.iter().enumerate() {
            chain.add_block(Block::new(i as u64, payload.to_string(), difficulty));
            assert_eq!(chain.validate(), Ok(()));
        }
        chain
    }

    #[test]
    fn empty_chain_is_vacuously_valid() {
        let chain = Chain::new();
        assert_eq!(chain.validate(), Ok(()));
        assert_eq!(chain.chain_hash(), "");
        assert!(chain.latest_block().is_none());
        assert!(chain.block(0).is_none());
        assert!(chain.is_empty());
    }

    #[test]
    fn append_links_blocks_and_caches_head_hash() {
        let chain = chain_of(&["Genesis", "pay Alice 10", "pay Bob 5"], 2);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.blocks()[0].previous_hash, "");
        assert_eq!(chain.blocks()[1].previous_hash, chain.blocks()[0].hash());
        assert_eq!(chain.blocks()[2].previous_hash, chain.blocks()[1].hash());
        assert_eq!(chain.chain_hash(), chain.blocks()[2].hash());
    }

    #[test]
    fn corrupt_genesis_then_repair() {
        let mut chain = chain_of(&["Genesis"], 2);

        chain.block_mut(0).expect("genesis exists").payload = "Hacked".into();
        assert!(chain.validate().is_err());

        chain.repair();
        assert_eq!(chain.validate(), Ok(()));
        let genesis = chain.block(0).expect("genesis exists");
        assert_eq!(genesis.payload, "Hacked");
        assert_eq!(genesis.previous_hash, "");
        assert_eq!(genesis.difficulty, 2);
    }

    #[test]
    fn corrupt_middle_block_detected_at_first_affected_index() {
        let mut chain = chain_of(&["Genesis", "pay Alice 10", "pay Bob 5"], 2);
        let block0_before = chain.blocks()[0].clone();

        chain.block_mut(1).expect("block 1 exists").payload = "pay Mallory 999".into();

        // Either block 1's own proof-of-work breaks, or (if its new hash is
        // coincidentally prefix-valid) block 2's parent link breaks.
        match chain.validate() {
            Err(ChainFault::InvalidProofOfWork { index: 1, .. })
            | Err(ChainFault::BrokenParentLink { index: 2 }) => {}
            other => panic!("unexpected validation result: {other:?}"),
        }

        chain.repair();
        assert_eq!(chain.validate(), Ok(()));
        assert_eq!(chain.blocks()[0].payload, "Genesis");
        assert_eq!(chain.blocks()[1].payload, "pay Mallory 999");
        assert_eq!(chain.blocks()[2].payload, "pay Bob 5");
        // Block 0 was already valid; repair re-mines it in place but its
        // content hash is unchanged.
        assert_eq!(chain.blocks()[0].hash(), block0_before.hash());
        assert_eq!(chain.blocks()[0].nonce, block0_before.nonce);
    }

    #[test]
    fn broken_parent_pointer_reported_at_lowest_index() {
        let mut chain = chain_of(&["Genesis", "pay Alice 10", "pay Bob 5"], 0);
        chain.block_mut(1).expect("block 1 exists").previous_hash = "deadbeef".into();

        // Difficulty 0 keeps every proof-of-work trivially valid, so the
        // first violation is exactly the rewritten pointer.
        assert_eq!(
            chain.validate(),
            Err(ChainFault::BrokenParentLink { index: 1 })
        );
    }

    #[test]
    fn stale_head_hash_detected() {
        let mut chain = chain_of(&["Genesis", "pay Alice 10"], 0);
        // At difficulty 0 a payload rewrite keeps the proof-of-work and the
        // stored parent links valid; only the cached head hash goes stale.
        chain.block_mut(1).expect("block 1 exists").payload = "pay Mallory 999".into();
        assert_eq!(chain.validate(), Err(ChainFault::StaleChainHash));

        chain.repair();
        assert_eq!(chain.validate(), Ok(()));
    }

    #[test]
    fn repair_continues_nonce_from_residual_value() {
        let mut chain = chain_of(&["Genesis"], 2);
        chain.block_mut(0).expect("genesis exists").payload = "Hacked".into();
        let residual = chain.blocks()[0].nonce.clone();

        chain.repair();
        // The search resumes from the residual nonce instead of restarting
        // at zero, so the repaired value can never be smaller.
        assert!(chain.blocks()[0].nonce >= residual);
        assert_eq!(chain.validate(), Ok(()));
    }

    #[test]
    fn repair_survives_repeated_tampering() {
        let mut chain = chain_of(&["Genesis", "a", "b"], 1);
        for (index, payload) in [(0, "x"), (2, "y"), (1, "z")] {
            chain.block_mut(index).expect("block exists").payload = payload.into();
        }
        chain.repair();
        assert_eq!(chain.validate(), Ok(()));
        assert_eq!(chain.blocks()[0].payload, "x");
        assert_eq!(chain.blocks()[1].payload, "z");
        assert_eq!(chain.blocks()[2].payload, "y");
    }

    #[test]
    fn aggregate_statistics() {
        let empty = Chain::new();
        assert_eq!(empty.total_difficulty(), 0);
        assert_eq!(empty.total_expected_hashes(), 0.0);

        let genesis_only = chain_of(&["Genesis"], 2);
        assert_eq!(genesis_only.total_difficulty(), 2);
        assert_eq!(genesis_only.total_expected_hashes(), 256.0);

        let chain = chain_of(&["Genesis", "a", "b"], 2);
        assert_eq!(chain.total_difficulty(), 6);
        assert_eq!(chain.total_expected_hashes(), 768.0);
    }

    #[test]
    fn chain_serializes_as_ordered_record_sequence() {
        let chain = chain_of(&["Genesis", "pay Alice 10"], 1);
        let v = serde_json::to_value(&chain).expect("serialize chain");
        let records = v.as_array().expect("chain renders as an array");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["tx"], "Genesis");
        assert_eq!(records[0]["previousHash"], "");
        assert_eq!(records[1]["index"], 1);
        assert_eq!(records[1]["tx"], "pay Alice 10");
    }

    #[test]
    fn hash_rate_measurement_is_positive() {
        let mut chain = Chain::new();
        assert_eq!(chain.hash_rate(), 0);
        chain.compute_hash_rate();
        assert!(chain.hash_rate() > 0);
    }

    #[test]
    fn validate_tolerates_oversized_difficulty() {
        let mut chain = Chain::new();
        // Force an impossible difficulty onto an already mined block; the
        // scan must fail the block, not panic on a short prefix.
        chain.add_block(Block::new(0, "Genesis".into(), 0));
        chain.block_mut(0).expect("genesis exists").difficulty = 65;
        assert!(matches!(
            chain.validate(),
            Err(ChainFault::InvalidProofOfWork { index: 0, .. })
        ));
    }

    #[test]
    fn mined_nonce_is_plain_counter_growth() {
        let mut chain = Chain::new();
        chain.add_block(Block::new(0, "Genesis".into(), 1));
        // Expected 16 attempts at difficulty 1; the nonce stays small but is
        // carried as an unbounded integer.
        assert!(chain.blocks()[0].nonce < BigUint::from(100_000u32));
    }
}
