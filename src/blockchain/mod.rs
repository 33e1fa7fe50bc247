pub mod block;
pub mod model;

pub use block::Block;
pub use model::{Chain, ChainFault};

/// Difficulty of the genesis block mined at startup.
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// Payload of the startup genesis block.
pub const GENESIS_PAYLOAD: &str = "Genesis";

/// Throwaway digests computed when measuring this machine's hash rate.
pub const HASH_RATE_ROUNDS: u32 = 2_000_000;
