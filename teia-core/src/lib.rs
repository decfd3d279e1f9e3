pub mod block;
pub mod chainstate;
pub mod cycle;
pub mod difficulty;
pub mod edges;
pub mod mempool;
pub mod miner;
pub mod params;
pub mod proof;
pub mod scratchpad;
pub mod script;
pub mod transaction;
pub mod trimmer;
pub mod verify;

// Re-exports principais
pub use block::{merkle_root, Block, BlockHeader};
pub use chainstate::{
    devnet_genesis, subsidy, BlockPolicy, ChainConfig, ChainNode, ChainState, ChainStats,
    ChainTip, SubmitResult,
};
pub use cycle::{find_cycle, forms_valid_cycle};
pub use difficulty::{
    compact_to_target, hash_meets_target, retarget_bits, target_to_compact, work_for_bits,
    BLOCKS_PER_ADJUSTMENT, MIN_DIFFICULTY_BITS, TARGET_BLOCK_SECONDS,
};
pub use edges::{Edge, EdgeGenerator};
pub use mempool::{Mempool, MempoolConfig, MempoolEntry, MempoolResult};
pub use miner::{BlockTemplate, Miner, MinerConfig, MiningResult};
pub use params::{GraphParams, CYCLE_LEN, EPOCH_LENGTH};
pub use proof::{Proof, HEADER_LEN, PROOF_LEN};
pub use scratchpad::Scratchpad;
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use trimmer::{trim_parallel, trim_reference};
pub use verify::Verifier;

// Re-exports de tipos compartilhados
pub use shared::{ChainError, Hash256, Result};
