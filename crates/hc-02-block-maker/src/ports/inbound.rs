//! Inbound ports (driving side - API)

use async_trait::async_trait;

use crate::config::NodeMode;
use crate::domain::TipStatus;
use crate::error::Result;

/// Primary port: Block maker service
#[async_trait]
pub trait BlockMakerService: Send + Sync {
    /// Records a new primary head and wakes the maker.
    fn handle_event(&self, tip: TipStatus);

    /// Spawns the production tasks.
    async fn start(&self) -> Result<()>;

    /// Stops the production tasks and waits for them. A halted maker cannot
    /// be started again.
    async fn halt(&self) -> Result<()>;

    fn status(&self) -> MakerStatus;
}

/// Production status snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MakerStatus {
    pub active: bool,
    pub mode: NodeMode,
    /// Height of the last primary head seen
    pub tip_height: u32,
    pub blocks_produced: u64,
    pub vacant_blocks: u64,
    /// Hashes per batch of the proof-of-work search
    pub hash_rate: u64,
}
