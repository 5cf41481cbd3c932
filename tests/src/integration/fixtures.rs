//! Shared setup for the end-to-end flows.
//!
//! One chain, one pool and one secret store are shared by every node a
//! flow starts, as if the nodes were perfectly connected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use hc_01_consensus::params::MIN_GAS_PRICE;
use hc_01_consensus::{
    BlockChain, BlockChainApi, BlockChainDependencies, BlockChainUpdate, BlockIndex,
    ConsensusParams, ConsensusResult, InMemoryBlockContainer, TemplateKind, TimeSource,
};
use hc_02_block_maker::{
    AgreementBlock, BlockDispatcher, BlockMaker, BlockMakerConfig, BlockMakerDependencies,
    ChainDispatcher, DelegateProfileConfig, InMemoryTxPool, LocalConsensus, LocalWorkService,
    PowProfileConfig, SecretStore,
};
use parking_lot::Mutex;
use primitive_types::U256;
use shared_types::crypto::{public_key_of, signing_key_from_seed};
use shared_types::{
    coin, Block, BlockProof, BlockType, CertData, Destination, ForkProfile, Hash, Transaction,
    TxDataKey, TxType,
};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

pub const GENESIS_TIME: u32 = 1_600_000_000;

const DELEGATE_SEED: [u8; 32] = [7u8; 32];
const OWNER_SEED: [u8; 32] = [8u8; 32];

/// Chain time following tokio's clock, so paused tests run in virtual time.
#[derive(Clone, Copy)]
pub struct TokioClock {
    base: u32,
    start: Instant,
}

impl TokioClock {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            start: Instant::now(),
        }
    }
}

impl TimeSource for TokioClock {
    fn now(&self) -> u32 {
        self.base + self.start.elapsed().as_secs() as u32
    }
}

/// Dispatcher recording the type of every block it admitted.
pub struct RecordingDispatcher {
    inner: ChainDispatcher,
    admitted: Mutex<Vec<BlockType>>,
}

impl RecordingDispatcher {
    pub fn new(chain: Arc<dyn BlockChainApi>) -> Self {
        Self {
            inner: ChainDispatcher::new(chain),
            admitted: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self, block_type: BlockType) -> usize {
        self.admitted.lock().iter().filter(|t| **t == block_type).count()
    }
}

#[async_trait]
impl BlockDispatcher for RecordingDispatcher {
    async fn add_new_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate> {
        let update = self.inner.add_new_block(block).await?;
        self.admitted.lock().push(block.block_type);
        Ok(update)
    }

    async fn set_consensus(&self, agreement: &AgreementBlock) {
        self.inner.set_consensus(agreement).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn delegate_template() -> TemplateKind {
    TemplateKind::Delegate {
        delegate: public_key_of(&signing_key_from_seed(&DELEGATE_SEED)),
        owner: Destination::PubKey(public_key_of(&signing_key_from_seed(&OWNER_SEED))),
        reward_ratio: 500,
    }
}

/// Config of a node producing for the test delegate.
pub fn delegate_config() -> BlockMakerConfig {
    BlockMakerConfig {
        delegates: vec![DelegateProfileConfig {
            key_seed: hex::encode(DELEGATE_SEED),
            owner: Destination::PubKey(public_key_of(&signing_key_from_seed(&OWNER_SEED))),
            reward_ratio: 500,
        }],
        ..Default::default()
    }
}

/// Config of a node that only mines, with a random key.
pub fn miner_config() -> BlockMakerConfig {
    BlockMakerConfig {
        pow: Some(PowProfileConfig {
            key_seed: hex::encode(rand::random::<[u8; 32]>()),
            use_template: false,
        }),
        ..Default::default()
    }
}

pub struct TestNetwork {
    pub chain: Arc<BlockChain<InMemoryBlockContainer>>,
    pub pool: Arc<InMemoryTxPool>,
    pub secrets: Arc<SecretStore>,
    pub clock: TokioClock,
    pub genesis: Hash,
    pub delegate: Destination,
    owner_key: SigningKey,
}

impl TestNetwork {
    /// Genesis minted to the delegate at `GENESIS_TIME`, with the clock
    /// starting there.
    pub fn new() -> anyhow::Result<Self> {
        let params = Arc::new(ConsensusParams::testnet());
        let delegate = delegate_template();
        let container = Arc::new(InMemoryBlockContainer::new(params.clone()));
        container.register_template(&delegate);

        let owner = delegate.destination();
        let mut genesis_block = Block::new(BlockType::Genesis, Hash::zero(), GENESIS_TIME, 0);
        genesis_block.mint_tx = Transaction {
            tx_type: TxType::Genesis,
            timestamp: GENESIS_TIME,
            to: owner,
            amount: coin(1_000_000),
            ..Default::default()
        };
        genesis_block.set_proof(BlockProof::Profile(ForkProfile {
            name: "hybrid".into(),
            symbol: "HC".into(),
            chain_id: 1,
            amount: coin(1_000_000),
            owner,
            ..Default::default()
        }));
        let genesis = genesis_block.hash();

        let clock = TokioClock::new(GENESIS_TIME);
        let chain = Arc::new(
            BlockChain::new(BlockChainDependencies {
                container,
                params,
                genesis,
            })
            .with_time_source(Box::new(clock)),
        );
        chain.insert_genesis_block(&genesis_block)?;

        Ok(Self {
            pool: Arc::new(InMemoryTxPool::new(chain.clone())),
            chain,
            secrets: Arc::new(SecretStore::new()),
            clock,
            genesis,
            delegate: delegate.destination(),
            owner_key: signing_key_from_seed(&OWNER_SEED),
        })
    }

    /// A node on the shared chain, dispatching through `dispatcher`.
    pub fn node(
        &self,
        config: BlockMakerConfig,
        dispatcher: Arc<dyn BlockDispatcher>,
    ) -> anyhow::Result<BlockMaker> {
        let maker = BlockMaker::new(
            config,
            BlockMakerDependencies {
                chain: self.chain.clone(),
                consensus: Arc::new(LocalConsensus::new(
                    self.chain.clone(),
                    self.secrets.clone(),
                    Arc::new(self.clock),
                )),
                tx_pool: self.pool.clone(),
                dispatcher,
                work: Arc::new(LocalWorkService::new(self.chain.clone(), self.pool.clone())),
                clock: Arc::new(self.clock),
            },
        )?;
        Ok(maker)
    }

    pub fn head(&self) -> anyhow::Result<BlockIndex> {
        self.chain
            .get_fork_last(&self.genesis)
            .context("primary chain has no head")
    }

    fn cert_tx(&self, nonce: u64, cert: CertData) -> Transaction {
        let mut tx = Transaction {
            tx_type: TxType::Cert,
            fork: self.genesis,
            timestamp: GENESIS_TIME,
            nonce,
            from: self.delegate,
            to: self.delegate,
            gas_price: U256::from(MIN_GAS_PRICE),
            gas_limit: 100_000,
            ..Default::default()
        };
        tx.add_data(TxDataKey::CertData, cert.encode());
        tx.sign(&self.owner_key);
        tx
    }

    /// Queues the CERT of every delegate of `node` for the block at `height`.
    pub fn enroll(&self, node: &BlockMaker, height: u32) {
        for (_, cert) in node.enroll_delegates(&self.secrets, height) {
            self.pool.push(self.cert_tx(u64::from(height), cert));
        }
    }

    /// Lets virtual time run until the primary head reaches `height`,
    /// enrolling the delegates of `enroller` for each next block.
    pub async fn run_until_height(
        &self,
        enroller: &BlockMaker,
        height: u32,
        limit: Duration,
    ) -> anyhow::Result<BlockIndex> {
        let deadline = Instant::now() + limit;
        let mut enrolled = 0u32;
        loop {
            let head = self.head()?;
            if head.height >= height {
                return Ok(head);
            }
            if enrolled < head.height + 1 {
                enrolled = head.height + 1;
                self.enroll(enroller, enrolled);
            }
            if Instant::now() >= deadline {
                bail!("head stuck at {} waiting for {}", head.height, height);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Side fork off `parent`, timed like the primary block after it.
    pub fn add_origin(&self, parent: &BlockIndex, time: u32) -> anyhow::Result<Hash> {
        let owner = Destination::PubKey(public_key_of(&self.owner_key));
        let mut origin = Block::new(BlockType::Origin, parent.hash, time, parent.number + 1);
        origin.mint_tx = Transaction {
            tx_type: TxType::Genesis,
            timestamp: time,
            to: owner,
            amount: coin(100),
            ..Default::default()
        };
        origin.set_proof(BlockProof::Profile(ForkProfile {
            name: "side".into(),
            symbol: "SD".into(),
            chain_id: 2,
            amount: coin(100),
            mint_reward: coin(1),
            parent: self.genesis,
            owner,
            joint_height: parent.height + 1,
            ..Default::default()
        }));
        origin.sign(&self.owner_key);
        self.chain.add_new_origin(&origin)?;
        Ok(origin.hash())
    }
}
