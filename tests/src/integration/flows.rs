//! # Production Flows
//!
//! Nodes run their real tasks on tokio's paused clock:
//!
//! 1. **Mining**: a miner node grows the primary chain while the delegate
//!    enrolls through CERT transactions from the pool
//! 2. **Delegated hand-over**: once the enrollment window fills, the
//!    delegate node takes over the primary chain
//! 3. **Fork production**: a side fork created mid-way gets a subsidiary
//!    block under every later primary block

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hc_01_consensus::BlockChainApi;
    use hc_02_block_maker::{BlockMakerError, BlockMakerService, NodeMode};
    use shared_types::{BlockType, TxType};

    use crate::integration::fixtures::{
        delegate_config, init_tracing, miner_config, RecordingDispatcher, TestNetwork,
        GENESIS_TIME,
    };

    const LIMIT: Duration = Duration::from_secs(600);

    // =============================================================================
    // MINING
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_miner_grows_chain_and_enrolls_delegate() -> anyhow::Result<()> {
        init_tracing();
        let net = TestNetwork::new()?;
        let dispatcher = Arc::new(RecordingDispatcher::new(net.chain.clone()));
        let miner = net.node(miner_config(), dispatcher)?;
        let delegate = net.node(
            delegate_config(),
            Arc::new(RecordingDispatcher::new(net.chain.clone())),
        )?;

        miner.start().await?;
        let head = net.run_until_height(&delegate, 6, LIMIT).await?;
        miner.halt().await?;

        assert_eq!(head.mint_type, TxType::Work);
        assert_eq!(head.timestamp, GENESIS_TIME + 60);
        assert_eq!(miner.metrics().blocks_produced(), 6);
        assert!(miner.metrics().pow_hashes() > 0);

        // Six certs went into six blocks; the window now names the delegate.
        let enrolled = net.chain.get_block_delegate_enrolled(&head.hash)?;
        assert!(enrolled.enroll_data.contains_key(&net.delegate));
        assert_eq!(net.secrets.len(), 6);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted_miner_stays_quiet() -> anyhow::Result<()> {
        init_tracing();
        let net = TestNetwork::new()?;
        let miner = net.node(
            miner_config(),
            Arc::new(RecordingDispatcher::new(net.chain.clone())),
        )?;
        let delegate = net.node(
            delegate_config(),
            Arc::new(RecordingDispatcher::new(net.chain.clone())),
        )?;

        miner.start().await?;
        let head = net.run_until_height(&delegate, 2, LIMIT).await?;
        miner.halt().await?;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(net.head()?.hash, head.hash);
        assert!(!miner.status().active);
        assert!(matches!(miner.start().await, Err(BlockMakerError::Halted)));
        Ok(())
    }

    // =============================================================================
    // DELEGATED HAND-OVER AND FORKS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_delegate_takes_over_and_feeds_fork() -> anyhow::Result<()> {
        init_tracing();
        let net = TestNetwork::new()?;
        let miner = net.node(
            miner_config(),
            Arc::new(RecordingDispatcher::new(net.chain.clone())),
        )?;
        let dispatcher = Arc::new(RecordingDispatcher::new(net.chain.clone()));
        let delegate = net.node(delegate_config(), dispatcher.clone())?;

        miner.start().await?;
        let h9 = net.run_until_height(&delegate, 9, LIMIT).await?;
        miner.halt().await?;
        assert_eq!(h9.mint_type, TxType::Work);

        delegate.start().await?;
        let h11 = net.run_until_height(&delegate, 11, LIMIT).await?;
        let h10 = net.chain.get_block_index(&h11.prev).expect("h10 indexed");
        assert_eq!(h10.mint_type, TxType::Stake);
        assert_eq!(h10.dest_mint, net.delegate);
        assert_eq!(h10.timestamp, h9.timestamp + 10);

        let fork = net.add_origin(&h10, h11.timestamp)?;
        let h13 = net.run_until_height(&delegate, 13, LIMIT).await?;
        delegate.halt().await?;

        let status = delegate.status();
        assert_eq!(status.mode, NodeMode::Common);
        assert!(status.tip_height >= 13);

        let fork_head = net.chain.get_fork_last(&fork).expect("fork head");
        assert!(fork_head.is_subsidiary());
        assert!(fork_head.height >= 13);
        assert_eq!(fork_head.mint_type, TxType::Stake);
        assert_eq!(fork_head.dest_mint, net.delegate);
        assert!(net.chain.get_block_index(&fork_head.ref_block).is_some());
        assert!(h13.height <= net.head()?.height);

        assert!(dispatcher.count(BlockType::Primary) >= 4);
        assert!(dispatcher.count(BlockType::Subsidiary) >= 2);
        assert_eq!(dispatcher.count(BlockType::Vacant), 0);
        Ok(())
    }
}
