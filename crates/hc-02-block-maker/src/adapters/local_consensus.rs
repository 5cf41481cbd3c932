//! Consensus engine over the local chain and this node's own secrets.
//!
//! The agreement is built from the shares of the delegates whose secrets
//! this node holds, so a single node producing for all its delegates
//! reaches the same ballot the chain verifies.

use std::sync::Arc;

use async_trait::async_trait;
use hc_01_consensus::domain::get_delegated_ballot;
use hc_01_consensus::{BlockChainApi, DelegateAgreement, PublishedShares, TimeSource};
use parking_lot::Mutex;
use shared_types::{Destination, Hash, TxType};

use crate::domain::{AgreementBlock, NextConsensus, SecretStore, WAIT_AGREEMENT_TIME_OFFSET};
use crate::error::{BlockMakerError, Result};
use crate::ports::ConsensusEngine;

pub struct LocalConsensus {
    chain: Arc<dyn BlockChainApi>,
    secrets: Arc<SecretStore>,
    clock: Arc<dyn TimeSource>,
    cached: Mutex<Option<AgreementBlock>>,
}

impl LocalConsensus {
    pub fn new(
        chain: Arc<dyn BlockChainApi>,
        secrets: Arc<SecretStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            chain,
            secrets,
            clock,
            cached: Mutex::new(None),
        }
    }

    fn compute_agreement(&self, prev: &Hash) -> Result<(DelegateAgreement, PublishedShares)> {
        let enrolled = self.chain.get_next_block_enrolled(prev)?;
        let shares = self.secrets.reveal(&enrolled);
        if shares.shares.is_empty() {
            return Ok((DelegateAgreement::default(), shares));
        }
        let agreement = shares.agreement();
        let ballot_set: Vec<Destination> = shares.shares.keys().copied().collect();
        let params = self.chain.params();
        let (ballot, _) =
            get_delegated_ballot(&params, &agreement, &ballot_set, &enrolled.vote_amounts);
        if ballot.is_empty() {
            return Ok((DelegateAgreement::default(), PublishedShares::default()));
        }
        Ok((
            DelegateAgreement {
                agreement,
                weight: shares.shares.len(),
                ballot,
            },
            shares,
        ))
    }
}

#[async_trait]
impl ConsensusEngine for LocalConsensus {
    async fn get_next_consensus(&self) -> Result<NextConsensus> {
        let genesis = self.chain.genesis_hash();
        let last = self.chain.get_fork_last(&genesis).ok_or_else(|| {
            BlockMakerError::AgreementUnavailable("primary chain is empty".to_string())
        })?;
        let next_time = self
            .chain
            .get_next_block_timestamp(&last.hash, TxType::Stake)
            .ok_or(BlockMakerError::NoSlotTime(last.hash))?;
        let now = i64::from(self.clock.now());
        let slot_wait = i64::from(next_time) - now;
        let ready_wait = slot_wait + WAIT_AGREEMENT_TIME_OFFSET;
        if ready_wait > 0 {
            return Ok(NextConsensus::Wait {
                prev: last.hash,
                prev_height: last.height,
                wait_time: ready_wait,
            });
        }

        let mut cached = self.cached.lock();
        if let Some(block) = cached.as_ref().filter(|b| b.prev == last.hash) {
            return Ok(NextConsensus::Ready(AgreementBlock {
                wait_time: slot_wait,
                ..block.clone()
            }));
        }

        let (agreement, shares) = self.compute_agreement(&last.hash)?;
        tracing::debug!(
            "[hc-02] Agreement after {} at {}: weight {}, pow {}",
            last.hash,
            last.height,
            agreement.weight,
            agreement.is_proof_of_work()
        );
        let block = AgreementBlock {
            prev: last.hash,
            prev_time: last.timestamp,
            prev_height: last.height,
            prev_number: last.number,
            prev_mint_type: last.mint_type,
            agreement,
            shares,
            wait_time: slot_wait,
        };
        *cached = Some(block.clone());
        Ok(NextConsensus::Ready(block))
    }
}
