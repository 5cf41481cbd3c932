//! Mint reward schedules and reward batch sizing.

use std::collections::BTreeMap;

use shared_types::{
    encode, Amount, Block, BlockProof, BlockType, Destination, ForkProfile, Hash, TemplateId,
    TemplateType, Transaction, TxDataKey, TxType, H256, U256,
};

use super::delegate_verify::PublishedShares;
use crate::params::{bbcp_reward_init, ConsensusParams, MAX_BLOCK_SIZE, MAX_DELEGATE_THRESH};

/// Reward of the primary block following a block at `prev_height`.
pub fn primary_block_reward(params: &ConsensusParams, prev_height: u32) -> Amount {
    let halvings = (prev_height + 1) / params.halve_cycle().max(1);
    if halvings >= 256 {
        return Amount::zero();
    }
    bbcp_reward_init() >> halvings as usize
}

/// Reward of a fork block following a block at `prev_height`.
pub fn fork_block_reward(profile: &ForkProfile, prev_height: u32) -> Amount {
    if profile.halve_cycle == 0 {
        return profile.mint_reward;
    }
    let elapsed = (prev_height + 1).saturating_sub(profile.joint_height);
    let halvings = elapsed / profile.halve_cycle;
    if halvings >= 256 {
        return Amount::zero();
    }
    profile.mint_reward >> halvings as usize
}

/// Number of vote reward transactions that fit in one block.
///
/// Block budget minus a fully loaded empty block, divided by the largest
/// reward transaction; a 100 transaction margin is kept when there is room.
pub fn max_block_reward_tx_count() -> usize {
    let mut block = Block::new(BlockType::Primary, H256::repeat_byte(0xff), u32::MAX, u64::MAX);
    let shares = PublishedShares {
        shares: (0..MAX_DELEGATE_THRESH)
            .map(|i| {
                let dest = Destination::Template(TemplateId {
                    kind: TemplateType::Delegate,
                    id: H256::from_low_u64_be(i as u64),
                });
                (dest, H256::repeat_byte(0xff))
            })
            .collect(),
    };
    block.set_proof(BlockProof::Delegate(shares.to_proof()));
    block.mint_tx = Transaction {
        tx_type: TxType::Stake,
        fork: H256::repeat_byte(0xff),
        timestamp: u32::MAX,
        to: Destination::Template(TemplateId {
            kind: TemplateType::Delegate,
            id: H256::repeat_byte(0xff),
        }),
        amount: U256::MAX,
        data: BTreeMap::from([
            (TxDataKey::MintCoin, encode(&U256::MAX)),
            (TxDataKey::MintReward, encode(&U256::MAX)),
        ]),
        ..Default::default()
    };
    block.signature = vec![0xff; 64];
    let empty_size = block.serialized_size();

    let reward_tx = worst_case_reward_tx(H256::repeat_byte(0xff));
    let tx_size = reward_tx.serialized_size().max(1);

    let count = MAX_BLOCK_SIZE.saturating_sub(empty_size) / tx_size;
    if count > 100 {
        count - 100
    } else {
        count
    }
}

fn worst_case_reward_tx(fork: Hash) -> Transaction {
    let mut tx = Transaction {
        tx_type: TxType::VoteReward,
        fork,
        timestamp: u32::MAX,
        nonce: u64::MAX,
        to: Destination::Template(TemplateId {
            kind: TemplateType::Vote,
            id: H256::repeat_byte(0xff),
        }),
        amount: U256::MAX,
        ..Default::default()
    };
    tx.add_data(TxDataKey::VoteReward, encode(&U256::MAX));
    // Room for a vote template attachment: two destinations and a mode.
    tx.add_data(TxDataKey::TemplateData, vec![0xff; 160]);
    tx
}

/// Reward of a block in `params` terms for callers holding only the
/// profile of a non-primary fork.
pub fn block_reward_for(
    params: &ConsensusParams,
    fork_profile: Option<&ForkProfile>,
    prev_height: u32,
) -> Amount {
    match fork_profile {
        Some(profile) => fork_block_reward(profile, prev_height),
        None => primary_block_reward(params, prev_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::coin;

    #[test]
    fn test_primary_reward_halves() {
        let params = ConsensusParams::testnet();
        let cycle = params.halve_cycle();
        assert_eq!(primary_block_reward(&params, 0), bbcp_reward_init());
        assert_eq!(primary_block_reward(&params, cycle - 1), bbcp_reward_init() / 2);
        assert_eq!(primary_block_reward(&params, 2 * cycle - 1), bbcp_reward_init() / 4);
    }

    #[test]
    fn test_fork_reward_schedule() {
        let mut profile = ForkProfile {
            mint_reward: coin(8),
            halve_cycle: 0,
            joint_height: 100,
            ..Default::default()
        };
        assert_eq!(fork_block_reward(&profile, 5_000), coin(8));

        profile.halve_cycle = 10;
        assert_eq!(fork_block_reward(&profile, 100), coin(8));
        assert_eq!(fork_block_reward(&profile, 109), coin(4));
        assert_eq!(fork_block_reward(&profile, 129), coin(1));
    }

    #[test]
    fn test_reward_batch_size_is_positive() {
        let count = max_block_reward_tx_count();
        assert!(count > 100);
        assert!(count < MAX_BLOCK_SIZE);
    }
}
