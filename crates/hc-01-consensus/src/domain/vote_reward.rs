//! Vote reward arithmetic.
//!
//! Pure functions over one distribution period. Chain walking and storage
//! access live in the service; everything here depends only on its
//! arguments, so the validator and the maker derive identical payouts.

use std::collections::BTreeMap;

use shared_types::{encode, Amount, Destination, Hash, Transaction, TxDataKey, TxType, COIN, U256};

use super::error::{ConsensusError, ConsensusResult};
use super::template::RewardMode;
use crate::params::MINT_REWARD_PER;

/// One voter's stake in a delegate at some height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteContext {
    pub vote_amount: Amount,
    pub reward_mode: RewardMode,
    pub owner: Destination,
    /// Share of its reward the voter keeps, out of `MINT_REWARD_PER`.
    pub reward_rate: u32,
}

/// All votes cast for one delegate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateVotes {
    pub voters: BTreeMap<Destination, VoteContext>,
    pub total: Amount,
}

/// Vote ledger of one height, keyed by delegate.
pub type DayVoteSnapshot = BTreeMap<Destination, DelegateVotes>;

/// Reward minted at one height by a stake block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcBlock {
    pub primary_block: Hash,
    pub dest_mint: Destination,
    /// Delegate commission, out of `MINT_REWARD_PER`.
    pub reward_ratio: u32,
    pub reward_amount: Amount,
}

/// Accumulated payouts of a period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardDistribution {
    /// voter -> (recipient, amount)
    pub per_voter: BTreeMap<Destination, (Destination, Amount)>,
    /// Pledge surplus: proof-of-work rewards and shaved voter shares.
    pub surplus: Amount,
    pub foundation: Amount,
}

fn ratio_of(amount: Amount, ratio: u32) -> Amount {
    amount * U256::from(ratio) / U256::from(MINT_REWARD_PER)
}

/// Splits the reward of one height among the voters of its minter.
pub fn distribute_height(
    calc: &CalcBlock,
    votes: Option<&DelegateVotes>,
    foundation_ratio: u32,
    out: &mut RewardDistribution,
) {
    let Some(votes) = votes else {
        return;
    };
    let mut reward = calc.reward_amount;
    if reward.is_zero() || votes.total.is_zero() {
        return;
    }
    if foundation_ratio != 0 {
        let skim = ratio_of(reward, foundation_ratio);
        out.foundation = out.foundation.saturating_add(skim);
        reward -= skim;
    }
    if calc.reward_ratio != 0 {
        reward -= ratio_of(reward, calc.reward_ratio);
    }

    let mut distributed = Amount::zero();
    let mut first_voter = None;
    for (voter, ctx) in &votes.voters {
        if ctx.vote_amount.is_zero() {
            continue;
        }
        first_voter.get_or_insert(*voter);
        let share = reward * ctx.vote_amount / votes.total;
        let kept = if ctx.reward_rate >= MINT_REWARD_PER {
            share
        } else {
            ratio_of(share, ctx.reward_rate)
        };
        out.surplus = out.surplus.saturating_add(share - kept);
        distributed = distributed.saturating_add(share);

        let recipient = match ctx.reward_mode {
            RewardMode::Vote => *voter,
            RewardMode::Owner => ctx.owner,
        };
        let entry = out
            .per_voter
            .entry(*voter)
            .or_insert((recipient, Amount::zero()));
        entry.0 = recipient;
        entry.1 = entry.1.saturating_add(kept);
    }

    if reward > distributed {
        if let Some(first) = first_voter {
            if let Some(entry) = out.per_voter.get_mut(&first) {
                entry.1 = entry.1.saturating_add(reward - distributed);
            }
        }
    }
}

/// Invite relation of one address on a fork.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteContext {
    /// Inviter, null for a root address.
    pub parent: Destination,
    /// Where invite rewards earned by this address are paid.
    pub reward: Destination,
    pub vote_amount: Amount,
}

/// Whole-coin balance range whose invite power is boosted by half.
const INVITE_BOOST_RANGE: std::ops::RangeInclusive<u64> = 50..=200;

fn whole_coins(amount: Amount) -> u64 {
    let coins = amount / U256::from(COIN);
    if coins > U256::from(u64::MAX) {
        u64::MAX
    } else {
        coins.low_u64()
    }
}

/// Splits `total` among inviters by the power of their invitees.
///
/// An invitee contributes the smaller of its own and its inviter's vote, in
/// whole coins, boosted to 3/2 inside `INVITE_BOOST_RANGE`. Rounding dust
/// goes to the first paid inviter in key order.
pub fn calc_invite_reward(
    relations: &BTreeMap<Destination, InviteContext>,
    total: Amount,
) -> BTreeMap<Destination, Amount> {
    let mut powers: BTreeMap<Destination, (u64, Destination)> = BTreeMap::new();
    let mut total_power = U256::zero();
    for sub in relations.values() {
        if sub.parent.is_null() {
            continue;
        }
        let Some(parent) = relations.get(&sub.parent) else {
            continue;
        };
        if parent.reward.is_null() {
            continue;
        }
        let balance = whole_coins(sub.vote_amount).min(whole_coins(parent.vote_amount));
        if balance == 0 {
            continue;
        }
        let power = if INVITE_BOOST_RANGE.contains(&balance) {
            balance * 3 / 2
        } else {
            balance
        };
        let entry = powers.entry(sub.parent).or_insert((0, parent.reward));
        entry.0 = entry.0.saturating_add(power);
        total_power += U256::from(power);
    }

    let mut out: BTreeMap<Destination, Amount> = BTreeMap::new();
    let mut paid = Amount::zero();
    let mut first = None;
    for (power, reward) in powers.values() {
        if *power == 0 {
            continue;
        }
        let amount = total * U256::from(*power) / total_power;
        out.insert(*reward, amount);
        paid = paid.saturating_add(amount);
        first.get_or_insert(*reward);
    }
    if first.is_none() && !total.is_zero() {
        first = powers.values().next().map(|(_, reward)| *reward);
    }
    if let Some(first) = first {
        if paid < total {
            let entry = out.entry(first).or_default();
            *entry = entry.saturating_add(total - paid);
        }
    }
    out
}

/// Total reward and vote share credited to one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientReward {
    pub total: Amount,
    pub vote_reward: Amount,
}

/// Aggregates voter payouts per recipient and adds invite rewards and the
/// function-address buckets. Invite rewards count toward the total only.
pub fn aggregate_rewards(
    distribution: &RewardDistribution,
    invite: &BTreeMap<Destination, Amount>,
    surplus_address: Destination,
    foundation_address: Destination,
) -> BTreeMap<Destination, RecipientReward> {
    let mut rewards: BTreeMap<Destination, RecipientReward> = BTreeMap::new();
    for (recipient, amount) in distribution.per_voter.values() {
        if amount.is_zero() {
            continue;
        }
        let r = rewards.entry(*recipient).or_default();
        r.total = r.total.saturating_add(*amount);
        r.vote_reward = r.vote_reward.saturating_add(*amount);
    }
    for (recipient, amount) in invite {
        if amount.is_zero() {
            continue;
        }
        let r = rewards.entry(*recipient).or_default();
        r.total = r.total.saturating_add(*amount);
    }

    let mut surplus = distribution.surplus;
    if foundation_address.is_null() {
        surplus = surplus.saturating_add(distribution.foundation);
    } else if !distribution.foundation.is_zero() {
        let r = rewards.entry(foundation_address).or_default();
        r.total = r.total.saturating_add(distribution.foundation);
    }
    if !surplus_address.is_null() && !surplus.is_zero() {
        let r = rewards.entry(surplus_address).or_default();
        r.total = r.total.saturating_add(surplus);
    }
    rewards
}

/// Packs recipient rewards into batches of `batch_size` reward transactions.
///
/// Transactions carry timestamp 0; the block that delivers a batch stamps
/// them with its own time and attaches any template data its chain lacks.
/// `check_recipient` rejects recipients that may not be paid.
pub fn build_reward_batches(
    fork: Hash,
    rewards: &BTreeMap<Destination, RecipientReward>,
    batch_size: usize,
    mut check_recipient: impl FnMut(&Destination) -> ConsensusResult<()>,
) -> ConsensusResult<Vec<Vec<Transaction>>> {
    if rewards.is_empty() {
        return Ok(Vec::new());
    }
    if batch_size == 0 {
        return Err(ConsensusError::BlockTransactionsInvalid(
            "reward batch size is zero".to_string(),
        ));
    }

    let mut batches: Vec<Vec<Transaction>> = Vec::with_capacity(rewards.len().div_ceil(batch_size));
    for (i, (to, reward)) in rewards.iter().enumerate() {
        let mut tx = Transaction {
            tx_type: TxType::VoteReward,
            fork,
            timestamp: 0,
            nonce: i as u64,
            to: *to,
            amount: reward.total,
            ..Default::default()
        };
        check_recipient(to)?;
        tx.add_data(TxDataKey::VoteReward, encode(&reward.vote_reward));
        if i % batch_size == 0 {
            batches.push(Vec::with_capacity(batch_size));
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(tx);
        }
    }
    Ok(batches)
}
