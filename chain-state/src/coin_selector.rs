//! Selects a subset of a wallet's outpoints to fund a payment, computing the
//! implied fee and change.

use chain_types::{amount::Amount, transparent::OutPoint};
use rand::seq::SliceRandom;

use crate::error::{Result, StateError};

/// An outpoint paired with the value of the UTXO it references; this is all
/// coin selection needs to know about a candidate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Candidate {
    pub outpoint: OutPoint,
    pub value: Amount,
}

/// Which order candidates are tried in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    LargestFirst,
    SmallestFirst,
    Random,
    /// Declared by the original design but unimplemented there; this
    /// implementation keeps that behavior and dispatches to `LargestFirst`.
    /// A future branch-and-bound search can replace this arm without
    /// changing the public API.
    BranchAndBound,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Selection {
    pub selected: Vec<OutPoint>,
    pub total_value: Amount,
    pub fee: Amount,
    pub change: Amount,
}

/// Estimated serialized size, in bytes, of a transaction with `num_inputs`
/// P2PKH inputs and `num_outputs` outputs.
pub fn estimate_transaction_size(num_inputs: usize, num_outputs: usize) -> usize {
    10 + 148 * num_inputs + 34 * num_outputs
}

/// Fee for a transaction of `tx_size` bytes at `fee_rate` (base units per kB).
pub fn calculate_fee(tx_size: usize, fee_rate: Amount) -> Amount {
    Amount::try_new((tx_size as u64 * fee_rate.as_u64()) / 1000).unwrap_or(Amount::ZERO)
}

/// Chooses candidates from `available` to cover `target` plus the fee
/// implied by the final input count, assuming a two-output transaction
/// (payment + change).
pub fn select(strategy: Strategy, target: Amount, fee_rate: Amount, available: &[Candidate]) -> Result<Selection> {
    if target.as_u64() == 0 {
        return Ok(Selection { selected: Vec::new(), total_value: Amount::ZERO, fee: Amount::ZERO, change: Amount::ZERO });
    }

    let mut ordered: Vec<Candidate> = available.to_vec();
    match strategy {
        Strategy::LargestFirst | Strategy::BranchAndBound => {
            ordered.sort_by_key(|c| std::cmp::Reverse(c.value.as_u64()))
        }
        Strategy::SmallestFirst => ordered.sort_by_key(|c| c.value.as_u64()),
        Strategy::Random => ordered.shuffle(&mut rand::thread_rng()),
    }

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;
    for candidate in ordered {
        selected.push(candidate.outpoint);
        total = total.checked_add(candidate.value)?;

        let size = estimate_transaction_size(selected.len(), 2);
        let fee = calculate_fee(size, fee_rate);
        let needed = target.checked_add(fee)?;
        if total.as_u64() >= needed.as_u64() {
            let change = Amount::try_new(total.as_u64() - needed.as_u64())?;
            return Ok(Selection { selected, total_value: total, fee, change });
        }
    }

    Err(StateError::InsufficientFunds { needed: target.as_u64(), available: total.as_u64() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(values: &[u64]) -> Vec<Candidate> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Candidate {
                outpoint: OutPoint::new(chain_types::hash::Hash256([i as u8; 32]), 0),
                value: Amount::try_new(v).unwrap(),
            })
            .collect()
    }

    const COIN: u64 = chain_types::amount::COIN;

    #[test]
    fn largest_first_picks_fewest_big_candidates() {
        let candidates = candidates(&[8 * COIN, 5 * COIN, 3 * COIN, 2 * COIN, COIN]);
        let selection = select(
            Strategy::LargestFirst,
            Amount::try_new(9 * COIN).unwrap(),
            Amount::try_new(10_000).unwrap(),
            &candidates,
        )
        .unwrap();

        assert_eq!(selection.selected.len(), 2);
        assert_eq!(selection.total_value.as_u64(), 13 * COIN);
        let expected_fee = estimate_transaction_size(2, 2) as u64 * 10_000 / 1000;
        assert_eq!(selection.fee.as_u64(), expected_fee);
        assert_eq!(selection.change.as_u64(), 13 * COIN - 9 * COIN - expected_fee);
    }

    #[test]
    fn smallest_first_accumulates_from_the_bottom() {
        let candidates = candidates(&[8 * COIN, 5 * COIN, 3 * COIN, 2 * COIN, COIN]);
        let selection = select(
            Strategy::SmallestFirst,
            Amount::try_new(9 * COIN).unwrap(),
            Amount::try_new(10_000).unwrap(),
            &candidates,
        )
        .unwrap();

        assert_eq!(selection.total_value.as_u64(), COIN + 2 * COIN + 3 * COIN + 5 * COIN);
    }

    #[test]
    fn insufficient_funds_when_total_cannot_cover_target() {
        let candidates = candidates(&[COIN]);
        let err = select(
            Strategy::LargestFirst,
            Amount::try_new(9 * COIN).unwrap(),
            Amount::try_new(10_000).unwrap(),
            &candidates,
        )
        .unwrap_err();
        assert!(matches!(err, StateError::InsufficientFunds { .. }));
    }

    #[test]
    fn branch_and_bound_falls_back_to_largest_first() {
        let candidates = candidates(&[8 * COIN, 5 * COIN, 3 * COIN, 2 * COIN, COIN]);
        let a = select(Strategy::LargestFirst, Amount::try_new(9 * COIN).unwrap(), Amount::try_new(10_000).unwrap(), &candidates)
            .unwrap();
        let b = select(Strategy::BranchAndBound, Amount::try_new(9 * COIN).unwrap(), Amount::try_new(10_000).unwrap(), &candidates)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn random_selection_still_covers_target() {
        let candidates = candidates(&[8 * COIN, 5 * COIN, 3 * COIN, 2 * COIN, COIN]);
        let selection =
            select(Strategy::Random, Amount::try_new(9 * COIN).unwrap(), Amount::try_new(10_000).unwrap(), &candidates).unwrap();
        assert!(selection.total_value.as_u64() >= 9 * COIN);
    }

    #[test]
    fn zero_target_succeeds_with_empty_selection() {
        let candidates = candidates(&[8 * COIN]);
        let selection = select(Strategy::LargestFirst, Amount::ZERO, Amount::try_new(10_000).unwrap(), &candidates).unwrap();
        assert!(selection.selected.is_empty());
        assert_eq!(selection.total_value.as_u64(), 0);
        assert_eq!(selection.fee.as_u64(), 0);
        assert_eq!(selection.change.as_u64(), 0);
    }

    #[test]
    fn empty_available_is_insufficient_funds() {
        let err = select(Strategy::LargestFirst, Amount::try_new(COIN).unwrap(), Amount::try_new(10_000).unwrap(), &[])
            .unwrap_err();
        assert!(matches!(err, StateError::InsufficientFunds { .. }));
    }

    #[test]
    fn fee_helpers_match_spec_formula() {
        assert_eq!(estimate_transaction_size(2, 2), 10 + 148 * 2 + 34 * 2);
        assert_eq!(calculate_fee(500, Amount::try_new(10_000).unwrap()).as_u64(), 500 * 10_000 / 1000);
    }
}
