//! Candidate move enumeration for one search round.

use crate::types::Allocation;
use crate::types::CandidateMove;

/// Enumerate every feasible single-pair trade at the given step size.
///
/// An asset can only sell weight it actually holds, so `sell` ranges over
/// assets with `weight >= step`; `buy` ranges over every other asset. Moves
/// are emitted in `(sell, buy)` index order, which is the order the round
/// reduction uses to break ties.
pub fn generate_moves(allocation: &Allocation, step: f64) -> Vec<CandidateMove> {
  let n = allocation.len();
  let mut moves = Vec::new();

  for sell in 0..n {
    if allocation[sell] < step {
      continue;
    }
    for buy in 0..n {
      if buy == sell {
        continue;
      }
      moves.push(CandidateMove { sell, buy, step });
    }
  }

  moves
}

/// Apply a move, producing the resulting allocation.
///
/// Total weight is conserved by construction; the sell side is clamped at
/// zero to absorb floating-point dust when a holding is sold out entirely.
pub fn apply_move(allocation: &Allocation, mv: &CandidateMove) -> Allocation {
  let mut next = allocation.clone();
  next[mv.sell] = (next[mv.sell] - mv.step).max(0.0);
  next[mv.buy] += mv.step;
  next
}

#[cfg(test)]
mod tests {
  use ndarray::arr1;

  use super::*;

  #[test]
  fn only_held_assets_can_sell() {
    let allocation = arr1(&[1.0, 0.0, 0.0]);
    let moves = generate_moves(&allocation, 1.0);

    assert_eq!(moves.len(), 2);
    assert!(moves.iter().all(|m| m.sell == 0));
  }

  #[test]
  fn moves_enumerate_in_sell_buy_order() {
    let allocation = arr1(&[0.5, 0.5, 0.0]);
    let moves = generate_moves(&allocation, 0.25);

    let pairs: Vec<(usize, usize)> = moves.iter().map(|m| (m.sell, m.buy)).collect();
    assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 0), (1, 2)]);
  }

  #[test]
  fn no_feasible_seller_yields_no_moves() {
    let allocation = arr1(&[0.5, 0.5]);
    assert!(generate_moves(&allocation, 1.0).is_empty());
  }

  #[test]
  fn apply_move_conserves_weight() {
    let allocation = arr1(&[0.3, 0.7, 0.0]);
    let mv = CandidateMove {
      sell: 1,
      buy: 2,
      step: 0.25,
    };

    let next = apply_move(&allocation, &mv);
    assert!((next.sum() - 1.0).abs() < 1e-9);
    assert!(next.iter().all(|&w| w >= 0.0));
    assert!((next[1] - 0.45).abs() < 1e-12);
    assert!((next[2] - 0.25).abs() < 1e-12);
  }

  #[test]
  fn selling_out_clamps_to_zero() {
    let allocation = arr1(&[0.1 + 1e-17, 0.9]);
    let mv = CandidateMove {
      sell: 0,
      buy: 1,
      step: 0.1 + 2e-17,
    };

    let next = apply_move(&allocation, &mv);
    assert!(next[0] >= 0.0);
  }
}
