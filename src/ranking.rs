use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::rounds::{total_rounds, RoundLabel};
use crate::types::{Item, ItemId, Match};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
  pub item_id: ItemId,
  pub rank: usize,
  pub wins: u32,
  pub losses: u32,
  pub total_matches: u32,
  /// Rounded to one decimal for display; ordering uses the exact ratio.
  pub win_rate_pct: f64,
  /// Best round reached across all histories; `None` if the item never played.
  pub round_reached: Option<RoundLabel>,
  pub appearances: u32,
  pub championships: u32,
}

#[derive(Debug, Clone, Default)]
struct Tally {
  wins: u32,
  losses: u32,
  round_reached: Option<RoundLabel>,
  appearances: u32,
  championships: u32,
}

impl Tally {
  fn total_matches(&self) -> u32 {
    self.wins + self.losses
  }

  fn win_rate_pct(&self) -> f64 {
    let total = self.total_matches();
    if total == 0 {
      return 0.0;
    }
    let rate = f64::from(self.wins) / f64::from(total) * 100.0;
    (rate * 10.0).round() / 10.0
  }

  /// `wins / total` as an exact fraction; no matches counts as `0 / 1`.
  fn win_ratio(&self) -> (u64, u64) {
    match self.total_matches() {
      0 => (0, 1),
      total => (u64::from(self.wins), u64::from(total)),
    }
  }
}

fn compare_ratio(a: (u64, u64), b: (u64, u64)) -> Ordering {
  (u128::from(a.0) * u128::from(b.1)).cmp(&(u128::from(b.0) * u128::from(a.1)))
}

/// Ranks `pool` from one or more match histories (one `Vec` per tournament).
///
/// Each resolved match between two items counts a win and a loss; bye matches
/// only count towards the round an item reached. Rows are ordered by round
/// reached, then win rate, then matches played, all descending; remaining
/// ties keep pool order. Output is a pure function of the input.
pub fn rank_items(pool: &[Item], histories: &[Vec<Match>]) -> Vec<RankingRow> {
  let mut order = Vec::with_capacity(pool.len());
  let mut tallies: HashMap<ItemId, Tally> = HashMap::with_capacity(pool.len());
  for item in pool {
    if tallies.insert(item.id, Tally::default()).is_none() {
      order.push(item.id);
    }
  }

  for history in histories {
    replay_history(history, &mut tallies);
  }

  let mut rows = order
    .into_iter()
    .map(|item_id| {
      let tally = tallies.remove(&item_id).unwrap_or_default();
      (item_id, tally)
    })
    .collect::<Vec<_>>();
  rows.sort_by(|(_, a), (_, b)| {
    b.round_reached
      .cmp(&a.round_reached)
      .then_with(|| compare_ratio(b.win_ratio(), a.win_ratio()))
      .then_with(|| b.total_matches().cmp(&a.total_matches()))
  });

  rows
    .into_iter()
    .enumerate()
    .map(|(index, (item_id, tally))| RankingRow {
      item_id,
      rank: index + 1,
      wins: tally.wins,
      losses: tally.losses,
      total_matches: tally.total_matches(),
      win_rate_pct: tally.win_rate_pct(),
      round_reached: tally.round_reached,
      appearances: tally.appearances,
      championships: tally.championships,
    })
    .collect()
}

fn replay_history(history: &[Match], tallies: &mut HashMap<ItemId, Tally>) {
  let round_one = history.iter().filter(|m| m.round == 1).count();
  if round_one == 0 {
    return;
  }
  let rounds = total_rounds(round_one * 2);

  let mut last_seen: HashMap<ItemId, &Match> = HashMap::new();
  for m in history {
    if let (Some(winner), Some(loser)) = (m.winner, m.loser()) {
      if let (Some(winner_id), Some(loser_id)) = (winner.item_id(), loser.item_id()) {
        if let Some(tally) = tallies.get_mut(&winner_id) {
          tally.wins += 1;
        }
        if let Some(tally) = tallies.get_mut(&loser_id) {
          tally.losses += 1;
        }
      }
    }
    for item_id in m.contenders().iter().filter_map(|c| c.item_id()) {
      let entry = last_seen.entry(item_id).or_insert(m);
      if m.position() > entry.position() {
        *entry = m;
      }
    }
  }

  for (item_id, last) in last_seen {
    let Some(tally) = tallies.get_mut(&item_id) else {
      continue;
    };
    tally.appearances += 1;
    let won_last = last.winner_item() == Some(item_id);
    let label = if won_last && last.round >= rounds {
      tally.championships += 1;
      RoundLabel::Champion
    } else if won_last {
      RoundLabel::for_round(last.round + 1, rounds)
    } else {
      RoundLabel::for_round(last.round, rounds)
    };
    tally.round_reached = tally.round_reached.max(Some(label));
  }
}
