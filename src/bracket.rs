use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::rounds::{next_power_of_two, total_rounds};
use crate::seeding::{seed_positions, validate_permutation, Seeding};
use crate::types::{Contender, Item, Match, MatchId, TournamentId, MIN_BRACKET_ITEMS};

/// Round one of a freshly seeded bracket, before ids are assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bracket {
  pub item_count: usize,
  pub padded_size: usize,
  pub total_rounds: u32,
  /// Pairings in match-number order.
  pub pairings: Vec<[Contender; 2]>,
}

impl Bracket {
  pub fn bye_count(&self) -> usize {
    self.padded_size - self.item_count
  }
}

pub fn seed_bracket(items: &[Item], seeding: &mut dyn Seeding) -> Result<Bracket> {
  let item_count = items.len();
  if item_count < MIN_BRACKET_ITEMS {
    return Err(EngineError::InvalidInput(format!(
      "a bracket needs at least {MIN_BRACKET_ITEMS} items, got {item_count}"
    )));
  }
  let mut ids = HashSet::with_capacity(item_count);
  for item in items {
    if !ids.insert(item.id) {
      return Err(EngineError::InvalidInput(format!(
        "item {} appears more than once",
        item.id
      )));
    }
  }

  let order = seeding.permutation(item_count);
  validate_permutation(&order, item_count)?;
  let seeded = order
    .iter()
    .map(|&index| Contender::Item(items[index].id))
    .collect::<Vec<_>>();

  let padded_size = next_power_of_two(item_count);
  let slots = seed_positions(padded_size)
    .into_iter()
    .map(|seed| seeded.get(seed - 1).copied().unwrap_or(Contender::Bye))
    .collect::<Vec<_>>();
  let pairings = slots
    .chunks(2)
    .map(|pair| [pair[0], pair[1]])
    .collect::<Vec<_>>();

  let bracket = Bracket {
    item_count,
    padded_size,
    total_rounds: total_rounds(item_count),
    pairings,
  };
  debug!(
    "seeded {} items into {} slots ({} byes, {} rounds)",
    item_count,
    padded_size,
    bracket.bye_count(),
    bracket.total_rounds
  );
  Ok(bracket)
}

/// Turns pairings into numbered matches of `round`, resolving any bye match
/// on the spot. `ids` must hold one id per pairing.
pub fn materialize_round(
  tournament_id: TournamentId,
  round: u32,
  pairings: &[[Contender; 2]],
  ids: &[MatchId],
  now_ms: u64,
) -> Result<Vec<Match>> {
  if ids.len() != pairings.len() {
    return Err(EngineError::InconsistentState(format!(
      "{} match ids allocated for {} pairings",
      ids.len(),
      pairings.len()
    )));
  }
  let matches = pairings
    .iter()
    .zip(ids)
    .enumerate()
    .map(|(index, (pair, &id))| {
      let mut m = Match {
        id,
        tournament_id,
        round,
        match_number: index as u32 + 1,
        item1: pair[0],
        item2: pair[1],
        winner: None,
        completed_at_ms: None,
        auto_resolved: false,
      };
      auto_resolve_bye(&mut m, now_ms);
      m
    })
    .collect();
  Ok(matches)
}

/// Decides a match that contains a bye. Returns whether the match was resolved.
pub fn auto_resolve_bye(m: &mut Match, now_ms: u64) -> bool {
  if m.is_resolved() || !m.has_bye() {
    return false;
  }
  let winner = match (m.item1, m.item2) {
    (Contender::Item(_), Contender::Bye) => m.item1,
    (Contender::Bye, Contender::Item(_)) => m.item2,
    _ => {
      warn!(
        "tournament {} round {} match {} pairs two byes; advancing slot 1",
        m.tournament_id, m.round, m.match_number
      );
      m.item1
    }
  };
  m.winner = Some(winner);
  m.completed_at_ms = Some(now_ms);
  m.auto_resolved = true;
  true
}
