use tracing::{debug, info, warn};

use crate::bracket::materialize_round;
use crate::error::{EngineError, Result};
use crate::stats::ChampionSink;
use crate::store::TournamentStore;
use crate::types::{Contender, ItemId, Match, TournamentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
  /// The current round still has open matches.
  Waiting,
  /// Round `n` was opened from the previous round's winners.
  Advanced(u32),
  Completed(ItemId),
  /// Nothing to do: the tournament is finished or another writer got there first.
  Idle,
}

/// Moves the tournament forward if its current round is fully decided.
///
/// Safe to call at any time; when the round is still open or another caller
/// already advanced it, nothing is written. The champion is reported to
/// `sink` only by the call whose completion write succeeds.
pub fn advance_round<S, K>(
  store: &S,
  sink: &K,
  tournament_id: TournamentId,
  now_ms: u64,
) -> Result<AdvanceOutcome>
where
  S: TournamentStore + ?Sized,
  K: ChampionSink + ?Sized,
{
  let tournament = store
    .tournament(tournament_id)?
    .ok_or(EngineError::TournamentNotFound(tournament_id))?;
  if tournament.is_completed() {
    return Ok(AdvanceOutcome::Idle);
  }

  let round = tournament.current_round;
  let mut matches = store
    .matches(tournament_id)?
    .into_iter()
    .filter(|m| m.round == round)
    .collect::<Vec<_>>();
  if matches.is_empty() {
    return Err(EngineError::InconsistentState(format!(
      "tournament {tournament_id} has no matches in round {round}"
    )));
  }
  if matches.iter().any(|m| !m.is_resolved()) {
    return Ok(AdvanceOutcome::Waiting);
  }
  matches.sort_by_key(|m| m.match_number);
  let winners = round_winners(&matches)?;

  if round >= tournament.total_rounds {
    let champion = final_winner(tournament_id, &winners)?;
    if !store.complete(tournament_id, round, champion, now_ms)? {
      debug!("tournament {tournament_id} was completed by another writer");
      return Ok(AdvanceOutcome::Idle);
    }
    info!("tournament {tournament_id} completed; champion is item {champion}");
    if let Err(e) = sink.record_champion(tournament.pool_id, champion) {
      warn!("recording champion {champion} for pool {}: {e}", tournament.pool_id);
    }
    return Ok(AdvanceOutcome::Completed(champion));
  }

  if winners.len() % 2 != 0 {
    return Err(EngineError::InconsistentState(format!(
      "round {round} of tournament {tournament_id} has {} matches",
      winners.len()
    )));
  }
  let pairings = winners
    .chunks(2)
    .map(|pair| [pair[0], pair[1]])
    .collect::<Vec<_>>();
  let ids = store.next_match_ids(pairings.len())?;
  let next_round = round + 1;
  let next = materialize_round(tournament_id, next_round, &pairings, &ids, now_ms)?;
  if !store.open_round(tournament_id, round, next)? {
    debug!("round {next_round} of tournament {tournament_id} was opened by another writer");
    return Ok(AdvanceOutcome::Idle);
  }
  info!(
    "tournament {} advanced to round {} of {} ({} matches)",
    tournament_id,
    next_round,
    tournament.total_rounds,
    pairings.len()
  );
  Ok(AdvanceOutcome::Advanced(next_round))
}

fn round_winners(matches: &[Match]) -> Result<Vec<Contender>> {
  matches
    .iter()
    .map(|m| {
      m.winner.ok_or_else(|| {
        EngineError::InconsistentState(format!("match {} has no winner", m.id))
      })
    })
    .collect()
}

fn final_winner(tournament_id: TournamentId, winners: &[Contender]) -> Result<ItemId> {
  match winners {
    [Contender::Item(id)] => Ok(*id),
    [Contender::Bye] => Err(EngineError::InconsistentState(format!(
      "final of tournament {tournament_id} was won by a bye"
    ))),
    _ => Err(EngineError::InconsistentState(format!(
      "final round of tournament {tournament_id} has {} matches",
      winners.len()
    ))),
  }
}
