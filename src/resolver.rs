use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::store::TournamentStore;
use crate::types::{Contender, ItemId, Match, MatchId, TournamentId};

/// Records `winner_id` as the winner of one match.
///
/// Checks run in a fixed order and stop at the first failure: the tournament
/// exists and is still running, the match exists in it, the match is open,
/// and the winner played in it. The write itself is conditional, so a
/// concurrent submission that lands first turns this one into
/// `MatchAlreadyResolved`.
pub fn resolve_match<S: TournamentStore + ?Sized>(
  store: &S,
  tournament_id: TournamentId,
  match_id: MatchId,
  winner_id: ItemId,
  now_ms: u64,
) -> Result<Match> {
  let tournament = store
    .tournament(tournament_id)?
    .ok_or(EngineError::TournamentNotFound(tournament_id))?;
  if tournament.is_completed() {
    return Err(EngineError::TournamentAlreadyCompleted(tournament_id));
  }

  let mut current = store
    .match_by_id(match_id)?
    .filter(|m| m.tournament_id == tournament_id)
    .ok_or(EngineError::MatchNotFound(match_id))?;
  if current.is_resolved() {
    return Err(EngineError::MatchAlreadyResolved(match_id));
  }
  if !current.contains(winner_id) {
    return Err(EngineError::InvalidWinner { match_id, winner_id });
  }

  let winner = Contender::Item(winner_id);
  if !store.resolve_if_open(match_id, winner, now_ms)? {
    debug!("lost race resolving match {match_id} of tournament {tournament_id}");
    return Err(EngineError::MatchAlreadyResolved(match_id));
  }
  current.winner = Some(winner);
  current.completed_at_ms = Some(now_ms);
  info!(
    "tournament {} round {} match {}: item {} wins",
    tournament_id, current.round, current.match_number, winner_id
  );
  Ok(current)
}
