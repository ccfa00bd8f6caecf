use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::snapshot::StoreSnapshot;
use crate::types::*;

/// Persistence collaborator for tournaments and their matches.
///
/// Every write that can race is conditional: `resolve_if_open` only fills an
/// empty winner, and `open_round` / `complete` only apply while the
/// tournament is still on `expected_round` and unfinished. They return
/// `Ok(false)` when the condition no longer holds.
pub trait TournamentStore: Send + Sync {
    fn next_tournament_id(&self) -> Result<TournamentId>;
    fn next_match_ids(&self, count: usize) -> Result<Vec<MatchId>>;

    /// Creates the tournament together with its round-one matches.
    fn insert_tournament(&self, tournament: Tournament, matches: Vec<Match>) -> Result<()>;

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>>;
    fn matches(&self, tournament_id: TournamentId) -> Result<Vec<Match>>;
    fn match_by_id(&self, id: MatchId) -> Result<Option<Match>>;
    fn tournaments_for_pool(&self, pool_id: PoolId) -> Result<Vec<Tournament>>;

    fn resolve_if_open(&self, match_id: MatchId, winner: Contender, now_ms: u64) -> Result<bool>;
    fn open_round(&self, tournament_id: TournamentId, expected_round: u32, matches: Vec<Match>) -> Result<bool>;
    fn complete(&self, tournament_id: TournamentId, expected_round: u32, winner: ItemId, now_ms: u64) -> Result<bool>;
}

impl<T: TournamentStore + ?Sized> TournamentStore for Arc<T> {
    fn next_tournament_id(&self) -> Result<TournamentId> {
        (**self).next_tournament_id()
    }

    fn next_match_ids(&self, count: usize) -> Result<Vec<MatchId>> {
        (**self).next_match_ids(count)
    }

    fn insert_tournament(&self, tournament: Tournament, matches: Vec<Match>) -> Result<()> {
        (**self).insert_tournament(tournament, matches)
    }

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>> {
        (**self).tournament(id)
    }

    fn matches(&self, tournament_id: TournamentId) -> Result<Vec<Match>> {
        (**self).matches(tournament_id)
    }

    fn match_by_id(&self, id: MatchId) -> Result<Option<Match>> {
        (**self).match_by_id(id)
    }

    fn tournaments_for_pool(&self, pool_id: PoolId) -> Result<Vec<Tournament>> {
        (**self).tournaments_for_pool(pool_id)
    }

    fn resolve_if_open(&self, match_id: MatchId, winner: Contender, now_ms: u64) -> Result<bool> {
        (**self).resolve_if_open(match_id, winner, now_ms)
    }

    fn open_round(&self, tournament_id: TournamentId, expected_round: u32, matches: Vec<Match>) -> Result<bool> {
        (**self).open_round(tournament_id, expected_round, matches)
    }

    fn complete(&self, tournament_id: TournamentId, expected_round: u32, winner: ItemId, now_ms: u64) -> Result<bool> {
        (**self).complete(tournament_id, expected_round, winner, now_ms)
    }
}

// ── In-memory store ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StoreState {
    tournaments: BTreeMap<TournamentId, Tournament>,
    matches: BTreeMap<MatchId, Match>,
    next_id: u64,
}

impl StoreState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn open_tournament(&self, tournament_id: TournamentId, expected_round: u32) -> Result<bool> {
        let tournament = self
            .tournaments
            .get(&tournament_id)
            .ok_or(EngineError::TournamentNotFound(tournament_id))?;
        Ok(!tournament.is_completed() && tournament.current_round == expected_round)
    }
}

/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let highest = snapshot
            .tournaments
            .iter()
            .map(|t| t.id)
            .chain(snapshot.matches.iter().map(|m| m.id))
            .max()
            .unwrap_or(0);
        let state = StoreState {
            tournaments: snapshot.tournaments.into_iter().map(|t| (t.id, t)).collect(),
            matches: snapshot.matches.into_iter().map(|m| (m.id, m)).collect(),
            next_id: snapshot.next_id.max(highest),
        };
        MemoryStore {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let guard = self.lock();
        StoreSnapshot {
            tournaments: guard.tournaments.values().cloned().collect(),
            matches: guard.matches.values().cloned().collect(),
            next_id: guard.next_id,
        }
    }

    pub fn tournament_count(&self) -> usize {
        self.lock().tournaments.len()
    }
}

impl TournamentStore for MemoryStore {
    fn next_tournament_id(&self) -> Result<TournamentId> {
        Ok(self.lock().allocate())
    }

    fn next_match_ids(&self, count: usize) -> Result<Vec<MatchId>> {
        let mut guard = self.lock();
        Ok((0..count).map(|_| guard.allocate()).collect())
    }

    fn insert_tournament(&self, tournament: Tournament, matches: Vec<Match>) -> Result<()> {
        let mut guard = self.lock();
        if guard.tournaments.contains_key(&tournament.id) {
            return Err(EngineError::Storage(format!(
                "tournament {} already exists",
                tournament.id
            )));
        }
        if let Some(m) = matches.iter().find(|m| guard.matches.contains_key(&m.id)) {
            return Err(EngineError::Storage(format!("match {} already exists", m.id)));
        }
        for m in matches {
            guard.matches.insert(m.id, m);
        }
        guard.tournaments.insert(tournament.id, tournament);
        Ok(())
    }

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>> {
        Ok(self.lock().tournaments.get(&id).cloned())
    }

    fn matches(&self, tournament_id: TournamentId) -> Result<Vec<Match>> {
        let guard = self.lock();
        let mut matches = guard
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by_key(Match::position);
        Ok(matches)
    }

    fn match_by_id(&self, id: MatchId) -> Result<Option<Match>> {
        Ok(self.lock().matches.get(&id).cloned())
    }

    fn tournaments_for_pool(&self, pool_id: PoolId) -> Result<Vec<Tournament>> {
        Ok(self
            .lock()
            .tournaments
            .values()
            .filter(|t| t.pool_id == pool_id)
            .cloned()
            .collect())
    }

    fn resolve_if_open(&self, match_id: MatchId, winner: Contender, now_ms: u64) -> Result<bool> {
        let mut guard = self.lock();
        let m = guard
            .matches
            .get_mut(&match_id)
            .ok_or(EngineError::MatchNotFound(match_id))?;
        if m.is_resolved() {
            debug!("match {match_id} already resolved; conditional write skipped");
            return Ok(false);
        }
        m.winner = Some(winner);
        m.completed_at_ms = Some(now_ms);
        Ok(true)
    }

    fn open_round(&self, tournament_id: TournamentId, expected_round: u32, matches: Vec<Match>) -> Result<bool> {
        let mut guard = self.lock();
        if !guard.open_tournament(tournament_id, expected_round)? {
            debug!("tournament {tournament_id} moved past round {expected_round}; round not opened");
            return Ok(false);
        }
        let next_round = expected_round + 1;
        if let Some(m) = matches
            .iter()
            .find(|m| m.tournament_id != tournament_id || m.round != next_round)
        {
            return Err(EngineError::InconsistentState(format!(
                "match {} does not belong to round {next_round} of tournament {tournament_id}",
                m.id
            )));
        }
        for m in matches {
            guard.matches.insert(m.id, m);
        }
        if let Some(tournament) = guard.tournaments.get_mut(&tournament_id) {
            tournament.current_round = next_round;
        }
        Ok(true)
    }

    fn complete(&self, tournament_id: TournamentId, expected_round: u32, winner: ItemId, now_ms: u64) -> Result<bool> {
        let mut guard = self.lock();
        if !guard.open_tournament(tournament_id, expected_round)? {
            debug!("tournament {tournament_id} already completed or moved on; completion skipped");
            return Ok(false);
        }
        if let Some(tournament) = guard.tournaments.get_mut(&tournament_id) {
            tournament.winner_id = Some(winner);
            tournament.completed_at_ms = Some(now_ms);
        }
        Ok(true)
    }
}
