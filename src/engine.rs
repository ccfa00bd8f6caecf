use std::sync::Mutex;
use tracing::info;

use crate::advancer::{advance_round, AdvanceOutcome};
use crate::bracket::{materialize_round, seed_bracket};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ranking::{rank_items, RankingRow};
use crate::resolver::resolve_match;
use crate::seeding::{FixedSeeding, RandomSeeding, Seeding};
use crate::stats::{ChampionSink, NoopSink};
use crate::store::TournamentStore;
use crate::types::*;

/// Upper bound on advancer passes after a single write; a bracket of
/// `DEFAULT_MAX_ITEMS` needs ten.
const MAX_SETTLE_PASSES: usize = 64;

/// Entry point for playing brackets: seeds tournaments, records votes and
/// reports what the player should see next.
pub struct Engine<S, K = NoopSink> {
    store: S,
    sink: K,
    config: EngineConfig,
    seeding: Mutex<Box<dyn Seeding + Send>>,
}

impl<S: TournamentStore, K: ChampionSink> Engine<S, K> {
    pub fn new(store: S, sink: K, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let seeding = Box::new(RandomSeeding::from_config(&config));
        Ok(Engine {
            store,
            sink,
            config,
            seeding: Mutex::new(seeding),
        })
    }

    /// Replaces the default shuffle used by [`Engine::start`].
    pub fn with_seeding(mut self, seeding: impl Seeding + Send + 'static) -> Self {
        self.seeding = Mutex::new(Box::new(seeding));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Commands ───────────────────────────────────────────────────────

    pub fn start(
        &self,
        pool_id: PoolId,
        owner_id: Option<UserId>,
        items: Vec<Item>,
        now_ms: u64,
    ) -> Result<TournamentView> {
        self.config.check_item_count(items.len())?;
        let order = {
            let mut seeding = self.seeding.lock().unwrap_or_else(|e| e.into_inner());
            seeding.permutation(items.len())
        };
        self.start_with(pool_id, owner_id, items, &mut FixedSeeding(order), now_ms)
    }

    pub fn start_with(
        &self,
        pool_id: PoolId,
        owner_id: Option<UserId>,
        items: Vec<Item>,
        seeding: &mut dyn Seeding,
        now_ms: u64,
    ) -> Result<TournamentView> {
        self.config.check_item_count(items.len())?;
        let bracket = seed_bracket(&items, seeding)?;

        let tournament_id = self.store.next_tournament_id()?;
        let ids = self.store.next_match_ids(bracket.pairings.len())?;
        let matches = materialize_round(tournament_id, 1, &bracket.pairings, &ids, now_ms)?;
        let tournament = Tournament {
            id: tournament_id,
            pool_id,
            owner_id,
            items,
            current_round: 1,
            total_rounds: bracket.total_rounds,
            winner_id: None,
            created_at_ms: now_ms,
            completed_at_ms: None,
        };
        self.store.insert_tournament(tournament, matches)?;
        info!(
            "tournament {} started for pool {}: {} items, {} byes, {} rounds",
            tournament_id,
            pool_id,
            bracket.item_count,
            bracket.bye_count(),
            bracket.total_rounds
        );

        self.settle(tournament_id, now_ms)?;
        self.state(tournament_id)
    }

    pub fn submit_winner(
        &self,
        tournament_id: TournamentId,
        match_id: MatchId,
        winner_id: ItemId,
        now_ms: u64,
    ) -> Result<TournamentView> {
        // Finish any advance a previous call recorded a vote for but could not write.
        self.settle(tournament_id, now_ms)?;
        resolve_match(&self.store, tournament_id, match_id, winner_id, now_ms)?;
        self.settle(tournament_id, now_ms)?;
        self.state(tournament_id)
    }

    /// Retries round advancement after a failed write. A no-op when the
    /// tournament already has an open match or is finished.
    pub fn advance(&self, tournament_id: TournamentId, now_ms: u64) -> Result<TournamentView> {
        self.settle(tournament_id, now_ms)?;
        self.state(tournament_id)
    }

    /// Runs the advancer until the tournament has an open match or is finished.
    fn settle(&self, tournament_id: TournamentId, now_ms: u64) -> Result<()> {
        let mut safety = 0;
        loop {
            safety += 1;
            if safety > MAX_SETTLE_PASSES {
                return Err(EngineError::InconsistentState(format!(
                    "tournament {tournament_id} did not settle after {MAX_SETTLE_PASSES} rounds"
                )));
            }
            match advance_round(&self.store, &self.sink, tournament_id, now_ms)? {
                AdvanceOutcome::Advanced(_) => continue,
                AdvanceOutcome::Waiting | AdvanceOutcome::Completed(_) | AdvanceOutcome::Idle => {
                    return Ok(())
                }
            }
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    fn load(&self, tournament_id: TournamentId) -> Result<Tournament> {
        self.store
            .tournament(tournament_id)?
            .ok_or(EngineError::TournamentNotFound(tournament_id))
    }

    pub fn state(&self, tournament_id: TournamentId) -> Result<TournamentView> {
        let tournament = self.load(tournament_id)?;
        let matches = self.store.matches(tournament_id)?;
        Ok(TournamentView::build(tournament, matches))
    }

    pub fn current_match(&self, tournament_id: TournamentId) -> Result<Option<Match>> {
        self.load(tournament_id)?;
        let matches = self.store.matches(tournament_id)?;
        Ok(current_match(&matches).cloned())
    }

    /// Ranking of one playthrough, finished or not.
    pub fn rank_tournament(&self, tournament_id: TournamentId) -> Result<Vec<RankingRow>> {
        let tournament = self.load(tournament_id)?;
        let matches = self.store.matches(tournament_id)?;
        Ok(rank_items(&tournament.items, &[matches]))
    }

    /// Ranking over every completed playthrough of `pool_id`.
    pub fn rank_pool(&self, pool_id: PoolId, items: &[Item]) -> Result<Vec<RankingRow>> {
        let mut tournaments = self
            .store
            .tournaments_for_pool(pool_id)?
            .into_iter()
            .filter(Tournament::is_completed)
            .collect::<Vec<_>>();
        tournaments.sort_by_key(|t| t.id);
        let histories = tournaments
            .iter()
            .map(|t| self.store.matches(t.id))
            .collect::<Result<Vec<_>>>()?;
        Ok(rank_items(items, &histories))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rounds::RoundLabel;
    use crate::seeding::IdentitySeeding;
    use crate::stats::ChampionTally;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn make_items(n: u64) -> Vec<Item> {
        (1..=n).map(|id| Item::new(id, format!("Item {id}"))).collect()
    }

    fn make_engine() -> Engine<MemoryStore, ChampionTally> {
        Engine::new(MemoryStore::new(), ChampionTally::new(), EngineConfig::default())
            .unwrap()
            .with_seeding(IdentitySeeding)
    }

    /// Delegates to a `MemoryStore`, except that the next `open_round` can be
    /// made to fail once.
    struct FlakyStore {
        inner: MemoryStore,
        fail_next_open: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            FlakyStore { inner: MemoryStore::new(), fail_next_open: AtomicBool::new(false) }
        }

        fn fail_next_open(&self) {
            self.fail_next_open.store(true, Ordering::SeqCst);
        }
    }

    impl TournamentStore for FlakyStore {
        fn next_tournament_id(&self) -> Result<TournamentId> {
            self.inner.next_tournament_id()
        }

        fn next_match_ids(&self, count: usize) -> Result<Vec<MatchId>> {
            self.inner.next_match_ids(count)
        }

        fn insert_tournament(&self, tournament: Tournament, matches: Vec<Match>) -> Result<()> {
            self.inner.insert_tournament(tournament, matches)
        }

        fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>> {
            self.inner.tournament(id)
        }

        fn matches(&self, tournament_id: TournamentId) -> Result<Vec<Match>> {
            self.inner.matches(tournament_id)
        }

        fn match_by_id(&self, id: MatchId) -> Result<Option<Match>> {
            self.inner.match_by_id(id)
        }

        fn tournaments_for_pool(&self, pool_id: PoolId) -> Result<Vec<Tournament>> {
            self.inner.tournaments_for_pool(pool_id)
        }

        fn resolve_if_open(&self, match_id: MatchId, winner: Contender, now_ms: u64) -> Result<bool> {
            self.inner.resolve_if_open(match_id, winner, now_ms)
        }

        fn open_round(&self, tournament_id: TournamentId, expected_round: u32, matches: Vec<Match>) -> Result<bool> {
            if self.fail_next_open.swap(false, Ordering::SeqCst) {
                return Err(EngineError::Storage("write timed out".into()));
            }
            self.inner.open_round(tournament_id, expected_round, matches)
        }

        fn complete(&self, tournament_id: TournamentId, expected_round: u32, winner: ItemId, now_ms: u64) -> Result<bool> {
            self.inner.complete(tournament_id, expected_round, winner, now_ms)
        }
    }

    /// Starts four items and decides round one, with the round-two write
    /// failing. Returns the engine, tournament id and the last match voted on.
    fn make_stalled_tournament() -> (Engine<FlakyStore>, TournamentId, MatchCard) {
        let engine = Engine::new(FlakyStore::new(), NoopSink, EngineConfig::default())
            .unwrap()
            .with_seeding(IdentitySeeding);
        let view = engine.start(1, None, make_items(4), 0).unwrap();
        let tournament_id = view.tournament.id;
        let first = view.current_match.unwrap();
        let view = engine.submit_winner(tournament_id, first.match_id, first.item1.id, 1).unwrap();
        let second = view.current_match.unwrap();

        engine.store().fail_next_open();
        let err = engine
            .submit_winner(tournament_id, second.match_id, second.item1.id, 2)
            .unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));

        let stalled = engine.state(tournament_id).unwrap();
        assert_eq!(stalled.tournament.current_round, 1);
        assert!(stalled.current_match.is_none());
        assert!(!stalled.is_completed);
        (engine, tournament_id, second)
    }

    /// Votes for slot one until the bracket finishes; returns the final view
    /// and the number of votes cast.
    fn play_out<S: TournamentStore, K: ChampionSink>(
        engine: &Engine<S, K>,
        mut view: TournamentView,
    ) -> (TournamentView, usize) {
        let mut votes = 0;
        while let Some(card) = view.current_match.clone() {
            view = engine
                .submit_winner(view.tournament.id, card.match_id, card.item1.id, 100 + votes as u64)
                .unwrap();
            votes += 1;
        }
        (view, votes)
    }

    #[test]
    fn test_eight_items_complete_after_seven_votes() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(8), 0).unwrap();
        assert_eq!(view.tournament.total_rounds, 3);
        assert_eq!(view.matches.len(), 4);
        assert!(view.matches.iter().all(|m| !m.auto_resolved));

        let (view, votes) = play_out(&engine, view);
        assert_eq!(votes, 7);
        assert!(view.is_completed);
        let final_match = view.matches.iter().find(|m| m.round == 3).unwrap();
        assert_eq!(view.tournament.winner_id, final_match.winner_item());
        assert_eq!(view.champion.as_ref().map(|item| item.id), view.tournament.winner_id);
        assert!(view.current_match.is_none());
        assert_eq!(view.matches.len(), 7);
    }

    #[test]
    fn test_five_items_end_to_end() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(5), 0).unwrap();
        assert_eq!(view.tournament.total_rounds, 3);
        let round_one = view.matches.iter().filter(|m| m.round == 1).collect::<Vec<_>>();
        assert_eq!(round_one.len(), 4);
        assert_eq!(round_one.iter().filter(|m| m.auto_resolved).count(), 3);
        assert_eq!(round_one.iter().filter(|m| !m.is_resolved()).count(), 1);

        let card = view.current_match.clone().unwrap();
        assert_eq!(card.round, 1);
        assert_eq!(card.round_label, RoundLabel::Quarterfinal);

        let (view, votes) = play_out(&engine, view);
        assert_eq!(votes, 4);
        assert!(view.is_completed);
        assert!(view.champion.is_some());
        assert!(view
            .matches
            .iter()
            .filter(|m| m.round > 1)
            .all(|m| !m.has_bye()));
        assert_eq!(engine.sink().total_for_pool(1), 1);
    }

    #[test]
    fn test_no_byes_after_round_one() {
        for n in 2..=33 {
            let engine = make_engine().with_seeding(RandomSeeding::seeded(n));
            let view = engine.start(1, None, make_items(n), 0).unwrap();
            let (view, _) = play_out(&engine, view);
            assert!(view.is_completed, "field of {n}");
            assert!(view.matches.iter().filter(|m| m.round > 1).all(|m| !m.has_bye()));
            assert_eq!(view.matches.len(), n as usize - 1 + view.matches.iter().filter(|m| m.auto_resolved).count());
        }
    }

    #[test]
    fn test_double_submit_is_rejected() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(8), 0).unwrap();
        let card = view.current_match.unwrap();
        engine.submit_winner(view.tournament.id, card.match_id, card.item1.id, 1).unwrap();
        let err = engine
            .submit_winner(view.tournament.id, card.match_id, card.item2.id, 2)
            .unwrap_err();
        assert_eq!(err, EngineError::MatchAlreadyResolved(card.match_id));
        assert!(err.is_stale_view());
        let stored = engine.store().match_by_id(card.match_id).unwrap().unwrap();
        assert_eq!(stored.winner_item(), Some(card.item1.id));
    }

    #[test]
    fn test_invalid_winner_is_rejected() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(4), 0).unwrap();
        let card = view.current_match.unwrap();
        let err = engine.submit_winner(view.tournament.id, card.match_id, 42, 1).unwrap_err();
        assert_eq!(err, EngineError::InvalidWinner { match_id: card.match_id, winner_id: 42 });
        let current = engine.current_match(view.tournament.id).unwrap().unwrap();
        assert_eq!(current.id, card.match_id);
        assert!(!current.is_resolved());
    }

    #[test]
    fn test_rounds_only_move_forward() {
        let engine = make_engine();
        let mut view = engine.start(1, None, make_items(16), 0).unwrap();
        let total_rounds = view.tournament.total_rounds;
        let mut last_round = view.tournament.current_round;
        while let Some(card) = view.current_match.clone() {
            view = engine
                .submit_winner(view.tournament.id, card.match_id, card.item2.id, 5)
                .unwrap();
            assert!(view.tournament.current_round >= last_round);
            assert!(view.tournament.current_round <= total_rounds);
            assert_eq!(view.tournament.total_rounds, total_rounds);
            last_round = view.tournament.current_round;
        }
        assert_eq!(last_round, total_rounds);
    }

    #[test]
    fn test_finished_tournament_rejects_votes() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(2), 0).unwrap();
        let card = view.current_match.clone().unwrap();
        let (view, _) = play_out(&engine, view);
        let err = engine
            .submit_winner(view.tournament.id, card.match_id, card.item2.id, 9)
            .unwrap_err();
        assert_eq!(err, EngineError::TournamentAlreadyCompleted(view.tournament.id));
        assert_eq!(err.to_string(), format!("tournament {} already completed", view.tournament.id));
    }

    #[test]
    fn test_item_count_policy() {
        let config = EngineConfig { min_items: 4, max_items: 8, ..EngineConfig::default() };
        let engine = Engine::new(MemoryStore::new(), NoopSink, config).unwrap();
        assert!(matches!(
            engine.start(1, None, make_items(3), 0),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.start(1, None, make_items(9), 0),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(engine.start(1, None, make_items(4), 0).is_ok());
        assert_eq!(engine.store().tournament_count(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig { min_items: 0, ..EngineConfig::default() };
        assert!(Engine::new(MemoryStore::new(), NoopSink, config).is_err());
    }

    #[test]
    fn test_unknown_tournament() {
        let engine = make_engine();
        assert_eq!(engine.state(77).unwrap_err(), EngineError::TournamentNotFound(77));
        assert_eq!(engine.current_match(77).unwrap_err(), EngineError::TournamentNotFound(77));
        assert_eq!(engine.rank_tournament(77).unwrap_err(), EngineError::TournamentNotFound(77));
    }

    #[test]
    fn test_state_is_read_only() {
        let engine = make_engine();
        let view = engine.start(1, Some(3), make_items(6), 0).unwrap();
        let again = engine.state(view.tournament.id).unwrap();
        assert_eq!(again, view);
        assert_eq!(again.tournament.owner_id, Some(3));
    }

    #[test]
    fn test_start_with_fixed_order() {
        let engine = make_engine();
        let mut seeding = FixedSeeding(vec![3, 2, 1, 0]);
        let view = engine.start_with(1, None, make_items(4), &mut seeding, 0).unwrap();
        // Seeds 1..4 are items 4, 3, 2, 1; seed 1 meets seed 4.
        let first = &view.matches[0];
        assert_eq!((first.item1, first.item2), (Contender::Item(4), Contender::Item(1)));
    }

    #[test]
    fn test_start_shuffles_reproducibly_from_seed() {
        let config = EngineConfig { shuffle_seed: Some(11), ..EngineConfig::default() };
        let first = Engine::new(MemoryStore::new(), NoopSink, config.clone()).unwrap();
        let second = Engine::new(MemoryStore::new(), NoopSink, config).unwrap();
        let a = first.start(1, None, make_items(16), 0).unwrap();
        let b = second.start(1, None, make_items(16), 0).unwrap();
        let pairs = |view: &TournamentView| {
            view.matches.iter().map(|m| (m.item1, m.item2)).collect::<Vec<_>>()
        };
        assert_eq!(pairs(&a), pairs(&b));

        // The shared shuffle keeps drawing: the next start may differ, but still
        // seats all sixteen items.
        let c = first.start(1, None, make_items(16), 0).unwrap();
        assert_eq!(c.matches.len(), 8);
        assert!(c.matches.iter().all(|m| !m.has_bye()));
    }

    #[test]
    fn test_retried_vote_finishes_stalled_advance() {
        let (engine, tournament_id, second) = make_stalled_tournament();
        let err = engine
            .submit_winner(tournament_id, second.match_id, second.item1.id, 3)
            .unwrap_err();
        assert_eq!(err, EngineError::MatchAlreadyResolved(second.match_id));

        let healed = engine.state(tournament_id).unwrap();
        assert_eq!(healed.tournament.current_round, 2);
        let card = healed.current_match.unwrap();
        assert_eq!(card.round_label, RoundLabel::Final);
        assert_eq!((card.item1.id, card.item2.id), (1, 2));
    }

    #[test]
    fn test_advance_finishes_stalled_advance() {
        let (engine, tournament_id, _) = make_stalled_tournament();
        let view = engine.advance(tournament_id, 3).unwrap();
        assert_eq!(view.tournament.current_round, 2);
        let card = view.current_match.clone().unwrap();
        assert_eq!(engine.advance(tournament_id, 4).unwrap(), view);

        let done = engine.submit_winner(tournament_id, card.match_id, card.item2.id, 5).unwrap();
        assert!(done.is_completed);
        assert_eq!(done.tournament.winner_id, Some(card.item2.id));
        assert_eq!(engine.advance(tournament_id, 6).unwrap(), done);
        assert_eq!(engine.advance(77, 6).unwrap_err(), EngineError::TournamentNotFound(77));
    }

    #[test]
    fn test_rank_pool_uses_completed_tournaments() {
        let engine = make_engine();
        for _ in 0..2 {
            let view = engine.start(5, None, make_items(4), 0).unwrap();
            play_out(&engine, view);
        }
        engine.start(5, None, make_items(4), 0).unwrap();

        let rows = engine.rank_pool(5, &make_items(4)).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].item_id, 1);
        assert_eq!(rows[0].round_reached, Some(RoundLabel::Champion));
        assert_eq!(rows[0].championships, 2);
        assert_eq!(rows[0].appearances, 2);
        assert_eq!(engine.sink().wins_for(5, 1), 2);
        assert!(engine.rank_pool(6, &make_items(4)).unwrap().iter().all(|r| r.round_reached.is_none()));
    }

    #[test]
    fn test_rank_tournament_in_progress() {
        let engine = make_engine();
        let view = engine.start(1, None, make_items(4), 0).unwrap();
        let card = view.current_match.unwrap();
        engine.submit_winner(view.tournament.id, card.match_id, card.item1.id, 1).unwrap();
        let rows = engine.rank_tournament(view.tournament.id).unwrap();
        assert_eq!(rows[0].item_id, card.item1.id);
        assert_eq!(rows[0].round_reached, Some(RoundLabel::Final));
    }

    #[test]
    fn test_concurrent_double_submit() {
        let engine = Arc::new(make_engine());
        let view = engine.start(1, None, make_items(8), 0).unwrap();
        let card = view.current_match.unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles = [card.item1.id, card.item2.id].map(|winner| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let tournament_id = view.tournament.id;
            let match_id = card.match_id;
            thread::spawn(move || {
                barrier.wait();
                engine.submit_winner(tournament_id, match_id, winner, 1)
            })
        });
        let results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| r.as_ref().err() == Some(&EngineError::MatchAlreadyResolved(card.match_id))));
    }

    #[test]
    fn test_concurrent_round_completion_advances_once() {
        let engine = Arc::new(make_engine());
        let view = engine.start(1, None, make_items(4), 0).unwrap();
        let tournament_id = view.tournament.id;
        let barrier = Arc::new(Barrier::new(2));
        let handles = view
            .matches
            .iter()
            .map(|m| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                let (match_id, winner) = (m.id, m.item1.item_id().unwrap());
                thread::spawn(move || {
                    barrier.wait();
                    engine.submit_winner(tournament_id, match_id, winner, 1)
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        let state = engine.state(tournament_id).unwrap();
        assert_eq!(state.tournament.current_round, 2);
        assert_eq!(state.matches.len(), 3);
        assert_eq!(state.matches.iter().filter(|m| m.round == 2).count(), 1);
    }
}
