use thiserror::Error;

use crate::types::{ItemId, MatchId, TournamentId};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("tournament {0} already completed")]
    TournamentAlreadyCompleted(TournamentId),

    #[error("match {0}: this match is already over")]
    MatchAlreadyResolved(MatchId),

    #[error("item {winner_id} is not a participant of match {match_id}")]
    InvalidWinner { match_id: MatchId, winner_id: ItemId },

    #[error("storage: {0}")]
    Storage(String),

    #[error("inconsistent bracket: {0}")]
    InconsistentState(String),
}

impl EngineError {
    /// Conditions a client can recover from by refreshing its view.
    pub fn is_stale_view(&self) -> bool {
        matches!(
            self,
            EngineError::MatchAlreadyResolved(_) | EngineError::TournamentAlreadyCompleted(_)
        )
    }
}
