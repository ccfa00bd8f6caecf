use serde::{Deserialize, Serialize};

use crate::rounds::RoundLabel;

// ── Constants ──────────────────────────────────────────────────────────

/// Smallest field the bracket itself can run. Stricter minimums are caller policy.
pub const MIN_BRACKET_ITEMS: usize = 2;
pub const DEFAULT_MIN_ITEMS: usize = 2;
pub const DEFAULT_MAX_ITEMS: usize = 1024;

// ── Ids ────────────────────────────────────────────────────────────────

pub type ItemId = u64;
pub type MatchId = u64;
pub type TournamentId = u64;
pub type PoolId = u64;
pub type UserId = u64;

// ── Bracket domain types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl Item {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Item {
            id,
            title: title.into(),
            description: None,
            media_url: None,
        }
    }
}

/// One side of a match: a real item, or the synthetic bye used to pad the
/// field to a power of two. A bye is never choosable and loses every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Contender {
    Item(ItemId),
    Bye,
}

impl Contender {
    pub fn is_bye(&self) -> bool {
        matches!(self, Contender::Bye)
    }

    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Contender::Item(id) => Some(*id),
            Contender::Bye => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round: u32,
    pub match_number: u32,
    pub item1: Contender,
    pub item2: Contender,
    pub winner: Option<Contender>,
    pub completed_at_ms: Option<u64>,
    /// Set when the match was decided by a bye rather than a vote.
    #[serde(default)]
    pub auto_resolved: bool,
}

impl Match {
    pub fn is_resolved(&self) -> bool {
        self.winner.is_some()
    }

    pub fn has_bye(&self) -> bool {
        self.item1.is_bye() || self.item2.is_bye()
    }

    pub fn contenders(&self) -> [Contender; 2] {
        [self.item1, self.item2]
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.contenders().contains(&Contender::Item(item_id))
    }

    pub fn winner_item(&self) -> Option<ItemId> {
        self.winner.and_then(|winner| winner.item_id())
    }

    pub fn loser(&self) -> Option<Contender> {
        let winner = self.winner?;
        if winner == self.item1 {
            Some(self.item2)
        } else {
            Some(self.item1)
        }
    }

    /// Bracket ordering key: the current match is the lowest unresolved one.
    pub fn position(&self) -> (u32, u32) {
        (self.round, self.match_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum TournamentStatus {
    InProgress { round: u32 },
    Completed { winner_id: ItemId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: TournamentId,
    pub pool_id: PoolId,
    pub owner_id: Option<UserId>,
    /// Snapshot of the pool at seeding time; items are immutable once play starts.
    pub items: Vec<Item>,
    pub current_round: u32,
    pub total_rounds: u32,
    pub winner_id: Option<ItemId>,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl Tournament {
    pub fn status(&self) -> TournamentStatus {
        match self.winner_id {
            Some(winner_id) if self.completed_at_ms.is_some() => {
                TournamentStatus::Completed { winner_id }
            }
            _ => TournamentStatus::InProgress {
                round: self.current_round,
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status(), TournamentStatus::Completed { .. })
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn round_label(&self, round: u32) -> RoundLabel {
        RoundLabel::for_round(round, self.total_rounds)
    }
}

// ── Presentation types ─────────────────────────────────────────────────

/// The actionable match as the choice UI renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCard {
    pub match_id: MatchId,
    pub round: u32,
    pub match_number: u32,
    pub round_label: RoundLabel,
    pub item1: Item,
    pub item2: Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub tournament: Tournament,
    pub matches: Vec<Match>,
    pub current_match: Option<MatchCard>,
    pub is_completed: bool,
    pub champion: Option<Item>,
}

impl TournamentView {
    pub fn build(tournament: Tournament, mut matches: Vec<Match>) -> Self {
        matches.sort_by_key(Match::position);
        let current_match = current_match(&matches).and_then(|current| {
            let item1 = tournament.item(current.item1.item_id()?)?.clone();
            let item2 = tournament.item(current.item2.item_id()?)?.clone();
            Some(MatchCard {
                match_id: current.id,
                round: current.round,
                match_number: current.match_number,
                round_label: tournament.round_label(current.round),
                item1,
                item2,
            })
        });
        let is_completed = tournament.is_completed();
        let champion = tournament
            .winner_id
            .filter(|_| is_completed)
            .and_then(|id| tournament.item(id).cloned());
        TournamentView {
            tournament,
            matches,
            current_match,
            is_completed,
            champion,
        }
    }
}

/// Lowest `(round, match_number)` among unresolved matches.
pub fn current_match(matches: &[Match]) -> Option<&Match> {
    matches
        .iter()
        .filter(|m| !m.is_resolved())
        .min_by_key(|m| m.position())
}
