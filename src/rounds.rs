use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// How far an item got in a bracket. Ordered by priority: `Champion` is the
/// greatest, then `Final`, `Semifinal`, `Quarterfinal`, then `RoundOf(n)` with
/// smaller `n` ranking higher. Equality follows the same order, so
/// `RoundOf(9)` and `RoundOf(16)` are the same label.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundLabel {
  Champion,
  Final,
  Semifinal,
  Quarterfinal,
  RoundOf(u64),
}

impl RoundLabel {
  /// `remaining` counts the current round, so the final has one remaining
  /// round and a finished bracket has zero.
  pub fn from_remaining_rounds(remaining: u32) -> Self {
    match remaining {
      0 => RoundLabel::Champion,
      1 => RoundLabel::Final,
      2 => RoundLabel::Semifinal,
      3 => RoundLabel::Quarterfinal,
      n => RoundLabel::RoundOf(1u64.checked_shl(n).unwrap_or(u64::MAX)),
    }
  }

  pub fn for_round(round: u32, total_rounds: u32) -> Self {
    let remaining = (total_rounds + 1).saturating_sub(round).max(1);
    RoundLabel::from_remaining_rounds(remaining)
  }

  pub fn remaining_rounds(&self) -> u32 {
    match self {
      RoundLabel::Champion => 0,
      RoundLabel::Final => 1,
      RoundLabel::Semifinal => 2,
      RoundLabel::Quarterfinal => 3,
      RoundLabel::RoundOf(size) => (*size)
        .max(2)
        .checked_next_power_of_two()
        .map_or(u64::BITS, |size| size.trailing_zeros()),
    }
  }
}

impl PartialEq for RoundLabel {
  fn eq(&self, other: &Self) -> bool {
    self.remaining_rounds() == other.remaining_rounds()
  }
}

impl Eq for RoundLabel {}

impl Hash for RoundLabel {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.remaining_rounds().hash(state);
  }
}

impl Ord for RoundLabel {
  fn cmp(&self, other: &Self) -> Ordering {
    other.remaining_rounds().cmp(&self.remaining_rounds())
  }
}

impl PartialOrd for RoundLabel {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for RoundLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RoundLabel::Champion => f.write_str("Champion"),
      RoundLabel::Final => f.write_str("Final"),
      RoundLabel::Semifinal => f.write_str("Semifinal"),
      RoundLabel::Quarterfinal => f.write_str("Quarterfinal"),
      RoundLabel::RoundOf(size) => write!(f, "Round of {size}"),
    }
  }
}

pub fn next_power_of_two(n: usize) -> usize {
  let value = n.max(1);
  if value.is_power_of_two() {
    return value;
  }
  value.next_power_of_two()
}

/// Rounds needed to reduce `participants` (padded with byes) to one champion.
pub fn total_rounds(participants: usize) -> u32 {
  next_power_of_two(participants).trailing_zeros()
}
