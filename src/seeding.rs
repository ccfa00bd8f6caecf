use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Picks the seed order of a field of `n` items.
///
/// The returned vector must be a permutation of `0..n`; entry `k` is the index
/// of the item that receives seed `k + 1`. Slot placement from seeds is fixed
/// (see [`seed_positions`]), so the strategy only decides who meets whom.
pub trait Seeding {
  fn permutation(&mut self, n: usize) -> Vec<usize>;
}

/// Uniform Fisher–Yates shuffle. This is the production default.
pub struct RandomSeeding<R = StdRng> {
  rng: R,
}

impl RandomSeeding<StdRng> {
  pub fn from_entropy() -> Self {
    RandomSeeding { rng: StdRng::from_entropy() }
  }

  pub fn seeded(seed: u64) -> Self {
    RandomSeeding { rng: StdRng::seed_from_u64(seed) }
  }

  pub fn from_config(config: &EngineConfig) -> Self {
    match config.shuffle_seed {
      Some(seed) => RandomSeeding::seeded(seed),
      None => RandomSeeding::from_entropy(),
    }
  }
}

impl<R: Rng> Seeding for RandomSeeding<R> {
  fn permutation(&mut self, n: usize) -> Vec<usize> {
    let mut order = (0..n).collect::<Vec<_>>();
    order.shuffle(&mut self.rng);
    order
  }
}

/// Seeds items in the order they were given.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentitySeeding;

impl Seeding for IdentitySeeding {
  fn permutation(&mut self, n: usize) -> Vec<usize> {
    (0..n).collect()
  }
}

/// Replays a recorded seed order.
#[derive(Clone, Debug)]
pub struct FixedSeeding(pub Vec<usize>);

impl Seeding for FixedSeeding {
  fn permutation(&mut self, _n: usize) -> Vec<usize> {
    self.0.clone()
  }
}

impl<F> Seeding for F
where
  F: FnMut(usize) -> Vec<usize>,
{
  fn permutation(&mut self, n: usize) -> Vec<usize> {
    self(n)
  }
}

pub fn validate_permutation(order: &[usize], n: usize) -> Result<()> {
  if order.len() != n {
    return Err(EngineError::InvalidInput(format!(
      "seeding returned {} positions for {n} items",
      order.len()
    )));
  }
  let mut seen = HashSet::with_capacity(n);
  for &index in order {
    if index >= n {
      return Err(EngineError::InvalidInput(format!(
        "seeding index {index} out of range for {n} items"
      )));
    }
    if !seen.insert(index) {
      return Err(EngineError::InvalidInput(format!(
        "seeding index {index} used twice"
      )));
    }
  }
  Ok(())
}

/// Seed numbers in bracket slot order for a power-of-two `size`. Slots
/// `(2i, 2i + 1)` form round-one match `i + 1`; seed `k` meets seed
/// `size + 1 - k`, so seeds above the field size (byes) never meet each other.
pub fn seed_positions(size: usize) -> Vec<usize> {
  let mut seeds = vec![1usize];
  while seeds.len() < size {
    let n = seeds.len();
    let mut next = Vec::with_capacity(n * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}
