//! Secret faction assignment.

use crate::error::GameError;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::PlayerId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub traitors: BTreeSet<PlayerId>,
    pub faithful: BTreeSet<PlayerId>,
}

/// Picks traitors uniformly at random without replacement.
///
/// `StdRng` is a CSPRNG; production seeds it from the OS, tests from a
/// fixed value so assignments are reproducible.
#[derive(Debug, Clone)]
pub struct RoleAssigner {
    rng: StdRng,
    traitor_count: usize,
    min_players: usize,
}

impl RoleAssigner {
    pub fn from_entropy(traitor_count: usize, min_players: usize) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            traitor_count,
            min_players,
        }
    }

    pub fn seeded(seed: u64, traitor_count: usize, min_players: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            traitor_count,
            min_players,
        }
    }

    pub fn assign(&mut self, players: &[PlayerId]) -> Result<RoleAssignment, GameError> {
        if players.len() < self.min_players {
            return Err(GameError::InsufficientPlayers {
                required: self.min_players,
                present: players.len(),
            });
        }

        let traitors: BTreeSet<PlayerId> = players
            .choose_multiple(&mut self.rng, self.traitor_count)
            .copied()
            .collect();
        let faithful = players
            .iter()
            .filter(|id| !traitors.contains(id))
            .copied()
            .collect();

        debug!("Selected {} traitors among {} players", traitors.len(), players.len());
        Ok(RoleAssignment { traitors, faithful })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(n: usize) -> Vec<PlayerId> {
        (0..n).map(|_| PlayerId::new()).collect()
    }

    #[test]
    fn test_rejects_small_roster() {
        let mut assigner = RoleAssigner::seeded(1, 2, 4);
        let result = assigner.assign(&players(3));
        assert_eq!(
            result,
            Err(GameError::InsufficientPlayers {
                required: 4,
                present: 3
            })
        );
    }

    #[test]
    fn test_partition_for_many_sizes_and_seeds() {
        for size in 4..12 {
            let roster = players(size);
            for seed in 0..20 {
                let mut assigner = RoleAssigner::seeded(seed, 2, 4);
                let roles = assigner.assign(&roster).unwrap();

                assert_eq!(roles.traitors.len(), 2);
                assert!(roles.traitors.is_disjoint(&roles.faithful));

                let union: BTreeSet<PlayerId> =
                    roles.traitors.union(&roles.faithful).copied().collect();
                let all: BTreeSet<PlayerId> = roster.iter().copied().collect();
                assert_eq!(union, all);
            }
        }
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let roster = players(8);
        let first = RoleAssigner::seeded(42, 2, 4).assign(&roster).unwrap();
        let second = RoleAssigner::seeded(42, 2, 4).assign(&roster).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_player_can_be_selected() {
        let roster = players(5);
        let mut assigner = RoleAssigner::seeded(7, 2, 4);
        let mut seen = BTreeSet::new();

        for _ in 0..200 {
            seen.extend(assigner.assign(&roster).unwrap().traitors);
        }

        assert_eq!(seen.len(), roster.len());
    }
}
