//! Roundtable voting.

use crate::error::GameError;
use crate::events::GameEvent;
use crate::game::Game;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{Phase, PlayerId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: PlayerId,
    pub target: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Eliminate(PlayerId),
    /// Several targets share the highest count; nobody leaves.
    Tie(Vec<PlayerId>),
}

/// Live votes of the current round, one per voter.
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    votes: HashMap<PlayerId, PlayerId>,
    /// First-vote order, so snapshots list votes deterministically.
    order: Vec<PlayerId>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(votes: impl IntoIterator<Item = Vote>) -> Self {
        let mut tally = Self::new();
        for vote in votes {
            tally.cast(vote.voter, vote.target);
        }
        tally
    }

    /// Records a vote, replacing the voter's earlier choice.
    pub fn cast(&mut self, voter: PlayerId, target: PlayerId) {
        if self.votes.insert(voter, target).is_none() {
            self.order.push(voter);
        }
    }

    pub fn vote_of(&self, voter: PlayerId) -> Option<PlayerId> {
        self.votes.get(&voter).copied()
    }

    /// Number of distinct voters.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
        self.order.clear();
    }

    pub fn to_vec(&self) -> Vec<Vote> {
        self.order
            .iter()
            .filter_map(|voter| {
                self.votes.get(voter).map(|target| Vote {
                    voter: *voter,
                    target: *target,
                })
            })
            .collect()
    }

    /// Votes per target.
    pub fn counts(&self) -> BTreeMap<PlayerId, usize> {
        let mut counts = BTreeMap::new();
        for target in self.votes.values() {
            *counts.entry(*target).or_insert(0) += 1;
        }
        counts
    }

    /// Resolves the round. `None` when nobody voted.
    pub fn outcome(&self) -> Option<VoteOutcome> {
        let counts = self.counts();
        let max = *counts.values().max()?;
        let mut leaders: Vec<PlayerId> = counts
            .into_iter()
            .filter(|(_, count)| *count == max)
            .map(|(target, _)| target)
            .collect();

        if leaders.len() == 1 {
            leaders.pop().map(VoteOutcome::Eliminate)
        } else {
            Some(VoteOutcome::Tie(leaders))
        }
    }
}

impl Game {
    /// Casts or replaces a roundtable vote. The round closes by itself once
    /// every living player has voted.
    pub fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: PlayerId,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        if self.state.phase != Phase::Roundtable {
            return Err(GameError::NotRoundtable);
        }
        if !self.roster.is_alive(voter) {
            return Err(GameError::VoterNotAlive);
        }
        if !self.roster.is_alive(target) {
            return Err(GameError::InvalidTarget);
        }

        self.votes.cast(voter, target);
        let votes_cast = self.votes.len();
        let votes_needed = self.roster.living_count();
        debug!("Vote {}/{}: {} -> {}", votes_cast, votes_needed, voter, target);

        let mut events = vec![GameEvent::VoteRecorded {
            voter,
            votes_cast,
            votes_needed,
        }];
        if votes_cast >= votes_needed {
            self.close_round(&mut events);
        }
        Ok(events)
    }

    fn close_round(&mut self, events: &mut Vec<GameEvent>) {
        let outcome = self.votes.outcome();
        self.votes.clear();

        match outcome {
            Some(VoteOutcome::Eliminate(expelled)) => {
                info!("Roundtable expels {}", self.roster.display_name(expelled));
                events.extend(self.eliminate(expelled));
            }
            Some(VoteOutcome::Tie(targets)) => {
                info!("Roundtable tied between {} players", targets.len());
                events.push(GameEvent::VoteTied { targets });
            }
            None => {}
        }

        if self.state.phase != Phase::GameOver {
            self.enter_night(events);
        }
    }
}
