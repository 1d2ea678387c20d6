//! Phase engine: the authoritative game state and its transitions.
//!
//! ```text
//! waiting -> invitation -> night -> roundtable -> night -> ... -> gameover
//! ```
//!
//! Every operation validates completely before mutating, so a rejected
//! action leaves the game untouched. Operations return the [`GameEvent`]s
//! they produced; turning those into messages and snapshots is the session
//! authority's job. The invitation, night and vote operations live in their
//! own modules as further `impl Game` blocks.

use crate::clock::Clock;
use crate::config::GameConfig;
use crate::error::GameError;
use crate::events::GameEvent;
use crate::roles::RoleAssigner;
use crate::roster::{Player, Roster};
use crate::votes::{Vote, VoteTally};
use log::info;
use serde::{Deserialize, Serialize};
use shared::{ConnectionId, ConnectionToken, Faction, InvitationStatus, Phase, PlayerId};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub target: PlayerId,
    pub accepted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub phase: Phase,
    pub day: u32,
    pub traitor_ids: BTreeSet<PlayerId>,
    pub faithful_ids: BTreeSet<PlayerId>,
    pub last_night_victim: Option<PlayerId>,
    pub pending_invitation: Option<PendingInvitation>,
    /// Answer to the day-1 invitation once it has been given.
    pub last_invitation_outcome: Option<bool>,
    pub winner: Option<Faction>,
}

impl GameState {
    pub fn invitation_status(&self) -> InvitationStatus {
        match (&self.pending_invitation, self.last_invitation_outcome) {
            (Some(_), _) => InvitationStatus::Pending,
            (None, Some(true)) => InvitationStatus::Accepted,
            (None, Some(false)) => InvitationStatus::Rejected,
            (None, None) => InvitationStatus::None,
        }
    }
}

/// Durable form of a running game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub state: GameState,
    pub votes: Vec<Vote>,
}

/// One game instance: roster, state, votes and the capabilities they need.
pub struct Game {
    pub(crate) config: GameConfig,
    pub(crate) state: GameState,
    pub(crate) roster: Roster,
    pub(crate) votes: VoteTally,
    pub(crate) roles: RoleAssigner,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Game {
    pub fn new(config: GameConfig, roles: RoleAssigner, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: GameState::default(),
            roster: Roster::new(),
            votes: VoteTally::new(),
            roles,
            clock,
        }
    }

    /// Resumes from persisted data. Restored players are all disconnected.
    pub fn restore(
        config: GameConfig,
        roles: RoleAssigner,
        clock: Arc<dyn Clock>,
        snapshot: Option<GameSnapshot>,
        players: Vec<Player>,
    ) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        info!(
            "Restoring game: phase {}, day {}, {} players",
            snapshot.state.phase,
            snapshot.state.day,
            players.len()
        );
        Self {
            config,
            state: snapshot.state,
            roster: Roster::restore(players),
            votes: VoteTally::restore(snapshot.votes),
            roles,
            clock,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn votes(&self) -> &VoteTally {
        &self.votes
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn day(&self) -> u32 {
        self.state.day
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            state: self.state.clone(),
            votes: self.votes.to_vec(),
        }
    }

    pub fn is_traitor(&self, id: PlayerId) -> bool {
        self.state.traitor_ids.contains(&id)
    }

    pub fn living_traitors(&self) -> usize {
        self.roster
            .living_players()
            .filter(|p| self.state.traitor_ids.contains(&p.id))
            .count()
    }

    pub fn living_faithful(&self) -> usize {
        self.roster
            .living_players()
            .filter(|p| self.state.faithful_ids.contains(&p.id))
            .count()
    }

    /// Display names of all traitors, in join order.
    pub fn traitor_names(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter(|p| self.state.traitor_ids.contains(&p.id))
            .map(|p| p.display_name.clone())
            .collect()
    }

    pub(crate) fn ensure_not_over(&self) -> Result<(), GameError> {
        if self.state.phase == Phase::GameOver {
            return Err(GameError::GameAlreadyOver);
        }
        Ok(())
    }

    pub fn join(
        &mut self,
        connection: ConnectionId,
        display_name: &str,
        avatar: &str,
    ) -> Result<(PlayerId, ConnectionToken, Vec<GameEvent>), GameError> {
        if self.state.phase != Phase::Waiting {
            return Err(GameError::GameInProgress);
        }
        if avatar.len() > self.config.max_avatar_len {
            return Err(GameError::InvalidAvatar {
                max: self.config.max_avatar_len,
            });
        }
        if self.roster.len() >= self.config.max_players {
            return Err(GameError::RosterFull {
                max: self.config.max_players,
            });
        }
        let (player, token) =
            self.roster
                .join(display_name, avatar, connection, self.config.max_name_len)?;
        Ok((player, token, vec![GameEvent::PlayerJoined { player }]))
    }

    pub fn reconnect(
        &mut self,
        token: &ConnectionToken,
        connection: ConnectionId,
    ) -> Result<(PlayerId, Vec<GameEvent>), GameError> {
        let player = self.roster.reconnect(token, connection)?.id;
        Ok((player, vec![GameEvent::PlayerReconnected { player }]))
    }

    /// Drops the connection binding. A pending invitation aimed at the
    /// departing player is withdrawn.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<GameEvent> {
        let Some(player) = self.roster.disconnect(connection) else {
            return Vec::new();
        };

        let mut events = vec![GameEvent::PlayerDisconnected { player }];
        let was_invited = matches!(
            &self.state.pending_invitation,
            Some(pending) if pending.target == player
        );
        if was_invited {
            self.state.pending_invitation = None;
            info!("Invitation to {} cancelled: disconnected", player);
            events.push(GameEvent::InvitationCancelled {
                target: player,
                reason: "the invited player disconnected".to_string(),
            });
        }
        events
    }

    /// waiting -> invitation: assigns roles and opens day 1.
    pub fn start(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        if self.state.phase != Phase::Waiting {
            return Err(GameError::GameInProgress);
        }

        let assignment = self.roles.assign(&self.roster.ids())?;

        self.roster.reset_roles();
        for id in &assignment.traitors {
            self.roster.set_faction(*id, Faction::Traitor);
        }
        for id in &assignment.faithful {
            self.roster.set_faction(*id, Faction::Faithful);
        }
        self.state.traitor_ids = assignment.traitors;
        self.state.faithful_ids = assignment.faithful;
        self.state.day = 1;
        self.state.phase = Phase::Invitation;
        self.votes.clear();

        info!(
            "Game started with {} players ({} traitors)",
            self.roster.len(),
            self.state.traitor_ids.len()
        );
        Ok(vec![
            GameEvent::RolesAssigned,
            GameEvent::DayAdvanced { day: 1 },
            GameEvent::PhaseChanged {
                phase: Phase::Invitation,
            },
        ])
    }

    /// Master-of-ceremonies day advance, allowed from invitation or night.
    pub fn advance_day(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        match self.state.phase {
            Phase::Invitation | Phase::Night => {}
            other => return Err(GameError::WrongPhase(other)),
        }

        let mut events = Vec::new();
        if let Some(pending) = self.state.pending_invitation.take() {
            events.push(GameEvent::InvitationCancelled {
                target: pending.target,
                reason: "the day ended".to_string(),
            });
        }

        self.state.day += 1;
        info!("Advanced to day {}", self.state.day);
        events.push(GameEvent::DayAdvanced {
            day: self.state.day,
        });
        self.enter_night(&mut events);
        Ok(events)
    }

    /// Back to a freshly constructed game with an empty roster.
    pub fn reset(&mut self) {
        self.state = GameState::default();
        self.roster = Roster::new();
        self.votes.clear();
        info!("Game reset");
    }

    /// Marks a player dead and evaluates the win conditions.
    ///
    /// Eliminating an already dead player does nothing, so the win check is
    /// never counted twice.
    pub fn eliminate(&mut self, player: PlayerId) -> Vec<GameEvent> {
        if !self.roster.eliminate(player) {
            return Vec::new();
        }
        let mut events = vec![GameEvent::PlayerEliminated { player }];
        self.check_game_over(&mut events);
        events
    }

    /// Moves to night. Faction counts only change through eliminations, which
    /// evaluate on their own; the night transition matters only once the day
    /// limit has been reached.
    pub(crate) fn enter_night(&mut self, events: &mut Vec<GameEvent>) {
        if self.state.phase != Phase::Night {
            self.state.phase = Phase::Night;
            events.push(GameEvent::PhaseChanged { phase: Phase::Night });
        }
        if self.state.day >= self.config.day_limit {
            self.check_game_over(events);
        }
    }

    /// Evaluates, in order: no traitors left, traitors at parity, day limit
    /// reached at night. Returns the winner if the game just ended.
    pub(crate) fn check_game_over(&mut self, events: &mut Vec<GameEvent>) -> Option<Faction> {
        if self.state.phase == Phase::GameOver {
            return None;
        }

        let traitors = self.living_traitors();
        let faithful = self.living_faithful();
        let winner = if traitors == 0 {
            Faction::Faithful
        } else if traitors >= faithful {
            Faction::Traitor
        } else if self.state.day >= self.config.day_limit && self.state.phase == Phase::Night {
            Faction::Faithful
        } else {
            return None;
        };

        self.state.phase = Phase::GameOver;
        self.state.winner = Some(winner);
        self.state.pending_invitation = None;
        self.votes.clear();
        info!(
            "Game over on day {}: {} win ({} traitors vs {} faithful alive)",
            self.state.day, winner, traitors, faithful
        );
        events.push(GameEvent::PhaseChanged {
            phase: Phase::GameOver,
        });
        events.push(GameEvent::GameOver { winner });
        Some(winner)
    }
}
