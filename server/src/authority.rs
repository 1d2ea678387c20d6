//! Session authority: the single entry point for client actions.
//!
//! The authority owns the [`Game`] and everything that sits beside it but is
//! not game logic: admin sessions, scoring tests, chat and the mapping from
//! engine events to client-visible [`ServerEvent`]s. Every call returns an
//! [`Outcome`] listing who should receive what and which [`PersistOp`]s to
//! hand to storage. Nothing here performs I/O.

use crate::error::GameError;
use crate::events::GameEvent;
use crate::game::Game;
use crate::persistence::PersistOp;
use chrono::Utc;
use log::{debug, info, warn};
use shared::{
    AdminView, ChatAudience, ClientAction, ConnectionId, ConnectionToken, Faction, PlayerId,
    ScoringTest, ServerEvent,
};
use std::collections::{BTreeSet, HashSet};

/// Who a delivery is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Connection(ConnectionId),
    Player(PlayerId),
    Players(Vec<PlayerId>),
    Admins,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipients: Recipients,
    pub event: ServerEvent,
}

/// Recipients resolved against the current roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Broadcast,
    Connections(Vec<ConnectionId>),
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub deliveries: Vec<Delivery>,
    pub persistence: Vec<PersistOp>,
}

impl Outcome {
    fn send(&mut self, recipients: Recipients, event: ServerEvent) {
        self.deliveries.push(Delivery { recipients, event });
    }

    fn rejected(connection: ConnectionId, error: &GameError) -> Self {
        let mut outcome = Self::default();
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::Rejected {
                kind: error.kind(),
                reason: error.to_string(),
            },
        );
        outcome
    }

    /// Events sent to `recipients`, in order. Mostly useful in tests.
    pub fn events_for(&self, recipients: &Recipients) -> Vec<&ServerEvent> {
        self.deliveries
            .iter()
            .filter(|d| &d.recipients == recipients)
            .map(|d| &d.event)
            .collect()
    }
}

pub struct SessionAuthority {
    game: Game,
    admin_secret: String,
    admins: HashSet<ConnectionId>,
    active_tests: Vec<ScoringTest>,
    next_test_id: u64,
}

impl SessionAuthority {
    pub fn new(game: Game, admin_secret: impl Into<String>) -> Self {
        Self {
            game,
            admin_secret: admin_secret.into(),
            admins: HashSet::new(),
            active_tests: Vec::new(),
            next_test_id: 1,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn is_admin(&self, connection: ConnectionId) -> bool {
        self.admins.contains(&connection)
    }

    pub fn active_tests(&self) -> &[ScoringTest] {
        &self.active_tests
    }

    /// Applies one client action. A refused action produces a single
    /// `Rejected` delivery to the sender and no persistence.
    pub fn handle(&mut self, connection: ConnectionId, action: ClientAction) -> Outcome {
        let refresh_admins = !matches!(
            action,
            ClientAction::Chat { .. } | ClientAction::AdminLogin { .. } | ClientAction::AdminGetState
        );

        match self.dispatch(connection, action) {
            Ok(mut outcome) => {
                if refresh_admins && !self.admins.is_empty() {
                    outcome.send(Recipients::Admins, ServerEvent::AdminState(self.admin_view()));
                }
                outcome
            }
            Err(error) => {
                warn!("Rejected action from {}: {}", connection, error);
                Outcome::rejected(connection, &error)
            }
        }
    }

    /// Transport-level disconnect or timeout.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Outcome {
        self.admins.remove(&connection);
        let events = self.game.disconnect(connection);

        let mut outcome = Outcome::default();
        if events.is_empty() {
            return outcome;
        }
        info!("Connection {} left the game", connection);
        self.persist(&events, &mut outcome);
        self.publish(events, &mut outcome);
        if !self.admins.is_empty() {
            outcome.send(Recipients::Admins, ServerEvent::AdminState(self.admin_view()));
        }
        outcome
    }

    /// Resolves recipients to live connections. Disconnected players are
    /// skipped; they catch up when they reconnect.
    pub fn route(&self, recipients: &Recipients) -> Route {
        let roster = self.game.roster();
        match recipients {
            Recipients::All => Route::Broadcast,
            Recipients::Connection(connection) => Route::Connections(vec![*connection]),
            Recipients::Player(id) => {
                Route::Connections(roster.connection_of(*id).into_iter().collect())
            }
            Recipients::Players(ids) => Route::Connections(
                ids.iter()
                    .filter_map(|id| roster.connection_of(*id))
                    .collect(),
            ),
            Recipients::Admins => {
                let mut admins: Vec<ConnectionId> = self.admins.iter().copied().collect();
                admins.sort();
                Route::Connections(admins)
            }
        }
    }

    pub fn admin_view(&self) -> AdminView {
        let state = self.game.state();
        AdminView {
            phase: state.phase,
            day: state.day,
            players: self.game.roster().public_view(),
            traitor_count: state.traitor_ids.len(),
            faithful_count: state.faithful_ids.len(),
            active_tests: self.active_tests.clone(),
            invitation: state.invitation_status(),
            winner: state.winner,
        }
    }

    fn dispatch(
        &mut self,
        connection: ConnectionId,
        action: ClientAction,
    ) -> Result<Outcome, GameError> {
        match action {
            ClientAction::Join {
                display_name,
                avatar,
            } => self.join(connection, &display_name, &avatar),
            ClientAction::Reconnect { token } => self.reconnect(connection, &token),
            ClientAction::StartGame => {
                self.actor(connection)?;
                let events = self.game.start()?;
                Ok(self.commit(events))
            }
            ClientAction::Invite { target } => {
                let actor = self.actor(connection)?;
                let events = self.game.invite(actor, target)?;
                Ok(self.commit(events))
            }
            ClientAction::RespondInvitation { accept } => {
                let actor = self.actor(connection)?;
                let events = self.game.respond_invitation(actor, accept)?;
                Ok(self.commit(events))
            }
            ClientAction::NightKill { victim } => {
                let actor = self.actor(connection)?;
                let events = self.game.kill(actor, victim)?;
                Ok(self.commit(events))
            }
            ClientAction::CastVote { target } => {
                let actor = self.actor(connection)?;
                let events = self.game.cast_vote(actor, target)?;
                Ok(self.commit(events))
            }
            ClientAction::Chat { message, audience } => self.chat(connection, &message, audience),
            ClientAction::AdminLogin { secret } => Ok(self.admin_login(connection, &secret)),
            ClientAction::AdminNextDay => {
                self.require_admin(connection)?;
                let events = self.game.advance_day()?;
                let mut outcome = self.commit(events);
                outcome.send(
                    Recipients::Connection(connection),
                    ServerEvent::AdminMessage(format!("Advanced to day {}", self.game.day())),
                );
                Ok(outcome)
            }
            ClientAction::AdminReset => {
                self.require_admin(connection)?;
                Ok(self.reset(connection))
            }
            ClientAction::AdminGetState => {
                self.require_admin(connection)?;
                let mut outcome = Outcome::default();
                outcome.send(
                    Recipients::Connection(connection),
                    ServerEvent::AdminState(self.admin_view()),
                );
                Ok(outcome)
            }
            ClientAction::AdminStartTest { name, targets } => {
                self.require_admin(connection)?;
                self.start_test(connection, name, targets)
            }
            ClientAction::AdminAwardPoints { targets, amount } => {
                self.require_admin(connection)?;
                self.award_points(connection, &targets, amount)
            }
        }
    }

    fn actor(&self, connection: ConnectionId) -> Result<PlayerId, GameError> {
        self.game
            .roster()
            .player_for_connection(connection)
            .ok_or(GameError::NotJoined)
    }

    fn require_admin(&self, connection: ConnectionId) -> Result<(), GameError> {
        if self.is_admin(connection) {
            Ok(())
        } else {
            Err(GameError::NotAuthorized)
        }
    }

    fn commit(&self, events: Vec<GameEvent>) -> Outcome {
        let mut outcome = Outcome::default();
        self.persist(&events, &mut outcome);
        self.publish(events, &mut outcome);
        outcome
    }

    fn join(
        &mut self,
        connection: ConnectionId,
        display_name: &str,
        avatar: &str,
    ) -> Result<Outcome, GameError> {
        let (player_id, token, events) = self.game.join(connection, display_name, avatar)?;

        let mut outcome = Outcome::default();
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::Joined { player_id, token },
        );
        self.persist(&events, &mut outcome);
        self.publish(events, &mut outcome);
        Ok(outcome)
    }

    fn reconnect(
        &mut self,
        connection: ConnectionId,
        token: &ConnectionToken,
    ) -> Result<Outcome, GameError> {
        let (id, events) = self.game.reconnect(token, connection)?;
        let player = self
            .game
            .roster()
            .get(id)
            .map(|p| p.to_own())
            .ok_or(GameError::UnknownToken)?;

        let mut outcome = Outcome::default();
        let to_player = Recipients::Connection(connection);
        outcome.send(
            to_player.clone(),
            ServerEvent::Reconnected {
                player,
                phase: self.game.phase(),
                day: self.game.day(),
            },
        );
        if let Some(role) = self.role_event(id) {
            outcome.send(to_player.clone(), role);
        }
        let invited = matches!(
            &self.game.state().pending_invitation,
            Some(pending) if pending.target == id
        );
        if invited {
            outcome.send(to_player, ServerEvent::InvitationOffered);
        }
        self.publish(events, &mut outcome);
        Ok(outcome)
    }

    fn chat(
        &self,
        connection: ConnectionId,
        message: &str,
        audience: ChatAudience,
    ) -> Result<Outcome, GameError> {
        let actor = self.actor(connection)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(GameError::EmptyMessage);
        }

        let recipients = match audience {
            ChatAudience::All => Recipients::All,
            ChatAudience::Traitors => {
                if !self.game.is_traitor(actor) {
                    return Err(GameError::NotTraitor);
                }
                self.traitors()
            }
        };
        debug!("Chat ({:?}) from {}: {}", audience, actor, message);

        let mut outcome = Outcome::default();
        outcome.send(
            recipients,
            ServerEvent::ChatRelayed {
                from: self.game.roster().display_name(actor).to_string(),
                message: message.to_string(),
                audience,
            },
        );
        Ok(outcome)
    }

    fn admin_login(&mut self, connection: ConnectionId, secret: &str) -> Outcome {
        let granted = secret == self.admin_secret;
        if granted {
            info!("Admin session opened on {}", connection);
            self.admins.insert(connection);
        } else {
            warn!("Failed admin login from {}", connection);
        }

        let mut outcome = Outcome::default();
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::AdminAuth { granted },
        );
        if granted {
            outcome.send(
                Recipients::Connection(connection),
                ServerEvent::AdminState(self.admin_view()),
            );
        }
        outcome
    }

    fn reset(&mut self, connection: ConnectionId) -> Outcome {
        self.game.reset();
        self.active_tests.clear();

        let mut outcome = Outcome::default();
        outcome.persistence.push(PersistOp::ClearAll);
        outcome.send(Recipients::All, ServerEvent::GameReset);
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::AdminMessage("Game reset".to_string()),
        );
        outcome
    }

    fn start_test(
        &mut self,
        connection: ConnectionId,
        name: String,
        targets: Vec<PlayerId>,
    ) -> Result<Outcome, GameError> {
        let name = name.trim().to_string();
        let max = self.game.config().max_name_len;
        if name.is_empty() || name.chars().count() > max {
            return Err(GameError::InvalidTestName { max });
        }
        self.ensure_known(&targets)?;

        let test = ScoringTest {
            id: self.next_test_id,
            name: name.clone(),
            players: targets.clone(),
            started_at: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
        };
        self.next_test_id += 1;
        info!("Test {} \"{}\" started for {} players", test.id, name, targets.len());
        self.active_tests.push(test);

        let mut outcome = Outcome::default();
        outcome.send(
            Recipients::Players(targets),
            ServerEvent::TestStarted { name: name.clone() },
        );
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::AdminMessage(format!("Test \"{}\" started", name)),
        );
        Ok(outcome)
    }

    fn award_points(
        &mut self,
        connection: ConnectionId,
        targets: &[PlayerId],
        amount: i64,
    ) -> Result<Outcome, GameError> {
        self.ensure_known(targets)?;

        let mut outcome = Outcome::default();
        // BTreeSet: a target listed twice is awarded once
        let unique: BTreeSet<PlayerId> = targets.iter().copied().collect();
        for id in unique {
            let Some(total) = self.game.roster.add_points(id, amount) else {
                continue;
            };
            outcome.send(
                Recipients::Player(id),
                ServerEvent::PointsAwarded {
                    points: amount,
                    total,
                },
            );
            if let Some(player) = self.game.roster().get(id) {
                outcome.persistence.push(PersistOp::UpsertPlayer(player.clone()));
            }
        }
        info!("Awarded {} points to {} players", amount, targets.len());

        let scores = self.game.roster().iter().map(|p| (p.id, p.score)).collect();
        outcome.send(Recipients::All, ServerEvent::ScoresUpdated { scores });
        outcome.send(
            Recipients::Connection(connection),
            ServerEvent::AdminMessage("Points awarded".to_string()),
        );
        Ok(outcome)
    }

    fn ensure_known(&self, targets: &[PlayerId]) -> Result<(), GameError> {
        if targets.iter().all(|id| self.game.roster().contains(*id)) {
            Ok(())
        } else {
            Err(GameError::InvalidTarget)
        }
    }

    fn traitors(&self) -> Recipients {
        Recipients::Players(self.game.state().traitor_ids.iter().copied().collect())
    }

    /// Private role notice. Traitors learn the names of the other traitors.
    fn role_event(&self, id: PlayerId) -> Option<ServerEvent> {
        let player = self.game.roster().get(id)?;
        if player.faction == Faction::Unassigned {
            return None;
        }
        let fellow_traitors = if self.game.is_traitor(id) {
            self.game
                .roster()
                .iter()
                .filter(|p| p.id != id && self.game.is_traitor(p.id))
                .map(|p| p.display_name.clone())
                .collect()
        } else {
            Vec::new()
        };
        Some(ServerEvent::RoleAssigned {
            faction: player.faction,
            fellow_traitors,
        })
    }

    /// Upserts players whose durable record changed, then the game snapshot.
    fn persist(&self, events: &[GameEvent], outcome: &mut Outcome) {
        let mut touched = BTreeSet::new();
        for event in events {
            match event {
                GameEvent::RolesAssigned => touched.extend(self.game.roster().ids()),
                GameEvent::PlayerJoined { player }
                | GameEvent::PlayerEliminated { player }
                | GameEvent::InvitationResolved {
                    target: player,
                    accepted: true,
                } => {
                    touched.insert(*player);
                }
                _ => {}
            }
        }

        let roster = self.game.roster();
        outcome.persistence.extend(
            touched
                .into_iter()
                .filter_map(|id| roster.get(id))
                .map(|p| PersistOp::UpsertPlayer(p.clone())),
        );
        outcome
            .persistence
            .push(PersistOp::SaveSnapshot(self.game.snapshot()));
    }

    /// Maps engine events to client-visible deliveries.
    fn publish(&self, events: Vec<GameEvent>, outcome: &mut Outcome) {
        let roster = self.game.roster();
        for event in events {
            match event {
                GameEvent::PlayerJoined { .. } | GameEvent::PlayerReconnected { .. } => {
                    outcome.send(
                        Recipients::All,
                        ServerEvent::RosterChanged {
                            players: roster.public_view(),
                        },
                    );
                }
                GameEvent::PlayerDisconnected { player } => {
                    outcome.send(
                        Recipients::All,
                        ServerEvent::PlayerDisconnected { player_id: player },
                    );
                    outcome.send(
                        Recipients::All,
                        ServerEvent::RosterChanged {
                            players: roster.public_view(),
                        },
                    );
                }
                GameEvent::RolesAssigned => {
                    for id in roster.ids() {
                        if let Some(role) = self.role_event(id) {
                            outcome.send(Recipients::Player(id), role);
                        }
                    }
                }
                GameEvent::DayAdvanced { day } => {
                    outcome.send(Recipients::All, ServerEvent::DayAdvanced { day });
                }
                GameEvent::PhaseChanged { phase } => {
                    outcome.send(Recipients::All, ServerEvent::PhaseChanged { phase });
                }
                GameEvent::InvitationOffered { target } => {
                    outcome.send(Recipients::Player(target), ServerEvent::InvitationOffered);
                    outcome.send(
                        self.traitors(),
                        ServerEvent::InvitationSent {
                            target_name: roster.display_name(target).to_string(),
                        },
                    );
                }
                GameEvent::InvitationResolved { target, accepted } => {
                    let others = self
                        .game
                        .state()
                        .traitor_ids
                        .iter()
                        .copied()
                        .filter(|id| *id != target)
                        .collect();
                    outcome.send(
                        Recipients::Players(others),
                        ServerEvent::InvitationOutcome {
                            target_name: roster.display_name(target).to_string(),
                            accepted,
                        },
                    );
                    if accepted {
                        if let Some(role) = self.role_event(target) {
                            outcome.send(Recipients::Player(target), role);
                        }
                    }
                }
                GameEvent::InvitationCancelled { target, reason } => {
                    let mut recipients: Vec<PlayerId> =
                        self.game.state().traitor_ids.iter().copied().collect();
                    recipients.push(target);
                    outcome.send(
                        Recipients::Players(recipients),
                        ServerEvent::InvitationCancelled { reason },
                    );
                }
                GameEvent::NightVictim { victim } => {
                    if let Some(player) = roster.get(victim) {
                        outcome.send(
                            Recipients::All,
                            ServerEvent::NightVictimAnnounced {
                                victim: player.to_public(),
                            },
                        );
                    }
                }
                GameEvent::VoteRecorded {
                    votes_cast,
                    votes_needed,
                    ..
                } => {
                    outcome.send(
                        Recipients::All,
                        ServerEvent::VoteRecorded {
                            votes_cast,
                            votes_needed,
                        },
                    );
                }
                GameEvent::VoteTied { .. } => {
                    outcome.send(Recipients::All, ServerEvent::VoteTied);
                }
                GameEvent::PlayerEliminated { player } => {
                    if let Some(player) = roster.get(player) {
                        outcome.send(
                            Recipients::All,
                            ServerEvent::PlayerEliminated {
                                player: player.to_public(),
                            },
                        );
                    }
                }
                GameEvent::GameOver { winner } => {
                    outcome.send(Recipients::All, ServerEvent::GameOver { winner });
                }
            }
        }
    }
}
