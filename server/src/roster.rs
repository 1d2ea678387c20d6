//! The canonical set of players.
//!
//! Players are indexed by their stable `PlayerId`. Two secondary indices map
//! the transient connection and the reconnection token back to that id, so
//! rebinding a returning player touches exactly one entry and nothing else in
//! the game state has to be rewritten.
//!
//! Records are never removed during a game: a disconnect only clears the
//! connection, keeping faction, liveness and score for the player's return.

use crate::error::GameError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{ConnectionId, ConnectionToken, Faction, OwnPlayer, PlayerId, PublicPlayer};
use std::collections::HashMap;

/// One participant and everything the authority knows about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Live network peer, `None` while disconnected.
    #[serde(skip)]
    pub connection: Option<ConnectionId>,
    pub display_name: String,
    pub avatar: String,
    pub faction: Faction,
    pub alive: bool,
    pub score: i64,
    pub token: ConnectionToken,
}

impl Player {
    pub fn new(display_name: String, avatar: String) -> Self {
        Self {
            id: PlayerId::new(),
            connection: None,
            display_name,
            avatar,
            faction: Faction::Unassigned,
            alive: true,
            score: 0,
            token: ConnectionToken::generate(),
        }
    }

    pub fn is_traitor(&self) -> bool {
        self.faction == Faction::Traitor
    }

    pub fn to_public(&self) -> PublicPlayer {
        PublicPlayer {
            id: self.id,
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            alive: self.alive,
            connected: self.connection.is_some(),
            score: self.score,
        }
    }

    pub fn to_own(&self) -> OwnPlayer {
        OwnPlayer {
            id: self.id,
            display_name: self.display_name.clone(),
            faction: self.faction,
            alive: self.alive,
            score: self.score,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Roster {
    players: HashMap<PlayerId, Player>,
    /// Join order, for stable listings.
    order: Vec<PlayerId>,
    by_connection: HashMap<ConnectionId, PlayerId>,
    by_token: HashMap<ConnectionToken, PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a roster from persisted records. Everyone starts disconnected.
    pub fn restore(players: impl IntoIterator<Item = Player>) -> Self {
        let mut roster = Self::new();
        for mut player in players {
            player.connection = None;
            roster.insert(player);
        }
        roster
    }

    fn insert(&mut self, player: Player) {
        let id = player.id;
        self.by_token.insert(player.token.clone(), id);
        if let Some(connection) = player.connection {
            self.by_connection.insert(connection, id);
        }
        if !self.players.contains_key(&id) {
            self.order.push(id);
        }
        self.players.insert(id, player);
    }

    /// Adds a new player bound to `connection`.
    ///
    /// Phase gating (`GameInProgress`) is the caller's responsibility since the
    /// roster does not know the phase.
    pub fn join(
        &mut self,
        display_name: &str,
        avatar: &str,
        connection: ConnectionId,
        max_name_len: usize,
    ) -> Result<(PlayerId, ConnectionToken), GameError> {
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > max_name_len {
            return Err(GameError::InvalidName { max: max_name_len });
        }
        if self.by_connection.contains_key(&connection) {
            return Err(GameError::AlreadyJoined);
        }

        let mut player = Player::new(display_name.to_string(), avatar.to_string());
        player.connection = Some(connection);
        let credentials = (player.id, player.token.clone());

        info!("{} joined as {} ({})", connection, player.display_name, player.id);
        self.insert(player);
        Ok(credentials)
    }

    /// Rebinds the token's owner to `connection`.
    ///
    /// A stale connection still mapped to the player is forgotten; a
    /// connection already playing as someone else is refused.
    pub fn reconnect(
        &mut self,
        token: &ConnectionToken,
        connection: ConnectionId,
    ) -> Result<&Player, GameError> {
        let id = *self.by_token.get(token).ok_or(GameError::UnknownToken)?;
        if let Some(bound) = self.by_connection.get(&connection) {
            if *bound != id {
                return Err(GameError::AlreadyJoined);
            }
        }

        let player = self.players.get_mut(&id).ok_or(GameError::UnknownToken)?;
        if let Some(stale) = player.connection.replace(connection) {
            if stale != connection {
                debug!("{} replaces stale {} for {}", connection, stale, id);
            }
            self.by_connection.remove(&stale);
        }
        self.by_connection.insert(connection, id);

        info!("{} reconnected on {}", player.display_name, connection);
        Ok(&*player)
    }

    /// Clears the connection binding. Returns the affected player, if any.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        let id = self.by_connection.remove(&connection)?;
        if let Some(player) = self.players.get_mut(&id) {
            player.connection = None;
            info!("{} disconnected ({})", player.display_name, connection);
        }
        Some(id)
    }

    /// Marks the player dead. Returns `true` only if they were alive.
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) if player.alive => {
                player.alive = false;
                info!("{} eliminated", player.display_name);
                true
            }
            _ => false,
        }
    }

    pub fn set_faction(&mut self, id: PlayerId, faction: Faction) {
        if let Some(player) = self.players.get_mut(&id) {
            player.faction = faction;
        }
    }

    /// Revives everyone and clears factions, ready for role assignment.
    pub fn reset_roles(&mut self) {
        for player in self.players.values_mut() {
            player.faction = Faction::Unassigned;
            player.alive = true;
        }
    }

    pub fn add_points(&mut self, id: PlayerId, points: i64) -> Option<i64> {
        let player = self.players.get_mut(&id)?;
        player.score = player.score.saturating_add(points);
        Some(player.score)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player_for_connection(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.by_connection.get(&connection).copied()
    }

    pub fn connection_of(&self, id: PlayerId) -> Option<ConnectionId> {
        self.players.get(&id).and_then(|p| p.connection)
    }

    pub fn display_name(&self, id: PlayerId) -> &str {
        self.players
            .get(&id)
            .map(|p| p.display_name.as_str())
            .unwrap_or("unknown")
    }

    /// All players in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> + Clone + '_ {
        self.order.iter().filter_map(|id| self.players.get(id))
    }

    /// Alive players in join order. The iterator is lazy and can be cloned to
    /// walk the same snapshot again.
    pub fn living_players(&self) -> impl Iterator<Item = &Player> + Clone + '_ {
        self.iter().filter(|p| p.alive)
    }

    pub fn living_count(&self) -> usize {
        self.living_players().count()
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.players.get(&id).map(|p| p.alive).unwrap_or(false)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.order.clone()
    }

    pub fn public_view(&self) -> Vec<shared::PublicPlayer> {
        self.iter().map(Player::to_public).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
