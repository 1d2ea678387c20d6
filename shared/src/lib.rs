//! Wire protocol shared by the game authority and its clients.
//!
//! Everything that crosses the UDP socket lives here: identifiers, the
//! public enums (`Phase`, `Faction`), the action vocabulary clients send and
//! the events the authority emits. Packets are encoded with `bincode`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Largest datagram either side will send or accept.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Stable identity of a person for the whole game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient identifier of one network peer; changes on every reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bearer credential handed out once at first join.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionToken(pub String);

impl ConnectionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionToken(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Faction {
    #[default]
    Unassigned,
    Faithful,
    Traitor,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Faction::Unassigned => "unassigned",
            Faction::Faithful => "faithful",
            Faction::Traitor => "traitor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Waiting,
    Invitation,
    Night,
    Roundtable,
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Invitation => "invitation",
            Phase::Night => "night",
            Phase::Roundtable => "roundtable",
            Phase::GameOver => "gameover",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a rejected action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Wrong phase or wrong actor role for the requested action.
    IllegalAction,
    /// Malformed or out-of-range input.
    ValidationFailure,
    /// The action conflicts with existing state.
    StateConflict,
    /// Storage collaborator unavailable.
    PersistenceFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatAudience {
    All,
    Traitors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    None,
    Pending,
    Accepted,
    Rejected,
}

/// What every participant may know about a player. Factions never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: PlayerId,
    pub display_name: String,
    pub avatar: String,
    pub alive: bool,
    pub connected: bool,
    pub score: i64,
}

/// A player's own view of themselves, sent on reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnPlayer {
    pub id: PlayerId,
    pub display_name: String,
    pub faction: Faction,
    pub alive: bool,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTest {
    pub id: u64,
    pub name: String,
    pub players: Vec<PlayerId>,
    /// Milliseconds since the Unix epoch.
    pub started_at: u64,
}

/// Game overview for the master of ceremonies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminView {
    pub phase: Phase,
    pub day: u32,
    pub players: Vec<PublicPlayer>,
    pub traitor_count: usize,
    pub faithful_count: usize,
    pub active_tests: Vec<ScoringTest>,
    pub invitation: InvitationStatus,
    pub winner: Option<Faction>,
}

/// Actions a client can request from the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientAction {
    Join { display_name: String, avatar: String },
    Reconnect { token: ConnectionToken },
    StartGame,
    Invite { target: PlayerId },
    RespondInvitation { accept: bool },
    NightKill { victim: PlayerId },
    CastVote { target: PlayerId },
    Chat { message: String, audience: ChatAudience },
    AdminLogin { secret: String },
    AdminNextDay,
    AdminReset,
    AdminGetState,
    AdminStartTest { name: String, targets: Vec<PlayerId> },
    AdminAwardPoints { targets: Vec<PlayerId>, amount: i64 },
}

/// Events the authority pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    Joined { player_id: PlayerId, token: ConnectionToken },
    Reconnected { player: OwnPlayer, phase: Phase, day: u32 },
    RosterChanged { players: Vec<PublicPlayer> },
    PhaseChanged { phase: Phase },
    DayAdvanced { day: u32 },
    RoleAssigned { faction: Faction, fellow_traitors: Vec<String> },
    InvitationOffered,
    InvitationSent { target_name: String },
    InvitationOutcome { target_name: String, accepted: bool },
    InvitationCancelled { reason: String },
    NightVictimAnnounced { victim: PublicPlayer },
    VoteRecorded { votes_cast: usize, votes_needed: usize },
    VoteTied,
    PlayerEliminated { player: PublicPlayer },
    GameOver { winner: Faction },
    ChatRelayed { from: String, message: String, audience: ChatAudience },
    PlayerDisconnected { player_id: PlayerId },
    AdminAuth { granted: bool },
    AdminState(AdminView),
    AdminMessage(String),
    TestStarted { name: String },
    PointsAwarded { points: i64, total: i64 },
    ScoresUpdated { scores: Vec<(PlayerId, i64)> },
    GameReset,
    Rejected { kind: ErrorKind, reason: String },
}

/// Unit of transmission in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Action(ClientAction),
    Event(ServerEvent),
    Heartbeat,
    Disconnect,
}

pub fn encode_packet(packet: &Packet) -> bincode::Result<Vec<u8>> {
    bincode::serialize(packet)
}

pub fn decode_packet(bytes: &[u8]) -> bincode::Result<Packet> {
    bincode::deserialize(bytes)
}
