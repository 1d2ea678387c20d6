use shared::{Faction, Phase, PlayerId};

/// Facts produced by an accepted game operation, in the order they happened.
///
/// The session authority turns these into deliveries for clients and into
/// persistence work; the game itself never talks to the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PlayerJoined { player: PlayerId },
    PlayerReconnected { player: PlayerId },
    PlayerDisconnected { player: PlayerId },
    RolesAssigned,
    DayAdvanced { day: u32 },
    PhaseChanged { phase: Phase },
    InvitationOffered { target: PlayerId },
    InvitationResolved { target: PlayerId, accepted: bool },
    InvitationCancelled { target: PlayerId, reason: String },
    NightVictim { victim: PlayerId },
    VoteRecorded { voter: PlayerId, votes_cast: usize, votes_needed: usize },
    VoteTied { targets: Vec<PlayerId> },
    PlayerEliminated { player: PlayerId },
    GameOver { winner: Faction },
}
