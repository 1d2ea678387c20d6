//! Typed rejection reasons for player and admin actions.

use shared::{ErrorKind, Phase};
use thiserror::Error;

/// Why an invitation could not be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvitationFault {
    #[error("invitations are only possible during the invitation phase")]
    WrongPhase,
    #[error("only traitors can invite")]
    NotTraitor,
    #[error("an invitation is already pending")]
    AlreadyPending,
    #[error("the target must be a living faithful")]
    InvalidTarget,
}

/// Reasons the authority refuses an action. A refused action never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("the game has already started")]
    GameInProgress,

    #[error("no player owns that reconnection token")]
    UnknownToken,

    #[error("at least {required} players are needed, only {present} joined")]
    InsufficientPlayers { required: usize, present: usize },

    #[error("invitation refused: {0}")]
    IllegalInvitation(InvitationFault),

    #[error("you have no pending invitation")]
    NotInvited,

    #[error("night actions are only possible during the night")]
    NotNightPhase,

    #[error("nobody can be eliminated on the first night")]
    FirstNightProtected,

    #[error("the conclave only meets between {0}")]
    OutsideConclaveWindow(String),

    #[error("invalid victim")]
    InvalidVictim,

    #[error("only living traitors can do that")]
    NotTraitor,

    #[error("voting is only open during the roundtable")]
    NotRoundtable,

    #[error("only living players can vote")]
    VoterNotAlive,

    #[error("unknown or eliminated target")]
    InvalidTarget,

    #[error("the game is over")]
    GameAlreadyOver,

    #[error("not allowed during the {0} phase")]
    WrongPhase(Phase),

    #[error("join the game first")]
    NotJoined,

    #[error("this connection already plays as someone")]
    AlreadyJoined,

    #[error("admin credentials required")]
    NotAuthorized,

    #[error("display name must be 1 to {max} characters")]
    InvalidName { max: usize },

    #[error("avatar reference must be at most {max} bytes")]
    InvalidAvatar { max: usize },

    #[error("the table is full ({max} players)")]
    RosterFull { max: usize },

    #[error("test name must be 1 to {max} characters")]
    InvalidTestName { max: usize },

    #[error("message is empty")]
    EmptyMessage,

    #[error("storage unavailable: {0}")]
    Persistence(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameInProgress
            | GameError::NotInvited
            | GameError::NotNightPhase
            | GameError::FirstNightProtected
            | GameError::OutsideConclaveWindow(_)
            | GameError::NotTraitor
            | GameError::NotRoundtable
            | GameError::VoterNotAlive
            | GameError::GameAlreadyOver
            | GameError::WrongPhase(_)
            | GameError::NotJoined
            | GameError::NotAuthorized => ErrorKind::IllegalAction,

            GameError::InsufficientPlayers { .. }
            | GameError::InvalidVictim
            | GameError::InvalidTarget
            | GameError::InvalidName { .. }
            | GameError::InvalidAvatar { .. }
            | GameError::RosterFull { .. }
            | GameError::InvalidTestName { .. }
            | GameError::EmptyMessage => ErrorKind::ValidationFailure,

            GameError::UnknownToken | GameError::AlreadyJoined => ErrorKind::StateConflict,

            GameError::IllegalInvitation(fault) => match fault {
                InvitationFault::WrongPhase | InvitationFault::NotTraitor => {
                    ErrorKind::IllegalAction
                }
                InvitationFault::AlreadyPending => ErrorKind::StateConflict,
                InvitationFault::InvalidTarget => ErrorKind::ValidationFailure,
            },

            GameError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}
