//! Rejections surfaced to players.
//!
//! The `Display` text of each variant is sent verbatim to the player whose
//! command was rejected, so keep the wording player-facing.

use shared::{Action, GameMode, PlayerId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("You are already in a speedrun!")]
    AlreadyInRun,

    #[error("You are not in a speedrun!")]
    NotInRun,

    #[error("You cannot challenge yourself!")]
    SelfTarget,

    #[error("You must specify a player to target!")]
    MissingTarget,

    #[error("No online player named '{0}'")]
    UnknownPlayer(String),

    #[error("{0} is already in a speedrun!")]
    TargetInRun(String),

    #[error("{0} already has a pending request!")]
    TargetHasPendingRequest(String),

    #[error("You've already sent a request! Please wait.")]
    RequestOutstanding,

    #[error("You have no pending request!")]
    NoPendingRequest,

    #[error("The other player is no longer available!")]
    OtherPlayerUnavailable,

    #[error("The {mode} mode has no '{action}' command")]
    UnsupportedAction { mode: GameMode, action: Action },

    #[error("You cannot use that command during a run!")]
    BlockedDuringRun,

    #[error("You cannot use commands during the countdown!")]
    Frozen,

    #[error("{0} is not in a speedrun!")]
    TargetNotInRun(String),

    #[error("Your run is not in progress!")]
    RunNotRunning,

    #[error("{0} is already in a coop!")]
    AlreadyInCoop(String),

    #[error("You must lead an accepted coop to do that!")]
    NotCoopLeader,

    #[error("{0} is not leading a coop that is ready to duel!")]
    TargetNotCoopLeader(String),

    #[error("You cannot team up with yourself!")]
    SelfTeammate,

    #[error("The amount must be between 1 and {max}!")]
    InvalidSeedAmount { max: u32 },

    #[error("No need to add seeds of this type!")]
    RandomSeedCategory,

    #[error("Unknown seed category '{0}'")]
    UnknownSeedCategory(String),

    #[error("Unknown command '{0}'. Type 'help' for a list of commands.")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("You do not have permission to do that!")]
    NotPermitted,

    #[error("Player {0} already belongs to another run")]
    ParticipantConflict(PlayerId),
}
