//! The three game modes.
//!
//! Every mode implements [`RunLifecycle`](crate::lifecycle::RunLifecycle);
//! the multiplayer modes also implement
//! [`ChallengeProtocol`](crate::negotiation::ChallengeProtocol). The engine
//! picks the mode with an exhaustive match on [`shared::GameMode`].

pub mod battle;
pub mod coop;
pub mod solo;

pub use battle::BattleMode;
pub use coop::{CoopGroup, CoopMode};
pub use solo::SoloMode;
