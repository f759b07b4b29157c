//! # Speedrun Server Library
//!
//! Run lifecycle and multiplayer negotiation for timed speedruns. Players
//! race alone (solo), together against the clock (coop), or against each
//! other one versus one or two versus two (battle). The library owns every
//! piece of run state; the environment that hosts the players is reached
//! only through the collaborator traits in [`host`], [`provisioning`] and
//! [`seeds`].
//!
//! ## Core Responsibilities
//!
//! ### Run Lifecycle
//! A run is registered, waits for its worlds to be created, counts down
//! with every participant frozen, and then runs until someone finishes or
//! the run is aborted. Finished runs linger for a short delay before their
//! participants are restored and their worlds deleted.
//!
//! ### Negotiation
//! Battles and coops start with a request that the target may accept or
//! decline. Every request expires on its own, and whichever of accept,
//! decline and expiry arrives first wins.
//!
//! ### Player Events
//! Movement, interaction, thrown tracking eyes and disconnects are fed in
//! by the host. Frozen participants have their actions cancelled; idle
//! participants are warned and eventually removed from their run.
//!
//! ## Architecture Design
//!
//! ### Single Writer
//! [`game::Game`] is driven entirely from outside and nothing runs
//! concurrently with a call into it. Asynchronous work (world creation,
//! seed fetching) reports back through completion callbacks tagged with a
//! ticket, so late or stale completions are recognised and discarded.
//!
//! ### Logical Time
//! Request expiry, the countdown, delayed teardown, the provisioning
//! watchdog and the AFK sweep are entries in one [`timers::TimerQueue`].
//! The host advances the clock from its tick loop; tests advance it by hand.
//!
//! ## Module Organization
//!
//! - [`game`]: the facade, command parsing and dispatch
//! - [`lifecycle`], [`negotiation`], [`modes`]: per-mode run and request handling
//! - [`registry`], [`model`], [`context`]: run bookkeeping
//! - [`timers`], [`afk`], [`leaderboard`], [`seeds`], [`seed_api`]: supporting services
//! - [`network`], [`client_manager`]: the UDP host adapter
//! - [`testing`]: recording collaborators for driving the engine in tests
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerOptions::default()).await?;
//!
//!     // Runs until a Shutdown message arrives through `server.handle()`.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod afk;
pub mod client_manager;
pub mod config;
pub mod context;
pub mod error;
pub mod game;
pub mod host;
pub mod leaderboard;
pub mod lifecycle;
pub mod model;
pub mod modes;
pub mod negotiation;
pub mod network;
pub mod provisioning;
pub mod registry;
pub mod seed_api;
pub mod seeds;
pub mod testing;
pub mod timers;
