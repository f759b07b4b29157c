//! # Speedrun Client Library
//!
//! A line-oriented terminal client for the speedrun server. It logs in with
//! a player name, sends typed lines as chat commands (`solo start`,
//! `battle request bob`, ...) and prints whatever the server sends back.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines into packets. Lines starting with `.` stand in for
//! in-game actions such as moving, throwing a tracking eye or stepping
//! through the exit portal.
//!
//! ### Network Module (`network`)
//! Owns the UDP socket, performs the connect handshake, keeps the
//! connection alive with heartbeats and runs the stdin/socket event loop.

pub mod input;
pub mod network;
