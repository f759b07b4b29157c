use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod triangulation;

pub const CLIENT_VERSION: u32 = 1;
pub const TICK_MILLIS: u64 = 50;
pub const COUNTDOWN_SECONDS: u32 = 5;
pub const FINISH_DELAY_TICKS: u64 = 200;

/// Server-assigned identity of a connected player.
pub type PlayerId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Solo,
    Coop,
    Battle,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Reset,
    Stop,
    Request,
    Accept,
    Decline,
    Team,
    Duel,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Solo, GameMode::Coop, GameMode::Battle];

    /// Every action the mode understands.
    pub fn actions(&self) -> &'static [Action] {
        match self {
            GameMode::Solo => &[Action::Start, Action::Reset, Action::Stop],
            GameMode::Coop => &[
                Action::Request,
                Action::Accept,
                Action::Decline,
                Action::Start,
                Action::Duel,
                Action::Stop,
            ],
            GameMode::Battle => &[
                Action::Request,
                Action::Reset,
                Action::Accept,
                Action::Decline,
                Action::Stop,
                Action::Team,
            ],
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    /// Whether a participant of a run in this mode may still issue `action`.
    pub fn is_action_allowed_during_run(&self, action: Action) -> bool {
        match self {
            GameMode::Solo | GameMode::Battle => matches!(action, Action::Reset | Action::Stop),
            GameMode::Coop => action == Action::Stop,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Coop => "coop",
            GameMode::Battle => "battle",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solo" => Ok(GameMode::Solo),
            "coop" => Ok(GameMode::Coop),
            "battle" => Ok(GameMode::Battle),
            other => Err(format!("Unknown game mode '{}'", other)),
        }
    }
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Reset => "reset",
            Action::Stop => "stop",
            Action::Request => "request",
            Action::Accept => "accept",
            Action::Decline => "decline",
            Action::Team => "team",
            Action::Duel => "duel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Action::Start),
            "reset" => Ok(Action::Reset),
            "stop" => Ok(Action::Stop),
            "request" => Ok(Action::Request),
            "accept" => Ok(Action::Accept),
            "decline" => Ok(Action::Decline),
            "team" => Ok(Action::Team),
            "duel" => Ok(Action::Duel),
            other => Err(format!("Unknown action '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
    },
    Command {
        line: String,
    },
    Move {
        position: Vec3,
    },
    Interact,
    Throw {
        origin: Vec3,
        target: Vec3,
    },
    ExitPortal,
    /// Keeps an idle connection from timing out
    Heartbeat,
    Disconnect,

    Connected {
        player_id: PlayerId,
    },
    Message {
        text: String,
    },
    Title {
        title: String,
        subtitle: String,
    },
    Frozen {
        frozen: bool,
    },
    Teleport {
        world: String,
    },
    TimerStarted {
        timestamp: u64,
    },
    Disconnected {
        reason: String,
    },
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Formats elapsed milliseconds as `[h:]mm:ss.mmm`.
pub fn format_elapsed(millis: u64) -> String {
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    let ms = millis % 1000;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, ms)
    }
}
