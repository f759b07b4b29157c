//! Turns typed lines into packets.
//!
//! Lines starting with `.` are client actions (`.move`, `.throw`, `.use`,
//! `.portal`, `.quit`). Everything else is sent to the server as a chat
//! command, e.g. `battle request bob`.

use shared::{Packet, Vec3};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Unknown client action '.{0}'")]
    UnknownAction(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

/// What the user asked for.
#[derive(Debug, Clone)]
pub enum UserInput {
    Send(Packet),
    Quit,
    Nothing,
}

fn parse_numbers(words: &[&str]) -> Result<Vec<f64>, InputError> {
    words
        .iter()
        .map(|w| {
            w.parse::<f64>()
                .map_err(|_| InputError::InvalidNumber(w.to_string()))
        })
        .collect()
}

fn parse_action(action: &str, args: &[&str]) -> Result<UserInput, InputError> {
    match action {
        "move" => {
            const USAGE: &str = ".move <x> <y> <z>";
            let n = parse_numbers(args)?;
            if n.len() != 3 {
                return Err(InputError::Usage(USAGE));
            }
            Ok(UserInput::Send(Packet::Move {
                position: Vec3::new(n[0], n[1], n[2]),
            }))
        }
        "throw" => {
            const USAGE: &str = ".throw <x> <y> <z> <to x> <to y> <to z>";
            let n = parse_numbers(args)?;
            if n.len() != 6 {
                return Err(InputError::Usage(USAGE));
            }
            Ok(UserInput::Send(Packet::Throw {
                origin: Vec3::new(n[0], n[1], n[2]),
                target: Vec3::new(n[3], n[4], n[5]),
            }))
        }
        "use" => Ok(UserInput::Send(Packet::Interact)),
        "portal" => Ok(UserInput::Send(Packet::ExitPortal)),
        "quit" | "exit" => Ok(UserInput::Quit),
        other => Err(InputError::UnknownAction(other.to_string())),
    }
}

pub fn parse_line(line: &str) -> Result<UserInput, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(UserInput::Nothing);
    }

    if let Some(rest) = line.strip_prefix('.') {
        let words: Vec<&str> = rest.split_whitespace().collect();
        let Some((action, args)) = words.split_first() else {
            return Err(InputError::UnknownAction(String::new()));
        };
        return parse_action(&action.to_ascii_lowercase(), args);
    }

    Ok(UserInput::Send(Packet::Command {
        line: line.to_string(),
    }))
}

/// Renders a server packet for the terminal. Returns `None` for packets
/// that carry nothing to show.
pub fn describe(packet: &Packet) -> Option<String> {
    match packet {
        Packet::Connected { player_id } => Some(format!("Connected as player {}", player_id)),
        Packet::Message { text } => Some(text.clone()),
        Packet::Title { title, subtitle } if subtitle.is_empty() => {
            Some(format!("== {} ==", title))
        }
        Packet::Title { title, subtitle } => Some(format!("== {} == {}", title, subtitle)),
        Packet::Frozen { frozen: true } => Some("[frozen]".to_string()),
        Packet::Frozen { frozen: false } => Some("[you can move again]".to_string()),
        Packet::Teleport { world } => Some(format!("[now in {}]", world)),
        Packet::TimerStarted { .. } => Some("[timer started]".to_string()),
        Packet::Disconnected { reason } => Some(format!("Disconnected: {}", reason)),
        _ => None,
    }
}
