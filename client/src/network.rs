use crate::input::{describe, parse_line, UserInput};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, CLIENT_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Idle connections send a heartbeat this often; the server drops clients
/// silent for a few seconds.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    player_id: Option<PlayerId>,
    connected: bool,
}

impl Client {
    pub async fn new(server_addr: &str, name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            player_id: None,
            connected: false,
        })
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {} as {}...", self.server_addr, self.name);

        let packet = Packet::Connect {
            client_version: CLIENT_VERSION,
            name: self.name.clone(),
        };
        self.send_packet(&packet).await
    }

    pub async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Waits for the next packet from the server and applies it.
    pub async fn recv_packet(&mut self) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 2048];
        loop {
            let (len, from) = self.socket.recv_from(&mut buffer).await?;
            if from != self.server_addr {
                debug!("Ignoring packet from {}", from);
                continue;
            }
            let packet = deserialize::<Packet>(&buffer[..len])?;
            self.apply(&packet);
            return Ok(packet);
        }
    }

    fn apply(&mut self, packet: &Packet) {
        match packet {
            Packet::Connected { player_id } => {
                info!("Connected! Player ID: {}", player_id);
                self.player_id = Some(*player_id);
                self.connected = true;
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.player_id = None;
            }
            _ => {}
        }
    }

    /// Reads lines from stdin and prints what the server sends until the
    /// user quits or the server drops the connection.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                result = self.recv_packet() => {
                    match result {
                        Ok(packet) => {
                            if let Some(text) = describe(&packet) {
                                println!("{}", text);
                            }
                            if matches!(packet, Packet::Disconnected { .. }) {
                                break;
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_line(&line) {
                        Ok(UserInput::Send(packet)) => self.send_packet(&packet).await?,
                        Ok(UserInput::Quit) => break,
                        Ok(UserInput::Nothing) => {}
                        Err(e) => println!("{}", e),
                    }
                },

                _ = heartbeat.tick() => {
                    if self.connected {
                        self.send_packet(&Packet::Heartbeat).await?;
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
