//! UDP host adapter: connects players to the run engine.
//!
//! One `select!` loop owns the [`Game`] and is the only writer of engine
//! state. Spawned tasks receive packets, send packets, watch for silent
//! clients, create worlds and fetch seeds; all of them report back to the
//! loop through a channel.

use crate::client_manager::{ClientManager, LOBBY_WORLD};
use crate::config::GameConfig;
use crate::game::Game;
use crate::host::Host;
use crate::leaderboard::Leaderboard;
use crate::model::{PlayerSnapshot, Stopwatch, WorldSet};
use crate::provisioning::{ProvisionTicket, ProvisionedWorlds, WorldProvisioner};
use crate::seed_api::SeedApi;
use crate::seeds::{SeedCatalog, SeedFetchOutcome, SeedFetchRequest, SeedFetcher};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::triangulation::ThrowEvent;
use shared::{duration_millis, Packet, PlayerId, Vec3, CLIENT_VERSION};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    CheckTimeouts,
    WorldsReady(ProvisionedWorlds),
    WorldsFailed { ticket: ProvisionTicket, reason: String },
    SeedsFetched(SeedFetchOutcome),
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

fn unix_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    duration_millis(elapsed)
}

/// What a player looked like before a run took them over.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SavedPlayer {
    position: Vec3,
    world: String,
}

/// [`Host`], [`WorldProvisioner`] and [`SeedFetcher`] on top of UDP clients.
///
/// Worlds are simulated: creating them takes `provisioning_delay` in a
/// spawned task and only their names are tracked.
pub struct NetworkHost {
    clients: ClientManager,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    provisioning_delay: Duration,
    seed_api: Option<SeedApi>,
    worlds: HashSet<String>,
}

impl NetworkHost {
    pub fn new(
        max_clients: usize,
        game_tx: mpsc::UnboundedSender<GameMessage>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        provisioning_delay: Duration,
        seed_api: Option<SeedApi>,
    ) -> Self {
        Self {
            clients: ClientManager::new(max_clients),
            game_tx,
            server_tx,
            provisioning_delay,
            seed_api,
            worlds: HashSet::new(),
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut ClientManager {
        &mut self.clients
    }

    /// Names of the worlds currently alive.
    pub fn worlds(&self) -> &HashSet<String> {
        &self.worlds
    }

    pub fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to(&self, player: PlayerId, packet: Packet) {
        match self.clients.get(player) {
            Some(client) => self.send_packet(packet, client.addr),
            None => debug!("Dropping packet for offline player {}", player),
        }
    }

    fn move_to(&mut self, player: PlayerId, world: &str, position: Vec3) {
        if let Some(client) = self.clients.get_mut(player) {
            client.world = world.to_string();
            client.position = position;
        }
        self.send_to(
            player,
            Packet::Teleport {
                world: world.to_string(),
            },
        );
    }
}

impl Host for NetworkHost {
    fn is_online(&self, player: PlayerId) -> bool {
        self.clients.get(player).is_some()
    }

    fn name(&self, player: PlayerId) -> String {
        self.clients
            .get(player)
            .map(|client| client.name.clone())
            .unwrap_or_else(|| format!("#{}", player))
    }

    fn find_player(&self, name: &str) -> Option<PlayerId> {
        self.clients.find_by_name(name)
    }

    fn send_message(&mut self, player: PlayerId, text: &str) {
        self.send_to(
            player,
            Packet::Message {
                text: text.to_string(),
            },
        );
    }

    fn send_title(&mut self, player: PlayerId, title: &str, subtitle: &str) {
        self.send_to(
            player,
            Packet::Title {
                title: title.to_string(),
                subtitle: subtitle.to_string(),
            },
        );
    }

    fn set_frozen(&mut self, player: PlayerId, frozen: bool) {
        self.send_to(player, Packet::Frozen { frozen });
    }

    fn capture_state(&mut self, player: PlayerId) -> PlayerSnapshot {
        let saved = match self.clients.get(player) {
            Some(client) => SavedPlayer {
                position: client.position,
                world: client.world.clone(),
            },
            None => SavedPlayer {
                position: Vec3::default(),
                world: LOBBY_WORLD.to_string(),
            },
        };
        match serialize(&saved) {
            Ok(bytes) => PlayerSnapshot(bytes),
            Err(e) => {
                warn!("Failed to capture state of player {}: {}", player, e);
                PlayerSnapshot(Vec::new())
            }
        }
    }

    fn reset_state(&mut self, player: PlayerId) {
        self.clients.set_position(player, Vec3::default());
    }

    fn restore_state(&mut self, player: PlayerId, snapshot: &PlayerSnapshot) {
        let saved = deserialize::<SavedPlayer>(&snapshot.0).unwrap_or_else(|_| SavedPlayer {
            position: Vec3::default(),
            world: LOBBY_WORLD.to_string(),
        });
        self.move_to(player, &saved.world, saved.position);
    }

    fn teleport_to_spawn(&mut self, player: PlayerId, worlds: &WorldSet) {
        self.move_to(player, worlds.spawn_world(), Vec3::default());
    }

    fn start_timer_display(&mut self, players: &[PlayerId], _stopwatch: &Stopwatch) {
        let timestamp = unix_millis();
        for player in players {
            self.send_to(*player, Packet::TimerStarted { timestamp });
        }
    }
}

impl WorldProvisioner for NetworkHost {
    fn create_worlds(
        &mut self,
        ticket: ProvisionTicket,
        representatives: &[PlayerId],
        seed: Option<i64>,
    ) {
        let seed = seed.unwrap_or_else(rand::random);
        let world_sets: HashMap<PlayerId, WorldSet> = representatives
            .iter()
            .map(|owner| {
                let base = format!("speedrun_{}_{}", ticket.0, owner);
                let set = WorldSet {
                    owner: *owner,
                    overworld: base.clone(),
                    nether: format!("{}_nether", base),
                    end: format!("{}_the_end", base),
                };
                (*owner, set)
            })
            .collect();
        for set in world_sets.values() {
            self.worlds.insert(set.overworld.clone());
            self.worlds.insert(set.nether.clone());
            self.worlds.insert(set.end.clone());
        }

        let server_tx = self.server_tx.clone();
        let delay = self.provisioning_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let worlds = ProvisionedWorlds {
                ticket,
                seed,
                world_sets,
            };
            if let Err(e) = server_tx.send(ServerMessage::WorldsReady(worlds)) {
                error!("Failed to report created worlds: {}", e);
            }
        });
    }

    fn delete_worlds(&mut self, worlds: &WorldSet) {
        info!("Deleting worlds of player {} ({})", worlds.owner, worlds.overworld);
        self.worlds.remove(&worlds.overworld);
        self.worlds.remove(&worlds.nether);
        self.worlds.remove(&worlds.end);
    }
}

impl SeedFetcher for NetworkHost {
    fn fetch_seeds(&mut self, request: SeedFetchRequest) {
        let server_tx = self.server_tx.clone();
        let Some(api) = self.seed_api.clone() else {
            warn!("No seed service configured, cannot fetch {} seeds", request.category);
            let outcome = SeedFetchOutcome {
                request,
                seeds: Vec::new(),
            };
            if let Err(e) = server_tx.send(ServerMessage::SeedsFetched(outcome)) {
                error!("Failed to report seed fetch: {}", e);
            }
            return;
        };

        tokio::spawn(async move {
            let outcome = api.fetch(request).await;
            if let Err(e) = server_tx.send(ServerMessage::SeedsFetched(outcome)) {
                error!("Failed to report seed fetch: {}", e);
            }
        });
    }
}

/// Everything the server needs besides its bind address.
pub struct ServerOptions {
    pub config: GameConfig,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub provisioning_delay: Duration,
    pub seeds: SeedCatalog,
    pub leaderboard: Leaderboard,
    pub seed_api: Option<SeedApi>,
    /// Player names granted admin commands when they connect
    pub admins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let config = GameConfig::default();
        let leaderboard = Leaderboard::new(config.leaderboard_size);
        Self {
            config,
            max_clients: 32,
            client_timeout: Duration::from_secs(5),
            provisioning_delay: Duration::from_millis(500),
            seeds: SeedCatalog::new(),
            leaderboard,
            seed_api: None,
            admins: Vec::new(),
        }
    }
}

/// Main server coordinating networking and the run engine
pub struct Server {
    socket: Arc<UdpSocket>,
    game: Game<NetworkHost>,
    tick_duration: Duration,
    client_timeout: Duration,
    admins: HashSet<String>,
    started: Instant,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(addr: &str, options: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let tick_duration = options.config.tick;
        let host = NetworkHost::new(
            options.max_clients,
            game_tx,
            server_tx.clone(),
            options.provisioning_delay,
            options.seed_api,
        );
        let game = Game::with_stores(options.config, host, options.seeds, options.leaderboard);

        Ok(Server {
            socket,
            game,
            tick_duration,
            client_timeout: options.client_timeout,
            admins: options
                .admins
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            started: Instant::now(),
            server_tx,
            server_rx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender for injecting messages, e.g. [`ServerMessage::Shutdown`].
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> &Game<NetworkHost> {
        &self.game
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { packet, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that asks the main loop to look for silent clients
    fn spawn_timeout_checker(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;
                if server_tx.send(ServerMessage::CheckTimeouts).is_err() {
                    break;
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn disconnect(&mut self, player: PlayerId) {
        self.game.handle_quit(player);
        self.game.host_mut().clients_mut().remove_client(player);
    }

    fn check_timeouts(&mut self) {
        let timed_out = self
            .game
            .host()
            .clients()
            .timed_out_clients(self.client_timeout);
        for player in timed_out {
            info!("Client {} timed out", player);
            self.disconnect(player);
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, client_version: u32, name: String) {
        info!(
            "Client {} connecting from {} (version: {})",
            name, addr, client_version
        );

        if client_version != CLIENT_VERSION {
            let reason = "Protocol version mismatch".to_string();
            self.game.host().send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        // Remove existing connection if present
        if let Some(existing) = self.game.host().clients().find_client_by_addr(addr) {
            info!("Removing existing client {} from {}", existing, addr);
            self.disconnect(existing);
        }

        let name = name.trim().to_string();
        if name.is_empty() || name.contains(char::is_whitespace) {
            let reason = "Invalid player name".to_string();
            self.game.host().send_packet(Packet::Disconnected { reason }, addr);
            return;
        }
        if self.game.host().clients().find_by_name(&name).is_some() {
            let reason = format!("The name {} is already taken", name);
            self.game.host().send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        let Some(player_id) = self.game.host_mut().clients_mut().add_client(addr, &name) else {
            let reason = "Server full".to_string();
            self.game.host().send_packet(Packet::Disconnected { reason }, addr);
            return;
        };

        self.game
            .host()
            .send_packet(Packet::Connected { player_id }, addr);
        if self.admins.contains(&name.to_ascii_lowercase()) {
            info!("Granting admin commands to {}", name);
            self.game.grant_admin(player_id);
        }
        let welcome = format!("Welcome, {}! Type 'help' for a list of commands.", name);
        self.game.host_mut().send_message(player_id, &welcome);
    }

    /// Processes an incoming packet
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            name,
        } = packet
        {
            self.handle_connect(addr, client_version, name);
            return;
        }

        let Some(player) = self.game.host().clients().find_client_by_addr(addr) else {
            debug!("Ignoring packet from unknown address {}", addr);
            return;
        };
        self.game.host_mut().clients_mut().touch(player);

        match packet {
            Packet::Command { line } => {
                // Rejections are reported to the player by the engine.
                let _ = self.game.execute(player, &line);
            }
            Packet::Move { position } => {
                if self.game.handle_move(player, position) {
                    self.game.host_mut().set_frozen(player, true);
                } else {
                    self.game.host_mut().clients_mut().set_position(player, position);
                }
            }
            Packet::Interact => {
                if self.game.handle_interact(player) {
                    self.game.host_mut().set_frozen(player, true);
                }
            }
            Packet::Throw { origin, target } => {
                let timestamp = duration_millis(self.started.elapsed());
                self.game
                    .handle_throw(player, ThrowEvent::new(origin, target, timestamp));
            }
            Packet::ExitPortal => {
                if let Err(e) = self.game.complete_run(player) {
                    debug!("Exit portal of player {} ignored: {}", player, e);
                }
            }
            Packet::Heartbeat => {}
            Packet::Disconnect => self.disconnect(player),
            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop. Returns after a [`ServerMessage::Shutdown`], with
    /// every run aborted.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        self.started = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        },
                        Some(ServerMessage::CheckTimeouts) => self.check_timeouts(),
                        Some(ServerMessage::WorldsReady(worlds)) => self.game.on_worlds_ready(worlds),
                        Some(ServerMessage::WorldsFailed { ticket, reason }) => {
                            self.game.on_worlds_failed(ticket, &reason);
                        },
                        Some(ServerMessage::SeedsFetched(outcome)) => self.game.on_seeds_fetched(outcome),
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.game.advance_to(self.started.elapsed());
                },
            }
        }

        self.game.abort_all("Server shutting down");
        Ok(())
    }
}
