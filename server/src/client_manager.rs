//! Connected players as seen by the UDP host.
//!
//! Each connection is tracked by address, carries the player's chosen name
//! and the last position and world the server told it about. Connections
//! that stay silent longer than the client timeout are dropped.

use log::info;
use shared::{PlayerId, Vec3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// World a freshly connected player stands in.
pub const LOBBY_WORLD: &str = "lobby";

/// A connected player.
#[derive(Debug)]
pub struct Client {
    /// Player id assigned by the server
    pub id: PlayerId,
    pub name: String,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    pub position: Vec3,
    pub world: String,
}

impl Client {
    pub fn new(id: PlayerId, name: &str, addr: SocketAddr) -> Self {
        Self {
            id,
            name: name.to_string(),
            addr,
            last_seen: Instant::now(),
            position: Vec3::default(),
            world: LOBBY_WORLD.to_string(),
        }
    }

    /// Returns true if no packets have been received within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All connected players, capped at `max_clients`.
pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    next_client_id: PlayerId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new connection.
    ///
    /// Returns `None` when the server is full. Names are not checked here,
    /// see [`ClientManager::find_by_name`].
    pub fn add_client(&mut self, addr: SocketAddr, name: &str) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, name, addr);
        self.clients
            .insert(client_id, Client::new(client_id, name, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: PlayerId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} ({}) disconnected", client.id, client.name);
        Some(client)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: PlayerId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Case-insensitive name lookup.
    pub fn find_by_name(&self, name: &str) -> Option<PlayerId> {
        self.clients
            .values()
            .find(|client| client.name.eq_ignore_ascii_case(name))
            .map(|client| client.id)
    }

    /// Marks the client as alive.
    pub fn touch(&mut self, client_id: PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn set_position(&mut self, client_id: PlayerId, position: Vec3) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.position = position;
        }
    }

    /// Ids of clients silent for longer than `timeout`. They stay connected
    /// until the caller removes them.
    pub fn timed_out_clients(&self, timeout: Duration) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, "ann", test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.name, "ann");
        assert_eq!(client.world, LOBBY_WORLD);
        assert_eq!(client.position, Vec3::default());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, "ann", test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_assigns_increasing_ids() {
        let mut manager = ClientManager::new(3);

        assert_eq!(manager.add_client(test_addr(), "ann"), Some(1));
        assert_eq!(manager.add_client(test_addr2(), "bob"), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr(), "ann").is_some());
        assert!(manager.add_client(test_addr2(), "bob").is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr(), "ann").unwrap();

        let removed = manager.remove_client(id).unwrap();
        assert_eq!(removed.name, "ann");
        assert!(manager.is_empty());
        assert!(manager.remove_client(id).is_none());
    }

    #[test]
    fn test_lookups() {
        let mut manager = ClientManager::new(2);
        let ann = manager.add_client(test_addr(), "Ann").unwrap();
        let bob = manager.add_client(test_addr2(), "bob").unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr2()), Some(bob));
        assert_eq!(manager.find_by_name("ANN"), Some(ann));
        assert_eq!(manager.find_by_name("cid"), None);

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_timed_out_clients() {
        let mut manager = ClientManager::new(2);
        let ann = manager.add_client(test_addr(), "ann").unwrap();
        let bob = manager.add_client(test_addr2(), "bob").unwrap();

        manager.get_mut(ann).unwrap().last_seen = Instant::now() - Duration::from_secs(10);
        assert_eq!(manager.timed_out_clients(Duration::from_secs(5)), vec![ann]);

        manager.touch(ann);
        assert!(manager.timed_out_clients(Duration::from_secs(5)).is_empty());
        assert!(manager.get(bob).is_some());
    }

    #[test]
    fn test_set_position() {
        let mut manager = ClientManager::new(1);
        let ann = manager.add_client(test_addr(), "ann").unwrap();

        manager.set_position(ann, Vec3::new(1.0, 64.0, -3.0));
        assert_eq!(manager.get(ann).unwrap().position, Vec3::new(1.0, 64.0, -3.0));
    }
}
