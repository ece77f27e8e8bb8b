//! Connected clients and the players they control
//!
//! This module keeps the server-side roster:
//! - Which peer address belongs to which session and player
//! - Player entities keyed by name, kept while they are online or hold
//!   unsaved changes; the store carries everyone else to their next login
//! - Capacity limits and inactivity timeouts
//!
//! The roster is also the [`PlayerDirectory`] chat broadcasts go through.

use crate::context::PlayerDirectory;
use crate::entity::EntityCore;
use crate::player::{ChatCapable, Nameable, NetworkedPlayer, DEFAULT_SAVE_INTERVAL};
use crate::session::Session;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A peer with an active session and the player it logged in as
#[derive(Debug, Clone)]
pub struct Client {
    pub session: Arc<Session>,
    pub player: Arc<NetworkedPlayer>,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(session: Arc<Session>, player: Arc<NetworkedPlayer>) -> Self {
        Self {
            session,
            player,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

struct Roster {
    clients: HashMap<SocketAddr, Client>,
    players: HashMap<String, Arc<NetworkedPlayer>>,
    next_session_id: u32,
    next_entity_id: u32,
}

/// Tracks connected clients and known players
///
/// All methods take `&self`; the roster sits behind a lock so network
/// handling and chat broadcasts can share one manager.
pub struct ClientManager {
    roster: RwLock<Roster>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    save_interval: u32,
    world_name: String,
}

impl ClientManager {
    pub fn new(max_clients: usize, world_name: impl Into<String>) -> Self {
        Self {
            roster: RwLock::new(Roster {
                clients: HashMap::new(),
                players: HashMap::new(),
                next_session_id: 1,
                next_entity_id: 1,
            }),
            max_clients,
            save_interval: DEFAULT_SAVE_INTERVAL,
            world_name: world_name.into(),
        }
    }

    /// Save interval given to players created from now on, at least one tick
    pub fn with_save_interval(mut self, ticks: u32) -> Self {
        self.save_interval = ticks.max(1);
        self
    }

    pub fn save_interval(&self) -> u32 {
        self.save_interval
    }

    pub fn is_full(&self) -> bool {
        self.roster.read().clients.len() >= self.max_clients
    }

    /// Hands out a fresh session id
    pub fn next_session_id(&self) -> u32 {
        let mut roster = self.roster.write();
        let id = roster.next_session_id;
        roster.next_session_id += 1;
        id
    }

    /// The player called `name`, created on first use
    pub fn player(&self, name: &str) -> Arc<NetworkedPlayer> {
        let mut roster = self.roster.write();
        if let Some(player) = roster.players.get(name) {
            return Arc::clone(player);
        }

        let entity_id = roster.next_entity_id;
        roster.next_entity_id += 1;
        let player = Arc::new(
            NetworkedPlayer::new(name, EntityCore::new(entity_id, self.world_name.as_str()))
                .with_save_interval(self.save_interval),
        );
        roster.players.insert(name.to_string(), Arc::clone(&player));
        player
    }

    /// Registers a logged-in client under its session's address
    ///
    /// Returns false if the server is at capacity.
    pub fn attach(&self, session: Arc<Session>, player: Arc<NetworkedPlayer>) -> bool {
        let mut roster = self.roster.write();
        if roster.clients.len() >= self.max_clients {
            return false;
        }

        info!(
            "Client {} attached from {} as {}",
            session.id(),
            session.addr(),
            player.name()
        );
        roster.clients.insert(session.addr(), Client::new(session, player));
        true
    }

    pub fn client(&self, addr: SocketAddr) -> Option<Client> {
        self.roster.read().clients.get(&addr).cloned()
    }

    /// Refreshes the client's activity timestamp
    pub fn touch(&self, addr: SocketAddr) -> bool {
        match self.roster.write().clients.get_mut(&addr) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn detach(&self, addr: SocketAddr) -> Option<Client> {
        let client = self.roster.write().clients.remove(&addr)?;
        info!("Client {} detached", client.session.id());
        Some(client)
    }

    /// Removes and returns clients silent for longer than `timeout`
    pub fn check_timeouts(&self, timeout: Duration) -> Vec<Client> {
        self.remove_where(|client| client.is_timed_out(timeout))
    }

    /// Removes and returns clients whose session has been closed
    pub fn prune_closed(&self) -> Vec<Client> {
        self.remove_where(|client| client.session.is_closed())
    }

    fn remove_where<F>(&self, predicate: F) -> Vec<Client>
    where
        F: Fn(&Client) -> bool,
    {
        let mut roster = self.roster.write();
        let addrs: Vec<SocketAddr> = roster
            .clients
            .iter()
            .filter(|(_, client)| predicate(client))
            .map(|(addr, _)| *addr)
            .collect();

        addrs
            .into_iter()
            .filter_map(|addr| roster.clients.remove(&addr))
            .collect()
    }

    pub fn clients(&self) -> Vec<Client> {
        self.roster.read().clients.values().cloned().collect()
    }

    /// Every player the roster still holds, online or not
    pub fn players(&self) -> Vec<Arc<NetworkedPlayer>> {
        self.roster.read().players.values().cloned().collect()
    }

    /// Forgets players that are offline, saved and held by nobody else
    ///
    /// Returns how many were released. Players with unsaved changes stay
    /// until a save succeeds.
    pub fn release_idle(&self) -> usize {
        let mut roster = self.roster.write();
        let Roster {
            clients, players, ..
        } = &mut *roster;

        let before = players.len();
        players.retain(|name, player| {
            let attached = clients.values().any(|client| Arc::ptr_eq(&client.player, player));
            let keep = attached
                || Arc::strong_count(player) > 1
                || player.lifecycle().is_online_live()
                || player.needs_save();
            if !keep {
                debug!("Released idle player {}", name);
            }
            keep
        });
        before - players.len()
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.roster.read().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.read().clients.is_empty()
    }
}

impl PlayerDirectory for ClientManager {
    fn broadcast(&self, message: &str) -> usize {
        // Sending happens outside the lock; a recipient's send never needs it
        let recipients: Vec<Arc<NetworkedPlayer>> = self
            .roster
            .read()
            .clients
            .values()
            .map(|client| Arc::clone(&client.player))
            .collect();

        recipients
            .iter()
            .filter(|player| player.send_message(message))
            .count()
    }

    fn online_players(&self) -> Vec<String> {
        self.roster
            .read()
            .clients
            .values()
            .map(|client| client.player.name().to_string())
            .collect()
    }
}
