//! Transport-level connection tracking for the game server
//!
//! This module handles the server-side bookkeeping of UDP peers, including:
//! - Connection lifecycle (first packet, explicit disconnect, timeout)
//! - Address to connection id lookup for routing inbound datagrams
//! - Liveness monitoring driven by client heartbeats
//! - Capacity limits on concurrent peers
//!
//! A connection is not a player. The session authority decides which player,
//! if any, a connection speaks for; this module only knows where to send bytes.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A peer we have heard from recently
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this peer
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the peer has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected peers
///
/// Connection ids are handed out sequentially starting at 1 and are never
/// reused while the server runs, so a stale id can never address a new peer.
pub struct ClientManager {
    /// Connected peers indexed by connection id
    clients: HashMap<ConnectionId, Client>,
    /// Reverse index for inbound datagrams
    by_addr: HashMap<SocketAddr, ConnectionId>,
    /// Next available connection id
    next_client_id: u32,
    /// Maximum number of concurrent peers allowed
    max_clients: usize,
    /// Silence after which a peer is considered gone
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            by_addr: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Registers a new peer
    ///
    /// Returns `None` if the server is at capacity. An address that is
    /// already registered keeps its existing id.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if let Some(existing) = self.find_client_by_addr(addr) {
            self.touch(existing);
            return Some(existing);
        }
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        info!("Connection {} opened from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        self.by_addr.insert(addr, client_id);

        Some(client_id)
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        match self.clients.remove(client_id) {
            Some(client) => {
                self.by_addr.remove(&client.addr);
                info!("Connection {} closed", client.id);
                true
            }
            None => false,
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, client_id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Marks a peer as alive. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Checks for and removes silent peers
    ///
    /// Returns the removed ids so the session authority can run its own
    /// disconnect handling for each of them.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let timeout = self.timeout;
        let timed_out: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all connection ids and their network addresses, for broadcasts
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
