//! Server network layer handling UDP communications and the authority loop
//!
//! The main loop owns the [`SessionAuthority`] outright. Helper tasks only
//! move bytes: the receiver decodes datagrams and queues them, the timeout
//! checker queues silent connections, the sender writes outbound packets and
//! the persistence worker applies storage operations. Each inbound message is
//! handled to completion before the next one is taken off the queue.

use crate::authority::{Outcome, Route, SessionAuthority};
use crate::client_manager::ClientManager;
use crate::persistence::{PersistOp, SnapshotStore};
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, ConnectionId, ErrorKind, Packet, ServerEvent, MAX_PACKET_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ConnectionId },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
    },
}

/// UDP front end of the game authority
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    authority: SessionAuthority,
    store: Arc<dyn SnapshotStore>,
    status_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    persist_rx: Option<mpsc::UnboundedReceiver<PersistOp>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        client_timeout: Duration,
        authority: SessionAuthority,
        store: Arc<dyn SnapshotStore>,
    ) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients, client_timeout))),
            authority,
            store,
            status_interval: Duration::from_secs(60),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
            persist_tx,
            persist_rx: Some(persist_rx),
        })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A handle that can stop the main loop with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn authority(&self) -> &SessionAuthority {
        &self.authority
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];
            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
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
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let client_addrs = clients.read().await.get_client_addrs();
                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to connection {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors connection timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let timed_out = clients.write().await.check_timeouts();
                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the worker that applies storage operations in order
    fn spawn_persistence_worker(&mut self) {
        let Some(mut persist_rx) = self.persist_rx.take() else {
            return;
        };
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || {
            while let Some(op) = persist_rx.blocking_recv() {
                op.apply_logged(store.as_ref());
            }
            debug!("Persistence worker stopped");
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> ServerResult<()> {
        let data = encode_packet(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            warn!("Packet of {} bytes to {} exceeds the datagram budget", data.len(), addr);
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Hands an authority outcome to the sender and persistence tasks
    async fn dispatch(&self, outcome: Outcome) {
        for op in outcome.persistence {
            if let Err(e) = self.persist_tx.send(op) {
                error!("Failed to queue persistence operation: {}", e);
            }
        }

        if outcome.deliveries.is_empty() {
            return;
        }
        let clients = self.clients.read().await;
        for delivery in outcome.deliveries {
            let packet = Packet::Event(delivery.event);
            match self.authority.route(&delivery.recipients) {
                Route::Broadcast => self.broadcast_packet(packet),
                Route::Connections(ids) => {
                    for id in ids {
                        match clients.addr_of(id) {
                            Some(addr) => self.send_packet(packet.clone(), addr),
                            None => debug!("Dropping event for departed connection {}", id),
                        }
                    }
                }
            }
        }
    }

    /// Resolves the sender's connection, registering new peers
    async fn connection_for(&self, addr: SocketAddr) -> Option<ConnectionId> {
        let mut clients = self.clients.write().await;
        match clients.find_client_by_addr(addr) {
            Some(id) => {
                clients.touch(id);
                Some(id)
            }
            None => clients.add_client(addr),
        }
    }

    /// Processes one inbound packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Action(action) => {
                let Some(connection) = self.connection_for(addr).await else {
                    warn!("Refusing {}: server full", addr);
                    let full = ServerEvent::Rejected {
                        kind: ErrorKind::StateConflict,
                        reason: "server full".to_string(),
                    };
                    self.send_packet(Packet::Event(full), addr);
                    return;
                };
                debug!("Action from {}: {:?}", connection, action);
                let outcome = self.authority.handle(connection, action);
                self.dispatch(outcome).await;
            }
            Packet::Heartbeat => {
                if self.connection_for(addr).await.is_some() {
                    self.send_packet(Packet::Heartbeat, addr);
                }
            }
            Packet::Disconnect => {
                let connection = {
                    let mut clients = self.clients.write().await;
                    let id = clients.find_client_by_addr(addr);
                    if let Some(id) = id {
                        clients.remove_client(&id);
                    }
                    id
                };
                if let Some(connection) = connection {
                    let outcome = self.authority.disconnect(connection);
                    self.dispatch(outcome).await;
                }
            }
            Packet::Event(_) => {
                warn!("Unexpected server event from client at {}", addr);
            }
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> ServerResult<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_persistence_worker();

        let mut status_interval = interval(self.status_interval);
        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Connection {} timed out", client_id);
                            let outcome = self.authority.disconnect(client_id);
                            self.dispatch(outcome).await;
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }
                _ = status_interval.tick() => {
                    let connections = self.clients.read().await.len();
                    let game = self.authority.game();
                    debug!(
                        "Status: {} connections, {} players, phase {}, day {}",
                        connections,
                        game.roster().len(),
                        game.phase(),
                        game.day()
                    );
                }
            }
        }

        Ok(())
    }
}
