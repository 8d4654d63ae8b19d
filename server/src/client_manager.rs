//! Client connection management and command queuing for the multiplayer server
//!
//! This module handles the server-side management of connected clients, including:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Command buffering with sequence-number deduplication, so redundant or
//!   out-of-order request delivery is absorbed before it reaches the world
//! - Connection health monitoring and automatic cleanup
//! - Client capacity management and address tracking
//!
//! The client manager also records which controller and combat entity each
//! connection drives, which the snapshot builder uses to scope per-viewer
//! replicated fields.

use log::info;
use shared::{ClientCommand, ControllerId, EntityId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client and their pending requests
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The controller/entity pair it was granted at spawn
/// - Buffered commands waiting for execution in sequence order
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Controller driving this client's entity, set after spawn
    pub controller: Option<ControllerId>,
    /// The combat entity this client views the world as
    pub entity: Option<EntityId>,
    /// Highest command sequence number already executed
    pub last_command_sequence: u32,
    /// Buffered commands waiting to be executed
    pub pending_commands: Vec<(u32, ClientCommand)>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            controller: None,
            entity: None,
            last_command_sequence: 0,
            pending_commands: Vec::new(),
        }
    }

    /// Buffers a command unless its sequence was already executed or is
    /// already pending. Duplicate delivery is expected and absorbed here.
    pub fn add_command(&mut self, sequence: u32, command: ClientCommand) {
        self.last_seen = Instant::now();

        if sequence <= self.last_command_sequence {
            return;
        }
        if self.pending_commands.iter().any(|(s, _)| *s == sequence) {
            return;
        }

        self.pending_commands.push((sequence, command));
        // sort by sequence to handle out-of-order packet delivery
        self.pending_commands.sort_by_key(|(s, _)| *s);
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their pending command queues
///
/// The ClientManager provides centralized control over client connections,
/// enforces server capacity limits, and drains each client's requests in
/// sequence order so the authoritative world re-executes them exactly once.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
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

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Records the controller and entity granted to a connection at spawn.
    pub fn assign_pawn(&mut self, client_id: u32, controller: ControllerId, entity: EntityId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.controller = Some(controller);
            client.entity = Some(entity);
        }
    }

    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if removed.is_some() {
            info!("Client {} disconnected", client_id);
        }
        removed
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn controller_of(&self, client_id: u32) -> Option<ControllerId> {
        self.clients.get(&client_id).and_then(|c| c.controller)
    }

    pub fn entity_of(&self, client_id: u32) -> Option<EntityId> {
        self.clients.get(&client_id).and_then(|c| c.entity)
    }

    /// Buffers a command for a specific client. Returns false if the client
    /// ID is invalid.
    pub fn add_command(&mut self, client_id: u32, sequence: u32, command: ClientCommand) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.add_command(sequence, command);
            true
        } else {
            false
        }
    }

    /// Drains every pending command in sequence order, marking each as
    /// executed. A request forwarded twice reaches the world once.
    pub fn drain_commands(&mut self) -> Vec<(ControllerId, ClientCommand)> {
        let mut drained = Vec::new();

        for client in self.clients.values_mut() {
            let controller = match client.controller {
                Some(c) => c,
                None => continue,
            };

            for (sequence, command) in client.pending_commands.drain(..) {
                client.last_command_sequence = client.last_command_sequence.max(sequence);
                drained.push((controller, command));
            }
        }

        drained
    }

    /// Checks for and removes timed-out clients, returning what was removed
    /// so the world can tear down their entities.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = Duration::from_secs(5);
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Gets all client IDs, addresses, and view entities for per-viewer
    /// state broadcasting.
    pub fn get_client_views(&self) -> Vec<(u32, SocketAddr, Option<EntityId>)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr, client.entity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
