//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game_mode::FreeForAllMode;
use crate::presentation::LogPresentation;
use crate::world::{Ctx, World, WorldEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{Packet, Vec3, WeaponKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Default loadout handed to every freshly spawned combatant.
const DEFAULT_LOADOUT: [WeaponKind; 2] = [WeaponKind::Rifle, WeaponKind::FreezeRay];

fn random_spawn_position() -> Vec3 {
    let mut rng = rand::thread_rng();
    Vec3::new(
        rng.gen_range(-500.0..500.0),
        rng.gen_range(-500.0..500.0),
        0.0,
    )
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        controller: Option<shared::ControllerId>,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Main server coordinating networking and the authoritative combat world
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        bot_count: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let mut world = World::new(
            Box::new(FreeForAllMode::new()),
            Box::new(LogPresentation::new()),
        );

        for _ in 0..bot_count {
            let position = random_spawn_position();
            let (_, entity) = world.spawn_bot(position);
            world.spawn_default_inventory(Ctx::authority(), entity, &DEFAULT_LOADOUT);
        }

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            world,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
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

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout {
                        client_id: client.id,
                        controller: client.controller,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
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

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes incoming packets and updates world state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    if let Some(client) = clients.remove_client(&existing_id) {
                        if let Some(controller) = client.controller {
                            self.world.remove_player(controller);
                        }
                    }
                }

                // Try to add new client
                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    let position = random_spawn_position();
                    let (controller, entity) = self.world.spawn_player(client_id, position);
                    self.world
                        .spawn_default_inventory(Ctx::authority(), entity, &DEFAULT_LOADOUT);

                    {
                        let mut clients = self.clients.write().await;
                        clients.assign_pawn(client_id, controller, entity);
                    }

                    let response = Packet::Connected { client_id, entity };
                    self.send_packet(&response, addr).await;
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                }
            }

            Packet::Command { sequence, command } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.add_command(client_id, sequence, command);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    if let Some(client) = clients.remove_client(&client_id) {
                        if let Some(controller) = client.controller {
                            self.world.remove_player(controller);
                        }
                    }
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Re-executes forwarded client requests under the authority role, then
    /// advances the simulation.
    async fn process_tick(&mut self, dt: f64) {
        let commands = {
            let mut clients = self.clients.write().await;
            clients.drain_commands()
        };

        for (controller, command) in commands {
            self.world
                .handle_command(Ctx::authority(), controller, command);
        }

        self.world.advance(dt);

        for event in self.world.drain_events() {
            match event {
                WorldEvent::Noise {
                    location,
                    loudness,
                    source,
                } => {
                    debug!(
                        "Noise at ({:.0}, {:.0}, {:.0}) loudness {:.1} from {}",
                        location.x, location.y, location.z, loudness, source
                    );
                }
            }
        }
    }

    /// Sends each connection its own view of the world, with scoped fields
    /// resolved against that connection's entity.
    async fn broadcast_world_state(&mut self) {
        let client_views = {
            let clients = self.clients.read().await;
            clients.get_client_views()
        };

        if client_views.is_empty() {
            self.world.clear_movement_refresh();
            return;
        }

        // Take timestamp as close to transmission as possible
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp_safe = (timestamp.min(u64::MAX as u128)) as u64;

        for (_, addr, entity) in client_views {
            let packet = Packet::State {
                tick: self.world.tick(),
                timestamp: timestamp_safe,
                characters: self.world.snapshot_for(entity),
            };
            self.send_packet(&packet, addr).await;
        }

        self.world.clear_movement_refresh();
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, controller }) => {
                            warn!("Client {} timed out", client_id);
                            if let Some(controller) = controller {
                                self.world.remove_player(controller);
                            }
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    self.process_tick(dt).await;
                    self.broadcast_world_state().await;

                    // Periodic health monitoring
                    if self.world.tick() % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {} entities, {:.1}Hz",
                                   self.world.tick(), client_count,
                                   self.world.character_ids().len(), 1.0 / dt);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ClientCommand;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_client_timeout_message() {
        let msg = ServerMessage::ClientTimeout {
            client_id: 42,
            controller: Some(shared::ControllerId(3)),
        };

        match msg {
            ServerMessage::ClientTimeout {
                client_id,
                controller,
            } => {
                assert_eq!(client_id, 42);
                assert_eq!(controller, Some(shared::ControllerId(3)));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let packet = Packet::Command {
            sequence: 1,
            command: ClientCommand::StartFire,
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        assert!(tx
            .send(ServerMessage::PacketReceived {
                packet: packet.clone(),
                addr
            })
            .is_ok());

        let received = rx.try_recv();
        assert!(received.is_ok());

        match received.unwrap() {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Command { sequence, command } => {
                        assert_eq!(sequence, 1);
                        assert_eq!(command, ClientCommand::StartFire);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect { client_version: 1 },
            Packet::Connected {
                client_id: 42,
                entity: shared::EntityId::new(1, 1),
            },
            Packet::Disconnect,
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
            Packet::Command {
                sequence: 100,
                command: ClientCommand::NextWeapon,
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet);
            assert!(serialized.is_ok());

            let deserialized: Result<Packet, _> = deserialize(&serialized.unwrap());
            assert!(deserialized.is_ok());

            match (&packet, &deserialized.unwrap()) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Connected { .. }, Packet::Connected { .. }) => {}
                (Packet::Disconnect, Packet::Disconnect) => {}
                (Packet::Disconnected { .. }, Packet::Disconnected { .. }) => {}
                (Packet::Command { .. }, Packet::Command { .. }) => {}
                _ => panic!("Packet type mismatch after roundtrip"),
            }
        }
    }

    #[test]
    fn test_buffer_bounds() {
        let buffer_size = 2048;

        let typical_sizes = vec![64, 128, 256, 512, 1024];
        for size in typical_sizes {
            assert!(size < buffer_size, "Packet size {} exceeds buffer", size);
        }

        assert!(buffer_size >= 1024);
        assert!(buffer_size <= 65536);
    }

    #[test]
    fn test_tick_duration_validation() {
        let valid_durations = vec![
            Duration::from_millis(16), // 60 Hz
            Duration::from_millis(33), // 30 Hz
            Duration::from_millis(8),  // 120 Hz
        ];

        for duration in valid_durations {
            assert!(duration.as_millis() > 0);
            assert!(duration.as_millis() < 1000);

            let hz = 1000.0 / duration.as_millis() as f64;
            assert!((1.0..=1000.0).contains(&hz));
        }
    }

    #[test]
    fn test_timestamp_generation() {
        let timestamp1 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        std::thread::sleep(std::time::Duration::from_millis(1));

        let timestamp2 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        assert!(timestamp2 > timestamp1);

        let large_timestamp = u128::MAX;
        let safe_timestamp = (large_timestamp.min(u64::MAX as u128)) as u64;
        assert_eq!(safe_timestamp, u64::MAX);
    }
}
