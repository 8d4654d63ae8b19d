//! Client network loop: connection handshake, command upload, state
//! application.

use crate::commands::CommandQueue;
use crate::mirror::{Mirror, MirrorEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientCommand, Packet};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::interval;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    pub mirror: Mirror,
    pub commands: CommandQueue,

    ping_ms: u64,
    started: Instant,
}

impl Client {
    pub async fn new(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            mirror: Mirror::new(),
            commands: CommandQueue::new(),
            ping_ms: 0,
            started: Instant::now(),
        })
    }

    /// Seconds since client start, the clock the local effect timers run on.
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect { client_version: 1 };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id, entity } => {
                info!("Connected! Client ID: {}, entity {}", client_id, entity);
                self.client_id = Some(client_id);
                self.connected = true;
                self.mirror.bind_local_entity(entity);
            }

            Packet::State {
                tick,
                timestamp,
                characters,
            } => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_millis() as u64;

                if timestamp > 0 {
                    self.ping_ms = now.saturating_sub(timestamp);
                }

                let local_now = self.now();
                self.mirror.apply_state(tick, characters, local_now);

                for event in self.mirror.drain_events() {
                    self.surface_event(event);
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Hands mirror reactions to the presentation side. Headless build:
    /// log lines stand in for HUD and sound hooks.
    fn surface_event(&self, event: MirrorEvent) {
        match event {
            MirrorEvent::HitTaken { victim, hit } => {
                if Some(victim) == self.mirror.local_entity {
                    info!("Hit for {:.1} ({:?})", hit.damage, hit.kind);
                } else {
                    debug!("Entity {} hit for {:.1}", victim, hit.damage);
                }
            }
            MirrorEvent::DeathObserved { victim, hit } => {
                info!("Entity {} died ({:?})", victim, hit.kind);
            }
            MirrorEvent::EnemyHitConfirmed { victim } => {
                debug!("Hit confirmed on {}", victim);
            }
        }
    }

    /// Queues a request for the authority; nothing is applied locally.
    pub fn request(&mut self, command: ClientCommand) {
        if !self.connected {
            return;
        }
        if !self.mirror.local_effects.input_enabled {
            // local effect track has input disabled
            return;
        }
        self.commands.push(command);
    }

    async fn flush_commands(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }

        for packet in self.commands.drain() {
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut command_interval = interval(Duration::from_millis(16));
        let mut effect_interval = interval(Duration::from_millis(16));
        let mut status_interval = interval(Duration::from_secs(5));

        let mut buffer = [0u8; 4096];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet).await;
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = command_interval.tick() => {
                    if let Err(e) = self.flush_commands().await {
                        error!("Error sending commands: {}", e);
                    }
                },

                _ = effect_interval.tick() => {
                    let now = self.now();
                    self.mirror.advance(now);
                },

                _ = status_interval.tick() => {
                    if self.connected {
                        let health = self.mirror.local_view().map(|v| v.health).unwrap_or(0.0);
                        debug!(
                            "Ping {}ms, health {:.0}{}",
                            self.ping_ms,
                            health,
                            if self.mirror.low_health_warning() { " (low!)" } else { "" }
                        );
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    self.shutdown().await?;
                    break;
                },
            }
        }

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connected {
            self.send_packet(&Packet::Disconnect).await?;
            self.connected = false;
        }
        Ok(())
    }
}
