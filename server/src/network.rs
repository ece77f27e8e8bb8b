//! Server network layer handling UDP communications and tick loop coordination

use crate::client_manager::{Client, ClientManager};
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::entity::Transform;
use crate::error::ServerError;
use crate::lifecycle::SharedSynchronizer;
use crate::player::{ChatCapable, Nameable, NetworkedPlayer};
use crate::session::{Outbound, Session};
use crate::store::{FileStore, MemoryStore, PlayerStore};
use crate::synchronizer::ProtocolSynchronizer;
use crate::utils::is_valid_player_name;
use crate::world::SimpleWorld;
use log::{debug, error, info, warn};
use shared::{
    CodecError, CodecRegistry, KeepAliveMessage, LoginAcceptedMessage, LoginMessage, Packet,
    PositionLookMessage, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Largest datagram the receiver accepts
const RECV_BUFFER_SIZE: usize = 65536;

/// Longest stretch of simulated time one tick may cover after a stall
const MAX_CATCH_UP_TICKS: u32 = 5;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    DecodeFailed {
        error: CodecError,
        addr: SocketAddr,
    },
    ClientTimeout {
        client: Client,
    },
    Shutdown,
}

/// Cloneable handle for stopping a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    /// Asks the server to disconnect everyone and return from `run`
    pub fn shutdown(&self) -> bool {
        self.server_tx.send(ServerMessage::Shutdown).is_ok()
    }
}

/// Main server coordinating networking and the tick loop
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    ctx: ServerContext,
    clients: Arc<ClientManager>,
    codecs: Arc<CodecRegistry>,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    /// Binds the socket and builds the default world and player store
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store: Arc<dyn PlayerStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        let world = Arc::new(SimpleWorld::new(
            config.world_name.as_str(),
            Transform::at(0.0, 64.0, 0.0),
        ));
        let ctx = ServerContext::new(world).with_store(store);
        Self::with_context(config, ctx).await
    }

    /// Binds the socket and serves players with the given collaborators
    ///
    /// The context's player directory is replaced by the server's own
    /// client roster.
    pub async fn with_context(config: ServerConfig, ctx: ServerContext) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let clients = Arc::new(
            ClientManager::new(config.max_clients, config.world_name.as_str())
                .with_save_interval(config.save_interval),
        );
        let ctx = ctx.with_directory(clients.clone());
        let codecs = Arc::new(CodecRegistry::standard()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            config,
            ctx,
            clients,
            codecs,
            tick: 0,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn clients(&self) -> &Arc<ClientManager> {
        &self.clients
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let codecs = Arc::clone(&self.codecs);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = match codecs.decode_frame(&buffer[..len]) {
                            Ok(packet) => ServerMessage::PacketReceived { packet, addr },
                            Err(error) => ServerMessage::DecodeFailed { error, addr },
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send packet to main loop: {}", e);
                            break;
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

    /// Spawns task that drains the outbound frame queue onto the socket
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(&frame.data, frame.addr).await {
                    error!("Failed to send packet to {}: {}", frame.addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                for client in clients.check_timeouts(timeout) {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn new_session(&self, addr: SocketAddr) -> Arc<Session> {
        Arc::new(Session::new(
            self.clients.next_session_id(),
            addr,
            Arc::clone(&self.codecs),
            self.outbound_tx.clone(),
        ))
    }

    /// Tells a peer without a session why it is being turned away
    fn refuse(&self, addr: SocketAddr, reason: &str) {
        warn!("Refusing {}: {}", addr, reason);
        self.new_session(addr).disconnect(reason);
    }

    /// Detaches the client at `addr` and logs its player out
    fn drop_client(&self, addr: SocketAddr, reason: &str) {
        if let Some(client) = self.clients.detach(addr) {
            client.session.disconnect(reason);
            client.player.disconnect(&self.ctx);
        }
    }

    /// Processes one decoded packet from `addr`
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let packet = match packet {
            Packet::Login(login) => {
                self.handle_login(login, addr);
                return;
            }
            other => other,
        };

        let Some(client) = self.clients.client(addr) else {
            warn!("{} from unknown peer {}", packet.name(), addr);
            return;
        };
        self.clients.touch(addr);

        match packet {
            Packet::KeepAlive(KeepAliveMessage { token }) => {
                if let Err(e) = client.session.send(&Packet::KeepAlive(KeepAliveMessage { token })) {
                    debug!("Keep-alive echo to {} failed: {}", addr, e);
                }
            }

            Packet::Chat(chat) => {
                let outcome = client.player.chat(&self.ctx, &chat.message);
                debug!("Chat from {}: {:?}", client.player.name(), outcome);
            }

            Packet::PositionLook(PositionLookMessage { x, y, z, yaw, pitch }) => {
                client.player.update_transform(|transform| {
                    transform.x = x;
                    transform.y = y;
                    transform.z = z;
                    transform.yaw = yaw;
                    transform.pitch = pitch;
                });
            }

            Packet::Kick(kick) => {
                info!("{} left: {}", client.player.name(), kick.reason);
                if let Some(client) = self.clients.detach(addr) {
                    client.session.close();
                    client.player.disconnect(&self.ctx);
                }
            }

            other => {
                warn!("Unexpected {} from client at {}", other.name(), addr);
            }
        }
    }

    fn handle_login(&mut self, login: LoginMessage, addr: SocketAddr) {
        info!(
            "Login from {} as {:?} (protocol {})",
            addr, login.name, login.protocol_version
        );

        // A second login from the same peer replaces the first
        if self.clients.client(addr).is_some() {
            self.drop_client(addr, "Logged in again");
        }

        if login.protocol_version != PROTOCOL_VERSION {
            self.refuse(
                addr,
                &format!(
                    "Protocol version mismatch: server speaks {}, client sent {}",
                    PROTOCOL_VERSION, login.protocol_version
                ),
            );
            return;
        }
        if !is_valid_player_name(&login.name) {
            self.refuse(addr, "Invalid player name");
            return;
        }
        if self.clients.is_full() {
            self.refuse(addr, "Server full");
            return;
        }

        let session = self.new_session(addr);
        let player = self.clients.player(&login.name);

        match player.connect(&self.ctx, Arc::clone(&session)) {
            Ok(true) => self.complete_login(session, player),
            Ok(false) => {
                session.disconnect("Already logged in");
            }
            Err(e) => {
                error!("Login of {} failed: {}", login.name, e);
                session.disconnect("Login failed");
            }
        }
    }

    fn complete_login(&mut self, session: Arc<Session>, player: Arc<NetworkedPlayer>) {
        let synchronizer: SharedSynchronizer = Arc::new(ProtocolSynchronizer::new(Arc::clone(&session)));
        if let Err(e) = player.bind_synchronizer(Some(synchronizer)) {
            error!("Could not bind synchronizer for {}: {}", player.name(), e);
        }

        let accepted = Packet::LoginAccepted(LoginAcceptedMessage {
            entity_id: player.entity().id(),
        });
        if let Err(e) = session.send(&accepted) {
            warn!("Could not confirm login of {}: {}", player.name(), e);
        }

        if !self.clients.attach(Arc::clone(&session), Arc::clone(&player)) {
            session.disconnect("Server full");
            player.disconnect(&self.ctx);
        }
    }

    /// Closes the session of a peer whose stream no longer decodes
    fn handle_decode_failure(&mut self, error: CodecError, addr: SocketAddr) {
        if !error.is_desync() {
            warn!("Rejected packet from {}: {}", addr, error);
            return;
        }

        warn!("Closing {} after undecodable packet: {}", addr, error);
        self.drop_client(addr, &format!("Bad packet: {}", error));
    }

    /// Publishes every player's live state, then runs per-tick work
    fn run_tick(&mut self, dt: f32) {
        for client in self.clients.prune_closed() {
            client.player.disconnect(&self.ctx);
        }

        let players = self.clients.players();
        for player in &players {
            player.copy_to_snapshot();
        }
        for player in &players {
            player.on_tick(&self.ctx, dt);
        }
        self.tick += 1;

        // Offline players whose logout save failed retry once per save window
        if self.tick % u64::from(self.clients.save_interval()) == 0 {
            for player in &players {
                if !player.lifecycle().is_online_live() && player.needs_save() {
                    if let Err(e) = player.save(&self.ctx) {
                        error!("Retrying save of {} failed: {}", player.name(), e);
                    }
                }
            }
        }
        drop(players);

        let released = self.clients.release_idle();
        if released > 0 {
            debug!("Released {} idle players", released);
        }
    }

    /// Disconnects everyone and saves them
    fn shutdown(&mut self) {
        for client in self.clients.clients() {
            self.drop_client(client.session.addr(), "Server closing");
        }
        for player in self.clients.players() {
            if player.needs_save() {
                if let Err(e) = player.save(&self.ctx) {
                    error!("Final save of {} failed: {}", player.name(), e);
                }
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let tick_duration = self.config.tick_duration();
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        },
                        Some(ServerMessage::DecodeFailed { error, addr }) => {
                            self.handle_decode_failure(error, addr);
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            info!("{} timed out", client.player.name());
                            client.session.disconnect("Timed out");
                            client.player.disconnect(&self.ctx);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.shutdown();
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = tick_delta(now.duration_since(last_tick), tick_duration);
                    last_tick = now;

                    self.run_tick(dt);

                    // Periodic performance monitoring
                    if self.tick % 100 == 0 && !self.clients.is_empty() {
                        debug!(
                            "Tick {}: {} clients, {:.1}Hz",
                            self.tick,
                            self.clients.len(),
                            1.0 / dt
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Seconds of simulated time for one tick, capped after long stalls
pub fn tick_delta(elapsed: Duration, tick_duration: Duration) -> f32 {
    elapsed
        .min(tick_duration * MAX_CATCH_UP_TICKS)
        .as_secs_f32()
}
