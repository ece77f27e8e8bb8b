//! The externally visible player entity
//!
//! A [`NetworkedPlayer`] is an [`EntityCore`] plus a [`SessionLifecycle`],
//! a dirty flag and a save schedule. Network tasks drive `connect`,
//! `disconnect`, `chat` and friends; the tick loop calls
//! [`NetworkedPlayer::copy_to_snapshot`] and then [`NetworkedPlayer::on_tick`]
//! once per tick.

use crate::context::ServerContext;
use crate::entity::{EntityCore, Experience, Transform};
use crate::error::SessionError;
use crate::events::{ChatEvent, DataValue};
use crate::lifecycle::{SessionLifecycle, SharedSynchronizer};
use crate::session::Session;
use crate::store::PlayerData;
use crate::synchronizer::PlayerView;
use crate::utils::{format_chat, get_timestamp, wrap_text, CHAT_LINE_WIDTH};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Ticks between periodic saves
pub const DEFAULT_SAVE_INTERVAL: u32 = 20;

pub const DEFAULT_KICK_REASON: &str = "Kicked";

pub trait Nameable {
    fn name(&self) -> &str;

    fn display_name(&self) -> String;

    fn set_display_name(&self, display_name: &str);
}

/// What happened to a line passed to [`ChatCapable::chat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Handed to the command processor
    Command,
    /// A chat handler cancelled it
    Cancelled,
    /// The chat format could not be rendered; nothing was sent
    Dropped,
    Broadcast { recipients: usize },
}

pub trait ChatCapable {
    fn chat(&self, ctx: &ServerContext, message: &str) -> ChatOutcome;

    /// Wraps `text` into chat lines and sends each one. True if any line
    /// was sent.
    fn send_message(&self, text: &str) -> bool;

    fn send_raw_message(&self, text: &str) -> bool;
}

pub trait PermissionQuery {
    /// Permission in the player's own world
    fn has_permission(&self, ctx: &ServerContext, node: &str) -> bool;

    fn has_permission_in(&self, ctx: &ServerContext, world: &str, node: &str) -> bool;

    fn is_in_group(&self, ctx: &ServerContext, group: &str) -> bool;

    fn groups(&self, ctx: &ServerContext) -> Vec<String>;

    fn is_group(&self) -> bool {
        false
    }

    fn data(&self, ctx: &ServerContext, node: &str) -> Option<DataValue>;
}

pub struct NetworkedPlayer {
    name: String,
    display_name: RwLock<String>,
    entity: EntityCore,
    lifecycle: SessionLifecycle,
    // Serializes connect/disconnect so teardown never runs in the middle
    // of another login's setup.
    transition: Mutex<()>,
    should_save: AtomicBool,
    save_ticks: AtomicU32,
    save_interval: u32,
}

impl NetworkedPlayer {
    pub fn new(name: impl Into<String>, entity: EntityCore) -> Self {
        let name = name.into();
        Self {
            display_name: RwLock::new(name.clone()),
            name,
            entity,
            lifecycle: SessionLifecycle::new(),
            transition: Mutex::new(()),
            should_save: AtomicBool::new(false),
            save_ticks: AtomicU32::new(0),
            save_interval: DEFAULT_SAVE_INTERVAL,
        }
    }

    /// Saves every `ticks` ticks instead of the default
    pub fn with_save_interval(mut self, ticks: u32) -> Self {
        self.save_interval = ticks.max(1);
        self
    }

    pub fn entity(&self) -> &EntityCore {
        &self.entity
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Logs the player in over `session`
    ///
    /// Returns `Ok(false)` if the player was already online. If loading,
    /// placement or spawning fails after the online flag flipped, the
    /// player is taken offline again and the error is returned.
    pub fn connect(&self, ctx: &ServerContext, session: Arc<Session>) -> Result<bool, SessionError> {
        let _transition = self.transition.lock();
        if !self.lifecycle.connect(session.clone()) {
            return Ok(false);
        }

        if let Err(e) = self.setup(ctx) {
            warn!("Login of {} failed, rolling back: {}", self.name, e);
            self.lifecycle.disconnect();
            return Err(e);
        }

        info!(
            "{} connected from {} as entity {}",
            self.name,
            session.addr(),
            self.entity.id()
        );
        Ok(true)
    }

    fn setup(&self, ctx: &ServerContext) -> Result<(), SessionError> {
        // Unsaved changes from a previous login win over the stored copy
        if !self.needs_save() {
            match ctx.store.load(&self.name)? {
                Some(data) => self.restore(data),
                None => {
                    self.entity.set_transform(ctx.world.spawn_point());
                    self.mark_dirty();
                }
            }
        }

        ctx.world.place(&self.entity)?;
        if let Err(e) = ctx.world.spawn(&self.entity) {
            if let Err(undo) = ctx.world.remove(&self.entity) {
                error!("Could not undo placement of {}: {}", self.name, undo);
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn restore(&self, data: PlayerData) {
        *self.display_name.write() = data.display_name;
        self.entity.set_transform(data.transform);
        self.entity.set_experience(data.experience);
    }

    /// Logs the player out, saving and removing it from the world
    ///
    /// Returns false if the player was already offline. The session itself
    /// is left to the caller; see [`NetworkedPlayer::kick_with_reason`].
    pub fn disconnect(&self, ctx: &ServerContext) -> bool {
        let _transition = self.transition.lock();
        if !self.lifecycle.disconnect() {
            return false;
        }

        if let Err(e) = self.save(ctx) {
            error!("Failed to save {} on logout: {}", self.name, e);
        }
        if let Err(e) = ctx.world.despawn(&self.entity) {
            warn!("Despawn of {} failed: {}", self.name, e);
        }
        if let Err(e) = ctx.world.remove(&self.entity) {
            warn!("Removal of {} failed: {}", self.name, e);
        }

        info!("{} disconnected", self.name);
        true
    }

    pub fn kick(&self, ctx: &ServerContext) -> Result<bool, SessionError> {
        self.kick_with_reason(ctx, DEFAULT_KICK_REASON)
    }

    /// Tells the client why, closes its session and logs the player out
    pub fn kick_with_reason(&self, ctx: &ServerContext, reason: &str) -> Result<bool, SessionError> {
        if reason.is_empty() {
            return Err(SessionError::InvalidArgument("kick reason cannot be empty"));
        }

        if let Some(session) = self.lifecycle.current_session() {
            session.disconnect(reason);
        }
        Ok(self.disconnect(ctx))
    }

    pub fn is_online(&self) -> bool {
        self.lifecycle.is_online()
    }

    /// Peer IP of the session as of the last tick
    pub fn address(&self) -> Option<IpAddr> {
        self.lifecycle.session().map(|session| session.addr().ip())
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.lifecycle.current_session()
    }

    pub fn bind_synchronizer(&self, synchronizer: Option<SharedSynchronizer>) -> Result<(), SessionError> {
        self.lifecycle.bind_synchronizer(synchronizer)
    }

    pub fn current_synchronizer(&self) -> Option<SharedSynchronizer> {
        self.lifecycle.current_synchronizer()
    }

    /// Publishes live state for this tick. Tick loop only.
    pub fn copy_to_snapshot(&self) {
        self.lifecycle.copy_to_snapshot();
        self.entity.copy_to_snapshot();
    }

    /// Per-tick work, run after [`NetworkedPlayer::copy_to_snapshot`]
    ///
    /// Does nothing while the snapshot says offline. Logout and shutdown
    /// save offline players.
    pub fn on_tick(&self, ctx: &ServerContext, _dt: f32) {
        if !self.lifecycle.is_online() {
            return;
        }
        if let Some(synchronizer) = self.lifecycle.current_synchronizer() {
            synchronizer.synchronize(&self.view());
        }

        let ticks = self.save_ticks.fetch_add(1, Ordering::AcqRel) + 1;
        if ticks < self.save_interval {
            return;
        }
        self.save_ticks.store(0, Ordering::Release);

        if self.needs_save() {
            if let Err(e) = self.save(ctx) {
                error!("Periodic save of {} failed: {}", self.name, e);
            }
        }
    }

    /// Writes live state to the store now
    ///
    /// A failed save leaves the player marked dirty.
    pub fn save(&self, ctx: &ServerContext) -> Result<(), SessionError> {
        // Cleared before reading so changes made during the save re-mark it
        self.should_save.store(false, Ordering::Release);
        let data = PlayerData {
            display_name: self.display_name(),
            transform: self.entity.live_transform(),
            experience: self.entity.live_experience(),
            saved_at: get_timestamp(),
        };

        if let Err(e) = ctx.store.save(&self.name, &data) {
            self.mark_dirty();
            return Err(e.into());
        }
        debug!("Saved {}", self.name);
        Ok(())
    }

    pub fn needs_save(&self) -> bool {
        self.should_save.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.should_save.store(true, Ordering::Release);
    }

    /// Snapshot state as seen by the synchronizer
    pub fn view(&self) -> PlayerView {
        PlayerView {
            entity_id: self.entity.id(),
            transform: self.entity.transform(),
            experience: self.entity.experience(),
        }
    }

    pub fn set_transform(&self, transform: Transform) {
        self.entity.set_transform(transform);
        self.mark_dirty();
    }

    pub fn update_transform<F>(&self, update: F)
    where
        F: FnOnce(&mut Transform),
    {
        self.entity.update_transform(update);
        self.mark_dirty();
    }

    pub fn set_experience(&self, experience: Experience) {
        self.entity.set_experience(experience);
        self.mark_dirty();
    }
}

impl Nameable for NetworkedPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    fn set_display_name(&self, display_name: &str) {
        *self.display_name.write() = display_name.to_string();
        self.mark_dirty();
    }
}

impl ChatCapable for NetworkedPlayer {
    fn chat(&self, ctx: &ServerContext, message: &str) -> ChatOutcome {
        if let Some(command) = message.strip_prefix('/') {
            ctx.commands.process(ctx, self, command);
            return ChatOutcome::Command;
        }

        let mut event = ChatEvent::new(self.name.as_str(), message);
        ctx.events.on_chat(&mut event);
        if event.is_cancelled() {
            return ChatOutcome::Cancelled;
        }

        let formatted = match format_chat(event.format(), &self.display_name(), event.message()) {
            Ok(formatted) => formatted,
            Err(e) => {
                warn!("Dropped chat from {}, bad format {:?}: {}", self.name, event.format(), e);
                return ChatOutcome::Dropped;
            }
        };

        info!("{}", formatted);
        ChatOutcome::Broadcast {
            recipients: ctx.directory.broadcast(&formatted),
        }
    }

    fn send_message(&self, text: &str) -> bool {
        let mut sent = false;
        for line in wrap_text(text, CHAT_LINE_WIDTH) {
            sent |= self.send_raw_message(&line);
        }
        sent
    }

    fn send_raw_message(&self, text: &str) -> bool {
        let Some(session) = self.lifecycle.current_session() else {
            return false;
        };
        let Some(packet) = session.protocol().chat_message(text) else {
            return false;
        };

        match session.send(&packet) {
            Ok(()) => true,
            Err(e) => {
                debug!("Message to {} not sent: {}", self.name, e);
                false
            }
        }
    }
}

impl PermissionQuery for NetworkedPlayer {
    fn has_permission(&self, ctx: &ServerContext, node: &str) -> bool {
        self.has_permission_in(ctx, self.entity.world(), node)
    }

    fn has_permission_in(&self, ctx: &ServerContext, world: &str, node: &str) -> bool {
        ctx.events.permission(world, &self.name, node).is_allowed()
    }

    fn is_in_group(&self, ctx: &ServerContext, group: &str) -> bool {
        ctx.events.in_group(self.entity.world(), &self.name, group)
    }

    fn groups(&self, ctx: &ServerContext) -> Vec<String> {
        ctx.events.groups(self.entity.world(), &self.name)
    }

    fn data(&self, ctx: &ServerContext, node: &str) -> Option<DataValue> {
        ctx.events.data(&self.name, node)
    }
}

impl PartialEq for NetworkedPlayer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for NetworkedPlayer {}

impl Hash for NetworkedPlayer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for NetworkedPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkedPlayer")
            .field("name", &self.name)
            .field("entity", &self.entity.id())
            .field("lifecycle", &self.lifecycle)
            .field("should_save", &self.needs_save())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CommandProcessor, PlayerDirectory};
    use crate::events::{EventDispatcher, EventResult};
    use crate::session::Outbound;
    use crate::store::{MemoryStore, PlayerStore, StoreError};
    use crate::synchronizer::NetworkSynchronizer;
    use crate::world::{SimpleWorld, World, WorldError};
    use shared::{CodecRegistry, Packet};
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use tokio::sync::mpsc;

    struct Fixture {
        ctx: ServerContext,
        world: Arc<SimpleWorld>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let world = Arc::new(SimpleWorld::new("world", Transform::at(0.0, 64.0, 0.0)));
        let store = Arc::new(MemoryStore::new());
        let ctx = ServerContext::new(world.clone()).with_store(store.clone());
        Fixture { ctx, world, store }
    }

    fn player(name: &str) -> NetworkedPlayer {
        NetworkedPlayer::new(name, EntityCore::new(7, "world"))
    }

    fn session(id: u32) -> (Arc<Session>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let codecs = Arc::new(CodecRegistry::standard().unwrap());
        let addr = format!("10.0.0.{}:25565", id).parse().unwrap();
        (Arc::new(Session::new(id, addr, codecs, tx)), rx)
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Packet> {
        let codecs = CodecRegistry::standard().unwrap();
        let mut packets = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            packets.push(codecs.decode_frame(&frame.data).unwrap());
        }
        packets
    }

    #[test]
    fn test_new_player_is_offline() {
        let player = player("alex");
        assert!(!player.is_online());
        assert_eq!(player.address(), None);
        assert!(player.session().is_none());
        assert_eq!(player.display_name(), "alex");
        assert!(!player.is_group());
    }

    #[test]
    fn test_connect_places_and_spawns() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(1);

        assert!(player.connect(&fx.ctx, s1).unwrap());
        assert!(fx.world.is_placed(7));
        assert!(fx.world.is_spawned(7));
        // Fresh players start at the spawn point with unsaved state
        assert_eq!(player.entity().live_transform(), Transform::at(0.0, 64.0, 0.0));
        assert!(player.needs_save());
    }

    #[test]
    fn test_second_connect_keeps_first_session() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx1) = session(1);
        let (s2, _rx2) = session(2);

        assert!(player.connect(&fx.ctx, s1.clone()).unwrap());
        assert!(!player.connect(&fx.ctx, s2).unwrap());

        let current = player.session().unwrap();
        assert!(Arc::ptr_eq(&current, &s1));
        assert_eq!(fx.world.population(), 1);
    }

    #[test]
    fn test_concurrent_connects() {
        const THREADS: usize = 16;
        let fx = fixture();
        let player = player("alex");
        let barrier = Barrier::new(THREADS);
        let winners = AtomicUsize::new(0);

        thread::scope(|scope| {
            for id in 0..THREADS {
                let (player, barrier, winners, ctx) = (&player, &barrier, &winners, &fx.ctx);
                scope.spawn(move || {
                    let (candidate, _rx) = session(id as u32);
                    barrier.wait();
                    if player.connect(ctx, candidate).unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(player.lifecycle().is_online_live());
        assert_eq!(fx.world.population(), 1);
    }

    #[test]
    fn test_disconnect_twice_and_reconnect() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx1) = session(1);
        let (s2, _rx2) = session(2);

        player.connect(&fx.ctx, s1).unwrap();
        assert!(player.disconnect(&fx.ctx));
        assert!(!player.disconnect(&fx.ctx));
        assert!(!fx.world.is_placed(7));
        assert!(!fx.world.is_spawned(7));

        assert!(player.connect(&fx.ctx, s2).unwrap());
        assert_eq!(player.session().unwrap().id(), 2);
    }

    #[test]
    fn test_disconnect_saves_live_state() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(1);

        player.connect(&fx.ctx, s1).unwrap();
        player.set_transform(Transform::at(3.0, 70.0, -2.0));
        player.set_display_name("Alexandra");
        player.disconnect(&fx.ctx);

        let saved = fx.store.get("alex").unwrap();
        assert_eq!(saved.transform, Transform::at(3.0, 70.0, -2.0));
        assert_eq!(saved.display_name, "Alexandra");
        assert!(saved.saved_at > 0);
        assert!(!player.needs_save());
    }

    #[test]
    fn test_connect_restores_saved_data() {
        let fx = fixture();
        fx.store
            .save(
                "alex",
                &PlayerData {
                    display_name: "Captain".to_string(),
                    transform: Transform::at(100.0, 5.0, 100.0),
                    experience: Experience::new(0.5, 4, 60),
                    saved_at: 0,
                },
            )
            .unwrap();

        let player = player("alex");
        let (s1, _rx) = session(1);
        player.connect(&fx.ctx, s1).unwrap();

        assert_eq!(player.display_name(), "Captain");
        assert_eq!(player.entity().live_transform(), Transform::at(100.0, 5.0, 100.0));
        assert_eq!(player.entity().live_experience(), Experience::new(0.5, 4, 60));
        assert!(!player.needs_save());
    }

    #[test]
    fn test_snapshot_isolation() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(9);

        player.connect(&fx.ctx, s1).unwrap();
        assert!(!player.is_online());
        assert_eq!(player.address(), None);

        player.copy_to_snapshot();
        assert!(player.is_online());
        assert_eq!(player.address(), Some("10.0.0.9".parse().unwrap()));

        player.disconnect(&fx.ctx);
        assert!(player.is_online());
        player.copy_to_snapshot();
        assert!(!player.is_online());
        assert_eq!(player.address(), None);
    }

    struct Recorder(AtomicUsize);

    impl NetworkSynchronizer for Recorder {
        fn synchronize(&self, _view: &PlayerView) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_synchronizer_rebind_after_disconnect() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx1) = session(1);
        let (s2, _rx2) = session(2);

        player.connect(&fx.ctx, s1).unwrap();
        player.bind_synchronizer(Some(Arc::new(Recorder(AtomicUsize::new(0))))).unwrap();
        assert!(matches!(
            player.bind_synchronizer(Some(Arc::new(Recorder(AtomicUsize::new(0))))),
            Err(SessionError::SynchronizerAlreadyBound)
        ));

        player.disconnect(&fx.ctx);
        player.connect(&fx.ctx, s2).unwrap();
        player.bind_synchronizer(Some(Arc::new(Recorder(AtomicUsize::new(0))))).unwrap();
    }

    #[test]
    fn test_on_tick_synchronizes_only_when_online() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(1);
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));

        player.connect(&fx.ctx, s1).unwrap();
        player.bind_synchronizer(Some(recorder.clone())).unwrap();

        // Not online in the snapshot yet
        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(recorder.0.load(Ordering::SeqCst), 0);

        player.copy_to_snapshot();
        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_save_every_interval_when_dirty() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(1);
        player.connect(&fx.ctx, s1).unwrap();

        for _ in 0..DEFAULT_SAVE_INTERVAL - 1 {
            player.copy_to_snapshot();
            player.on_tick(&fx.ctx, 0.05);
        }
        assert_eq!(fx.store.save_count(), 0);

        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(fx.store.save_count(), 1);
        assert!(!player.needs_save());

        // Clean window: nothing to write
        for _ in 0..DEFAULT_SAVE_INTERVAL {
            player.on_tick(&fx.ctx, 0.05);
        }
        assert_eq!(fx.store.save_count(), 1);

        player.update_transform(|t| t.yaw = 90.0);
        for _ in 0..DEFAULT_SAVE_INTERVAL {
            player.on_tick(&fx.ctx, 0.05);
        }
        assert_eq!(fx.store.save_count(), 2);
        assert_eq!(fx.store.get("alex").unwrap().transform.yaw, 90.0);
    }

    #[test]
    fn test_custom_save_interval() {
        let fx = fixture();
        let player = player("alex").with_save_interval(2);
        let (s1, _rx) = session(1);
        player.connect(&fx.ctx, s1).unwrap();
        player.copy_to_snapshot();
        player.mark_dirty();

        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(fx.store.save_count(), 0);
        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(fx.store.save_count(), 1);
    }

    #[test]
    fn test_offline_player_not_saved_by_ticks() {
        let fx = fixture();
        let player = player("alex");
        player.set_display_name("Alex");

        for _ in 0..DEFAULT_SAVE_INTERVAL * 2 {
            player.copy_to_snapshot();
            player.on_tick(&fx.ctx, 0.05);
        }
        assert_eq!(fx.store.save_count(), 0);
        assert!(player.needs_save());

        // Ticks spent offline do not count towards the next window
        let (s1, _rx) = session(1);
        player.connect(&fx.ctx, s1).unwrap();
        for _ in 0..DEFAULT_SAVE_INTERVAL - 1 {
            player.copy_to_snapshot();
            player.on_tick(&fx.ctx, 0.05);
        }
        assert_eq!(fx.store.save_count(), 0);
        player.on_tick(&fx.ctx, 0.05);
        assert_eq!(fx.store.save_count(), 1);
    }

    struct BrokenStore;

    impl PlayerStore for BrokenStore {
        fn load(&self, _name: &str) -> Result<Option<PlayerData>, StoreError> {
            Ok(None)
        }

        fn save(&self, _name: &str, _data: &PlayerData) -> Result<(), StoreError> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
        }
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let ctx = fixture().ctx.with_store(Arc::new(BrokenStore));
        let player = player("alex");
        let (s1, _rx) = session(1);
        player.connect(&ctx, s1).unwrap();
        player.copy_to_snapshot();
        player.mark_dirty();

        for _ in 0..DEFAULT_SAVE_INTERVAL {
            player.on_tick(&ctx, 0.05);
        }
        assert!(player.needs_save());
        assert!(matches!(player.save(&ctx), Err(SessionError::Store(_))));
    }

    struct NoSpawnWorld(SimpleWorld);

    impl World for NoSpawnWorld {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn spawn_point(&self) -> Transform {
            self.0.spawn_point()
        }

        fn place(&self, entity: &EntityCore) -> Result<(), WorldError> {
            self.0.place(entity)
        }

        fn remove(&self, entity: &EntityCore) -> Result<(), WorldError> {
            self.0.remove(entity)
        }

        fn spawn(&self, entity: &EntityCore) -> Result<(), WorldError> {
            Err(WorldError::NotPlaced(entity.id()))
        }

        fn despawn(&self, entity: &EntityCore) -> Result<(), WorldError> {
            self.0.despawn(entity)
        }
    }

    #[test]
    fn test_failed_spawn_rolls_back() {
        let world = Arc::new(NoSpawnWorld(SimpleWorld::new("world", Transform::default())));
        let ctx = ServerContext::new(world.clone());
        let player = player("alex");
        let (s1, _rx) = session(1);

        let result = player.connect(&ctx, s1);
        assert!(matches!(result, Err(SessionError::World(_))));
        assert!(!player.lifecycle().is_online_live());
        assert!(player.session().is_none());
        assert_eq!(world.0.population(), 0);

        // The lifecycle is usable again afterwards
        let (s2, _rx2) = session(2);
        assert!(player.connect(&ctx, s2).is_err());
    }

    #[test]
    fn test_failed_placement_rolls_back() {
        let fx = fixture();
        let player = player("alex");
        fx.world.place(player.entity()).unwrap();

        let (s1, _rx) = session(1);
        let result = player.connect(&fx.ctx, s1);
        assert!(matches!(
            result,
            Err(SessionError::World(WorldError::AlreadyPlaced(7)))
        ));
        assert!(!player.lifecycle().is_online_live());
    }

    #[test]
    fn test_send_message_without_session() {
        let player = player("alex");
        assert!(!player.send_message("hello"));
        assert!(!player.send_raw_message("hello"));
    }

    #[test]
    fn test_send_message_wraps_lines() {
        let fx = fixture();
        let player = player("alex");
        let (s1, mut rx) = session(1);
        player.connect(&fx.ctx, s1).unwrap();

        let text = format!("{} {}", "a".repeat(100), "b".repeat(100));
        assert!(player.send_message(&text));

        let packets = frames(&mut rx);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], Packet::Chat(shared::ChatMessage::new("a".repeat(100))));
        assert_eq!(packets[1], Packet::Chat(shared::ChatMessage::new("b".repeat(100))));
    }

    #[test]
    fn test_send_message_to_closed_session() {
        let fx = fixture();
        let player = player("alex");
        let (s1, _rx) = session(1);
        player.connect(&fx.ctx, s1.clone()).unwrap();

        s1.disconnect("gone");
        assert!(!player.send_message("hello"));
    }

    #[derive(Default)]
    struct Chatter {
        lines: Mutex<Vec<String>>,
        commands: Mutex<Vec<String>>,
    }

    impl PlayerDirectory for Chatter {
        fn broadcast(&self, message: &str) -> usize {
            self.lines.lock().push(message.to_string());
            3
        }

        fn online_players(&self) -> Vec<String> {
            vec!["alex".to_string()]
        }
    }

    impl CommandProcessor for Chatter {
        fn process(&self, _ctx: &ServerContext, _sender: &NetworkedPlayer, command: &str) {
            self.commands.lock().push(command.to_string());
        }
    }

    struct Censor;

    impl EventDispatcher for Censor {
        fn on_chat(&self, event: &mut ChatEvent) {
            if event.message().contains("secret") {
                event.set_cancelled(true);
            }
            if event.message() == "broken" {
                event.set_format("%s %s %s");
            }
            if event.message() == "huge" {
                event.set_format("%99999999999999999999999$s");
            }
        }
    }

    fn chat_context() -> (ServerContext, Arc<Chatter>) {
        let chatter = Arc::new(Chatter::default());
        let ctx = fixture()
            .ctx
            .with_directory(chatter.clone())
            .with_commands(chatter.clone())
            .with_events(Arc::new(Censor));
        (ctx, chatter)
    }

    #[test]
    fn test_chat_broadcasts_formatted_line() {
        let (ctx, chatter) = chat_context();
        let player = player("alex");
        player.set_display_name("Alex");

        assert_eq!(
            player.chat(&ctx, "hello"),
            ChatOutcome::Broadcast { recipients: 3 }
        );
        assert_eq!(*chatter.lines.lock(), vec!["<Alex> hello".to_string()]);
    }

    #[test]
    fn test_chat_commands_and_cancellation() {
        let (ctx, chatter) = chat_context();
        let player = player("alex");

        assert_eq!(player.chat(&ctx, "/list all"), ChatOutcome::Command);
        assert_eq!(*chatter.commands.lock(), vec!["list all".to_string()]);

        assert_eq!(player.chat(&ctx, "the secret"), ChatOutcome::Cancelled);
        assert!(chatter.lines.lock().is_empty());
    }

    #[test]
    fn test_chat_bad_format_is_dropped() {
        let (ctx, chatter) = chat_context();
        let player = player("alex");

        assert_eq!(player.chat(&ctx, "broken"), ChatOutcome::Dropped);
        assert_eq!(player.chat(&ctx, "huge"), ChatOutcome::Dropped);
        assert!(chatter.lines.lock().is_empty());
    }

    #[test]
    fn test_kick() {
        let fx = fixture();
        let player = player("alex");
        let (s1, mut rx) = session(1);
        player.connect(&fx.ctx, s1.clone()).unwrap();

        assert!(matches!(
            player.kick_with_reason(&fx.ctx, ""),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(player.lifecycle().is_online_live());
        assert!(!s1.is_closed());

        assert!(player.kick(&fx.ctx).unwrap());
        assert!(s1.is_closed());
        assert!(!player.lifecycle().is_online_live());
        assert_eq!(
            frames(&mut rx),
            vec![Packet::Kick(shared::KickMessage::new(DEFAULT_KICK_REASON))]
        );

        // Kicking an offline player is a no-op
        assert!(!player.kick(&fx.ctx).unwrap());
    }

    struct Permissions;

    impl EventDispatcher for Permissions {
        fn permission(&self, world: &str, _player: &str, node: &str) -> EventResult {
            match (world, node) {
                ("world", "build") => EventResult::Allow,
                (_, "build") => EventResult::Deny,
                _ => EventResult::Default,
            }
        }

        fn in_group(&self, _world: &str, player: &str, group: &str) -> bool {
            player == "alex" && group == "builders"
        }

        fn groups(&self, _world: &str, _player: &str) -> Vec<String> {
            vec!["builders".to_string()]
        }

        fn data(&self, _player: &str, node: &str) -> Option<DataValue> {
            (node == "rank").then(|| DataValue::Int(3))
        }
    }

    #[test]
    fn test_permission_queries() {
        let ctx = fixture().ctx.with_events(Arc::new(Permissions));
        let player = player("alex");

        assert!(player.has_permission(&ctx, "build"));
        assert!(!player.has_permission_in(&ctx, "nether", "build"));
        assert!(!player.has_permission(&ctx, "fly"));
        assert!(player.is_in_group(&ctx, "builders"));
        assert_eq!(player.groups(&ctx), vec!["builders".to_string()]);
        assert_eq!(player.data(&ctx, "rank"), Some(DataValue::Int(3)));
        assert_eq!(player.data(&ctx, "other"), None);
    }

    #[test]
    fn test_identity_by_name() {
        let a = NetworkedPlayer::new("alex", EntityCore::new(1, "world"));
        let b = NetworkedPlayer::new("alex", EntityCore::new(2, "world"));
        let c = NetworkedPlayer::new("sam", EntityCore::new(1, "world"));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
        assert!(set.insert(c));
    }
}
