//! Collaborators handed to player operations
//!
//! Instead of reaching for a global engine, operations that need the event
//! bus, the command processor, the world, persistence or the list of online
//! players take a [`ServerContext`].

use crate::entity::Transform;
use crate::events::{DefaultEvents, EventDispatcher};
use crate::player::{ChatCapable, NetworkedPlayer};
use crate::store::{MemoryStore, PlayerStore};
use crate::world::{SimpleWorld, World};
use std::sync::Arc;

/// Handles `/`-prefixed chat lines
pub trait CommandProcessor: Send + Sync {
    /// `command` has the leading slash already stripped
    fn process(&self, ctx: &ServerContext, sender: &NetworkedPlayer, command: &str);
}

/// Everyone a chat broadcast can reach
pub trait PlayerDirectory: Send + Sync {
    /// Sends `message` to every online player, returning how many got it
    fn broadcast(&self, message: &str) -> usize;

    fn online_players(&self) -> Vec<String>;
}

/// Directory with nobody in it, for players living outside a server
#[derive(Debug, Default)]
pub struct EmptyDirectory;

impl PlayerDirectory for EmptyDirectory {
    fn broadcast(&self, _message: &str) -> usize {
        0
    }

    fn online_players(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone)]
pub struct ServerContext {
    pub events: Arc<dyn EventDispatcher>,
    pub commands: Arc<dyn CommandProcessor>,
    pub world: Arc<dyn World>,
    pub store: Arc<dyn PlayerStore>,
    pub directory: Arc<dyn PlayerDirectory>,
}

impl ServerContext {
    /// Context around `world` with default events, built-in commands,
    /// an in-memory store and an empty directory
    pub fn new(world: Arc<dyn World>) -> Self {
        Self {
            events: Arc::new(DefaultEvents),
            commands: Arc::new(BuiltinCommands),
            world,
            store: Arc::new(MemoryStore::new()),
            directory: Arc::new(EmptyDirectory),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandProcessor>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PlayerStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn PlayerDirectory>) -> Self {
        self.directory = directory;
        self
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new(Arc::new(SimpleWorld::new("world", Transform::default())))
    }
}

/// The few commands every server answers
#[derive(Debug, Default)]
pub struct BuiltinCommands;

impl CommandProcessor for BuiltinCommands {
    fn process(&self, ctx: &ServerContext, sender: &NetworkedPlayer, command: &str) {
        let name = command.split_whitespace().next().unwrap_or("");
        match name.to_ascii_lowercase().as_str() {
            "list" => {
                let mut players = ctx.directory.online_players();
                players.sort();
                sender.send_message(&format!(
                    "Online players ({}): {}",
                    players.len(),
                    players.join(", ")
                ));
            }
            "help" => {
                sender.send_message("Commands: /list, /help");
            }
            _ => {
                sender.send_message("Unknown command. Type /help for help.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityCore;
    use crate::session::{Outbound, Session};
    use shared::{CodecRegistry, Packet};
    use tokio::sync::mpsc;

    struct Fixed(Vec<&'static str>);

    impl PlayerDirectory for Fixed {
        fn broadcast(&self, _message: &str) -> usize {
            self.0.len()
        }

        fn online_players(&self) -> Vec<String> {
            self.0.iter().map(|name| name.to_string()).collect()
        }
    }

    fn replies(command: &str) -> Vec<Packet> {
        let ctx = ServerContext::default().with_directory(Arc::new(Fixed(vec!["sam", "alex"])));
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        let codecs = Arc::new(CodecRegistry::standard().unwrap());
        let session = Arc::new(Session::new(1, "127.0.0.1:4000".parse().unwrap(), codecs.clone(), tx));

        let player = NetworkedPlayer::new("alex", EntityCore::new(1, "world"));
        player.connect(&ctx, session).unwrap();
        ctx.commands.process(&ctx, &player, command);

        let mut packets = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            packets.push(codecs.decode_frame(&frame.data).unwrap());
        }
        packets
    }

    fn chat(text: &str) -> Packet {
        Packet::Chat(shared::ChatMessage::new(text))
    }

    #[test]
    fn test_list_command() {
        assert_eq!(replies("list"), vec![chat("Online players (2): alex, sam")]);
        assert_eq!(replies("LIST extra"), vec![chat("Online players (2): alex, sam")]);
    }

    #[test]
    fn test_help_and_unknown() {
        assert_eq!(replies("help"), vec![chat("Commands: /list, /help")]);
        assert_eq!(
            replies("fly"),
            vec![chat("Unknown command. Type /help for help.")]
        );
    }

    #[test]
    fn test_empty_directory() {
        let directory = EmptyDirectory;
        assert_eq!(directory.broadcast("hi"), 0);
        assert!(directory.online_players().is_empty());
    }
}
