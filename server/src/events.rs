//! Events raised towards the external event and permission bus
//!
//! The core only needs answers: whether a chat line was cancelled and how
//! to format it, whether a permission is granted, which groups a player
//! belongs to. Plugins answer by implementing [`EventDispatcher`].

/// Format used when no handler changes it. `%s` is the display name, the
/// second `%s` the message.
pub const DEFAULT_CHAT_FORMAT: &str = "<%s> %s";

/// Tri-state answer to a permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventResult {
    Allow,
    Deny,
    /// Nobody answered
    #[default]
    Default,
}

impl EventResult {
    /// Only an explicit allow grants anything
    pub fn is_allowed(self) -> bool {
        matches!(self, EventResult::Allow)
    }
}

/// A chat line about to be broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    player: String,
    message: String,
    format: String,
    cancelled: bool,
}

impl ChatEvent {
    pub fn new(player: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            message: message.into(),
            format: DEFAULT_CHAT_FORMAT.to_string(),
            cancelled: false,
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = format.into();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Arbitrary per-player data supplied by plugins
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Handlers for everything the player core asks the bus
///
/// Every method has a neutral default, so implementors override only what
/// they care about.
pub trait EventDispatcher: Send + Sync {
    fn on_chat(&self, _event: &mut ChatEvent) {}

    fn permission(&self, _world: &str, _player: &str, _node: &str) -> EventResult {
        EventResult::Default
    }

    fn in_group(&self, _world: &str, _player: &str, _group: &str) -> bool {
        false
    }

    fn groups(&self, _world: &str, _player: &str) -> Vec<String> {
        Vec::new()
    }

    fn data(&self, _player: &str, _node: &str) -> Option<DataValue> {
        None
    }
}

/// Dispatcher with no handlers registered
#[derive(Debug, Default)]
pub struct DefaultEvents;

impl EventDispatcher for DefaultEvents {}
