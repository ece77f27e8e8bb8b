//! Keeps each client's view of its own entity in line with the server

use crate::entity::{Experience, Transform};
use crate::session::Session;
use log::debug;
use parking_lot::Mutex;
use shared::Packet;
use std::sync::Arc;

/// Snapshot-side view of a player handed to the synchronizer each tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub entity_id: u32,
    pub transform: Transform,
    pub experience: Experience,
}

/// Component that pushes server state to one client
///
/// Bound to a player at most once per login.
pub trait NetworkSynchronizer: Send + Sync {
    /// Called once per tick with the player's snapshot state
    fn synchronize(&self, view: &PlayerView);
}

/// Sends position and experience updates whenever they differ from what the
/// client was last told
pub struct ProtocolSynchronizer {
    session: Arc<Session>,
    last_transform: Mutex<Option<Transform>>,
    last_experience: Mutex<Option<Experience>>,
}

impl ProtocolSynchronizer {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            last_transform: Mutex::new(None),
            last_experience: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn push(&self, packet: Packet) -> bool {
        match self.session.send(&packet) {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    "Synchronizer for session {} dropped {}: {}",
                    self.session.id(),
                    packet.name(),
                    e
                );
                false
            }
        }
    }
}

impl NetworkSynchronizer for ProtocolSynchronizer {
    fn synchronize(&self, view: &PlayerView) {
        {
            let mut last = self.last_transform.lock();
            if *last != Some(view.transform)
                && self.push(Packet::PositionLook(view.transform.to_message()))
            {
                *last = Some(view.transform);
            }
        }

        let mut last = self.last_experience.lock();
        if *last != Some(view.experience)
            && self.push(Packet::Experience(view.experience.to_message()))
        {
            *last = Some(view.experience);
        }
    }
}
