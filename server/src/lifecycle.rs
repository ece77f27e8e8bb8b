//! Online/offline state machine for one player entity
//!
//! ```text
//!            connect (CAS false -> true)
//!   Offline ----------------------------> Online
//!      ^                                    |
//!      +------------------------------------+
//!            disconnect (CAS true -> false)
//! ```
//!
//! The online flag's compare-and-set decides which of several racing
//! callers performs a transition. The winner commits the flag, session and
//! synchronizer together on the live side; simulation code sees the result
//! after the tick loop's next [`SessionLifecycle::copy_to_snapshot`].

use crate::dual_state::DualStateCell;
use crate::error::SessionError;
use crate::session::Session;
use crate::synchronizer::NetworkSynchronizer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub type SharedSynchronizer = Arc<dyn NetworkSynchronizer>;

pub struct SessionLifecycle {
    online: DualStateCell<bool>,
    session: DualStateCell<Option<Arc<Session>>>,
    synchronizer: DualStateCell<Option<SharedSynchronizer>>,
    // Held while a transition writes its fields and while they are copied,
    // so a snapshot never mixes two transitions.
    commit: Mutex<()>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            online: DualStateCell::new(false),
            session: DualStateCell::new(None),
            synchronizer: DualStateCell::new(None),
            commit: Mutex::new(()),
        }
    }

    /// Moves Offline -> Online with `session` as the active connection
    ///
    /// Returns false, changing nothing, if the entity is already online.
    pub fn connect(&self, session: Arc<Session>) -> bool {
        let _commit = self.commit.lock();
        if !self.online.compare_and_set_live(&false, true) {
            return false;
        }
        self.session.set_live(Some(session));
        true
    }

    /// Moves Online -> Offline, dropping the session and synchronizer
    ///
    /// Returns false, changing nothing, if the entity is already offline.
    pub fn disconnect(&self) -> bool {
        let _commit = self.commit.lock();
        if !self.online.compare_and_set_live(&true, false) {
            return false;
        }
        self.session.set_live(None);
        self.synchronizer.set_live(None);
        true
    }

    /// Binds the synchronizer for the current login
    ///
    /// `None` while offline clears the slot. Anything else only succeeds if
    /// the slot is empty; rebinding a bound slot is a
    /// [`SessionError::SynchronizerAlreadyBound`] fault.
    pub fn bind_synchronizer(
        &self,
        synchronizer: Option<SharedSynchronizer>,
    ) -> Result<(), SessionError> {
        if synchronizer.is_none() && !self.online.live() {
            self.synchronizer.set_live(None);
            return Ok(());
        }

        if self.synchronizer.compare_and_set_live(&None, synchronizer) {
            Ok(())
        } else {
            Err(SessionError::SynchronizerAlreadyBound)
        }
    }

    /// Online flag as of the last tick
    pub fn is_online(&self) -> bool {
        self.online.snapshot()
    }

    pub fn is_online_live(&self) -> bool {
        self.online.live()
    }

    /// Session as of the last tick
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.snapshot()
    }

    pub fn live_session(&self) -> Option<Arc<Session>> {
        self.session.live()
    }

    /// Snapshot session, or the live one before the first tick after login
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.session().or_else(|| self.live_session())
    }

    /// Snapshot synchronizer, or the live one before the first tick after
    /// it was bound
    pub fn current_synchronizer(&self) -> Option<SharedSynchronizer> {
        self.synchronizer
            .snapshot()
            .or_else(|| self.synchronizer.live())
    }

    /// Publishes online flag, session and synchronizer. Tick loop only.
    pub fn copy_to_snapshot(&self) {
        let _commit = self.commit.lock();
        self.session.copy_to_snapshot();
        self.online.copy_to_snapshot();
        self.synchronizer.copy_to_snapshot();
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("online", &self.online)
            .field("session", &self.session)
            .field("synchronizer_bound", &self.synchronizer.live().is_some())
            .finish()
    }
}
