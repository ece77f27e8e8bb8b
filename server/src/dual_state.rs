//! Live/snapshot storage shared between network tasks and the tick loop
//!
//! A [`DualStateCell`] holds two copies of a value:
//!
//! - the **live** value, written at any time from any thread through
//!   [`DualStateCell::set_live`] or [`DualStateCell::compare_and_set_live`]
//! - the **snapshot** value, replaced only by [`DualStateCell::copy_to_snapshot`]
//!
//! The tick loop is the single owner of `copy_to_snapshot` and calls it once
//! per tick before running simulation logic. Simulation logic reads only the
//! snapshot, so every field it looks at is consistent as of the same tick
//! boundary no matter how many writes land in between. Nothing stops another
//! caller from copying; keeping the copy on the tick loop is the caller's job.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// Equality used by [`DualStateCell::compare_and_set_live`]
///
/// Plain values compare by value. Shared handles compare by identity, so a
/// transition guarded on "this exact session" cannot be satisfied by a
/// different session that merely looks the same.
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

impl SameValue for bool {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl SameValue for u32 {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl<T: ?Sized> SameValue for Option<Arc<T>> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

pub struct DualStateCell<T> {
    live: Mutex<T>,
    snapshot: RwLock<T>,
}

impl<T: Clone> DualStateCell<T> {
    /// Creates a cell whose live and snapshot values both start at `initial`
    pub fn new(initial: T) -> Self {
        Self {
            live: Mutex::new(initial.clone()),
            snapshot: RwLock::new(initial),
        }
    }

    /// Unconditionally replaces the live value
    pub fn set_live(&self, value: T) {
        *self.live.lock() = value;
    }

    /// Current live value
    ///
    /// Meant for network-side bookkeeping. Simulation logic reads
    /// [`DualStateCell::snapshot`] instead.
    pub fn live(&self) -> T {
        self.live.lock().clone()
    }

    /// Applies `update` to the live value in place
    pub fn update_live<F>(&self, update: F)
    where
        F: FnOnce(&mut T),
    {
        let mut live = self.live.lock();
        update(&mut *live);
    }

    /// Publishes the current live value as the snapshot
    pub fn copy_to_snapshot(&self) {
        let value = self.live();
        *self.snapshot.write() = value;
    }

    /// Value as of the most recent [`DualStateCell::copy_to_snapshot`]
    pub fn snapshot(&self) -> T {
        self.snapshot.read().clone()
    }
}

impl<T: Clone + SameValue> DualStateCell<T> {
    /// Replaces the live value with `value` only if it currently equals
    /// `expected`; returns whether the swap happened
    ///
    /// Of several threads racing to make the same transition, exactly one
    /// observes `true`.
    pub fn compare_and_set_live(&self, expected: &T, value: T) -> bool {
        let mut live = self.live.lock();
        if live.same_value(expected) {
            *live = value;
            true
        } else {
            false
        }
    }
}

impl<T: Clone + Default> Default for DualStateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for DualStateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualStateCell")
            .field("live", &*self.live.lock())
            .field("snapshot", &*self.snapshot.read())
            .finish()
    }
}
