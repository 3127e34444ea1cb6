//! Lock types used across the workspace.
//!
//! These never poison and never need an async context, so they are safe to take
//! from external event callbacks as well as from inside `poll_*` methods. Guards
//! must not be held across an `.await`.

/// Mutual exclusion lock guarding connection state.
pub type Mutex<T> = parking_lot::Mutex<T>;

/// Guard returned by [`Mutex::lock`].
pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// Reader-writer lock for data that is read far more often than replaced.
pub type RwLock<T> = parking_lot::RwLock<T>;

pub type RwLockReadGuard<'a, T> = parking_lot::RwLockReadGuard<'a, T>;

pub type RwLockWriteGuard<'a, T> = parking_lot::RwLockWriteGuard<'a, T>;
