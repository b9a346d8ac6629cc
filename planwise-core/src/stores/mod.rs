//! Client-side stores
//!
//! Each store owns one slice of application state behind a
//! [`std::sync::Mutex`] and talks to the backend through the shared
//! [`Gateway`](crate::api::Gateway). Guards are never held across an
//! `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod alarms;
pub mod entity;
pub mod goals;
pub mod mutation;
pub mod profile;
pub mod projects;
pub mod routines;
pub mod tasks;
pub mod timers;

#[cfg(test)]
pub(crate) mod test_support;

pub use alarms::AlarmStore;
pub use entity::{derive_view, Entity, EntityState, EntityStore, FilterState, PageInfo, SortKey, SortOrder};
pub use goals::GoalStore;
pub use mutation::{Pending, RollbackPolicy, Snapshot};
pub use profile::{PasswordChange, ProfileStore};
pub use projects::ProjectStore;
pub use routines::RoutineStore;
pub use tasks::TaskStore;
pub use timers::{TimerEvent, TimerStore};

/// Lock a store mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
