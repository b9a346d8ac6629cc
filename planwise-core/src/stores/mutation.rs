//! Snapshot, mutate, try remote, then roll back or keep.
//!
//! Optimistic operations apply a local change before the backend has
//! confirmed it. What happens when the backend then refuses depends on the
//! caller's [`RollbackPolicy`]:
//!
//! - [`RollbackPolicy::Restore`] puts the saved snapshot back (entity reorder)
//! - [`RollbackPolicy::KeepLocal`] logs and keeps the local change (timers,
//!   whose local state is authoritative)

use std::future::Future;
use std::sync::Mutex;

use crate::error::Result;

use super::lock;

/// State that can save and restore the part an optimistic change touches
pub trait Snapshot {
    type Saved: Send;

    fn save(&self) -> Self::Saved;
    fn restore(&mut self, saved: Self::Saved);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
    Restore,
    KeepLocal,
}

/// A local change waiting for its remote confirmation
#[must_use = "settle the pending mutation with the remote result"]
pub struct Pending<S: Snapshot> {
    saved: Option<S::Saved>,
    label: String,
}

/// Apply `mutate` to the state in `cell`, saving a snapshot first when the
/// policy may need it.
pub fn begin<S: Snapshot>(
    cell: &Mutex<S>,
    policy: RollbackPolicy,
    label: impl Into<String>,
    mutate: impl FnOnce(&mut S),
) -> Pending<S> {
    let mut state = lock(cell);
    let saved = match policy {
        RollbackPolicy::Restore => Some(state.save()),
        RollbackPolicy::KeepLocal => None,
    };
    mutate(&mut state);
    Pending {
        saved,
        label: label.into(),
    }
}

impl<S: Snapshot> Pending<S> {
    /// Resolve with the remote outcome, restoring the snapshot on failure
    /// under [`RollbackPolicy::Restore`]. The result is passed through.
    pub fn settle<T>(self, cell: &Mutex<S>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            match self.saved {
                Some(saved) => {
                    lock(cell).restore(saved);
                    tracing::warn!(
                        operation = %self.label,
                        error = %e,
                        "Remote update failed; local change rolled back"
                    );
                }
                None => {
                    tracing::warn!(
                        operation = %self.label,
                        error = %e,
                        "Remote update failed; keeping local change"
                    );
                }
            }
        }
        result
    }
}

/// [`begin`], await `remote`, then [`Pending::settle`]
pub async fn run<S, T, F>(
    cell: &Mutex<S>,
    policy: RollbackPolicy,
    label: impl Into<String>,
    mutate: impl FnOnce(&mut S),
    remote: F,
) -> Result<T>
where
    S: Snapshot,
    F: Future<Output = Result<T>>,
{
    let pending = begin(cell, policy, label, mutate);
    let result = remote.await;
    pending.settle(cell, result)
}
