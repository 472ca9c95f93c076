//! Per-call credentials
//!
//! A credential is in effect either for one [`crate::Request`] or for the
//! lifetime of a [`CredentialGuard`]. Guards are per thread: an override set
//! on one thread is never seen by requests issued from another, and the
//! previous credential comes back when the guard drops, on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// Elevated or per-user credential
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Per-user session token (`X-Parse-Session-Token`)
    Session(String),
    /// Master key (`X-Parse-Master-Key`)
    Master(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Session(_) => f.write_str("Credential::Session(..)"),
            Credential::Master(_) => f.write_str("Credential::Master(..)"),
        }
    }
}

/// Scoped overrides, one slot per thread
#[derive(Default)]
pub(crate) struct ScopedCredentials {
    slots: Mutex<HashMap<ThreadId, Credential>>,
}

impl ScopedCredentials {
    pub(crate) fn current(&self) -> Option<Credential> {
        self.slots.lock().get(&thread::current().id()).cloned()
    }

    pub(crate) fn enter(&self, credential: Credential) -> CredentialGuard<'_> {
        let thread = thread::current().id();
        let previous = self.slots.lock().insert(thread, credential);
        CredentialGuard {
            scope: self,
            thread,
            previous,
        }
    }
}

/// Restores the previous credential when dropped
#[must_use = "the credential is only in effect while the guard is alive"]
pub struct CredentialGuard<'a> {
    scope: &'a ScopedCredentials,
    thread: ThreadId,
    previous: Option<Credential>,
}

impl Drop for CredentialGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.scope.slots.lock();
        match self.previous.take() {
            Some(previous) => {
                slots.insert(self.thread, previous);
            }
            None => {
                slots.remove(&self.thread);
            }
        }
    }
}
