//! Session handle: the datastore that owns a session record
//!
//! Teardown runs once, either from an explicit stop or from the channel's
//! hangup. It clears the record under the handle lock, so it waits for any
//! join callback that is currently reading the record, and then signals the
//! destruction condition for anyone who needs to confirm the release.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::record::SessionRecord;
use crate::host::{BridgeEventSource, Datastore, HookToken};

/// Datastore type under which handles are attached to channels
pub const DATASTORE_TYPE: &str = "bridgemon";

/// A registered join hook, released on teardown.
///
/// Holds the source weakly: the handle lives on a channel the source owns.
pub struct HookRegistration {
    source: Weak<dyn BridgeEventSource>,
    token: HookToken,
}

impl HookRegistration {
    pub fn new(source: Weak<dyn BridgeEventSource>, token: HookToken) -> Self {
        Self { source, token }
    }

    fn release(self) {
        let Some(source) = self.source.upgrade() else {
            debug!("Source of join {} is gone", self.token);
            return;
        };
        if !source.unregister_join_hook(self.token) {
            debug!("Join {} was already gone", self.token);
        }
    }
}

struct HandleState {
    record: Option<SessionRecord>,
    destruction_ok: bool,
    hook: Option<HookRegistration>,
}

pub struct SessionHandle {
    session_id: String,
    channel_name: String,
    state: Mutex<HandleState>,
    destruction: Condvar,
}

impl SessionHandle {
    pub fn new(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id().to_string(),
            channel_name: record.monitored_name().to_string(),
            state: Mutex::new(HandleState {
                record: Some(record),
                destruction_ok: false,
                hook: None,
            }),
            destruction: Condvar::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Recover a handle from a channel datastore
    pub fn from_datastore(data: Arc<dyn Datastore>) -> Option<Arc<Self>> {
        data.as_any().downcast::<Self>().ok()
    }

    /// Run `f` with the record while holding the handle lock.
    /// Returns `None` once teardown has cleared the record.
    pub fn with_record<R>(&self, f: impl FnOnce(&SessionRecord) -> R) -> Option<R> {
        let state = self.state.lock();
        state.record.as_ref().map(f)
    }

    /// Mark the record inactive. Returns whether it was active.
    pub fn deactivate(&self) -> bool {
        self.with_record(SessionRecord::deactivate).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.with_record(SessionRecord::is_active).unwrap_or(false)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destruction_ok
    }

    /// Keep the join hook registration so teardown can release it.
    ///
    /// If teardown already happened the registration is released at once.
    pub fn attach_hook(&self, registration: HookRegistration) {
        let leftover = {
            let mut state = self.state.lock();
            if state.destruction_ok {
                Some(registration)
            } else {
                state.hook = Some(registration);
                None
            }
        };
        if let Some(registration) = leftover {
            debug!(
                "Session {} on {} torn down before its hook was stored",
                self.session_id, self.channel_name
            );
            registration.release();
        }
    }

    /// Clear the record, signal destruction and release the join hook.
    pub fn teardown(&self) {
        let registration = {
            let mut state = self.state.lock();
            if state.destruction_ok {
                debug!("Session {} on {} already torn down", self.session_id, self.channel_name);
                return;
            }
            state.record = None;
            state.destruction_ok = true;
            self.destruction.notify_all();
            state.hook.take()
        };

        if let Some(registration) = registration {
            registration.release();
        }
        debug!("Tore down session {} on {}", self.session_id, self.channel_name);
    }

    /// Wait until teardown has run. Returns false on timeout.
    pub fn wait_destroyed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.destruction_ok {
            if self.destruction.wait_until(&mut state, deadline).timed_out() {
                return state.destruction_ok;
            }
        }
        true
    }
}

impl Datastore for SessionHandle {
    fn destroy(&self) {
        self.teardown();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
