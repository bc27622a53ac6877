//! Channels: named endpoints with variables and attached datastores

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::bridge::{Bridge, JoinNotification};
use super::VariableStore;

/// Object attached to a channel and destroyed with it.
///
/// `destroy` is called exactly once by the channel: when the datastore is
/// detached or when the channel hangs up, whichever comes first. It is never
/// called while the channel lock is held.
pub trait Datastore: Send + Sync + 'static {
    fn destroy(&self);

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Why a datastore could not be attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// The channel has already hung up
    HungUp,
    /// A datastore with the same type and uid is already attached
    Duplicate,
}

/// Why a channel could not enter a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinError {
    HungUp,
    BridgeClosed,
}

struct DatastoreEntry {
    kind: &'static str,
    uid: String,
    data: Arc<dyn Datastore>,
}

#[derive(Default)]
struct ChannelState {
    variables: HashMap<String, String>,
    datastores: Vec<DatastoreEntry>,
    /// Bridge the channel is in; changed only together with `hung_up`
    bridge: Option<Arc<Bridge>>,
    hung_up: bool,
}

/// A single communicating party
pub struct Channel {
    name: String,
    unique_id: String,
    /// Guards variables, datastores and bridge membership
    state: Mutex<ChannelState>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("unique_id", &self.unique_id)
            .finish()
    }
}

fn same_datastore(a: &Arc<dyn Datastore>, b: &Arc<dyn Datastore>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Channel {
    pub fn new(name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_id: unique_id.into(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn is_hung_up(&self) -> bool {
        self.state.lock().hung_up
    }

    /// Id of the bridge the channel is currently in
    pub fn bridge_id(&self) -> Option<String> {
        self.state.lock().bridge.as_ref().map(|b| b.id().to_string())
    }

    /// Move into `bridge` and out of the current one. A refused join leaves
    /// the channel where it was.
    ///
    /// Membership changes happen under the channel lock, so a concurrent
    /// hangup either sees the channel bridged and removes it, or wins and the
    /// join is refused.
    pub(crate) fn enter_bridge(self: &Arc<Self>, bridge: &Arc<Bridge>) -> Result<JoinNotification, JoinError> {
        let mut state = self.state.lock();
        if state.hung_up {
            return Err(JoinError::HungUp);
        }
        let notification = bridge.add(self).ok_or(JoinError::BridgeClosed)?;
        if let Some(previous) = state.bridge.replace(Arc::clone(bridge)) {
            if !Arc::ptr_eq(&previous, bridge) {
                previous.remove(self);
            }
        }
        Ok(notification)
    }

    /// Leave the current bridge. Returns false if the channel was not bridged.
    pub(crate) fn leave_bridge(&self) -> bool {
        let previous = self.state.lock().bridge.take();
        match previous {
            Some(bridge) => bridge.remove(self),
            None => false,
        }
    }

    /// Forget `bridge` after it was closed, unless the channel already moved on
    pub(crate) fn clear_bridge(&self, bridge: &Bridge) -> bool {
        let mut state = self.state.lock();
        match &state.bridge {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), bridge) => {
                state.bridge = None;
                true
            }
            _ => false,
        }
    }

    /// Attach a datastore under `(kind, uid)`
    pub fn attach_datastore(
        &self,
        kind: &'static str,
        uid: &str,
        data: Arc<dyn Datastore>,
    ) -> Result<(), AttachError> {
        let mut state = self.state.lock();
        if state.hung_up {
            return Err(AttachError::HungUp);
        }
        if state.datastores.iter().any(|d| d.kind == kind && d.uid == uid) {
            return Err(AttachError::Duplicate);
        }
        state.datastores.push(DatastoreEntry {
            kind,
            uid: uid.to_string(),
            data,
        });
        Ok(())
    }

    pub fn find_datastore(&self, kind: &str, uid: &str) -> Option<Arc<dyn Datastore>> {
        let state = self.state.lock();
        state
            .datastores
            .iter()
            .find(|d| d.kind == kind && d.uid == uid)
            .map(|d| Arc::clone(&d.data))
    }

    /// Uids of every attached datastore of `kind`, in attach order
    pub fn datastore_uids(&self, kind: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .datastores
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.uid.clone())
            .collect()
    }

    /// Detach this exact datastore instance and destroy it.
    ///
    /// Returns false if it was no longer attached, in which case whoever
    /// detached it is responsible for the destroy.
    pub fn detach_datastore(&self, data: &Arc<dyn Datastore>) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let position = state.datastores.iter().position(|d| same_datastore(&d.data, data));
            position.map(|index| state.datastores.remove(index))
        };

        match removed {
            Some(entry) => {
                debug!("Detached {} datastore {} from {}", entry.kind, entry.uid, self.name);
                entry.data.destroy();
                true
            }
            None => false,
        }
    }

    /// Mark the channel hung up, take it out of its bridge and destroy every
    /// attached datastore.
    ///
    /// Returns false if the channel was already hung up.
    pub(crate) fn hangup(&self) -> bool {
        let datastores = {
            let mut state = self.state.lock();
            if state.hung_up {
                return false;
            }
            state.hung_up = true;
            if let Some(bridge) = state.bridge.take() {
                bridge.remove(self);
            }
            std::mem::take(&mut state.datastores)
        };

        for entry in datastores {
            debug!("Destroying {} datastore {} on hangup of {}", entry.kind, entry.uid, self.name);
            entry.data.destroy();
        }
        true
    }

    /// Snapshot of all variables
    pub fn variables(&self) -> HashMap<String, String> {
        self.state.lock().variables.clone()
    }
}

impl VariableStore for Channel {
    fn set_variable(&self, key: &str, value: &str) {
        self.set_variables(&[(key, value)]);
    }

    fn set_variables(&self, pairs: &[(&str, &str)]) {
        let mut state = self.state.lock();
        for (key, value) in pairs {
            state.variables.insert((*key).to_string(), (*value).to_string());
        }
    }

    fn variable(&self, key: &str) -> Option<String> {
        self.state.lock().variables.get(key).cloned()
    }
}
