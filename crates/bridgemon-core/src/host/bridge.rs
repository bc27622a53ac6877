//! Bridges and join notifications

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::channel::Channel;

/// A set of channels sharing a transport, in join order
pub struct Bridge {
    id: String,
    state: Mutex<BridgeState>,
}

#[derive(Default)]
struct BridgeState {
    members: Vec<Arc<Channel>>,
    /// Set once the bridge is destroyed; no further joins are accepted
    closed: bool,
}

impl Bridge {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(BridgeState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn members(&self) -> Vec<Arc<Channel>> {
        self.state.lock().members.clone()
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_member(&self, channel: &Channel) -> bool {
        self.state
            .lock()
            .members
            .iter()
            .any(|m| std::ptr::eq(Arc::as_ptr(m), channel))
    }

    /// Add `channel` and build the notification for that join.
    ///
    /// The membership snapshot is taken under the same lock as the insert, so
    /// concurrent joins into one bridge observe distinct snapshots. Returns
    /// `None` once the bridge is closed.
    pub(crate) fn add(&self, channel: &Arc<Channel>) -> Option<JoinNotification> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        if !state.members.iter().any(|m| Arc::ptr_eq(m, channel)) {
            state.members.push(Arc::clone(channel));
        }
        debug!("Added {} to bridge {}: {} channels", channel.name(), self.id, state.members.len());

        Some(JoinNotification {
            bridge_id: self.id.clone(),
            joining: Arc::clone(channel),
            members: state.members.clone(),
        })
    }

    /// Remove `channel`. Returns false if it was not a member.
    pub(crate) fn remove(&self, channel: &Channel) -> bool {
        let mut state = self.state.lock();
        let before = state.members.len();
        state.members.retain(|m| !std::ptr::eq(Arc::as_ptr(m), channel));
        let removed = state.members.len() != before;
        if removed {
            debug!("Removed {} from bridge {}: {} channels", channel.name(), self.id, state.members.len());
        }
        removed
    }

    /// Refuse further joins and hand back the members
    pub(crate) fn close(&self) -> Vec<Arc<Channel>> {
        let mut state = self.state.lock();
        state.closed = true;
        std::mem::take(&mut state.members)
    }
}

/// Delivered to join hooks whenever a channel enters a bridge
#[derive(Debug, Clone)]
pub struct JoinNotification {
    bridge_id: String,
    joining: Arc<Channel>,
    /// Membership right after the join, in join order
    members: Vec<Arc<Channel>>,
}

impl JoinNotification {
    pub fn new(bridge_id: impl Into<String>, joining: Arc<Channel>, members: Vec<Arc<Channel>>) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            joining,
            members,
        }
    }

    pub fn bridge_id(&self) -> &str {
        &self.bridge_id
    }

    pub fn joining_endpoint(&self) -> &Arc<Channel> {
        &self.joining
    }

    pub fn members(&self) -> &[Arc<Channel>] {
        &self.members
    }

    /// The other channel in the bridge, from the joining channel's side
    pub fn peer_lookup(&self) -> Option<&Arc<Channel>> {
        self.peer_of(&self.joining)
    }

    /// The other channel in the bridge from `channel`'s side.
    ///
    /// Peers only exist in two-party bridges: with any other member count,
    /// or when `channel` is not a member, there is no peer.
    pub fn peer_of(&self, channel: &Arc<Channel>) -> Option<&Arc<Channel>> {
        if self.members.len() != 2 || !self.members.iter().any(|m| Arc::ptr_eq(m, channel)) {
            return None;
        }
        self.members.iter().find(|m| !Arc::ptr_eq(m, channel))
    }
}
