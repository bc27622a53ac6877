//! Join hook adapter between the bridge event source and the resolver

use std::sync::{Arc, Weak};

use tracing::debug;

use super::handle::SessionHandle;
use super::resolver::{PeerJoinResolver, Resolution};
use crate::host::{JoinHook, JoinNotification};

/// Join hook registered once per session.
///
/// Holds the handle weakly: the channel's datastore list owns it. Calls that
/// arrive after the handle is gone, after teardown cleared the record, or
/// after the record went inactive do nothing.
pub struct BridgeHook {
    handle: Weak<SessionHandle>,
    resolver: Arc<PeerJoinResolver>,
}

impl BridgeHook {
    pub fn new(handle: Weak<SessionHandle>, resolver: Arc<PeerJoinResolver>) -> Self {
        Self { handle, resolver }
    }

    /// Handle one notification and report what happened
    pub fn handle_join(&self, notification: &JoinNotification) -> Resolution {
        let Some(handle) = self.handle.upgrade() else {
            return Resolution::Inactive;
        };
        handle
            .with_record(|record| self.resolver.on_join(record, notification))
            .unwrap_or(Resolution::Inactive)
    }
}

impl JoinHook for BridgeHook {
    fn on_join(&self, notification: &JoinNotification) {
        let resolution = self.handle_join(notification);
        debug!(
            "Join of {} into {}: {:?}",
            notification.joining_endpoint().name(),
            notification.bridge_id(),
            resolution
        );
    }
}
