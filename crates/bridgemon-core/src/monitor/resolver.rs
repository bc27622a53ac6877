//! Peer-join resolution
//!
//! Two notifications fire when a two-party bridge forms, one per participant,
//! in no particular order. Only the one that observes the pair fully formed
//! finds a peer:
//!
//! - the monitored channel joins a bridge that already holds its peer
//!   ([`JoinCase::MonitoredJoined`]), or
//! - the peer joins a bridge that already holds the monitored channel
//!   ([`JoinCase::PeerJoined`]).
//!
//! Peers only exist in two-party bridges, so joins into larger bridges leave
//! the previously recorded peer id alone.

use std::sync::Arc;

use tracing::debug;

use super::record::SessionRecord;
use super::vars;
use crate::config::BridgeMonConfig;
use crate::host::{Channel, JoinNotification, VariableStore};

/// Which side of the pairing the notification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCase {
    MonitoredJoined,
    PeerJoined,
}

/// Outcome of one join notification for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The peer was identified and recorded on the monitored channel
    Peer {
        case: JoinCase,
        peer_id: String,
        peer_name: String,
    },
    /// The monitored channel joined first; the peer's join will resolve it
    AwaitingPeer,
    /// The join does not pair anything with the monitored channel
    Unrelated,
    /// The session is stopped or its channel is gone
    Inactive,
}

impl Resolution {
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            Resolution::Peer { peer_id, .. } => Some(peer_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerJoinResolver {
    peer_id_key: String,
    diagnostics: bool,
}

impl PeerJoinResolver {
    pub fn new(peer_id_key: impl Into<String>, diagnostics: bool) -> Self {
        Self {
            peer_id_key: peer_id_key.into(),
            diagnostics,
        }
    }

    pub fn from_config(config: &BridgeMonConfig) -> Self {
        Self::new(config.variables.peer_id.clone(), config.diagnostics)
    }

    pub fn peer_id_key(&self) -> &str {
        &self.peer_id_key
    }

    /// Decide what `notification` means for `monitored`. Writes nothing.
    pub fn resolve(&self, monitored: &Arc<Channel>, notification: &JoinNotification) -> Resolution {
        let joining = notification.joining_endpoint();

        if Arc::ptr_eq(joining, monitored) {
            return match notification.peer_lookup() {
                Some(peer) => Resolution::Peer {
                    case: JoinCase::MonitoredJoined,
                    peer_id: peer.unique_id().to_string(),
                    peer_name: peer.name().to_string(),
                },
                None => Resolution::AwaitingPeer,
            };
        }

        match notification.peer_lookup() {
            Some(peer) if Arc::ptr_eq(peer, monitored) => Resolution::Peer {
                case: JoinCase::PeerJoined,
                peer_id: joining.unique_id().to_string(),
                peer_name: joining.name().to_string(),
            },
            _ => Resolution::Unrelated,
        }
    }

    /// Write the outcome to the monitored channel's variables in one batch
    pub fn apply(&self, monitored: &Channel, notification: &JoinNotification, resolution: &Resolution) {
        let monitored_joined = std::ptr::eq(Arc::as_ptr(notification.joining_endpoint()), monitored);

        match resolution {
            Resolution::Peer { peer_id, peer_name, .. } => {
                let mut pairs = vec![(self.peer_id_key.as_str(), peer_id.as_str())];
                if self.diagnostics {
                    if monitored_joined {
                        pairs.push((vars::HOOK_TRIGGERED, "1"));
                    }
                    pairs.push((vars::PEER_FOUND, "1"));
                    pairs.push((vars::PEER_NAME, peer_name.as_str()));
                    pairs.push((vars::CHANNEL_ID, peer_id.as_str()));
                }
                monitored.set_variables(&pairs);
                debug!(
                    "Set {}={} for monitored channel {}",
                    self.peer_id_key,
                    peer_id,
                    monitored.name()
                );
            }
            Resolution::AwaitingPeer => {
                if self.diagnostics {
                    monitored.set_variable(vars::HOOK_TRIGGERED, "1");
                }
                debug!("{} joined {} first, waiting for its peer", monitored.name(), notification.bridge_id());
            }
            Resolution::Unrelated | Resolution::Inactive => {}
        }
    }

    /// Resolve and apply under the record lock, if the record is active
    pub fn on_join(&self, record: &SessionRecord, notification: &JoinNotification) -> Resolution {
        record
            .while_active(|monitored| {
                let resolution = self.resolve(monitored, notification);
                self.apply(monitored, notification, &resolution);
                resolution
            })
            .unwrap_or(Resolution::Inactive)
    }
}
