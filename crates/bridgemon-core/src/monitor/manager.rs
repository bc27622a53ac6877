//! Session manager: start and stop monitoring on a channel

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::handle::{HookRegistration, SessionHandle, DATASTORE_TYPE};
use super::hook::BridgeHook;
use super::record::SessionRecord;
use super::resolver::PeerJoinResolver;
use super::vars;
use crate::config::BridgeMonConfig;
use crate::errors::{BridgeMonError, Result};
use crate::host::{AttachError, BridgeEventSource, Channel, Datastore, VariableStore};

/// Starts and stops monitoring sessions.
///
/// Sessions are keyed by id within their channel; the id defaults to the
/// channel's unique id. All session state lives on the channel itself.
pub struct SessionManager {
    events: Arc<dyn BridgeEventSource>,
    resolver: Arc<PeerJoinResolver>,
    diagnostics: bool,
    teardown_timeout: Duration,
}

impl SessionManager {
    pub fn new(events: Arc<dyn BridgeEventSource>, config: &BridgeMonConfig) -> Self {
        Self {
            events,
            resolver: Arc::new(PeerJoinResolver::from_config(config)),
            diagnostics: config.diagnostics,
            teardown_timeout: config.teardown_timeout(),
        }
    }

    pub fn resolver(&self) -> &PeerJoinResolver {
        &self.resolver
    }

    /// Start monitoring `channel` under `session_id`.
    ///
    /// Fails with `AlreadyMonitoring` if the id is taken on this channel and
    /// with `Resource` if the session cannot be attached or hooked. Nothing
    /// stays attached on failure.
    pub fn start(&self, channel: &Arc<Channel>, session_id: Option<&str>) -> Result<()> {
        let session_id = session_id_for(channel, session_id)?;
        debug!("Starting bridge monitoring for {} (ID: {})", channel.name(), session_id);

        let handle = Arc::new(SessionHandle::new(SessionRecord::new(channel, session_id.as_str())));
        let datastore: Arc<dyn Datastore> = handle.clone();

        channel
            .attach_datastore(DATASTORE_TYPE, &session_id, Arc::clone(&datastore))
            .map_err(|e| match e {
                AttachError::Duplicate => BridgeMonError::AlreadyMonitoring {
                    channel: channel.name().to_string(),
                    session_id: session_id.clone(),
                },
                AttachError::HungUp => BridgeMonError::resource(format!(
                    "cannot attach session {} to {}: channel hung up",
                    session_id,
                    channel.name()
                )),
            })?;

        if self.diagnostics {
            channel.set_variable(vars::MONITORING_STARTED, "1");
        }

        let hook = Arc::new(BridgeHook::new(Arc::downgrade(&handle), Arc::clone(&self.resolver)));
        match self.events.register_join_hook(channel, hook) {
            Ok(token) => {
                handle.attach_hook(HookRegistration::new(Arc::downgrade(&self.events), token));
            }
            Err(e) => {
                channel.detach_datastore(&datastore);
                return Err(BridgeMonError::resource(format!(
                    "Couldn't add bridge join hook for channel '{}': {}",
                    channel.name(),
                    e
                )));
            }
        }

        if self.diagnostics {
            channel.set_variable(vars::HOOK_ADDED, "1");
        }
        info!("Started monitoring bridge events for channel {} (ID: {})", channel.name(), session_id);
        Ok(())
    }

    /// Stop the session `session_id` on `channel`.
    ///
    /// Once this returns no join callback will write for the session.
    pub fn stop(&self, channel: &Arc<Channel>, session_id: Option<&str>) -> Result<()> {
        let session_id = session_id_for(channel, session_id)?;

        let Some((datastore, handle)) = self.find(channel, &session_id) else {
            return Err(BridgeMonError::not_found(format!(
                "No bridge monitoring found for channel {} (ID: {})",
                channel.name(),
                session_id
            )));
        };

        handle.deactivate();

        if !channel.detach_datastore(&datastore) {
            // The channel hung up between the lookup and the detach; its
            // teardown is running on the hangup path.
            if !handle.wait_destroyed(self.teardown_timeout) {
                warn!(
                    "Session {} on {} not torn down within {:?}",
                    session_id,
                    channel.name(),
                    self.teardown_timeout
                );
            }
        }

        info!("Stopped monitoring bridge events for channel {} (ID: {})", channel.name(), session_id);
        Ok(())
    }

    /// Whether `channel` has a live session under `session_id`
    pub fn is_monitoring(&self, channel: &Arc<Channel>, session_id: Option<&str>) -> bool {
        let Ok(session_id) = session_id_for(channel, session_id) else {
            return false;
        };
        self.find(channel, &session_id)
            .map(|(_, handle)| handle.is_active())
            .unwrap_or(false)
    }

    /// Ids of every session attached to `channel`
    pub fn sessions(&self, channel: &Channel) -> Vec<String> {
        channel.datastore_uids(DATASTORE_TYPE)
    }

    fn find(&self, channel: &Channel, session_id: &str) -> Option<(Arc<dyn Datastore>, Arc<SessionHandle>)> {
        let datastore = channel.find_datastore(DATASTORE_TYPE, session_id)?;
        let handle = SessionHandle::from_datastore(Arc::clone(&datastore))?;
        Some((datastore, handle))
    }
}

fn session_id_for(channel: &Channel, session_id: Option<&str>) -> Result<String> {
    match session_id {
        None => Ok(channel.unique_id().to_string()),
        Some(id) if id.trim().is_empty() => Err(BridgeMonError::invalid_argument("session id must not be empty")),
        Some(id) => Ok(id.to_string()),
    }
}
