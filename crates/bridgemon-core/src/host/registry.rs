//! In-memory host: channel directory, bridges and join hook dispatch

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::bridge::{Bridge, JoinNotification};
use super::channel::{Channel, JoinError};
use super::{BridgeEventSource, EndpointDirectory, HookToken, JoinHook};
use crate::errors::{BridgeMonError, Result};

struct RegisteredHook {
    token: HookToken,
    hook: Arc<dyn JoinHook>,
}

/// Owns the live channels and bridges, and dispatches join hooks.
///
/// Hooks run on the thread that called [`Host::join_bridge`], after every
/// host lock has been released.
pub struct Host {
    /// Live channels by unique id
    channels: DashMap<String, Arc<Channel>>,
    /// Bridges by id
    bridges: DashMap<String, Arc<Bridge>>,
    /// Channel unique id -> hooks registered for that channel
    hooks: DashMap<String, Vec<RegisteredHook>>,
    /// Hook token -> channel unique id
    hook_owners: DashMap<HookToken, String>,
    next_hook: AtomicU64,
    next_channel: AtomicU64,
    epoch: i64,
}

impl Host {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            bridges: DashMap::new(),
            hooks: DashMap::new(),
            hook_owners: DashMap::new(),
            next_hook: AtomicU64::new(1),
            next_channel: AtomicU64::new(1),
            epoch: Utc::now().timestamp(),
        }
    }

    /// Create a channel with a fresh `<epoch>.<sequence>` unique id
    pub fn create_channel(&self, name: &str) -> Result<Arc<Channel>> {
        if name.trim().is_empty() {
            return Err(BridgeMonError::invalid_argument("channel name must not be empty"));
        }
        if self.channels.iter().any(|c| c.name().eq_ignore_ascii_case(name)) {
            return Err(BridgeMonError::invalid_argument(format!("channel {} already exists", name)));
        }

        let sequence = self.next_channel.fetch_add(1, Ordering::SeqCst);
        let channel = Arc::new(Channel::new(name, format!("{}.{}", self.epoch, sequence)));
        self.channels.insert(channel.unique_id().to_string(), Arc::clone(&channel));
        info!("Created channel {} ({})", channel.name(), channel.unique_id());
        Ok(channel)
    }

    /// Create an empty bridge and return its id
    pub fn create_bridge(&self) -> String {
        let id = format!("bridge-{}", Uuid::new_v4());
        self.bridges.insert(id.clone(), Arc::new(Bridge::new(id.clone())));
        debug!("Created bridge {}", id);
        id
    }

    /// Create an empty bridge with a caller-chosen id
    pub fn create_named_bridge(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(BridgeMonError::invalid_argument("bridge id must not be empty"));
        }
        match self.bridges.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BridgeMonError::invalid_argument(format!(
                "bridge {} already exists",
                id
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(Bridge::new(id)));
                debug!("Created bridge {}", id);
                Ok(())
            }
        }
    }

    pub fn bridge(&self, id: &str) -> Option<Arc<Bridge>> {
        self.bridges.get(id).map(|b| Arc::clone(b.value()))
    }

    /// Id of the bridge `channel` is currently in
    pub fn bridge_of(&self, channel: &Channel) -> Option<String> {
        channel.bridge_id()
    }

    /// All live channels, ordered by name
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        let mut channels: Vec<_> = self.channels.iter().map(|c| Arc::clone(c.value())).collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    /// Put `channel` into a bridge, leaving its current bridge first, and
    /// deliver the join notification to every hook of every member.
    pub fn join_bridge(&self, bridge_id: &str, channel: &Arc<Channel>) -> Result<()> {
        let no_bridge = || BridgeMonError::not_found(format!("No such bridge: {}", bridge_id));
        let bridge = self.bridge(bridge_id).ok_or_else(no_bridge)?;

        let notification = channel.enter_bridge(&bridge).map_err(|e| match e {
            JoinError::HungUp => BridgeMonError::resource(format!("channel {} is hung up", channel.name())),
            JoinError::BridgeClosed => no_bridge(),
        })?;

        self.dispatch(&notification);
        Ok(())
    }

    /// Take `channel` out of its bridge. Returns false if it was not bridged.
    pub fn leave_bridge(&self, channel: &Channel) -> bool {
        channel.leave_bridge()
    }

    /// Remove a bridge, ejecting its members
    pub fn destroy_bridge(&self, bridge_id: &str) -> bool {
        let Some((_, bridge)) = self.bridges.remove(bridge_id) else {
            return false;
        };
        for member in bridge.close() {
            member.clear_bridge(&bridge);
        }
        debug!("Destroyed bridge {}", bridge_id);
        true
    }

    /// Hang up a channel: leave its bridge, destroy its datastores, drop its
    /// hooks and remove it from the directory.
    pub fn hangup(&self, channel: &Channel) -> bool {
        if self.channels.remove(channel.unique_id()).is_none() {
            return false;
        }
        channel.hangup();

        if let Some((_, hooks)) = self.hooks.remove(channel.unique_id()) {
            for registered in hooks {
                self.hook_owners.remove(&registered.token);
            }
        }
        info!("Hung up channel {} ({})", channel.name(), channel.unique_id());
        true
    }

    /// Number of hooks currently registered for `channel`
    pub fn hook_count(&self, channel: &Channel) -> usize {
        self.hooks.get(channel.unique_id()).map(|h| h.len()).unwrap_or(0)
    }

    fn dispatch(&self, notification: &JoinNotification) {
        let hooks: Vec<Arc<dyn JoinHook>> = notification
            .members()
            .iter()
            .filter_map(|member| self.hooks.get(member.unique_id()))
            .flat_map(|registered| {
                registered
                    .iter()
                    .map(|r| Arc::clone(&r.hook))
                    .collect::<Vec<_>>()
            })
            .collect();

        debug!(
            "Dispatching join of {} into {} to {} hooks",
            notification.joining_endpoint().name(),
            notification.bridge_id(),
            hooks.len()
        );
        for hook in hooks {
            hook.on_join(notification);
        }
    }
}

impl Drop for Host {
    /// Channels and bridges refer to each other; close every bridge so
    /// neither outlives the host.
    fn drop(&mut self) {
        for entry in self.bridges.iter() {
            let bridge = entry.value();
            for member in bridge.close() {
                member.clear_bridge(bridge);
            }
        }
    }
}

impl EndpointDirectory for Host {
    fn find_by_name(&self, name: &str) -> Option<Arc<Channel>> {
        if let Some(channel) = self.channels.get(name) {
            return Some(Arc::clone(channel.value()));
        }
        self.channels
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(|c| Arc::clone(c.value()))
    }

    fn find_by_prefix(&self, prefix: &str) -> Option<Arc<Channel>> {
        if prefix.is_empty() {
            return None;
        }
        let prefix = prefix.to_ascii_lowercase();
        self.channels()
            .into_iter()
            .find(|c| c.name().to_ascii_lowercase().starts_with(&prefix))
    }
}

impl BridgeEventSource for Host {
    fn register_join_hook(&self, channel: &Arc<Channel>, hook: Arc<dyn JoinHook>) -> Result<HookToken> {
        if channel.is_hung_up() || !self.channels.contains_key(channel.unique_id()) {
            return Err(BridgeMonError::resource(format!(
                "cannot hook channel {}: not live",
                channel.name()
            )));
        }

        let token = HookToken(self.next_hook.fetch_add(1, Ordering::SeqCst));
        self.hooks
            .entry(channel.unique_id().to_string())
            .or_default()
            .push(RegisteredHook { token, hook });
        self.hook_owners.insert(token, channel.unique_id().to_string());
        debug!("Registered join {} for {}", token, channel.name());
        Ok(token)
    }

    fn unregister_join_hook(&self, token: HookToken) -> bool {
        let Some((_, owner)) = self.hook_owners.remove(&token) else {
            return false;
        };
        if let Some(mut hooks) = self.hooks.get_mut(&owner) {
            hooks.retain(|r| r.token != token);
        }
        debug!("Unregistered join {}", token);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHook {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl JoinHook for RecordingHook {
        fn on_join(&self, notification: &JoinNotification) {
            self.seen.lock().push((
                notification.joining_endpoint().name().to_string(),
                notification.peer_lookup().map(|p| p.name().to_string()),
            ));
        }
    }

    #[test]
    fn test_unique_ids() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let bob = host.create_channel("PJSIP/bob-1").unwrap();
        assert_ne!(alice.unique_id(), bob.unique_id());
        assert!(host.create_channel("pjsip/ALICE-1").is_err());
        assert!(host.create_channel(" ").is_err());
    }

    #[test]
    fn test_directory_lookup() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-00000001").unwrap();
        host.create_channel("PJSIP/bob-00000002").unwrap();

        let by_name = host.find_by_name("pjsip/alice-00000001").unwrap();
        assert!(Arc::ptr_eq(&by_name, &alice));
        let by_id = host.find_by_name(alice.unique_id()).unwrap();
        assert!(Arc::ptr_eq(&by_id, &alice));
        let by_prefix = host.find_by_prefix("PJSIP/al").unwrap();
        assert!(Arc::ptr_eq(&by_prefix, &alice));

        assert!(host.find_by_name("PJSIP/alice").is_none());
        assert!(host.find_by_prefix("SIP/").is_none());
        assert!(host.find_by_prefix("").is_none());
    }

    #[test]
    fn test_hooks_see_joins_of_bridge_members() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let bob = host.create_channel("PJSIP/bob-1").unwrap();
        let hook = Arc::new(RecordingHook::default());
        host.register_join_hook(&alice, hook.clone()).unwrap();

        let bridge = host.create_bridge();
        host.join_bridge(&bridge, &alice).unwrap();
        host.join_bridge(&bridge, &bob).unwrap();

        let seen = hook.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                ("PJSIP/alice-1".to_string(), None),
                ("PJSIP/bob-1".to_string(), Some("PJSIP/alice-1".to_string())),
            ]
        );
    }

    #[test]
    fn test_hook_not_called_for_other_bridges() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let bob = host.create_channel("PJSIP/bob-1").unwrap();
        let hook = Arc::new(RecordingHook::default());
        host.register_join_hook(&alice, hook.clone()).unwrap();

        let bridge = host.create_bridge();
        host.join_bridge(&bridge, &bob).unwrap();
        assert!(hook.seen.lock().is_empty());
    }

    #[test]
    fn test_unregister() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let hook = Arc::new(RecordingHook::default());
        let token = host.register_join_hook(&alice, hook.clone()).unwrap();
        assert_eq!(host.hook_count(&alice), 1);

        assert!(host.unregister_join_hook(token));
        assert!(!host.unregister_join_hook(token));
        assert_eq!(host.hook_count(&alice), 0);

        let bridge = host.create_bridge();
        host.join_bridge(&bridge, &alice).unwrap();
        assert!(hook.seen.lock().is_empty());
    }

    #[test]
    fn test_join_moves_between_bridges() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let first = host.create_bridge();
        let second = host.create_bridge();

        host.join_bridge(&first, &alice).unwrap();
        host.join_bridge(&second, &alice).unwrap();
        assert_eq!(host.bridge(&first).unwrap().member_count(), 0);
        assert_eq!(host.bridge(&second).unwrap().member_count(), 1);
        assert_eq!(host.bridge_of(&alice), Some(second.clone()));

        assert!(host.leave_bridge(&alice));
        assert!(!host.leave_bridge(&alice));
    }

    #[test]
    fn test_hangup() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        host.register_join_hook(&alice, Arc::new(RecordingHook::default())).unwrap();
        let bridge = host.create_bridge();
        host.join_bridge(&bridge, &alice).unwrap();

        assert!(host.hangup(&alice));
        assert!(!host.hangup(&alice));
        assert!(alice.is_hung_up());
        assert_eq!(host.hook_count(&alice), 0);
        assert_eq!(host.bridge(&bridge).unwrap().member_count(), 0);
        assert!(host.find_by_name("PJSIP/alice-1").is_none());
        assert!(host.join_bridge(&bridge, &alice).is_err());
        assert!(host
            .register_join_hook(&alice, Arc::new(RecordingHook::default()))
            .is_err());
    }

    #[test]
    fn test_named_bridges() {
        let host = Host::new();
        host.create_named_bridge("conf").unwrap();
        assert!(host.create_named_bridge("conf").is_err());
        assert!(host.destroy_bridge("conf"));
        assert!(!host.destroy_bridge("conf"));

        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        let err = host.join_bridge("conf", &alice).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_destroy_bridge_unbridges_members() {
        let host = Host::new();
        let alice = host.create_channel("PJSIP/alice-1").unwrap();
        host.create_named_bridge("conf").unwrap();
        host.join_bridge("conf", &alice).unwrap();
        let conf = host.bridge("conf").unwrap();

        assert!(host.destroy_bridge("conf"));
        assert_eq!(host.bridge_of(&alice), None);
        assert!(!host.leave_bridge(&alice));
        assert_eq!(conf.member_count(), 0);
    }
}
