//! Session record: identity plus the active flag

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::host::Channel;

/// One monitoring session.
///
/// The monitored channel is only borrowed: the record holds a weak
/// reference, and a channel that has gone away reads as inactive.
#[derive(Debug)]
pub struct SessionRecord {
    session_id: String,
    monitored: Weak<Channel>,
    monitored_name: String,
    active: Mutex<bool>,
}

impl SessionRecord {
    /// New records start active
    pub fn new(monitored: &Arc<Channel>, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            monitored: Arc::downgrade(monitored),
            monitored_name: monitored.name().to_string(),
            active: Mutex::new(true),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Name of the monitored channel at the time the session started
    pub fn monitored_name(&self) -> &str {
        &self.monitored_name
    }

    pub fn monitored(&self) -> Option<Arc<Channel>> {
        self.monitored.upgrade()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Clear the active flag. Returns whether the record was active.
    ///
    /// Blocks while a [`while_active`](Self::while_active) closure runs, so
    /// once this returns no write for this record is in progress or pending.
    pub fn deactivate(&self) -> bool {
        let mut active = self.active.lock();
        std::mem::replace(&mut *active, false)
    }

    /// Run `f` against the monitored channel while holding the record lock,
    /// provided the record is active and the channel still exists.
    pub fn while_active<R>(&self, f: impl FnOnce(&Arc<Channel>) -> R) -> Option<R> {
        let active = self.active.lock();
        if !*active {
            return None;
        }
        let monitored = self.monitored.upgrade()?;
        let result = f(&monitored);
        drop(active);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let channel = Arc::new(Channel::new("PJSIP/alice-1", "100.1"));
        let record = SessionRecord::new(&channel, "s1");
        assert_eq!(record.session_id(), "s1");
        assert_eq!(record.monitored_name(), "PJSIP/alice-1");
        assert!(record.is_active());
        assert_eq!(record.while_active(|c| c.unique_id().to_string()).as_deref(), Some("100.1"));

        assert!(record.deactivate());
        assert!(!record.deactivate());
        assert!(!record.is_active());
        assert!(record.while_active(|_| ()).is_none());
    }

    #[test]
    fn test_vanished_channel() {
        let channel = Arc::new(Channel::new("PJSIP/alice-1", "100.1"));
        let record = SessionRecord::new(&channel, "s1");
        drop(channel);

        assert!(record.monitored().is_none());
        assert!(record.while_active(|_| ()).is_none());
    }
}
