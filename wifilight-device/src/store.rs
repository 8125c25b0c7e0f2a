//! State store seam
//!
//! Devices publish what they learn (reachability, power, color, program)
//! through a [`StateStore`] and read a few user settings back from it. Writes
//! are staged by [`StateStore::set`] and committed by [`StateStore::update`];
//! a value equal to the committed one is not staged at all.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

/// State names published by a device
pub mod names {
    pub const REACHABLE: &str = "reachable";
    pub const ON: &str = "on";
    pub const RED: &str = "r";
    pub const GREEN: &str = "g";
    pub const BLUE: &str = "b";
    pub const WHITE: &str = "w";
    pub const PROGRAM: &str = "progNo";
    pub const PROGRAM_RUNNING: &str = "progOn";
    pub const PROGRAM_SPEED: &str = "progSpeed";
    pub const RGB: &str = "rgb";
    /// Read: brightness in percent used by color temperature
    pub const BRIGHTNESS: &str = "bri";
    /// Read: default transition in tenths of a second
    pub const TRANSITION: &str = "trans";
}

pub trait StateStore: Send + Sync {
    /// Committed value of `name` on `channel`
    fn get(&self, channel: &str, name: &str) -> Option<Value>;

    /// Stage a value. Returns false when it equals the committed one.
    fn set(&self, channel: &str, name: &str, value: Value) -> bool;

    /// Commit everything staged
    fn update(&self);

    /// Forget the committed value so the next `set` commits unconditionally
    fn invalidate(&self, channel: &str, name: &str);
}

/// A committed change
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub channel: String,
    pub name: String,
    pub value: Value,
}

type Key = (String, String);

#[derive(Default)]
struct Inner {
    committed: HashMap<Key, Value>,
    pending: Vec<(Key, Value)>,
}

/// In-memory store broadcasting every committed change
pub struct MemoryStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<StateChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// All committed values of one channel, sorted by name
    pub fn snapshot(&self, channel: &str) -> Vec<(String, Value)> {
        let inner = self.inner.lock();
        let mut values: Vec<_> = inner
            .committed
            .iter()
            .filter(|((c, _), _)| c == channel)
            .map(|((_, n), v)| (n.clone(), v.clone()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, channel: &str, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .committed
            .get(&(channel.to_string(), name.to_string()))
            .cloned()
    }

    fn set(&self, channel: &str, name: &str, value: Value) -> bool {
        let key = (channel.to_string(), name.to_string());
        let mut inner = self.inner.lock();
        if inner.committed.get(&key) == Some(&value) {
            return false;
        }
        inner.pending.retain(|(k, _)| *k != key);
        inner.pending.push((key, value));
        true
    }

    fn update(&self) {
        let pending = {
            let mut inner = self.inner.lock();
            let pending = std::mem::take(&mut inner.pending);
            for (key, value) in &pending {
                inner.committed.insert(key.clone(), value.clone());
            }
            pending
        };
        for ((channel, name), value) in pending {
            // No subscribers is fine
            let _ = self.changes.send(StateChange {
                channel,
                name,
                value,
            });
        }
    }

    fn invalidate(&self, channel: &str, name: &str) {
        self.inner
            .lock()
            .committed
            .remove(&(channel.to_string(), name.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_commits_on_update_only() {
        let store = MemoryStore::new();
        assert!(store.set("dev", names::RED, json!(10)));
        assert_eq!(store.get("dev", names::RED), None);
        store.update();
        assert_eq!(store.get("dev", names::RED), Some(json!(10)));
    }

    #[test]
    fn test_unchanged_value_is_not_staged() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.set("dev", names::ON, json!(true));
        store.update();
        assert!(!store.set("dev", names::ON, json!(true)));
        store.update();

        assert_eq!(rx.try_recv().unwrap().value, json!(true));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalidate_forces_commit() {
        let store = MemoryStore::new();
        store.set("dev", names::ON, json!(true));
        store.update();
        store.invalidate("dev", names::ON);
        assert!(store.set("dev", names::ON, json!(true)));
    }

    #[test]
    fn test_snapshot_is_per_channel() {
        let store = MemoryStore::new();
        store.set("a", names::RED, json!(1));
        store.set("a", names::GREEN, json!(2));
        store.set("b", names::RED, json!(3));
        store.update();
        let snap = store.snapshot("a");
        assert_eq!(
            snap,
            vec![
                ("g".to_string(), json!(2)),
                ("r".to_string(), json!(1))
            ]
        );
    }
}
