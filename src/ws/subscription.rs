//! Per-connection subscription manager.
//!
//! Tracks which event types a WebSocket client is subscribed to and
//! provides server-side event filtering.

use std::collections::BTreeSet;

use crate::domain::PipelineEvent;

/// Manages the set of event-type subscriptions for a single connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed event types. Ignored while `subscribe_all` is set.
    event_types: BTreeSet<&'static str>,
    /// Whether the client receives every event (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds event types to the subscription set.
    ///
    /// `"*"` enables the wildcard. Returns the names that are not event
    /// types; those are ignored.
    pub fn subscribe<'a>(&mut self, names: &[&'a str]) -> Vec<&'a str> {
        let mut unknown = Vec::new();
        for name in names {
            if *name == "*" {
                self.subscribe_all = true;
            } else if let Some(known) = canonical(name) {
                self.event_types.insert(known);
            } else {
                unknown.push(*name);
            }
        }
        unknown
    }

    /// Removes event types. `"*"` clears the wildcard and every type.
    pub fn unsubscribe(&mut self, names: &[&str]) {
        for name in names {
            if *name == "*" {
                self.subscribe_all = false;
                self.event_types.clear();
            } else if let Some(known) = canonical(name) {
                self.event_types.remove(known);
            }
        }
    }

    /// Returns `true` if `event` passes the subscription filter.
    #[must_use]
    pub fn matches(&self, event: &PipelineEvent) -> bool {
        self.subscribe_all || self.event_types.contains(event.event_type_str())
    }

    /// Explicitly subscribed event types.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.event_types.iter().copied().collect()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

fn canonical(name: &str) -> Option<&'static str> {
    PipelineEvent::EVENT_TYPES
        .iter()
        .copied()
        .find(|known| *known == name)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::RecordId;

    fn failed() -> PipelineEvent {
        PipelineEvent::RecordFailed {
            reward_id: RecordId::new(),
            reason: "swap unconfirmed".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn started() -> PipelineEvent {
        PipelineEvent::RunStarted {
            run_id: "run".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&failed()));
    }

    #[test]
    fn subscribe_specific_type() {
        let mut mgr = SubscriptionManager::new();
        assert!(mgr.subscribe(&["record_failed"]).is_empty());
        assert!(mgr.matches(&failed()));
        assert!(!mgr.matches(&started()));
    }

    #[test]
    fn unknown_types_are_reported() {
        let mut mgr = SubscriptionManager::new();
        let unknown = mgr.subscribe(&["pool_created", "run_started"]);
        assert_eq!(unknown, vec!["pool_created"]);
        assert_eq!(mgr.event_types(), vec!["run_started"]);
    }

    #[test]
    fn wildcard_matches_everything_until_cleared() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&["*"]);
        assert!(mgr.matches(&failed()));
        assert!(mgr.matches(&started()));
        mgr.unsubscribe(&["*"]);
        assert!(!mgr.is_subscribed_all());
        assert!(!mgr.matches(&started()));
    }

    #[test]
    fn unsubscribe_removes_type() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&["record_failed", "run_started"]);
        mgr.unsubscribe(&["record_failed"]);
        assert!(!mgr.matches(&failed()));
        assert!(mgr.matches(&started()));
    }
}
