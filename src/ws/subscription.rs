//! Per-connection subscription manager.
//!
//! Tracks which providers an operator connection follows and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::ProviderId;

/// Manages the set of provider subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed provider IDs. If `subscribe_all` is true, this set is ignored.
    provider_ids: HashSet<ProviderId>,
    /// Whether the client follows every provider (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds provider IDs to the subscription set.
    pub fn subscribe(&mut self, ids: &[ProviderId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.provider_ids.extend(ids.iter().copied());
    }

    /// Removes provider IDs; `wildcard` switches the `"*"` subscription off.
    pub fn unsubscribe(&mut self, ids: &[ProviderId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.provider_ids.remove(id);
        }
    }

    /// Whether an event about `provider_id` should be forwarded.
    ///
    /// Events not tied to a provider only reach wildcard subscribers.
    #[must_use]
    pub fn matches(&self, provider_id: Option<ProviderId>) -> bool {
        self.subscribe_all || provider_id.is_some_and(|id| self.provider_ids.contains(&id))
    }

    /// Returns the number of explicitly subscribed provider IDs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.provider_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(Some(ProviderId::new())));
        assert!(!mgr.matches(None));
    }

    #[test]
    fn subscribe_specific_provider() {
        let mut mgr = SubscriptionManager::new();
        let id = ProviderId::new();
        mgr.subscribe(&[id], false);
        assert!(mgr.matches(Some(id)));
        assert!(!mgr.matches(Some(ProviderId::new())));
        assert!(!mgr.matches(None));
    }

    #[test]
    fn wildcard_matches_unattributed_events() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(Some(ProviderId::new())));
        assert!(mgr.matches(None));

        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches(None));
    }

    #[test]
    fn unsubscribe_removes_provider() {
        let mut mgr = SubscriptionManager::new();
        let id = ProviderId::new();
        mgr.subscribe(&[id, ProviderId::new()], false);
        assert_eq!(mgr.count(), 2);
        mgr.unsubscribe(&[id], false);
        assert!(!mgr.matches(Some(id)));
        assert_eq!(mgr.count(), 1);
    }
}
