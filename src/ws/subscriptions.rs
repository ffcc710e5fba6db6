//! In-memory record of the desired topic → symbol subscriptions.
//!
//! The registry is the source of truth for what the server should be
//! streaming. After every (re)connect the client replays
//! [`SubscriptionRegistry::subscribe_messages`] instead of whatever was
//! sitting in the outbound queue when the old connection died.

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::ALL_SYMBOLS;
use crate::types::control::{Action, ControlMessage};
use crate::types::enums::Topic;

/// Normalize a caller-provided symbol list: empty or containing `*`
/// means "all symbols".
pub(crate) fn normalize_symbols(symbols: &[&str]) -> Vec<String> {
    if symbols.is_empty() || symbols.contains(&ALL_SYMBOLS) {
        vec![ALL_SYMBOLS.to_owned()]
    } else {
        symbols.iter().map(|s| (*s).to_owned()).collect()
    }
}

/// Build the wire message for `action` on `topic` with `symbols`.
pub(crate) fn control_message(action: Action, topic: Topic, symbols: &[String]) -> ControlMessage {
    let params = symbols
        .iter()
        .map(|sym| topic.param(sym))
        .collect::<Vec<_>>()
        .join(",");
    ControlMessage { action, params }
}

/// Topic → symbols map. Absence of a topic means "not subscribed"; a
/// topic subscribed to every symbol holds exactly `{"*"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    topics: BTreeMap<Topic, BTreeSet<String>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Adding `*`, or adding anything to a topic
    /// already holding `*`, leaves the topic at exactly `{"*"}`.
    pub fn add(&mut self, topic: Topic, symbols: &[String]) {
        let entry = self.topics.entry(topic).or_default();
        if entry.contains(ALL_SYMBOLS) || symbols.iter().any(|s| s == ALL_SYMBOLS) {
            entry.clear();
            entry.insert(ALL_SYMBOLS.to_owned());
            return;
        }
        entry.extend(symbols.iter().cloned());
        if entry.is_empty() {
            self.topics.remove(&topic);
        }
    }

    /// Drop a subscription. Removing `*` removes the whole topic; removing
    /// individual symbols from an "all" topic is a no-op; removing the
    /// last symbol removes the topic.
    pub fn remove(&mut self, topic: Topic, symbols: &[String]) {
        let Some(entry) = self.topics.get_mut(&topic) else {
            return;
        };
        if symbols.iter().any(|s| s == ALL_SYMBOLS) {
            self.topics.remove(&topic);
            return;
        }
        if entry.contains(ALL_SYMBOLS) {
            return;
        }
        for sym in symbols {
            entry.remove(sym);
        }
        if entry.is_empty() {
            self.topics.remove(&topic);
        }
    }

    /// Symbols currently recorded for `topic`.
    pub fn symbols(&self, topic: Topic) -> Option<&BTreeSet<String>> {
        self.topics.get(&topic)
    }

    /// Whether `topic` has any subscription.
    pub fn contains(&self, topic: Topic) -> bool {
        self.topics.contains_key(&topic)
    }

    /// Number of subscribed topics.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Owned snapshot, ordered by topic code then symbol.
    pub fn snapshot(&self) -> Vec<(Topic, Vec<String>)> {
        self.topics
            .iter()
            .map(|(topic, syms)| (*topic, syms.iter().cloned().collect()))
            .collect()
    }

    /// One subscribe message per topic, restoring the full state.
    pub fn subscribe_messages(&self) -> Vec<ControlMessage> {
        self.topics
            .iter()
            .map(|(topic, syms)| {
                let syms: Vec<String> = syms.iter().cloned().collect();
                control_message(Action::Subscribe, *topic, &syms)
            })
            .collect()
    }
}
