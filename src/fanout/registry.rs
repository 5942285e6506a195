//! Connection registry
//!
//! Bookkeeping for live connections and the topics each one watches. The
//! registry itself is plain data: the [`FanoutEngine`](super::FanoutEngine)
//! wraps it in its lock and pairs every empty ↔ non-empty transition with the
//! matching broker subscription change.
//!
//! Two indexes are kept in sync:
//!
//! ```text
//! connections: conn_id ──▶ { sender, topics, closing }
//! interest:    topic   ──▶ { conn_id, ... }      (key present only while non-empty)
//! ```

use super::connection::{ConnectionId, ConnectionSender};
use crate::core::error::FanoutError;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct ConnectionEntry {
    sender: ConnectionSender,
    topics: HashSet<String>,
    /// Set once deregistration has started; joins are refused from then on
    closing: bool,
}

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection was added to the topic
    Joined {
        /// The topic had no members before
        first: bool,
    },
    /// The connection was already a member
    AlreadyMember,
}

/// Result of a leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not a member (or the topic is unknown)
    NotMember,
    /// The connection was removed
    Left {
        /// The topic has no members any more
        emptied: bool,
    },
}

/// Live connections and their interest sets
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    interest: HashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection with an empty interest set
    pub fn register(&mut self, sender: ConnectionSender) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                sender,
                topics: HashSet::new(),
                closing: false,
            },
        );
        id
    }

    /// Whether `id` may join a topic right now
    ///
    /// Returns `Ok(true)` when it is already a member of `topic`.
    pub fn check_join(&self, id: &ConnectionId, topic: &str) -> Result<bool, FanoutError> {
        match self.connections.get(id) {
            Some(entry) if !entry.closing => Ok(entry.topics.contains(topic)),
            _ => Err(FanoutError::UnknownConnection(id.clone())),
        }
    }

    /// Add `id` to `topic`'s interest set
    pub fn join(&mut self, id: &ConnectionId, topic: &str) -> Result<JoinOutcome, FanoutError> {
        let entry = match self.connections.get_mut(id) {
            Some(entry) if !entry.closing => entry,
            _ => return Err(FanoutError::UnknownConnection(id.clone())),
        };
        if !entry.topics.insert(topic.to_string()) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let members = self.interest.entry(topic.to_string()).or_default();
        let first = members.is_empty();
        members.insert(id.clone());
        Ok(JoinOutcome::Joined { first })
    }

    /// Remove `id` from `topic`'s interest set
    ///
    /// Works for connections that are closing, so deregistration can use it.
    pub fn leave(&mut self, id: &ConnectionId, topic: &str) -> LeaveOutcome {
        let Some(members) = self.interest.get_mut(topic) else {
            return LeaveOutcome::NotMember;
        };
        if !members.remove(id) {
            return LeaveOutcome::NotMember;
        }

        let emptied = members.is_empty();
        if emptied {
            self.interest.remove(topic);
        }
        if let Some(entry) = self.connections.get_mut(id) {
            entry.topics.remove(topic);
        }
        LeaveOutcome::Left { emptied }
    }

    /// Start deregistering `id`: refuse further joins and return its topics
    ///
    /// Returns `None` if the connection is unknown or already closing.
    pub fn begin_deregister(&mut self, id: &ConnectionId) -> Option<Vec<String>> {
        let entry = self.connections.get_mut(id)?;
        if entry.closing {
            return None;
        }
        entry.closing = true;
        let mut topics: Vec<String> = entry.topics.iter().cloned().collect();
        topics.sort();
        Some(topics)
    }

    /// Discard a connection whose memberships have all been removed
    pub fn finish_deregister(&mut self, id: &ConnectionId) {
        if let Some(entry) = self.connections.remove(id) {
            for topic in &entry.topics {
                // Only reachable if a caller skipped leave(); keep the indexes consistent.
                self.leave_stale(id, topic);
            }
        }
    }

    fn leave_stale(&mut self, id: &ConnectionId, topic: &str) {
        if let Some(members) = self.interest.get_mut(topic) {
            members.remove(id);
            if members.is_empty() {
                self.interest.remove(topic);
            }
        }
    }

    /// Snapshot of the members of `topic` (empty for unknown topics)
    pub fn members_of(&self, topic: &str) -> HashSet<ConnectionId> {
        self.interest.get(topic).cloned().unwrap_or_default()
    }

    /// Members of `topic` that can still receive, with their senders
    pub fn recipients(&self, topic: &str) -> Vec<(ConnectionId, ConnectionSender)> {
        let Some(members) = self.interest.get(topic) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| {
                let entry = self.connections.get(id)?;
                (!entry.closing).then(|| (id.clone(), entry.sender.clone()))
            })
            .collect()
    }

    pub fn is_topic_empty(&self, topic: &str) -> bool {
        !self.interest.contains_key(topic)
    }

    /// Whether `id` is registered and not being deregistered
    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.connections.get(id).is_some_and(|entry| !entry.closing)
    }

    /// Topics `id` currently watches
    pub fn topics_of(&self, id: &ConnectionId) -> HashSet<String> {
        self.connections
            .get(id)
            .map(|entry| entry.topics.clone())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
