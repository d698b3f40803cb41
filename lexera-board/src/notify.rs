/// User-visible failure notifications ("Couldn't move card").
use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::types::EntityRef;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub entity: EntityRef,
    /// Unix millis.
    pub created_at_ms: i64,
}

/// Bounded, newest-last queue of notifications.
#[derive(Debug, Clone)]
pub struct Notifications {
    items: VecDeque<Notification>,
    limit: usize,
    next_id: u64,
}

impl Notifications {
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            limit: limit.max(1),
            next_id: 1,
        }
    }

    pub fn push(&mut self, entity: EntityRef, message: impl Into<String>) -> &Notification {
        let notification = Notification {
            id: self.next_id,
            message: message.into(),
            entity,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        };
        self.next_id += 1;
        while self.items.len() >= self.limit {
            self.items.pop_front();
        }
        self.items.push_back(notification);
        &self.items[self.items.len() - 1]
    }

    /// Returns false if no notification has this id.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    /// Drop notifications older than `max_age` at `now_ms` (unix millis).
    /// Returns how many were dropped.
    pub fn prune_older_than(&mut self, max_age: Duration, now_ms: i64) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let before = self.items.len();
        self.items
            .retain(|n| now_ms.saturating_sub(n.created_at_ms) < max_age_ms);
        before - self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_increasing_ids() {
        let mut n = Notifications::new(5);
        let first = n.push(EntityRef::card("p1"), "Couldn't move card").id;
        let second = n.push(EntityRef::card("p2"), "Couldn't move card").id;
        assert!(second > first);
        assert_eq!(n.len(), 2);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut n = Notifications::new(2);
        n.push(EntityRef::card("a"), "1");
        n.push(EntityRef::card("b"), "2");
        n.push(EntityRef::card("c"), "3");
        let messages: Vec<&str> = n.iter().map(|x| x.message.as_str()).collect();
        assert_eq!(messages, vec!["2", "3"]);
    }

    #[test]
    fn test_prune_older_than() {
        let mut n = Notifications::new(5);
        let created = n.push(EntityRef::card("a"), "old").created_at_ms;
        n.push(EntityRef::card("b"), "new");
        // back-date the first one
        if let Some(first) = n.items.front_mut() {
            first.created_at_ms = created - 10_000;
        }
        let dropped = n.prune_older_than(Duration::from_secs(8), created);
        assert_eq!(dropped, 1);
        let messages: Vec<&str> = n.iter().map(|x| x.message.as_str()).collect();
        assert_eq!(messages, vec!["new"]);
        assert_eq!(n.prune_older_than(Duration::from_secs(8), created), 0);
    }

    #[test]
    fn test_dismiss() {
        let mut n = Notifications::new(5);
        let id = n.push(EntityRef::list("A"), "Couldn't move list").id;
        assert!(n.dismiss(id));
        assert!(!n.dismiss(id));
        assert!(n.is_empty());
    }
}
