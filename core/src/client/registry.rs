// Pending-notification registry: id ↔ delivery, both directions
//
// Two maps updated together under one short-lived lock. The id side is
// guaranteed unique by the monotonic generator; the token side is
// best-effort and lookups must handle absence.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::Notification;

/// One delivery attempt series for a notification.
///
/// `token` is the opaque correlation key assigned at first submission and
/// used for retry bookkeeping; `id` is the wire correlation id, allocated
/// at the first successful connect of the series and reused by retries.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub token: u64,
    pub id: Option<u64>,
    pub notification: Notification,
}

#[derive(Default)]
struct Maps {
    by_id: HashMap<u64, Delivery>,
    id_by_token: HashMap<u64, u64>,
}

/// Outstanding deliveries awaiting a terminal daemon response.
#[derive(Default)]
pub struct PendingNotifications {
    maps: Mutex<Maps>,
}

impl PendingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivery under its wire id. An id is never reused, so an
    /// existing entry under the same id indicates a generator bug.
    pub fn insert(&self, id: u64, delivery: Delivery) {
        let mut maps = self.maps.lock();
        let token = delivery.token;
        let previous = maps.by_id.insert(id, delivery);
        debug_assert!(previous.is_none(), "duplicate notification id {id}");
        maps.id_by_token.insert(token, id);
    }

    pub fn remove_by_id(&self, id: u64) -> Option<Delivery> {
        let mut maps = self.maps.lock();
        let delivery = maps.by_id.remove(&id)?;
        maps.id_by_token.remove(&delivery.token);
        Some(delivery)
    }

    /// Reverse removal; returns the id the delivery was filed under.
    pub fn remove_by_token(&self, token: u64) -> Option<u64> {
        let mut maps = self.maps.lock();
        let id = maps.id_by_token.remove(&token)?;
        maps.by_id.remove(&id);
        Some(id)
    }

    pub fn get_by_id(&self, id: u64) -> Option<Delivery> {
        self.maps.lock().by_id.get(&id).cloned()
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.maps.lock().by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.maps.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.lock().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(token: u64, id: u64) -> Delivery {
        Delivery {
            token,
            id: Some(id),
            notification: Notification::new("t", "title"),
        }
    }

    #[test]
    fn test_insert_and_lookup_both_directions() {
        let pending = PendingNotifications::new();
        pending.insert(10, delivery(1, 10));
        pending.insert(11, delivery(2, 11));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.get_by_id(10).unwrap().token, 1);
        assert_eq!(pending.remove_by_token(2), Some(11));
        assert!(!pending.contains_id(11));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_remove_by_id_clears_token_index() {
        let pending = PendingNotifications::new();
        pending.insert(10, delivery(1, 10));

        let removed = pending.remove_by_id(10).unwrap();
        assert_eq!(removed.token, 1);
        assert_eq!(pending.remove_by_token(1), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_absent_lookups() {
        let pending = PendingNotifications::new();
        assert!(pending.get_by_id(99).is_none());
        assert!(pending.remove_by_id(99).is_none());
        assert!(pending.remove_by_token(99).is_none());
    }
}
