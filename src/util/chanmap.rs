//! Id-indexed channel registry.
//!
//! Lets one task hand out a numeric id that another task later uses to reach
//! it, e.g. correlating replies with pending requests.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub type ChanId = u64;

/// Registry of bounded Tokio channels keyed by id. Ids start at 1.
pub struct ChanMap<T> {
    chans: DashMap<ChanId, mpsc::Sender<T>>,
    next_id: AtomicU64,
    default_capacity: usize,
}

impl<T> ChanMap<T> {
    /// Channels created with [`ChanMap::create`] buffer `default_capacity` items (minimum 1).
    pub fn new(default_capacity: usize) -> Self {
        Self {
            chans: DashMap::new(),
            next_id: AtomicU64::new(1),
            default_capacity: default_capacity.max(1),
        }
    }

    /// Register a channel with the default capacity.
    pub fn create(&self) -> (ChanId, mpsc::Receiver<T>) {
        self.create_with_capacity(self.default_capacity)
    }

    /// Register a channel buffering `capacity` items. 0 is treated as 1.
    pub fn create_with_capacity(&self, capacity: usize) -> (ChanId, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.chans.insert(id, tx);
        (id, rx)
    }

    /// Sender for `id`, if still registered.
    pub fn get(&self, id: ChanId) -> Option<mpsc::Sender<T>> {
        self.chans.get(&id).map(|entry| entry.value().clone())
    }

    /// Unregister `id`. Receivers see the channel close once outstanding senders drop.
    pub fn remove(&self, id: ChanId) -> bool {
        self.chans.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.chans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chans.is_empty()
    }
}

impl<T> Default for ChanMap<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_start_at_one_and_route_messages() {
        let map = ChanMap::<&'static str>::default();
        let (a, mut rx_a) = map.create();
        let (b, _rx_b) = map.create_with_capacity(0);
        assert_eq!((a, b), (1, 2));

        map.get(a).unwrap().send("hello").await.unwrap();
        assert_eq!(rx_a.recv().await, Some("hello"));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn removed_channel_closes() {
        let map = ChanMap::<u32>::new(4);
        let (id, mut rx) = map.create();
        assert!(map.remove(id));
        assert!(!map.remove(id));
        assert!(map.get(id).is_none());
        assert_eq!(rx.recv().await, None);
        assert!(map.is_empty());
    }
}
