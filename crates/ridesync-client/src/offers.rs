//! Driver offer book.
//!
//! Open rides pushed to a driver (`new:ride`) or fetched from the backend.
//! While the driver is busy, offers keep arriving here but are not surfaced;
//! they are surfaced in one batch once the driver is idle again.

use std::collections::VecDeque;

use ridesync_proto::{RideId, RidePayload};

#[derive(Debug, Clone)]
struct Entry {
    offer: RidePayload,
    surfaced: bool,
}

/// Bounded, newest-first set of ride offers, unique by ride id.
#[derive(Debug, Clone)]
pub struct OfferBook {
    capacity: usize,
    entries: VecDeque<Entry>,
}

impl OfferBook {
    /// Empty book holding at most `capacity` offers.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new() }
    }

    /// Number of offers held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the book is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `ride_id` is on offer.
    pub fn contains(&self, ride_id: &RideId) -> bool {
        self.entries.iter().any(|e| &e.offer.id == ride_id)
    }

    /// Offer for `ride_id`.
    pub fn get(&self, ride_id: &RideId) -> Option<&RidePayload> {
        self.entries.iter().find(|e| &e.offer.id == ride_id).map(|e| &e.offer)
    }

    /// Offers, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &RidePayload> {
        self.entries.iter().map(|e| &e.offer)
    }

    /// Add or refresh an offer.
    ///
    /// A known ride is updated in place. Returns the offer evicted to make
    /// room, if any, and whether the ride was new.
    pub fn insert(&mut self, offer: RidePayload, surfaced: bool) -> (bool, Option<RidePayload>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.offer.id == offer.id) {
            entry.offer = offer;
            entry.surfaced |= surfaced;
            return (false, None);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_back().map(|e| e.offer)
        } else {
            None
        };
        self.entries.push_front(Entry { offer, surfaced });
        (true, evicted)
    }

    /// Remove an offer.
    pub fn remove(&mut self, ride_id: &RideId) -> Option<RidePayload> {
        let index = self.entries.iter().position(|e| &e.offer.id == ride_id)?;
        self.entries.remove(index).map(|e| e.offer)
    }

    /// Mark every unsurfaced offer surfaced and return them, oldest first.
    pub fn surface_pending(&mut self) -> Vec<RidePayload> {
        self.entries
            .iter_mut()
            .rev()
            .filter(|e| !e.surfaced)
            .map(|e| {
                e.surfaced = true;
                e.offer.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_and_unique() {
        let mut book = OfferBook::new(10);
        book.insert(RidePayload::new("a"), true);
        book.insert(RidePayload::new("b"), true);
        let (new, _) = book.insert(RidePayload::new("a").with_fare(99.0, 3.0), true);

        assert!(!new);
        let ids: Vec<_> = book.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(book.get(&"a".into()).and_then(|o| o.fare), Some(99.0));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut book = OfferBook::new(2);
        book.insert(RidePayload::new("a"), true);
        book.insert(RidePayload::new("b"), true);
        let (_, evicted) = book.insert(RidePayload::new("c"), true);
        assert_eq!(evicted.map(|o| o.id), Some(RideId::new("a")));
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn queued_offers_surface_once() {
        let mut book = OfferBook::new(10);
        book.insert(RidePayload::new("a"), true);
        book.insert(RidePayload::new("b"), false);
        book.insert(RidePayload::new("c"), false);

        let surfaced: Vec<_> = book.surface_pending().into_iter().map(|o| o.id).collect();
        assert_eq!(surfaced, [RideId::new("b"), RideId::new("c")]);
        assert!(book.surface_pending().is_empty());
    }

    #[test]
    fn remove() {
        let mut book = OfferBook::new(10);
        book.insert(RidePayload::new("a"), true);
        assert!(book.remove(&"a".into()).is_some());
        assert!(book.remove(&"a".into()).is_none());
        assert!(book.is_empty());
    }
}
