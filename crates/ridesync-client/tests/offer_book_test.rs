//! Offer book bounds under arbitrary offer traffic.

use std::collections::HashSet;

use proptest::prelude::*;
use ridesync_client::OfferBook;
use ridesync_proto::{RideId, RidePayload};

#[derive(Debug, Clone)]
enum Op {
    Insert { id: u8, surfaced: bool },
    Remove(u8),
    Surface,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..16, any::<bool>()).prop_map(|(id, surfaced)| Op::Insert { id, surfaced }),
        1 => (0u8..16).prop_map(Op::Remove),
        1 => Just(Op::Surface),
    ]
}

proptest! {
    #[test]
    fn bounded_unique_and_surfaced_once(capacity in 1usize..8, ops in prop::collection::vec(op(), 0..60)) {
        let mut book = OfferBook::new(capacity);
        let mut surfaced: HashSet<RideId> = HashSet::new();

        for op in ops {
            match op {
                Op::Insert { id, surfaced: shown } => {
                    let ride_id = RideId::new(format!("r{id}"));
                    if shown {
                        surfaced.insert(ride_id.clone());
                    }
                    let (_, evicted) = book.insert(RidePayload::new(ride_id), shown);
                    if let Some(evicted) = evicted {
                        surfaced.remove(&evicted.id);
                    }
                },
                Op::Remove(id) => {
                    let ride_id = RideId::new(format!("r{id}"));
                    book.remove(&ride_id);
                    surfaced.remove(&ride_id);
                },
                Op::Surface => {
                    for offer in book.surface_pending() {
                        prop_assert!(surfaced.insert(offer.id.clone()), "{} surfaced twice", offer.id);
                    }
                },
            }

            prop_assert!(book.len() <= capacity);
            let ids: HashSet<_> = book.iter().map(|o| o.id.clone()).collect();
            prop_assert_eq!(ids.len(), book.len());
        }
    }
}
