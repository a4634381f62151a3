//! View state bounds under arbitrary client output.

use proptest::prelude::*;
use ridesync_app::App;
use ridesync_client::ClientAction;
use ridesync_proto::{RideId, RidePayload, Role};

fn action() -> impl Strategy<Value = ClientAction> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(|message| ClientAction::ServerError { message }),
        "[a-z ]{1,20}".prop_map(|reason| ClientAction::ActionFailed { action: "request_ride", reason }),
        "[a-z ]{1,20}".prop_map(|reason| ClientAction::LocationUnavailable { reason }),
        (0u8..6).prop_map(|id| ClientAction::OfferAvailable(RidePayload::new(format!("r{id}")))),
        (0u8..6).prop_map(|id| ClientAction::OfferWithdrawn(RideId::new(format!("r{id}")))),
    ]
}

proptest! {
    #[test]
    fn notices_stay_bounded_and_offers_unique(actions in prop::collection::vec(action(), 0..80)) {
        let mut app = App::new(Role::Driver);
        let mut last_notice = None;

        for action in &actions {
            app.apply(action);
            match action {
                ClientAction::ServerError { message } => last_notice = Some(message.clone()),
                ClientAction::ActionFailed { action, reason } => {
                    last_notice = Some(format!("{action} failed: {reason}"));
                },
                ClientAction::LocationUnavailable { reason } => {
                    last_notice = Some(format!("location unavailable: {reason}"));
                },
                _ => {},
            }
        }

        prop_assert!(app.notices().count() <= 8);
        prop_assert_eq!(app.notices().last().map(|n| n.text.clone()), last_notice);

        let mut ids: Vec<_> = app.offers().iter().map(|o| o.id.clone()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), total);
    }
}
