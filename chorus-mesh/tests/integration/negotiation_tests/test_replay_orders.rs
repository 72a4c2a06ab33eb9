use chorus_core::{ParticipantId, SessionId};
use chorus_mesh::{MemorySignalingHub, PeerStatus};

use crate::integration::{TestPeer, init_tracing, test_config};
use crate::utils::{RawParticipant, wait_for_status};

#[derive(Debug, Clone, Copy)]
enum Step {
    Join,
    Offer,
    Candidate,
}

async fn play(zed: &RawParticipant, to: &ParticipantId, step: Step) {
    match step {
        Step::Join => zed.announce("Zed").await,
        Step::Offer => zed.offer(to, "v=0 zed-offer").await,
        Step::Candidate => zed.candidate(to, "candidate:1").await,
    }
}

#[tokio::test]
async fn test_any_replay_order_yields_one_connection() {
    init_tracing();

    let orders: &[&[Step]] = &[
        &[Step::Join, Step::Offer, Step::Candidate],
        &[Step::Offer, Step::Join, Step::Candidate],
        &[Step::Offer, Step::Candidate, Step::Join],
        &[Step::Candidate, Step::Offer, Step::Join],
        &[Step::Join, Step::Offer, Step::Offer, Step::Candidate, Step::Join, Step::Candidate],
    ];

    for order in orders {
        let hub = MemorySignalingHub::new();
        let session = SessionId::from("room-1");
        let alice = TestPeer::new(&hub, "alice", "Alice", test_config());
        let alice_session = alice.join(&session).await;
        let alice_id = alice_session.local_participant().id.clone();

        let zed = RawParticipant::join(&hub, &session, "zed").await;
        for step in order.iter() {
            play(&zed, &alice_id, *step).await;
        }

        assert!(
            wait_for_status(&alice_session, &zed.id, PeerStatus::Connected).await,
            "order {order:?} should connect"
        );
        let roster = alice_session.roster().await.unwrap();
        assert_eq!(roster.len(), 1, "order {order:?}");
        assert_eq!(
            alice.media.transports_for(&zed.id).len(),
            1,
            "order {order:?} created a duplicate connection"
        );
        assert_eq!(alice.media.open_transports_for(&zed.id), 1);

        alice_session.leave().await.unwrap();
    }
}
