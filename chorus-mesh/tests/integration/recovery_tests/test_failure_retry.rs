use std::time::Duration;

use chorus_core::SessionId;
use chorus_mesh::{MemorySignalingHub, PeerStatus};

use crate::integration::{TestPeer, init_tracing, test_config};
use crate::utils::{offers_between, wait_for_full_mesh, wait_for_status};

#[tokio::test(start_paused = true)]
async fn test_failed_peer_is_renegotiated_after_backoff() {
    init_tracing();

    let hub = MemorySignalingHub::new();
    let session = SessionId::from("room-1");
    let config = test_config();
    let backoff = config.retry_backoff;
    let alice = TestPeer::new(&hub, "alice", "Alice", config.clone());
    let bob = TestPeer::new(&hub, "bob", "Bob", config);

    let alice_session = alice.join(&session).await;
    let bob_session = bob.join(&session).await;
    let alice_id = alice_session.local_participant().id.clone();
    let bob_id = bob_session.local_participant().id.clone();
    assert!(wait_for_full_mesh(&[&alice_session, &bob_session]).await);

    // The path between them breaks; both ends notice.
    bob.media.latest_for(&alice_id).unwrap().fail();
    alice.media.latest_for(&bob_id).unwrap().fail();

    assert!(wait_for_status(&bob_session, &alice_id, PeerStatus::Failed).await);
    assert!(bob.media.latest_for(&alice_id).unwrap().is_closed());

    // Nothing happens before the backoff elapses.
    tokio::time::sleep(backoff / 2).await;
    assert_eq!(bob.media.transports_for(&alice_id).len(), 1);

    assert!(wait_for_full_mesh(&[&alice_session, &bob_session]).await);
    assert_eq!(bob.media.transports_for(&alice_id).len(), 2);
    assert_eq!(bob.media.open_transports_for(&alice_id), 1);
    assert_eq!(alice.media.open_transports_for(&bob_id), 1);

    // The retry came from the same side as the first offer.
    let offers = offers_between(&hub, &session, &alice_id, &bob_id);
    assert_eq!(offers.len(), 2);
    assert!(offers.iter().all(|(from, _)| from == &bob_id));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bob.media.transports_for(&alice_id).len(), 2, "no retry loop");

    alice_session.leave().await.unwrap();
    bob_session.leave().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stuck_negotiation_times_out_and_retries() {
    init_tracing();

    let hub = MemorySignalingHub::new();
    let session = SessionId::from("room-1");
    let config = test_config();
    let timeout = config.negotiation_timeout;
    let zed = TestPeer::new(&hub, "zed", "Zed", config);
    let zed_session = zed.join(&session).await;

    // alice never answers, zed's offer stays unanswered.
    let alice = crate::utils::RawParticipant::join(&hub, &session, "alice").await;
    assert!(wait_for_status(&zed_session, &alice.id, PeerStatus::Connecting).await);
    assert_eq!(zed.media.transports_for(&alice.id).len(), 1);

    tokio::time::sleep(timeout + Duration::from_millis(100)).await;
    assert!(zed.media.transports_for(&alice.id)[0].is_closed());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(zed.media.transports_for(&alice.id).len(), 2);
    assert_eq!(zed.media.open_transports_for(&alice.id), 1);

    zed_session.leave().await.unwrap();
}
