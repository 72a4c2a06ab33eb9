use std::time::Duration;

use chorus_core::{SessionId, SignalingMessage};
use chorus_mesh::{MemorySignalingHub, PeerStatus};

use crate::integration::{TestPeer, init_tracing, test_config};
use crate::utils::{
    SETTLE_TIMEOUT_MS, offers_between, status_of, transcript, wait_for_full_mesh,
    wait_for_status, wait_until,
};

#[tokio::test(start_paused = true)]
async fn test_responder_side_failure_is_healed_by_the_initiator() {
    init_tracing();

    let hub = MemorySignalingHub::new();
    let session = SessionId::from("room-1");
    let alice = TestPeer::new(&hub, "alice", "Alice", test_config());
    let bob = TestPeer::new(&hub, "bob", "Bob", test_config());

    let alice_session = alice.join(&session).await;
    let bob_session = bob.join(&session).await;
    let alice_id = alice_session.local_participant().id.clone();
    let bob_id = bob_session.local_participant().id.clone();
    assert!(wait_for_full_mesh(&[&alice_session, &bob_session]).await);

    // Only alice, the answering side, sees the path break.
    alice.media.latest_for(&bob_id).unwrap().fail();
    assert!(wait_for_status(&alice_session, &bob_id, PeerStatus::Failed).await);
    assert_eq!(
        status_of(&bob_session, &alice_id).await,
        Some(PeerStatus::Connected)
    );

    assert!(
        wait_until(SETTLE_TIMEOUT_MS, || async {
            bob.media.transports_for(&alice_id).len() == 2
        })
        .await,
        "bob should offer again once alice asks"
    );
    assert!(wait_for_full_mesh(&[&alice_session, &bob_session]).await);

    assert!(bob.media.transports_for(&alice_id)[0].is_closed());
    assert_eq!(alice.media.transports_for(&bob_id).len(), 2);
    assert_eq!(alice.media.open_transports_for(&bob_id), 1);
    assert_eq!(bob.media.open_transports_for(&alice_id), 1);

    let offers = offers_between(&hub, &session, &alice_id, &bob_id);
    assert_eq!(offers.len(), 2);
    assert!(offers.iter().all(|(from, _)| from == &bob_id));

    let requests = transcript(&hub, &session)
        .into_iter()
        .filter(|m| matches!(m, SignalingMessage::Reconnect { .. }))
        .collect::<Vec<_>>();
    assert_eq!(
        requests,
        vec![SignalingMessage::Reconnect {
            from: alice_id.clone(),
            to: bob_id.clone(),
        }]
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bob.media.transports_for(&alice_id).len(), 2, "no retry loop");

    alice_session.leave().await.unwrap();
    bob_session.leave().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_from_the_initiating_side_is_ignored() {
    init_tracing();

    let hub = MemorySignalingHub::new();
    let session = SessionId::from("room-1");
    let alice = TestPeer::new(&hub, "alice", "Alice", test_config());
    let alice_session = alice.join(&session).await;
    let alice_id = alice_session.local_participant().id.clone();

    // "zed" sorts after alice, so zed offers and alice only answers.
    let mut zed = crate::utils::RawParticipant::join(&hub, &session, "zed").await;
    zed.offer(&alice_id, "v=0 zed-offer").await;
    assert!(zed.next_answer(SETTLE_TIMEOUT_MS).await.is_some());
    assert!(wait_for_status(&alice_session, &zed.id, PeerStatus::Connected).await);

    zed.reconnect(&alice_id).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(alice.media.transports_for(&zed.id).len(), 1);
    assert_eq!(
        status_of(&alice_session, &zed.id).await,
        Some(PeerStatus::Connected)
    );
    assert!(offers_between(&hub, &session, &alice_id, &zed.id)
        .iter()
        .all(|(from, _)| from == &zed.id));

    alice_session.leave().await.unwrap();
}
