use chorus_core::{IceCandidate, RelayFrame, SessionId, SignalingMessage};

use crate::integration::init_tracing;
use crate::utils::{FRAME_TIMEOUT_MS, RelayHarness, WsClient};

async fn three_way(relay: &RelayHarness, session: &SessionId) -> (WsClient, WsClient, WsClient) {
    let (mut alice, _) = WsClient::connect(&relay.url(session, &"alice".into()), "alice").await;
    let (mut bob, _) = WsClient::connect(&relay.url(session, &"bob".into()), "bob").await;
    let (carol, _) = WsClient::connect(&relay.url(session, &"carol".into()), "carol").await;

    // Drain the Joined frames so only forwarded signals remain.
    for _ in 0..2 {
        alice.next_frame(FRAME_TIMEOUT_MS).await;
    }
    bob.next_frame(FRAME_TIMEOUT_MS).await;
    (alice, bob, carol)
}

#[cfg(test)]
mod test_forwarding {
    use super::*;

    #[tokio::test]
    async fn test_addressed_signal_is_point_to_point() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");
        let (mut alice, mut bob, mut carol) = three_way(&relay, &session).await;

        let candidate = SignalingMessage::IceCandidate {
            from: "carol".into(),
            to: "alice".into(),
            candidate: IceCandidate::new("candidate:1 1 udp 1 10.0.0.3 5000 typ host"),
        };
        carol.send(&candidate).await;

        assert_eq!(
            alice.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Signal { message: candidate })
        );
        assert_eq!(bob.next_frame(300).await, None);
    }

    #[tokio::test]
    async fn test_reconnect_request_reaches_only_the_initiator() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");
        let (mut alice, mut bob, mut carol) = three_way(&relay, &session).await;

        let reconnect = SignalingMessage::Reconnect {
            from: "alice".into(),
            to: "carol".into(),
        };
        alice.send(&reconnect).await;

        assert_eq!(
            carol.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Signal { message: reconnect })
        );
        assert_eq!(bob.next_frame(300).await, None);
        assert_eq!(alice.next_frame(300).await, None);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_else() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");
        let (mut alice, mut bob, mut carol) = three_way(&relay, &session).await;

        let join = SignalingMessage::Join {
            from: "alice".into(),
            display_name: "Alice".into(),
            instance: "1".to_owned(),
            reply: false,
        };
        alice.send(&join).await;

        let expected = Some(RelayFrame::Signal { message: join });
        assert_eq!(bob.next_frame(FRAME_TIMEOUT_MS).await, expected);
        assert_eq!(carol.next_frame(FRAME_TIMEOUT_MS).await, expected);
        assert_eq!(alice.next_frame(300).await, None);
    }
}

#[cfg(test)]
mod test_rejection {
    use super::*;

    #[tokio::test]
    async fn test_spoofed_and_malformed_signals_are_dropped() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");
        let (mut alice, mut bob, _carol) = three_way(&relay, &session).await;

        bob.send(&SignalingMessage::Offer {
            from: "carol".into(),
            to: "alice".into(),
            sdp: "v=0 spoofed".to_owned(),
        })
        .await;
        bob.send_text("{\"op\":\"Offer\"").await;
        bob.send_text("{\"op\":\"Kick\",\"d\":{\"from\":\"bob\"}}").await;

        let genuine = SignalingMessage::Offer {
            from: "bob".into(),
            to: "alice".into(),
            sdp: "v=0 genuine".to_owned(),
        };
        bob.send(&genuine).await;

        // Frames on one connection are handled in order, so the genuine offer is the
        // first thing alice can see.
        assert_eq!(
            alice.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Signal { message: genuine })
        );
        assert!(relay.wait_for_participants(&session, &["alice", "bob", "carol"]).await);
    }
}
