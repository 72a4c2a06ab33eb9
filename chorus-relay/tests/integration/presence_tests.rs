use chorus_core::{ParticipantId, RelayFrame, SessionId};

use crate::integration::init_tracing;
use crate::utils::{FRAME_TIMEOUT_MS, RelayHarness, WsClient};

#[cfg(test)]
mod test_presence_frames {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_joined_left() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");

        let (mut alice, snapshot) =
            WsClient::connect(&relay.url(&session, &"alice".into()), "alice").await;
        assert!(snapshot.is_empty());

        let (bob, snapshot) = WsClient::connect(&relay.url(&session, &"bob".into()), "bob").await;
        assert_eq!(snapshot, vec![ParticipantId::from("alice")]);
        assert_eq!(
            alice.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Joined {
                participant: "bob".into()
            })
        );

        bob.close().await;
        assert_eq!(
            alice.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Left {
                participant: "bob".into()
            })
        );
        assert!(relay.wait_for_participants(&session, &["alice"]).await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let standup = SessionId::from("standup");
        let retro = SessionId::from("retro");

        let (_alice, _) = WsClient::connect(&relay.url(&standup, &"alice".into()), "alice").await;
        let (_bob, snapshot) = WsClient::connect(&relay.url(&retro, &"bob".into()), "bob").await;

        assert!(snapshot.is_empty());
        assert_eq!(relay.service.participants(&standup), vec!["alice".into()]);
        assert_eq!(relay.service.participants(&retro), vec!["bob".into()]);
    }
}

#[cfg(test)]
mod test_reconnect {
    use super::*;

    #[tokio::test]
    async fn test_second_connection_replaces_first() {
        init_tracing();
        let relay = RelayHarness::start().await;
        let session = SessionId::from("standup");

        let (mut alice, _) =
            WsClient::connect(&relay.url(&session, &"alice".into()), "alice").await;
        let (mut bob_old, _) = WsClient::connect(&relay.url(&session, &"bob".into()), "bob").await;
        assert!(matches!(
            alice.next_frame(FRAME_TIMEOUT_MS).await,
            Some(RelayFrame::Joined { .. })
        ));

        let (_bob_new, snapshot) =
            WsClient::connect(&relay.url(&session, &"bob".into()), "bob").await;
        assert_eq!(snapshot, vec![ParticipantId::from("alice")]);

        // The replaced socket is closed by the relay.
        assert_eq!(bob_old.next_frame(FRAME_TIMEOUT_MS).await, None);

        // Neither a second Joined nor a Left reaches alice.
        assert_eq!(alice.next_frame(300).await, None);
        assert!(relay.wait_for_participants(&session, &["alice", "bob"]).await);
    }
}
