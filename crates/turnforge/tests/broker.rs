//! End-to-end tests over a real broker on an OS-assigned port.
//!
//! These use the wall clock: WebSocket I/O doesn't mix with a paused
//! runtime. Every wait is bounded so a broken relay fails instead of hangs.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use turnforge::prelude::*;
use turnforge::transport::{BrokerFrame, PeerStream, TransportEvent};

const WAIT: Duration = Duration::from_secs(5);

/// Starts a broker in the background and returns its `ws://` URL.
async fn start_broker() -> String {
    let broker = Broker::bind(BrokerConfig::bind("127.0.0.1:0"))
        .await
        .expect("should bind");
    let addr = broker.local_addr().expect("bound address");
    tokio::spawn(broker.run());
    format!("ws://{addr}")
}

/// Reads events until one matches, skipping the rest.
async fn expect_event(
    stream: &mut PeerStream,
    what: &str,
    pred: impl Fn(&TransportEvent) -> bool,
) -> TransportEvent {
    let found = tokio::time::timeout(WAIT, async {
        while let Some(event) = stream.next().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("stream ended before {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

fn roster_of(ids: &[&str]) -> impl Fn(&TransportEvent) -> bool {
    let want: Vec<PeerId> = ids.iter().map(|id| PeerId::new(*id)).collect();
    move |event| matches!(event, TransportEvent::RosterChanged(peers) if *peers == want)
}

async fn wait_until(
    handle: &CoordinatorHandle,
    what: &str,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let snap = handle.snapshot().await.expect("coordinator running");
        if pred(&snap) {
            return snap;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("{} never reached {what}: {snap:#?}", handle.local_peer());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_broadcast_reaches_other_members_only() {
    let url = start_broker().await;
    let alice = WebSocketPeer::new(url.as_str(), "alice");
    let bob = WebSocketPeer::new(url.as_str(), "bob");

    let mut alice_rx = alice.join("s1").await.unwrap();
    expect_event(&mut alice_rx, "alice alone", roster_of(&["alice"])).await;
    let mut bob_rx = bob.join("s1").await.unwrap();
    expect_event(&mut alice_rx, "alice sees bob", roster_of(&["alice", "bob"])).await;
    expect_event(&mut bob_rx, "bob sees alice", roster_of(&["alice", "bob"])).await;

    alice.broadcast(b"hello").await.unwrap();
    let event = expect_event(&mut bob_rx, "delivery", |e| {
        matches!(e, TransportEvent::Message { .. })
    })
    .await;
    assert_eq!(
        event,
        TransportEvent::Message {
            data: b"hello".to_vec(),
            from: PeerId::new("alice"),
        }
    );

    // Alice doesn't get her own frame back.
    bob.broadcast(b"marker").await.unwrap();
    let next = expect_event(&mut alice_rx, "marker", |e| {
        matches!(e, TransportEvent::Message { .. })
    })
    .await;
    assert!(matches!(next, TransportEvent::Message { data, .. } if data == b"marker"));
    assert_eq!(
        alice.roster().await,
        vec![PeerId::new("alice"), PeerId::new("bob")]
    );
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let url = start_broker().await;
    let alice = WebSocketPeer::new(url.as_str(), "alice");
    let bob = WebSocketPeer::new(url.as_str(), "bob");
    let carol = WebSocketPeer::new(url.as_str(), "carol");

    let mut alice_rx = alice.join("s1").await.unwrap();
    let mut bob_rx = bob.join("s1").await.unwrap();
    let mut carol_rx = carol.join("s2").await.unwrap();
    expect_event(&mut alice_rx, "pair", roster_of(&["alice", "bob"])).await;
    expect_event(&mut bob_rx, "pair", roster_of(&["alice", "bob"])).await;
    expect_event(&mut carol_rx, "carol alone", roster_of(&["carol"])).await;

    alice.broadcast(b"s1 only").await.unwrap();
    carol.broadcast(b"s2 only").await.unwrap();

    let got = expect_event(&mut bob_rx, "s1 delivery", |e| {
        matches!(e, TransportEvent::Message { .. })
    })
    .await;
    assert!(matches!(got, TransportEvent::Message { data, .. } if data == b"s1 only"));

    let quiet = tokio::time::timeout(Duration::from_millis(200), carol_rx.next()).await;
    assert!(quiet.is_err(), "carol should hear nothing from s1: {quiet:?}");
}

#[tokio::test]
async fn test_leave_updates_remaining_roster() {
    let url = start_broker().await;
    let alice = WebSocketPeer::new(url.as_str(), "alice");
    let bob = WebSocketPeer::new(url.as_str(), "bob");

    let mut alice_rx = alice.join("s1").await.unwrap();
    let _bob_rx = bob.join("s1").await.unwrap();
    expect_event(&mut alice_rx, "pair", roster_of(&["alice", "bob"])).await;

    bob.leave().await.unwrap();
    expect_event(&mut alice_rx, "bob gone", roster_of(&["alice"])).await;
}

#[tokio::test]
async fn test_rejoin_with_same_id_replaces_link() {
    let url = start_broker().await;
    let alice = WebSocketPeer::new(url.as_str(), "alice");
    let mut alice_rx = alice.join("s1").await.unwrap();

    let first = WebSocketPeer::new(url.as_str(), "bob");
    let mut first_rx = first.join("s1").await.unwrap();
    expect_event(&mut alice_rx, "pair", roster_of(&["alice", "bob"])).await;

    let second = WebSocketPeer::new(url.as_str(), "bob");
    let mut second_rx = second.join("s1").await.unwrap();
    expect_event(&mut second_rx, "pair", roster_of(&["alice", "bob"])).await;

    // The broker drops the old link once it has been superseded.
    expect_event(&mut first_rx, "old link dropped", |e| {
        matches!(e, TransportEvent::Invalidated { .. })
    })
    .await;

    alice.broadcast(b"still here").await.unwrap();
    let got = expect_event(&mut second_rx, "delivery", |e| {
        matches!(e, TransportEvent::Message { .. })
    })
    .await;
    assert!(matches!(got, TransportEvent::Message { data, .. } if data == b"still here"));
}

#[tokio::test]
async fn test_connection_must_open_with_join() {
    let url = start_broker().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .expect("client should connect");

    let not_join = BrokerFrame::Broadcast { data: vec![1] }.encode().unwrap();
    ws.send(Message::Binary(not_join.into())).await.unwrap();

    // The broker hangs up without relaying anything.
    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(other)) => panic!("unexpected frame before close: {other:?}"),
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "broker should close the connection");
}

#[tokio::test]
async fn test_run_until_stops_on_signal() {
    let broker = Broker::bind(BrokerConfig::bind("127.0.0.1:0"))
        .await
        .expect("should bind");
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(broker.run_until(async {
        let _ = stop_rx.await;
    }));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(WAIT, running)
        .await
        .expect("broker should stop")
        .expect("broker task");
    assert!(result.is_ok());
}

// =========================================================================
// Full session over the broker
// =========================================================================

#[tokio::test]
async fn test_three_player_round_over_broker() {
    let url = start_broker().await;
    let spawn = |id: &str| {
        CoordinatorHandle::spawn(
            WebSocketPeer::new(url.as_str(), id),
            CoordinatorConfig::named(id.to_uppercase()),
        )
    };
    let host = spawn("host");
    let p1 = spawn("p1");
    let p2 = spawn("p2");

    let sid = host
        .host_room("Once upon a time", Duration::from_secs(30))
        .await
        .unwrap();
    wait_until(&host, "own roster", |s| s.roster.len() == 1).await;
    // Join one at a time so the turn order is host, p1, p2.
    p1.join_room(sid.clone()).await.unwrap();
    wait_until(&host, "p1 in lobby", |s| s.players.len() == 2).await;
    p2.join_room(sid).await.unwrap();
    for handle in [&host, &p1, &p2] {
        wait_until(handle, "full lobby", |s| s.players.len() == 3).await;
    }

    host.start_game().await.unwrap();
    host.submit("foo").await.unwrap();
    wait_until(&p1, "turn 1", |s| {
        s.active_turn.as_ref().is_some_and(|t| t.turn_index == 1)
    })
    .await;
    p1.submit("baz").await.unwrap();
    wait_until(&p2, "turn 2", |s| {
        s.active_turn.as_ref().is_some_and(|t| t.turn_index == 2)
    })
    .await;
    p2.submit("bar").await.unwrap();

    for handle in [&host, &p1, &p2] {
        let snap = wait_until(handle, "replay", |s| s.phase == SessionPhase::Replay).await;
        let texts: Vec<_> = snap
            .replay
            .as_ref()
            .map(|r| r.items.iter().map(|i| i.text.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(texts, ["foo", "baz", "bar"]);
    }
}
