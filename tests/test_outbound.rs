//! Outbound traffic: directed messages and telemetry data over a live
//! session, including acknowledgement handling.


use meshblu_client::client::HandshakeState;
use meshblu_client::protocol::events::names;
use meshblu_client::testing::MemoryConfigStore;
use meshblu_client::{ClientError, DeviceSchemas};
use serde_json::{json, Value};
use test_helpers::{harness, harness_with_options, short_timeout_options, wait_for_state, Harness};
use tokio_test::assert_ok;

/// Spin up a connected session; the returned task resolves once the client
/// is disconnected.
async fn connected(
    h: &Harness,
) -> tokio::task::JoinHandle<Result<(), ClientError>> {
    let mut state = h.client.state_watch();
    let client = h.client.clone();
    let session = tokio::spawn(async move { client.connect(DeviceSchemas::default()).await });
    wait_for_state(&mut state, HandshakeState::Identifying).await;
    session
}

#[tokio::test]
async fn send_message_wraps_targets_and_returns_ack() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));
    let session = connected(&h).await;

    h.transport
        .script_ack(names::OUT_MESSAGE, json!({"delivered": true}));

    let ack = h
        .client
        .send_message(json!(["u2"]), json!({"on": true}))
        .await
        .unwrap();
    assert_eq!(ack, json!({"delivered": true}));

    let sent = h.transport.emitted_named(names::OUT_MESSAGE);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].payload,
        json!({"devices": ["u2"], "payload": {"on": true}})
    );
    assert!(sent[0].ack.is_some());

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_message_supports_broadcast_targets() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));
    let session = connected(&h).await;

    h.transport.script_ack(names::OUT_MESSAGE, json!("ok"));

    h.client
        .send_message(json!("*"), json!({"announce": 1}))
        .await
        .unwrap();

    let sent = h.transport.emitted_named(names::OUT_MESSAGE);
    assert_eq!(sent[0].payload["devices"], json!("*"));

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_telemetry_emits_data_verbatim() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));
    let session = connected(&h).await;

    h.transport
        .script_ack(names::OUT_DATA, json!({"stored": true}));

    let ack = h
        .client
        .send_telemetry(json!({"temperature": 21.5}))
        .await
        .unwrap();
    assert_eq!(ack, json!({"stored": true}));

    let sent = h.transport.emitted_named(names::OUT_DATA);
    assert_eq!(sent.len(), 1);
    // Telemetry travels as supplied, no envelope
    assert_eq!(sent[0].payload, json!({"temperature": 21.5}));

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_sends_get_their_own_acks() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));
    let session = connected(&h).await;

    h.transport
        .script_ack(names::OUT_MESSAGE, json!({"seq": "m"}));
    h.transport.script_ack(names::OUT_DATA, json!({"seq": "d"}));

    // Two requests in flight at once; correlation ids keep them apart
    let (message_ack, data_ack) = futures::future::join(
        h.client.send_message(json!(["u2"]), json!({"n": 1})),
        h.client.send_telemetry(json!({"n": 2})),
    )
    .await;

    assert_eq!(assert_ok!(message_ack), json!({"seq": "m"}));
    assert_eq!(assert_ok!(data_ack), json!({"seq": "d"}));

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_telemetry_rejects_null_payload() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));

    let result = h.client.send_telemetry(Value::Null).await;
    assert!(matches!(result, Err(ClientError::InvalidArgument { .. })));
    assert!(h.transport.emitted().is_empty());
}

#[tokio::test]
async fn unacknowledged_send_times_out() {
    let h = harness_with_options(
        MemoryConfigStore::with_identity("u1", "t1"),
        short_timeout_options(),
    );
    let session = connected(&h).await;

    // No scripted ack, so the wait bound is the only way out
    let result = h.client.send_message(json!(["u2"]), json!({})).await;
    match result {
        Err(ClientError::AckTimeout { event, .. }) => assert_eq!(event, names::OUT_MESSAGE),
        other => panic!("expected an ack timeout, got {other:?}"),
    }

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn timed_out_sends_leave_no_pending_acks() {
    let h = harness_with_options(
        MemoryConfigStore::with_identity("u1", "t1"),
        short_timeout_options(),
    );
    let session = connected(&h).await;

    // A broker that never acks must not grow the pending-ack table
    for _ in 0..5 {
        let result = h.client.send_message(json!(["u2"]), json!({})).await;
        assert!(matches!(result, Err(ClientError::AckTimeout { .. })));
    }
    assert_eq!(h.client.outstanding_acks(), 0);

    h.client.disconnect();
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_failure_surfaces_transport_error() {
    let h = harness(MemoryConfigStore::with_identity("u1", "t1"));
    let session = connected(&h).await;

    h.transport.fail_emits(true);
    let result = h.client.send_message(json!(["u2"]), json!({})).await;
    assert!(matches!(result, Err(ClientError::Transport(_))));

    h.transport.fail_emits(false);
    h.client.disconnect();
    session.await.unwrap().unwrap();
}
