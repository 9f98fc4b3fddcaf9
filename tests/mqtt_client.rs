mod common;

use common::*;
use embassy_futures::block_on;
use embassy_time::Duration;
use myrtio_netkit::error::{ConnectReasonCode, MqttError, ProtocolError};
use myrtio_netkit::packet::{Publish, SubscribeReturnCode};
use myrtio_netkit::session::{PublishStage, SessionState};
use myrtio_netkit::{MqttClient, MqttEvent, MqttOptions, QoS};

type TestClient<'a> = MqttClient<'a, MockTransport, 4, 256>;

fn connected(script: Vec<Vec<u8>>) -> TestClient<'static> {
    let mut chunks = vec![connack(false, 0)];
    chunks.extend(script);
    let mut client = TestClient::new(MockTransport::new(chunks), MqttOptions::new("test-client"));
    assert_eq!(block_on(client.connect()), Ok(false));
    client
}

#[test]
fn test_connect_sends_connect_and_reads_connack() {
    let client = connected(vec![]);
    assert!(client.is_connected());
    let transport = client.into_transport();
    assert_eq!(transport.sent.len(), 1);
    assert_eq!(transport.sent[0][0], 0x10);
}

#[test]
fn test_connect_refused() {
    let mut client = TestClient::new(
        MockTransport::new([connack(false, 5)]),
        MqttOptions::new("test-client"),
    );
    assert_eq!(
        block_on(client.connect()),
        Err(MqttError::ConnectionRefused(ConnectReasonCode::NotAuthorized))
    );
    assert!(!client.is_connected());
}

#[test]
fn test_connack_split_across_reads() {
    let mut client = TestClient::new(
        MockTransport::new([vec![0x20], vec![0x02, 0x01], vec![0x00]]),
        MqttOptions::new("test-client").with_clean_session(false),
    );
    assert_eq!(block_on(client.connect()), Ok(true));
}

#[test]
fn test_qos1_publish_completes_on_puback() {
    let mut client = connected(vec![]);
    let packet_id = block_on(client.publish("sensor/temp", b"21.5", QoS::AtLeastOnce))
        .unwrap()
        .unwrap();
    assert_eq!(client.session().publish_stage(packet_id), Some(PublishStage::Sent));

    client.transport_mut().push_incoming(puback(packet_id));
    assert_eq!(
        block_on(client.poll()),
        Ok(MqttEvent::Published { packet_id })
    );
    assert_eq!(client.session().inflight_len(), 0);
}

#[test]
fn test_qos0_publish_has_no_identifier() {
    let mut client = connected(vec![]);
    assert_eq!(block_on(client.publish("a", b"b", QoS::AtMostOnce)), Ok(None));
    assert_eq!(client.transport_mut().last_sent(), &[0x30, 0x04, 0x00, 0x01, b'a', b'b']);
}

#[test]
fn test_inbound_qos1_message_is_acknowledged() {
    let packet = publish("light/set", b"on", QoS::AtLeastOnce, Some(9));
    let (head, tail) = packet.split_at(1);
    let mut client = connected(vec![head.to_vec(), tail.to_vec()]);

    match block_on(client.poll()).unwrap() {
        MqttEvent::Message(msg) => {
            assert_eq!(msg.topic, "light/set");
            assert_eq!(msg.payload, b"on");
            assert_eq!(msg.packet_id, Some(9));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.transport_mut().last_sent(), puback(9).as_slice());
}

#[test]
fn test_consecutive_messages_in_one_read() {
    let mut bytes = publish("a", b"1", QoS::AtMostOnce, None);
    bytes.extend(publish("b", b"2", QoS::AtMostOnce, None));
    let mut client = connected(vec![bytes]);

    let first = match block_on(client.poll()).unwrap() {
        MqttEvent::Message(msg) => msg.topic.to_owned(),
        other => panic!("unexpected event {other:?}"),
    };
    let second = match block_on(client.poll()).unwrap() {
        MqttEvent::Message(msg) => msg.topic.to_owned(),
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
}

#[test]
fn test_qos2_handshake_for_identifier_7() {
    let mut client = connected(vec![]);
    let message = Publish::new("door/lock", b"locked", QoS::ExactlyOnce);
    block_on(client.publish_with_id(&message, 0x0007)).unwrap();
    assert_eq!(client.session().publish_stage(0x0007), Some(PublishStage::Sent));

    client.transport_mut().push_incoming(pubrec(0x0007));
    client.transport_mut().push_incoming(pubcomp(0x0007));
    assert_eq!(
        block_on(client.poll()),
        Ok(MqttEvent::Published { packet_id: 0x0007 })
    );

    let transport = client.transport_mut();
    assert_eq!(transport.sent.len(), 3);
    assert_eq!(transport.sent[2], pubrel(0x0007));
    assert_eq!(client.session().publish_stage(0x0007), None);
    assert_eq!(client.session().inflight_len(), 0);
}

#[test]
fn test_identifier_in_flight_is_rejected() {
    let mut client = connected(vec![]);
    let message = Publish::new("t", b"x", QoS::AtLeastOnce);
    block_on(client.publish_with_id(&message, 42)).unwrap();
    assert_eq!(
        block_on(client.publish_with_id(&message, 42)),
        Err(MqttError::PacketIdInUse(42))
    );
}

#[test]
fn test_stray_pubcomp_is_ignored() {
    let mut client = connected(vec![]);
    let packet_id = block_on(client.publish("t", b"x", QoS::AtLeastOnce))
        .unwrap()
        .unwrap();
    client.transport_mut().push_incoming(pubcomp(0x0100));
    client.transport_mut().push_incoming(puback(packet_id));
    assert_eq!(
        block_on(client.poll()),
        Ok(MqttEvent::Published { packet_id })
    );
}

#[test]
fn test_subscribe_reports_return_codes() {
    let mut client = connected(vec![]);
    let packet_id = block_on(client.subscribe_many(&[
        ("a/+", QoS::AtLeastOnce),
        ("b/#", QoS::ExactlyOnce),
    ]))
    .unwrap();
    client
        .transport_mut()
        .push_incoming(suback(packet_id, &[0x01, 0x80]));

    match block_on(client.poll()).unwrap() {
        MqttEvent::Subscribed {
            packet_id: id,
            return_codes,
        } => {
            assert_eq!(id, packet_id);
            assert_eq!(
                return_codes.as_slice(),
                &[
                    SubscribeReturnCode::Granted(QoS::AtLeastOnce),
                    SubscribeReturnCode::Failure
                ]
            );
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_transport_failure_drops_connection() {
    let mut client = connected(vec![]);
    assert_eq!(
        block_on(client.poll()),
        Err(MqttError::Transport(MockError::Exhausted))
    );
    assert!(!client.is_connected());
    assert_eq!(block_on(client.poll()), Err(MqttError::NotConnected));
}

#[test]
fn test_idle_read_timeouts_keep_connection_and_ping() {
    let mut transport = MockTransport::new([connack(false, 0)]);
    // reads give up well before the keep-alive falls due
    for _ in 0..3 {
        transport.push_idle(Duration::from_millis(400));
    }
    transport.push_incoming(vec![0xD0, 0x00]);
    transport.push_incoming(publish("after/ping", b"x", QoS::AtMostOnce, None));
    let mut client = TestClient::new(
        transport,
        MqttOptions::new("test-client").with_keep_alive(Duration::from_secs(1)),
    );
    assert_eq!(block_on(client.connect()), Ok(false));

    match block_on(client.poll()).unwrap() {
        MqttEvent::Message(msg) => assert_eq!(msg.topic, "after/ping"),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(client.is_connected());
    let sent = &client.transport_mut().sent;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], [0xC0u8, 0x00]);
}

#[test]
fn test_read_timeout_while_connecting_is_retried() {
    let mut transport = MockTransport::new([]);
    transport.push_idle(Duration::from_millis(10));
    transport.push_incoming(connack(false, 0));
    let mut client = TestClient::new(transport, MqttOptions::new("test-client"));
    assert_eq!(block_on(client.connect()), Ok(false));
    assert!(client.is_connected());
}

#[test]
fn test_failed_connect_leaves_session_disconnected() {
    let mut client = TestClient::new(MockTransport::new([]), MqttOptions::new("test-client"));
    assert_eq!(
        block_on(client.connect()),
        Err(MqttError::Transport(MockError::Exhausted))
    );
    assert_eq!(client.session().state(), SessionState::Disconnected);

    // peer closes the stream before CONNACK
    let mut client = TestClient::new(MockTransport::new([vec![]]), MqttOptions::new("test-client"));
    assert_eq!(
        block_on(client.connect()),
        Err(MqttError::Protocol(ProtocolError::ConnectionClosed))
    );
    assert_eq!(client.session().state(), SessionState::Disconnected);
}

#[test]
fn test_oversize_packet_drops_connection() {
    // PUBLISH declaring 16383 bytes, far past the 256 byte buffer
    let mut client = connected(vec![vec![0x30, 0xFF, 0x7F]]);
    assert_eq!(
        block_on(client.poll()),
        Err(MqttError::Protocol(ProtocolError::PayloadTooLarge))
    );
    assert!(!client.is_connected());
    assert_eq!(client.session().state(), SessionState::Disconnected);
}

#[test]
fn test_unexpected_broker_packet_is_protocol_error() {
    // PINGREQ is never sent to a client
    let mut client = connected(vec![vec![0xC0, 0x00]]);
    assert_eq!(
        block_on(client.poll()),
        Err(MqttError::Protocol(ProtocolError::UnexpectedPacket))
    );
}

#[test]
fn test_malformed_packet_is_dropped() {
    // PUBACK with a remaining length of 3
    let mut client = connected(vec![
        vec![0x40, 0x03, 0x00, 0x01, 0x00],
        publish("after", b"x", QoS::AtMostOnce, None),
    ]);
    match block_on(client.poll()).unwrap() {
        MqttEvent::Message(msg) => assert_eq!(msg.topic, "after"),
        other => panic!("unexpected event {other:?}"),
    }
}
