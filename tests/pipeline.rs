//! MQTT carried over WebSocket frames, from raw reads to a listener on another queue.

mod common;

use common::*;
use embassy_time::Instant;
use myrtio_netkit::ipc::{Publisher, Queue, TaskEventQueue};
use myrtio_netkit::packet::{Connect, PacketDecoder, PacketReader};
use myrtio_netkit::runtime::MqttData;
use myrtio_netkit::session::{Session, SessionConfig, SessionEvent};
use myrtio_netkit::websocket::{FrameDecoder, OpCode, encode_frame};
use myrtio_netkit::QoS;

type Data = MqttData<32, 32>;

fn frames(stream: &[u8], frame_size: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    for (i, part) in stream.chunks(frame_size).enumerate() {
        if i == 1 {
            // a control frame between data frames carries nothing for MQTT
            let mut ping = [0u8; 8];
            let len = encode_frame(OpCode::Ping, None, b"hi", &mut ping).unwrap();
            wire.extend_from_slice(&ping[..len]);
        }
        let mut buf = vec![0u8; part.len() + 14];
        let len = encode_frame(OpCode::Binary, None, part, &mut buf).unwrap();
        wire.extend_from_slice(&buf[..len]);
    }
    wire
}

struct Pipeline {
    frames: FrameDecoder<16>,
    reader: PacketReader<128>,
    session: Session<4, 4, 128>,
    replies: Vec<Vec<u8>>,
    pings: usize,
    connected: bool,
}

impl Pipeline {
    fn new() -> Self {
        let mut session = Session::new(SessionConfig::default());
        let mut out = [0u8; 64];
        session
            .connect(&Connect::new("ws", 60, true), Instant::from_secs(0), &mut out)
            .unwrap();
        Self {
            frames: FrameDecoder::new(),
            reader: PacketReader::new(),
            session,
            replies: Vec::new(),
            pings: 0,
            connected: false,
        }
    }

    fn receive(&mut self, mut read: &[u8], messages: &Publisher<Data, 2>) {
        while !read.is_empty() || self.frames.is_complete() {
            let used = self.frames.feed(read);
            read = &read[used..];
            assert!(!self.frames.is_error());
            if !self.frames.is_complete() {
                if used == 0 {
                    break;
                }
                continue;
            }
            if self.frames.is_control_frame() {
                assert_eq!(self.frames.opcode(), OpCode::Ping);
                self.pings += 1;
            } else {
                let taken = self.reader.extend(self.frames.payload());
                assert_eq!(taken, self.frames.payload().len());
                self.drain_packets(messages);
            }
            self.frames.consume_unit();
        }
    }

    fn drain_packets(&mut self, messages: &Publisher<Data, 2>) {
        let mut out = [0u8; 16];
        while let Some(raw) = self.reader.next_packet().unwrap() {
            if let Some(packet) = PacketDecoder::decode_packet(&raw) {
                let incoming = self
                    .session
                    .handle_packet(packet, Instant::from_secs(1), &mut out)
                    .unwrap();
                if let Some(len) = incoming.reply {
                    self.replies.push(out[..len].to_vec());
                }
                match incoming.event {
                    Some(SessionEvent::Connected { .. }) => self.connected = true,
                    Some(SessionEvent::Message(publish)) => {
                        messages.publish(Data::from_publish(&publish).unwrap());
                    }
                    _ => {}
                }
            }
            self.reader.consume();
        }
    }
}

#[test]
fn test_mqtt_over_websocket_reaches_listener() {
    let mut stream = connack(false, 0);
    stream.extend(publish("light/set", b"on", QoS::AtLeastOnce, Some(5)));
    stream.extend(publish("light/brightness", b"128", QoS::AtMostOnce, None));
    let wire = frames(&stream, 7);

    for read_size in [1, 3, 10, wire.len()] {
        let inbox = Queue::<Data, 4>::new();
        let messages = Publisher::<Data, 2>::new();
        let mut topics = Vec::new();
        let mut events =
            TaskEventQueue::new(&messages, &inbox, |d: &Data| topics.push(d.topic().to_owned()))
                .unwrap();

        let mut pipeline = Pipeline::new();
        for read in wire.chunks(read_size) {
            pipeline.receive(read, &messages);
        }

        assert!(pipeline.connected, "read size {read_size}");
        assert_eq!(pipeline.pings, 1);
        assert_eq!(pipeline.replies, vec![puback(5)]);
        assert_eq!(events.count(), 2);
        while events.forward_to_event_queue() {}
        drop(events);
        assert_eq!(topics, ["light/set", "light/brightness"]);
    }
}
