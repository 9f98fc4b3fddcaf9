#![allow(dead_code)]

use std::collections::VecDeque;

use embassy_time::{Duration, Timer};
use myrtio_netkit::packet::{EncodePacket, Publish, QoS};
use myrtio_netkit::transport::MqttTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// The script ran out of bytes to deliver.
    Exhausted,
    /// A read gave up waiting, like a socket read timeout.
    Timeout,
}

enum Step {
    Data(Vec<u8>),
    /// Nothing arrives for this long, then the read times out.
    Idle(Duration),
}

/// Scripted transport: hands out the queued chunks in order, never more than the
/// reader asks for, and records everything sent.
pub struct MockTransport {
    incoming: VecDeque<Step>,
    pub sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
        Self {
            incoming: chunks.into_iter().map(Step::Data).collect(),
            sent: Vec::new(),
        }
    }

    pub fn push_incoming(&mut self, chunk: Vec<u8>) {
        self.incoming.push_back(Step::Data(chunk));
    }

    pub fn push_idle(&mut self, idle: Duration) {
        self.incoming.push_back(Step::Idle(idle));
    }

    pub fn last_sent(&self) -> &[u8] {
        self.sent.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl MqttTransport for MockTransport {
    type Error = MockError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut chunk = match self.incoming.pop_front().ok_or(MockError::Exhausted)? {
            Step::Data(chunk) => chunk,
            Step::Idle(idle) => {
                Timer::after(idle).await;
                return Err(MockError::Timeout);
            }
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            self.incoming.push_front(Step::Data(chunk));
        }
        Ok(n)
    }

    fn is_timeout(error: &Self::Error) -> bool {
        *error == MockError::Timeout
    }
}

pub fn connack(session_present: bool, return_code: u8) -> Vec<u8> {
    vec![0x20, 0x02, session_present as u8, return_code]
}

pub fn ack(first_byte: u8, packet_id: u16) -> Vec<u8> {
    let [hi, lo] = packet_id.to_be_bytes();
    vec![first_byte, 0x02, hi, lo]
}

pub fn puback(packet_id: u16) -> Vec<u8> {
    ack(0x40, packet_id)
}

pub fn pubrec(packet_id: u16) -> Vec<u8> {
    ack(0x50, packet_id)
}

pub fn pubrel(packet_id: u16) -> Vec<u8> {
    ack(0x62, packet_id)
}

pub fn pubcomp(packet_id: u16) -> Vec<u8> {
    ack(0x70, packet_id)
}

pub fn suback(packet_id: u16, codes: &[u8]) -> Vec<u8> {
    let [hi, lo] = packet_id.to_be_bytes();
    let mut bytes = vec![0x90, 2 + codes.len() as u8, hi, lo];
    bytes.extend_from_slice(codes);
    bytes
}

pub fn publish(topic: &str, payload: &[u8], qos: QoS, packet_id: Option<u16>) -> Vec<u8> {
    let mut packet = Publish::new(topic, payload, qos);
    packet.packet_id = packet_id;
    let mut buf = vec![0u8; topic.len() + payload.len() + 16];
    let len = packet.encode(&mut buf).unwrap();
    buf.truncate(len);
    buf
}
