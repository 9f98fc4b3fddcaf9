//! Per-type packet views and their encoders.
//!
//! Parsers read from the packet body (everything after the fixed header) and never
//! index past it. Encoders write the full packet including the fixed header.

use heapless::Vec;

use super::{EncodePacket, PacketType, QoS, write_fixed_header};
use crate::error::{CodecError, ConnectReasonCode, MqttError, ProtocolError};
use crate::util::{read_binary, read_u16, read_utf8_string, write_binary, write_utf8_string};

/// Maximum number of topic filters carried by one SUBSCRIBE, SUBACK or UNSUBSCRIBE.
pub const MAX_TOPICS_PER_PACKET: usize = 8;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

fn malformed() -> CodecError {
    MqttError::Protocol(ProtocolError::MalformedPacket)
}

fn byte_at(buf: &[u8], index: usize) -> Result<u8, CodecError> {
    buf.get(index).copied().ok_or_else(malformed)
}

fn put(buf: &mut [u8], cursor: &mut usize, bytes: &[u8]) -> Result<(), CodecError> {
    buf.get_mut(*cursor..*cursor + bytes.len())
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(bytes);
    *cursor += bytes.len();
    Ok(())
}

// --- CONNECT Packet ---

/// Message the broker publishes on the client's behalf if it disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<LastWill<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    /// Protocol name, level, connect flags and keep-alive.
    pub const VARIABLE_HEADER_LEN: usize = 10;

    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            will: None,
            username: None,
            password: None,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        flags
    }

    pub(crate) fn payload_len(&self) -> usize {
        let mut len = 2 + self.client_id.len();
        if let Some(will) = &self.will {
            len += 2 + will.topic.len() + 2 + will.payload.len();
        }
        if let Some(username) = self.username {
            len += 2 + username.len();
        }
        if let Some(password) = self.password {
            len += 2 + password.len();
        }
        len
    }

    pub(crate) fn parse(body: &'a [u8]) -> Result<Self, CodecError> {
        let mut cursor = 0;
        if read_utf8_string(&mut cursor, body)? != PROTOCOL_NAME {
            return Err(malformed());
        }
        if byte_at(body, cursor)? != PROTOCOL_LEVEL {
            return Err(MqttError::ConnectionRefused(
                ConnectReasonCode::UnacceptableProtocolVersion,
            ));
        }
        let flags = byte_at(body, cursor + 1)?;
        cursor += 2;
        if flags & 0x01 != 0 || flags & 0xC0 == 0x40 {
            return Err(malformed());
        }
        let keep_alive = read_u16(&mut cursor, body)?;
        let client_id = read_utf8_string(&mut cursor, body)?;

        let will = if flags & 0x04 != 0 {
            let qos = QoS::from_bits((flags >> 3) & 0x03).ok_or_else(malformed)?;
            let topic = read_utf8_string(&mut cursor, body)?;
            let payload = read_binary(&mut cursor, body)?;
            Some(LastWill {
                topic,
                payload,
                qos,
                retain: flags & 0x20 != 0,
            })
        } else {
            if flags & 0x38 != 0 {
                return Err(malformed());
            }
            None
        };
        let username = if flags & 0x80 != 0 {
            Some(read_utf8_string(&mut cursor, body)?)
        } else {
            None
        };
        let password = if flags & 0x40 != 0 {
            Some(read_binary(&mut cursor, body)?)
        } else {
            None
        };

        Ok(Self {
            client_id,
            keep_alive,
            clean_session: flags & 0x02 != 0,
            will,
            username,
            password,
        })
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        // MQTT 3.1.1 has no password without a user name
        if self.password.is_some() && self.username.is_none() {
            return Err(malformed());
        }
        let remaining_len = Self::VARIABLE_HEADER_LEN + self.payload_len();
        let mut cursor = write_fixed_header(buf, 0x10, remaining_len)?;

        cursor += write_utf8_string(&mut buf[cursor..], PROTOCOL_NAME)?;
        put(buf, &mut cursor, &[PROTOCOL_LEVEL, self.flags()])?;
        put(buf, &mut cursor, &self.keep_alive.to_be_bytes())?;
        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        if let Some(will) = &self.will {
            cursor += write_utf8_string(&mut buf[cursor..], will.topic)?;
            cursor += write_binary(&mut buf[cursor..], will.payload)?;
        }
        if let Some(username) = self.username {
            cursor += write_utf8_string(&mut buf[cursor..], username)?;
        }
        if let Some(password) = self.password {
            cursor += write_binary(&mut buf[cursor..], password)?;
        }
        Ok(cursor)
    }
}

// --- CONNACK Packet ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: ConnectReasonCode,
}

impl ConnAck {
    pub(crate) fn parse(body: &[u8]) -> Result<Self, CodecError> {
        let flags = byte_at(body, 0)?;
        if flags & 0xFE != 0 {
            return Err(malformed());
        }
        Ok(Self {
            session_present: flags & 0x01 != 0,
            return_code: ConnectReasonCode::from(byte_at(body, 1)?),
        })
    }
}

impl EncodePacket for ConnAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut cursor = write_fixed_header(buf, 0x20, 2)?;
        put(
            buf,
            &mut cursor,
            &[self.session_present as u8, u8::from(self.return_code)],
        )?;
        Ok(cursor)
    }
}

// --- PUBLISH Packet ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
    pub dup: bool,
    pub retain: bool,
}

impl<'a> Publish<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8], qos: QoS) -> Self {
        Self {
            topic,
            qos,
            payload,
            packet_id: None,
            dup: false,
            retain: false,
        }
    }

    pub(crate) fn parse(flags: u8, body: &'a [u8]) -> Result<Self, CodecError> {
        let qos = QoS::from_bits((flags >> 1) & 0x03).ok_or_else(malformed)?;
        let dup = flags & 0x08 != 0;
        if qos == QoS::AtMostOnce && dup {
            return Err(malformed());
        }

        let mut cursor = 0;
        let topic = read_utf8_string(&mut cursor, body)?;
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(malformed());
        }
        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, body)?)
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            payload: &body[cursor..],
            packet_id,
            dup,
            retain: flags & 0x01 != 0,
        })
    }

    fn first_byte(&self) -> u8 {
        let mut byte = 0x30 | ((self.qos as u8) << 1);
        if self.dup {
            byte |= 0x08;
        }
        if self.retain {
            byte |= 0x01;
        }
        byte
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let packet_id = match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, _) => None,
            (_, Some(id)) if id != 0 => Some(id),
            _ => return Err(malformed()),
        };
        let remaining_len =
            2 + self.topic.len() + packet_id.map_or(0, |_| 2) + self.payload.len();
        let mut cursor = write_fixed_header(buf, self.first_byte(), remaining_len)?;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;
        if let Some(id) = packet_id {
            put(buf, &mut cursor, &id.to_be_bytes())?;
        }
        put(buf, &mut cursor, self.payload)?;
        Ok(cursor)
    }
}

// --- PUBACK / PUBREC / PUBREL / PUBCOMP / UNSUBACK ---

/// Body shared by every packet that carries nothing but a packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub packet_id: u16,
}

impl Ack {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    pub(crate) fn parse(body: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = 0;
        Ok(Self {
            packet_id: read_u16(&mut cursor, body)?,
        })
    }

    /// Encodes this identifier as a packet of `packet_type`, e.g. a PUBREL.
    pub fn encode(&self, packet_type: PacketType, buf: &mut [u8]) -> Result<usize, CodecError> {
        let flags = packet_type.required_flags().unwrap_or(0);
        let mut cursor = write_fixed_header(buf, ((packet_type as u8) << 4) | flags, 2)?;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;
        Ok(cursor)
    }
}

// --- SUBSCRIBE Packet ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), MAX_TOPICS_PER_PACKET>,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.topics.iter().map(|(topic, _)| 2 + topic.len() + 1).sum()
    }

    pub(crate) fn parse(body: &'a [u8]) -> Result<Self, CodecError> {
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;
        let mut topics = Vec::new();
        while cursor < body.len() {
            let topic = read_utf8_string(&mut cursor, body)?;
            let options = byte_at(body, cursor)?;
            cursor += 1;
            if options & 0xFC != 0 {
                return Err(malformed());
            }
            let qos = QoS::from_bits(options).ok_or_else(malformed)?;
            topics
                .push((topic, qos))
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }
        Ok(Self { packet_id, topics })
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut cursor = write_fixed_header(buf, 0x82, 2 + self.payload_len())?;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;
        for (topic, qos) in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
            put(buf, &mut cursor, &[*qos as u8])?;
        }
        Ok(cursor)
    }
}

// --- SUBACK Packet ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscribeReturnCode {
    Granted(QoS),
    Failure,
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x80 => Ok(SubscribeReturnCode::Failure),
            _ => QoS::from_bits(code)
                .map(SubscribeReturnCode::Granted)
                .ok_or(ProtocolError::MalformedPacket),
        }
    }
}

impl From<SubscribeReturnCode> for u8 {
    fn from(code: SubscribeReturnCode) -> Self {
        match code {
            SubscribeReturnCode::Granted(qos) => qos as u8,
            SubscribeReturnCode::Failure => 0x80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode, MAX_TOPICS_PER_PACKET>,
}

impl SubAck {
    pub(crate) fn parse(body: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;
        let mut return_codes = Vec::new();
        for &code in &body[cursor..] {
            let code = SubscribeReturnCode::try_from(code).map_err(MqttError::Protocol)?;
            return_codes
                .push(code)
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}

impl EncodePacket for SubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut cursor = write_fixed_header(buf, 0x90, 2 + self.return_codes.len())?;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;
        for code in &self.return_codes {
            put(buf, &mut cursor, &[u8::from(*code)])?;
        }
        Ok(cursor)
    }
}

// --- UNSUBSCRIBE Packet ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<&'a str, MAX_TOPICS_PER_PACKET>,
}

impl<'a> Unsubscribe<'a> {
    pub fn new(packet_id: u16, topic: &'a str) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push(topic);
        Self { packet_id, topics }
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.topics.iter().map(|topic| 2 + topic.len()).sum()
    }

    pub(crate) fn parse(body: &'a [u8]) -> Result<Self, CodecError> {
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;
        let mut topics = Vec::new();
        while cursor < body.len() {
            let topic = read_utf8_string(&mut cursor, body)?;
            topics
                .push(topic)
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }
        Ok(Self { packet_id, topics })
    }
}

impl EncodePacket for Unsubscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut cursor = write_fixed_header(buf, 0xA2, 2 + self.payload_len())?;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;
        for topic in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
        }
        Ok(cursor)
    }
}

// --- PINGREQ / PINGRESP / DISCONNECT ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

fn encode_empty(buf: &mut [u8], first_byte: u8) -> Result<usize, CodecError> {
    write_fixed_header(buf, first_byte, 0)
}

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_empty(buf, 0xC0)
    }
}

impl EncodePacket for PingResp {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_empty(buf, 0xD0)
    }
}

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_empty(buf, 0xE0)
    }
}
