//! # MQTT Packet Model
//!
//! A received control packet is first seen as a [`RawPacket`]: a bounds-checked view of
//! the fixed header (type, flags, remaining length) over the bytes the transport
//! delivered. [`Packet`] is the closed set of typed views built over those same bytes
//! without copying. Each variant knows whether it carries a packet identifier, how long
//! its variable header is and whether a payload follows; [`Packet::validate_packet`]
//! uses that to cross-check the remaining-length field.
//!
//! Only MQTT 3.1.1 is supported.

mod control;
pub mod decoder;
pub mod reader;

pub use control::{
    Ack, ConnAck, Connect, Disconnect, LastWill, MAX_TOPICS_PER_PACKET, PingReq, PingResp,
    Publish, SubAck, Subscribe, SubscribeReturnCode, Unsubscribe,
};
pub use decoder::PacketDecoder;
pub use reader::PacketReader;

use crate::error::{CodecError, MqttError, ProtocolError};
use crate::util::{self, VarInt};

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Maps the two QoS bits to a level; `3` is reserved and yields `None`.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Writes the complete packet to the start of `buf` and returns its length.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;
}

/// The 4-bit control packet type from the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => PacketType::Connect,
            2 => PacketType::ConnAck,
            3 => PacketType::Publish,
            4 => PacketType::PubAck,
            5 => PacketType::PubRec,
            6 => PacketType::PubRel,
            7 => PacketType::PubComp,
            8 => PacketType::Subscribe,
            9 => PacketType::SubAck,
            10 => PacketType::Unsubscribe,
            11 => PacketType::UnsubAck,
            12 => PacketType::PingReq,
            13 => PacketType::PingResp,
            14 => PacketType::Disconnect,
            _ => return Err(ProtocolError::InvalidPacketType(tag)),
        })
    }
}

impl PacketType {
    /// Flags the fixed header must carry for this type. `None` for PUBLISH, whose
    /// flags hold DUP/QoS/RETAIN.
    pub const fn required_flags(self) -> Option<u8> {
        match self {
            PacketType::Publish => None,
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => Some(0b0010),
            _ => Some(0),
        }
    }
}

/// The generic framing of one control packet: fixed header plus the bytes after it.
///
/// Construction only checks that the fixed header itself can be read. Whether the
/// remaining-length field matches the buffer is checked by
/// [`Packet::validate_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket<'a> {
    bytes: &'a [u8],
    header_len: usize,
    remaining_length: usize,
}

impl<'a> RawPacket<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let len_bytes = bytes
            .get(1..)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        match util::peek_variable_byte_integer(len_bytes)? {
            VarInt::Complete { value, len } => Ok(Self {
                bytes,
                header_len: 1 + len,
                remaining_length: value,
            }),
            VarInt::Incomplete => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }

    /// The 4-bit type tag, not yet mapped to a [`PacketType`].
    pub fn type_tag(&self) -> u8 {
        self.bytes[0] >> 4
    }

    pub fn flags(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    /// The remaining length as declared by the fixed header.
    pub fn remaining_length(&self) -> usize {
        self.remaining_length
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Everything after the fixed header, as actually received.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[self.header_len..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Every MQTT 3.1.1 control packet, as a typed view over received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(Ack),
    PubRec(Ack),
    PubRel(Ack),
    PubComp(Ack),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe<'a>),
    UnsubAck(Ack),
    PingReq,
    PingResp,
    Disconnect,
}

impl<'a> Packet<'a> {
    /// Builds the typed view for `packet_type` over `raw`, reading fields within
    /// `raw.body()` only.
    pub fn from_raw(packet_type: PacketType, raw: &RawPacket<'a>) -> Result<Self, CodecError> {
        let body = raw.body();
        Ok(match packet_type {
            PacketType::Connect => Packet::Connect(Connect::parse(body)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::parse(body)?),
            PacketType::Publish => Packet::Publish(Publish::parse(raw.flags(), body)?),
            PacketType::PubAck => Packet::PubAck(Ack::parse(body)?),
            PacketType::PubRec => Packet::PubRec(Ack::parse(body)?),
            PacketType::PubRel => Packet::PubRel(Ack::parse(body)?),
            PacketType::PubComp => Packet::PubComp(Ack::parse(body)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::parse(body)?),
            PacketType::SubAck => Packet::SubAck(SubAck::parse(body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::parse(body)?),
            PacketType::UnsubAck => Packet::UnsubAck(Ack::parse(body)?),
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => Packet::Disconnect,
        })
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    pub fn has_packet_identifier(&self) -> bool {
        match self {
            Packet::Publish(p) => p.qos != QoS::AtMostOnce,
            Packet::PubAck(_)
            | Packet::PubRec(_)
            | Packet::PubRel(_)
            | Packet::PubComp(_)
            | Packet::Subscribe(_)
            | Packet::SubAck(_)
            | Packet::Unsubscribe(_)
            | Packet::UnsubAck(_) => true,
            Packet::Connect(_)
            | Packet::ConnAck(_)
            | Packet::PingReq
            | Packet::PingResp
            | Packet::Disconnect => false,
        }
    }

    pub fn packet_identifier(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PubAck(a)
            | Packet::PubRec(a)
            | Packet::PubRel(a)
            | Packet::PubComp(a)
            | Packet::UnsubAck(a) => Some(a.packet_id),
            Packet::Subscribe(s) => Some(s.packet_id),
            Packet::SubAck(s) => Some(s.packet_id),
            Packet::Unsubscribe(u) => Some(u.packet_id),
            _ => None,
        }
    }

    pub fn has_payload(&self) -> bool {
        matches!(
            self,
            Packet::Connect(_)
                | Packet::Publish(_)
                | Packet::Subscribe(_)
                | Packet::SubAck(_)
                | Packet::Unsubscribe(_)
        )
    }

    pub fn variable_header_length(&self) -> usize {
        match self {
            Packet::Connect(_) => Connect::VARIABLE_HEADER_LEN,
            Packet::ConnAck(_) => 2,
            Packet::Publish(p) => 2 + p.topic.len() + if p.packet_id.is_some() { 2 } else { 0 },
            Packet::PubAck(_)
            | Packet::PubRec(_)
            | Packet::PubRel(_)
            | Packet::PubComp(_)
            | Packet::Subscribe(_)
            | Packet::SubAck(_)
            | Packet::Unsubscribe(_)
            | Packet::UnsubAck(_) => 2,
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => 0,
        }
    }

    /// Length of the payload this view parsed out of the body.
    pub fn payload_length(&self) -> usize {
        match self {
            Packet::Connect(c) => c.payload_len(),
            Packet::Publish(p) => p.payload.len(),
            Packet::Subscribe(s) => s.payload_len(),
            Packet::SubAck(s) => s.return_codes.len(),
            Packet::Unsubscribe(u) => u.payload_len(),
            _ => 0,
        }
    }

    /// Cross-checks the fixed header against what this variant says should follow it.
    pub fn validate_packet(&self, raw: &RawPacket<'_>) -> Result<(), ProtocolError> {
        let packet_type = self.packet_type();
        if let Some(flags) = packet_type.required_flags()
            && raw.flags() != flags
        {
            return Err(ProtocolError::MalformedPacket);
        }
        if raw.remaining_length() != raw.body().len() {
            return Err(ProtocolError::InvalidRemainingLength);
        }
        let payload_len = self.payload_length();
        if self.variable_header_length() + payload_len != raw.remaining_length() {
            return Err(ProtocolError::InvalidRemainingLength);
        }
        if !self.has_payload() && payload_len != 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        // SUBSCRIBE, SUBACK and UNSUBSCRIBE must name at least one topic.
        if matches!(
            packet_type,
            PacketType::Subscribe | PacketType::SubAck | PacketType::Unsubscribe
        ) && payload_len == 0
        {
            return Err(ProtocolError::MalformedPacket);
        }
        if self.has_packet_identifier() && self.packet_identifier() == Some(0) {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(())
    }
}

/// Writes the fixed header for a packet with the given first byte and remaining length.
pub(crate) fn write_fixed_header(
    buf: &mut [u8],
    first_byte: u8,
    remaining_length: usize,
) -> Result<usize, CodecError> {
    let total = 1 + util::variable_byte_integer_len(remaining_length) + remaining_length;
    if buf.len() < total {
        return Err(MqttError::BufferTooSmall);
    }
    buf[0] = first_byte;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[1..], remaining_length)?;
    Ok(1 + len_bytes)
}
