//! Classification and validation of received packets.

use super::{Packet, PacketType, RawPacket};

/// Turns a fully received packet into a typed, validated [`Packet`].
///
/// Anything the decoder can't make sense of is dropped and logged; whether that
/// should end the connection is the caller's decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketDecoder;

impl PacketDecoder {
    /// Decodes one complete packet from `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Packet<'_>> {
        match RawPacket::new(bytes) {
            Ok(raw) => Self::decode_packet(&raw),
            Err(_) => {
                warn!("Dropping packet with unreadable fixed header");
                None
            }
        }
    }

    /// Maps the type tag of `raw` to its variant, builds the view over the same bytes
    /// and validates it.
    pub fn decode_packet<'a>(raw: &RawPacket<'a>) -> Option<Packet<'a>> {
        let packet_type = match PacketType::try_from(raw.type_tag()) {
            Ok(packet_type) => packet_type,
            Err(_) => {
                warn!("Dropping packet with reserved type {}", raw.type_tag());
                return None;
            }
        };

        let packet = match Packet::from_raw(packet_type, raw) {
            Ok(packet) => packet,
            Err(_) => {
                warn!("Dropping malformed {:?}", packet_type);
                return None;
            }
        };

        debug!(
            "Incoming {:?}: flags={} remaining_length={} id={:?}",
            packet_type,
            raw.flags(),
            raw.remaining_length(),
            packet.packet_identifier()
        );

        match packet.validate_packet(raw) {
            Ok(()) => Some(packet),
            Err(e) => {
                warn!("Invalid {:?}: {:?}", packet_type, e);
                None
            }
        }
    }
}
