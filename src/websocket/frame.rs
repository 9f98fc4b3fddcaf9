//! Frame header encoding.

use super::{FrameError, MAX_CONTROL_PAYLOAD, OpCode, apply_mask};

/// The fixed part of a frame: everything before the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn new(opcode: OpCode, payload_len: u64) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload_len,
        }
    }

    /// Sets the masking key. Frames sent by a client must be masked.
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Size of the encoded header, picking the shortest length encoding.
    pub fn encoded_len(&self) -> usize {
        let length_bytes = match self.payload_len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        2 + length_bytes + if self.mask.is_some() { 4 } else { 0 }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        if self.opcode.is_control() {
            if !self.fin {
                return Err(FrameError::FragmentedControl);
            }
            if self.payload_len > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlTooLong);
            }
        }
        if self.payload_len >> 63 != 0 {
            return Err(FrameError::LengthOverflow);
        }
        let len = self.encoded_len();
        let out = buf.get_mut(..len).ok_or(FrameError::BufferTooSmall)?;

        out[0] = (self.fin as u8) << 7 | self.opcode as u8;
        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        let mut cursor = 2;
        match self.payload_len {
            0..=125 => out[1] = mask_bit | self.payload_len as u8,
            126..=0xFFFF => {
                out[1] = mask_bit | 126;
                out[2..4].copy_from_slice(&(self.payload_len as u16).to_be_bytes());
                cursor += 2;
            }
            _ => {
                out[1] = mask_bit | 127;
                out[2..10].copy_from_slice(&self.payload_len.to_be_bytes());
                cursor += 8;
            }
        }
        if let Some(key) = self.mask {
            out[cursor..cursor + 4].copy_from_slice(&key);
        }
        Ok(len)
    }
}

/// Writes a complete single frame carrying `payload`, masking it if `mask` is set.
pub fn encode_frame(
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload: &[u8],
    buf: &mut [u8],
) -> Result<usize, FrameError> {
    let mut header = FrameHeader::new(opcode, payload.len() as u64);
    header.mask = mask;
    let header_len = header.encode(buf)?;
    let total = header_len + payload.len();
    let body = buf
        .get_mut(header_len..total)
        .ok_or(FrameError::BufferTooSmall)?;
    body.copy_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(key, 0, body);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_unmasked_text() {
        let mut buf = [0u8; 16];
        let len = encode_frame(OpCode::Text, None, b"Hello", &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_masked_text_matches_rfc_example() {
        // RFC 6455 §5.7
        let mut buf = [0u8; 16];
        let len =
            encode_frame(OpCode::Text, Some([0x37, 0xFA, 0x21, 0x3D]), b"Hello", &mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            &[0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58]
        );
    }

    #[test]
    fn test_length_encodings() {
        let mut buf = [0u8; 16];
        let len = FrameHeader::new(OpCode::Binary, 256).encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x82, 0x7E, 0x01, 0x00]);

        let len = FrameHeader::new(OpCode::Binary, 65_536)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(
            &buf[..len],
            &[0x82, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_control_frame_rules() {
        let mut buf = [0u8; 16];
        assert_eq!(
            FrameHeader::new(OpCode::Ping, 126).encode(&mut buf),
            Err(FrameError::ControlTooLong)
        );
        assert_eq!(
            FrameHeader::new(OpCode::Close, 2)
                .with_fin(false)
                .encode(&mut buf),
            Err(FrameError::FragmentedControl)
        );
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_frame(OpCode::Text, None, b"Hello", &mut buf),
            Err(FrameError::BufferTooSmall)
        );
    }
}
