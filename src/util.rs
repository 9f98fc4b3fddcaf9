//! # MQTT Serialization Utilities
//!
//! Helpers for reading and writing MQTT-specific data types from and to byte buffers:
//! variable-byte integers, big-endian `u16` fields and length-prefixed strings.
//! Every read is bounds-checked and reports a malformed packet instead of panicking.

use crate::error::{CodecError, MqttError, ProtocolError};

/// Largest value a four byte variable-byte integer can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Outcome of trying to read a variable-byte integer from a partial buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarInt {
    /// The integer was fully read; `len` is the number of bytes it occupied.
    Complete { value: usize, len: usize },
    /// More bytes are needed before the integer can be read.
    Incomplete,
}

/// Reads a variable-byte integer starting at `buf[0]` without assuming the buffer
/// holds all of it.
pub fn peek_variable_byte_integer(buf: &[u8]) -> Result<VarInt, CodecError> {
    let mut multiplier = 1;
    let mut value = 0;
    for (i, encoded_byte) in buf.iter().enumerate() {
        if i >= 4 {
            break;
        }
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            return Ok(VarInt::Complete { value, len: i + 1 });
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        Err(MqttError::Protocol(ProtocolError::MalformedPacket))
    } else {
        Ok(VarInt::Incomplete)
    }
}

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is a common encoding scheme in MQTT for packet lengths.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> Result<usize, CodecError> {
    let rest = buf
        .get(*cursor..)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    match peek_variable_byte_integer(rest)? {
        VarInt::Complete { value, len } => {
            *cursor += len;
            Ok(value)
        }
        VarInt::Incomplete => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
    }
}

/// Number of bytes `val` occupies as a variable-byte integer.
pub fn variable_byte_integer_len(val: usize) -> usize {
    match val {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Writes a variable-byte integer to the start of `buf`, returning the byte count.
pub fn write_variable_byte_integer_len(buf: &mut [u8], mut val: usize) -> Result<usize, CodecError> {
    if val > MAX_REMAINING_LENGTH {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, CodecError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a length-prefixed byte string, advancing the cursor.
pub fn read_binary<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = read_u16(cursor, buf)? as usize;
    let data = buf
        .get(*cursor..*cursor + len)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += len;
    Ok(data)
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, CodecError> {
    let bytes = read_binary(cursor, buf)?;
    core::str::from_utf8(bytes).map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))
}

/// Writes a length-prefixed byte string to the start of `buf`.
pub fn write_binary(buf: &mut [u8], data: &[u8]) -> Result<usize, CodecError> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&(len as u16).to_be_bytes());
    slice[2..].copy_from_slice(data);
    Ok(required_space)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, CodecError> {
    write_binary(buf, s.as_bytes())
}
