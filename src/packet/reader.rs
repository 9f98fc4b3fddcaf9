//! Reassembly of complete control packets from a byte stream.
//!
//! Transport reads land at arbitrary boundaries: half a fixed header, one packet and a
//! bit, three packets at once. [`PacketReader`] buffers them, works out from the
//! remaining-length varint how much of the current packet is still missing and hands
//! out exactly one complete packet at a time.

use super::RawPacket;
use crate::error::{CodecError, MqttError, ProtocolError};
use crate::util::{self, VarInt};

/// Fixed-capacity stream buffer yielding one [`RawPacket`] at a time.
///
/// `N` bounds the largest packet that can be received. A fixed header declaring a
/// bigger packet is a protocol error; the stream can't be resynchronised after it.
pub struct PacketReader<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for PacketReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PacketReader<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    /// Total size of the packet at the front of the buffer, once its fixed header is in.
    fn frame_len(&self) -> Result<Option<usize>, CodecError> {
        if self.len < 2 {
            return Ok(None);
        }
        match util::peek_variable_byte_integer(&self.buf[1..self.len])? {
            VarInt::Incomplete => Ok(None),
            VarInt::Complete { value, len } => {
                let total = 1 + len + value;
                if total > N {
                    warn!("Packet of {} bytes exceeds the {} byte buffer", total, N);
                    return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
                }
                Ok(Some(total))
            }
        }
    }

    /// Bytes still missing before the front packet is complete; `0` when it is.
    ///
    /// While the fixed header is incomplete this is the minimum needed to make
    /// progress, not the final amount.
    pub fn wanted_amount(&self) -> Result<usize, CodecError> {
        Ok(match self.frame_len()? {
            Some(total) => total.saturating_sub(self.len),
            None if self.len == 0 => 2,
            None => 1,
        })
    }

    /// Free space after the buffered bytes, for reading straight from a transport.
    /// Follow up with [`commit`](Self::commit).
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Marks `n` bytes written into [`space`](Self::space) as received.
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(N);
    }

    /// Copies as much of `data` as fits and returns how many bytes were taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let space = self.space();
        let n = data.len().min(space.len());
        space[..n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// The packet at the front of the buffer, if all of it has arrived.
    pub fn next_packet(&self) -> Result<Option<RawPacket<'_>>, CodecError> {
        match self.frame_len()? {
            Some(total) if total <= self.len => RawPacket::new(&self.buf[..total]).map(Some),
            _ => Ok(None),
        }
    }

    /// Drops the front packet and moves any bytes of the following ones forward.
    /// Does nothing while the front packet is incomplete.
    pub fn consume(&mut self) {
        if let Ok(Some(total)) = self.frame_len()
            && total <= self.len
        {
            self.buf.copy_within(total..self.len, 0);
            self.len -= total;
        }
    }

    /// Number of bytes held, across however many packets.
    pub fn buffered(&self) -> usize {
        self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
