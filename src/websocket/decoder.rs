//! Resumable frame decoder.
//!
//! The decoder never needs the whole frame in memory. It asks for the exact number of
//! bytes its current state can use ([`FrameDecoder::wanted_amount`]), accumulates the
//! header across reads and hands out the payload in chunks of at most `CHUNK` bytes,
//! already unmasked. A unit is ready when [`FrameDecoder::is_complete`] reports it:
//! either the frame's payload is fully received or the chunk buffer is full.
//!
//! Typical read loop:
//!
//! ```ignore
//! let mut rest = received;
//! while !rest.is_empty() {
//!     let used = decoder.feed(rest);
//!     rest = &rest[used..];
//!     if decoder.is_error() {
//!         break;
//!     }
//!     if decoder.is_complete() {
//!         handle(decoder.opcode(), decoder.payload());
//!         decoder.consume_unit();
//!     }
//! }
//! ```

use super::{FrameError, MAX_CONTROL_PAYLOAD, OpCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Header,
    ExtendedLength16,
    ExtendedLength64,
    MaskingKey,
    Payload,
}

impl State {
    /// Header bytes this state collects before moving on.
    const fn header_bytes(self) -> usize {
        match self {
            State::Header | State::ExtendedLength16 => 2,
            State::ExtendedLength64 => 8,
            State::MaskingKey => 4,
            State::Payload => 0,
        }
    }
}

pub struct FrameDecoder<const CHUNK: usize> {
    state: State,
    scratch: [u8; 8],
    collected: usize,

    fin: bool,
    opcode: OpCode,
    masked: bool,
    mask_key: [u8; 4],
    payload_length: u64,
    received_payload: u64,

    chunk: [u8; CHUNK],
    in_chunk: usize,
    /// The last unit of the frame was handed out; only [`Self::reset`] moves on.
    drained: bool,
    error: Option<FrameError>,
}

impl<const CHUNK: usize> Default for FrameDecoder<CHUNK> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CHUNK: usize> FrameDecoder<CHUNK> {
    /// A decoder waiting for a frame header. `CHUNK` must be at least one byte:
    ///
    /// ```compile_fail
    /// let decoder = myrtio_netkit::websocket::FrameDecoder::<0>::new();
    /// ```
    pub const fn new() -> Self {
        const { assert!(CHUNK > 0, "FrameDecoder needs a non-empty chunk") };
        Self {
            state: State::Header,
            scratch: [0; 8],
            collected: 0,
            fin: false,
            opcode: OpCode::Continuation,
            masked: false,
            mask_key: [0; 4],
            payload_length: 0,
            received_payload: 0,
            chunk: [0; CHUNK],
            in_chunk: 0,
            drained: false,
            error: None,
        }
    }

    /// Bytes the decoder can take right now without overrunning the current state.
    ///
    /// Zero while a complete unit is waiting or after an error.
    pub fn wanted_amount(&self) -> usize {
        if self.error.is_some() || self.is_complete() || self.drained {
            return 0;
        }
        match self.state {
            State::Payload => {
                let remaining = self.payload_length - self.received_payload;
                let room = (CHUNK - self.in_chunk) as u64;
                remaining.min(room) as usize
            }
            header => header.header_bytes() - self.collected,
        }
    }

    /// Consumes bytes from `data` until a unit is complete, an error is found, or
    /// `data` runs out. Returns how many bytes were used.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let mut used = 0;
        loop {
            let wanted = self.wanted_amount();
            let rest = &data[used..];
            if wanted == 0 || rest.is_empty() {
                break;
            }
            let take = wanted.min(rest.len());
            self.accept(&rest[..take]);
            used += take;
        }
        used
    }

    fn accept(&mut self, bytes: &[u8]) {
        match self.state {
            State::Payload => {
                for &byte in bytes {
                    let key = self.mask_key[(self.received_payload % 4) as usize];
                    self.chunk[self.in_chunk] = if self.masked { byte ^ key } else { byte };
                    self.in_chunk += 1;
                    self.received_payload += 1;
                }
            }
            state => {
                self.scratch[self.collected..self.collected + bytes.len()].copy_from_slice(bytes);
                self.collected += bytes.len();
                if self.collected == state.header_bytes() {
                    self.collected = 0;
                    if let Err(error) = self.finish_state(state) {
                        warn!("WebSocket frame rejected: {:?}", error);
                        self.error = Some(error);
                    }
                }
            }
        }
    }

    fn finish_state(&mut self, state: State) -> Result<(), FrameError> {
        match state {
            State::Header => {
                let [first, second, ..] = self.scratch;
                if first & 0x70 != 0 {
                    return Err(FrameError::ReservedBits);
                }
                self.fin = first & 0x80 != 0;
                self.opcode = OpCode::try_from(first & 0x0F)?;
                self.masked = second & 0x80 != 0;
                let length = second & 0x7F;
                if self.opcode.is_control() {
                    if !self.fin {
                        return Err(FrameError::FragmentedControl);
                    }
                    if u64::from(length) > MAX_CONTROL_PAYLOAD {
                        return Err(FrameError::ControlTooLong);
                    }
                }
                match length {
                    126 => self.state = State::ExtendedLength16,
                    127 => self.state = State::ExtendedLength64,
                    short => {
                        self.payload_length = u64::from(short);
                        self.after_length();
                    }
                }
            }
            State::ExtendedLength16 => {
                self.payload_length = u64::from(u16::from_be_bytes([self.scratch[0], self.scratch[1]]));
                self.after_length();
            }
            State::ExtendedLength64 => {
                let length = u64::from_be_bytes(self.scratch);
                if length >> 63 != 0 {
                    return Err(FrameError::LengthOverflow);
                }
                self.payload_length = length;
                self.after_length();
            }
            State::MaskingKey => {
                self.mask_key.copy_from_slice(&self.scratch[..4]);
                self.state = State::Payload;
            }
            State::Payload => {}
        }
        Ok(())
    }

    fn after_length(&mut self) {
        self.state = if self.masked {
            State::MaskingKey
        } else {
            State::Payload
        };
    }

    /// A unit of payload is ready: the frame is fully received or the chunk is full.
    ///
    /// True once per unit; [`Self::packet_consumed`] or [`Self::reset`] clears it.
    pub fn is_complete(&self) -> bool {
        if self.state != State::Payload || self.drained || self.error.is_some() {
            return false;
        }
        self.received_payload == self.payload_length || self.in_chunk == CHUNK
    }

    /// The whole declared payload has been received.
    pub fn is_frame_done(&self) -> bool {
        self.state == State::Payload && self.received_payload == self.payload_length
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<FrameError> {
        self.error
    }

    /// Unmasked bytes of the current unit.
    pub fn payload(&self) -> &[u8] {
        &self.chunk[..self.in_chunk]
    }

    /// Releases the current unit so the next chunk of the same frame can fill.
    ///
    /// Clears the chunk and any error. Frame header state is kept, so once the last
    /// unit is released the decoder waits for [`Self::reset`].
    pub fn packet_consumed(&mut self) {
        if self.is_frame_done() {
            self.drained = true;
        }
        self.in_chunk = 0;
        self.error = None;
    }

    /// Forgets the current frame and waits for the next header.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Releases the current unit and, if it ended the frame, prepares for the next.
    pub fn consume_unit(&mut self) {
        if self.is_frame_done() {
            self.reset();
        } else {
            self.packet_consumed();
        }
    }

    pub fn fin(&self) -> bool {
        self.fin
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn is_control_frame(&self) -> bool {
        self.opcode.is_control()
    }

    /// The current unit starts at payload offset zero.
    pub fn is_first_part(&self) -> bool {
        self.received_payload == self.in_chunk as u64
    }

    /// The current unit ends the frame's payload.
    pub fn is_last_part(&self) -> bool {
        self.is_frame_done()
    }

    pub fn payload_length(&self) -> u64 {
        self.payload_length
    }

    pub fn received_payload(&self) -> u64 {
        self.received_payload
    }
}
