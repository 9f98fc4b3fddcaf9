//! # MQTT Session State
//!
//! [`Session`] is the sans-IO half of the client. It owns the packet-identifier space,
//! the pending-acknowledgement records for outbound QoS 1/2 publishes, the inbound
//! QoS 2 identifiers awaiting PUBREL, and keep-alive bookkeeping. It never reads a
//! clock or touches a socket: every call takes the current [`Instant`] and a buffer to
//! encode into, and the caller sends whatever bytes it is handed back.
//!
//! Outbound QoS 1: `Sent` until PUBACK. Outbound QoS 2: `Sent` until PUBREC, then
//! `Received` while PUBREL is produced, then `Released` until PUBCOMP. A record that
//! sees no acknowledgement within the retransmit timeout is sent again (PUBLISH with
//! DUP set, or PUBREL) until `max_retries` is used up, at which point the publish is
//! reported failed once and the record is dropped.
//!
//! Time-driven work comes out of [`Session::handle_tick`], one action per call, so the
//! caller loops until it returns `None`.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::error::{CodecError, ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    Ack, ConnAck, Connect, Disconnect, EncodePacket, MAX_TOPICS_PER_PACKET, Packet, PacketType,
    PingReq, Publish, QoS, SubAck, Subscribe, SubscribeReturnCode, Unsubscribe,
};

const DUP_FLAG: u8 = 0x08;

/// Timing parameters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle interval after which a PINGREQ is sent. Zero disables keep-alive.
    pub keep_alive: Duration,
    /// How long to wait for an acknowledgement before sending again.
    pub retransmit_timeout: Duration,
    /// Retransmissions allowed before a publish is reported failed.
    pub max_retries: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            retransmit_timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    /// CONNECT sent, waiting for CONNACK.
    Connecting,
    Connected,
}

/// Where an outbound QoS 1/2 publish is in its acknowledgement handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishStage {
    /// PUBLISH sent, waiting for PUBACK (QoS 1) or PUBREC (QoS 2).
    Sent,
    /// PUBREC received, PUBREL not yet sent.
    Received,
    /// PUBREL sent, waiting for PUBCOMP.
    Released,
}

struct InflightPublish<const P: usize> {
    packet_id: u16,
    qos: QoS,
    stage: PublishStage,
    /// The encoded PUBLISH, kept for retransmission.
    bytes: Vec<u8, P>,
    sent_at: Instant,
    retries: u8,
    /// Set on session resumption; sent again on the next tick regardless of timers.
    resend_now: bool,
    /// Dropped with a session the broker didn't keep; waits to be reported failed.
    lost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Subscribe,
    Unsubscribe,
}

/// Something the session produced from an incoming packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    Connected {
        session_present: bool,
    },
    /// An application message to deliver. Duplicates of an inbound QoS 2 publish
    /// that is still awaiting PUBREL are not reported again.
    Message(Publish<'a>),
    /// An outbound QoS 1/2 publish completed its handshake.
    Published {
        packet_id: u16,
    },
    Subscribed {
        packet_id: u16,
        return_codes: Vec<SubscribeReturnCode, MAX_TOPICS_PER_PACKET>,
    },
    Unsubscribed {
        packet_id: u16,
    },
    Pong,
}

/// Result of [`Session::handle_packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming<'a> {
    /// Length of the acknowledgement written to the output buffer, if one must be sent.
    pub reply: Option<usize>,
    pub event: Option<SessionEvent<'a>>,
}

impl<'a> Incoming<'a> {
    fn none() -> Self {
        Self {
            reply: None,
            event: None,
        }
    }

    fn event(event: SessionEvent<'a>) -> Self {
        Self {
            reply: None,
            event: Some(event),
        }
    }
}

/// Time-driven work produced by [`Session::handle_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickAction {
    /// A PUBLISH (with DUP) or PUBREL of `len` bytes was written to the output buffer.
    Resend { packet_id: u16, len: usize },
    /// A PINGREQ of `len` bytes was written to the output buffer.
    PingRequest { len: usize },
    /// The publish ran out of retries, or was lost with the session. Reported once.
    PublishFailed { packet_id: u16 },
}

/// Client-side MQTT session state machine.
///
/// - `INFLIGHT`: outbound QoS 1/2 publishes awaiting acknowledgement, and separately
///   SUBSCRIBE/UNSUBSCRIBE requests awaiting SUBACK/UNSUBACK.
/// - `INBOUND`: inbound QoS 2 identifiers awaiting PUBREL.
/// - `P`: largest PUBLISH that can be kept for retransmission.
pub struct Session<const INFLIGHT: usize, const INBOUND: usize, const P: usize> {
    config: SessionConfig,
    state: SessionState,
    last_packet_id: u16,
    inflight: Vec<InflightPublish<P>, INFLIGHT>,
    pending: Vec<(u16, PendingKind), INFLIGHT>,
    awaiting_pubrel: Vec<u16, INBOUND>,
    last_sent: Instant,
    ping_sent_at: Option<Instant>,
}

impl<const INFLIGHT: usize, const INBOUND: usize, const P: usize> Session<INFLIGHT, INBOUND, P> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            last_packet_id: 0,
            inflight: Vec::new(),
            pending: Vec::new(),
            awaiting_pubrel: Vec::new(),
            last_sent: Instant::MIN,
            ping_sent_at: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Stage of the outbound publish using `packet_id`, if it is still in flight.
    pub fn publish_stage(&self, packet_id: u16) -> Option<PublishStage> {
        self.inflight
            .iter()
            .find(|r| r.packet_id == packet_id && !r.lost)
            .map(|r| r.stage)
    }

    /// Number of outbound publishes holding a slot, counting lost ones whose failure
    /// hasn't been reported yet.
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// SUBSCRIBE and UNSUBSCRIBE requests still waiting for their acknowledgement.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn ensure_connected(&self) -> Result<(), CodecError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    fn id_in_use(&self, packet_id: u16) -> bool {
        self.inflight.iter().any(|r| r.packet_id == packet_id)
            || self.pending.iter().any(|(id, _)| *id == packet_id)
    }

    /// Allocates the next identifier not owned by any outstanding request.
    fn next_packet_id(&mut self) -> Result<u16, CodecError> {
        for _ in 0..u16::MAX {
            self.last_packet_id = self.last_packet_id.wrapping_add(1);
            if self.last_packet_id == 0 {
                self.last_packet_id = 1;
            }
            if !self.id_in_use(self.last_packet_id) {
                return Ok(self.last_packet_id);
            }
        }
        Err(MqttError::InflightFull)
    }

    fn sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Encodes CONNECT and waits for CONNACK.
    pub fn connect(
        &mut self,
        connect: &Connect<'_>,
        now: Instant,
        out: &mut [u8],
    ) -> Result<usize, CodecError> {
        let len = connect.encode(out)?;
        self.state = SessionState::Connecting;
        self.pending.clear();
        self.ping_sent_at = None;
        self.sent(now);
        Ok(len)
    }

    /// Encodes `publish`, allocating a packet identifier for QoS 1/2.
    ///
    /// Returns the encoded length and the identifier used, if any.
    pub fn publish(
        &mut self,
        publish: &Publish<'_>,
        now: Instant,
        out: &mut [u8],
    ) -> Result<(usize, Option<u16>), CodecError> {
        self.ensure_connected()?;
        if publish.qos == QoS::AtMostOnce {
            let mut packet = *publish;
            packet.packet_id = None;
            packet.dup = false;
            let len = packet.encode(out)?;
            self.sent(now);
            return Ok((len, None));
        }
        if self.inflight.is_full() {
            return Err(MqttError::InflightFull);
        }
        let packet_id = self.next_packet_id()?;
        let len = self.publish_with_id(publish, packet_id, now, out)?;
        Ok((len, Some(packet_id)))
    }

    /// Encodes a QoS 1/2 `publish` under a caller-chosen identifier.
    ///
    /// Fails with [`MqttError::PacketIdInUse`] while an earlier request with the same
    /// identifier is outstanding; the existing record is left untouched.
    pub fn publish_with_id(
        &mut self,
        publish: &Publish<'_>,
        packet_id: u16,
        now: Instant,
        out: &mut [u8],
    ) -> Result<usize, CodecError> {
        self.ensure_connected()?;
        if publish.qos == QoS::AtMostOnce || packet_id == 0 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        if self.id_in_use(packet_id) {
            return Err(MqttError::PacketIdInUse(packet_id));
        }
        if self.inflight.is_full() {
            return Err(MqttError::InflightFull);
        }

        let mut packet = *publish;
        packet.packet_id = Some(packet_id);
        packet.dup = false;
        let len = packet.encode(out)?;

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(&out[..len])
            .map_err(|_| MqttError::BufferTooSmall)?;
        self.inflight
            .push(InflightPublish {
                packet_id,
                qos: packet.qos,
                stage: PublishStage::Sent,
                bytes,
                sent_at: now,
                retries: 0,
                resend_now: false,
                lost: false,
            })
            .map_err(|_| MqttError::InflightFull)?;
        self.sent(now);
        Ok(len)
    }

    /// Encodes a SUBSCRIBE for `topics` and tracks it until SUBACK.
    pub fn subscribe(
        &mut self,
        topics: &[(&str, QoS)],
        now: Instant,
        out: &mut [u8],
    ) -> Result<(usize, u16), CodecError> {
        self.ensure_connected()?;
        if topics.is_empty() {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        if self.pending.is_full() {
            return Err(MqttError::InflightFull);
        }
        let packet_id = self.next_packet_id()?;
        let mut packet = Subscribe::new(packet_id, topics[0].0, topics[0].1);
        for topic in &topics[1..] {
            packet
                .topics
                .push(*topic)
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }
        let len = packet.encode(out)?;
        let _ = self.pending.push((packet_id, PendingKind::Subscribe));
        self.sent(now);
        Ok((len, packet_id))
    }

    /// Encodes an UNSUBSCRIBE for `topics` and tracks it until UNSUBACK.
    pub fn unsubscribe(
        &mut self,
        topics: &[&str],
        now: Instant,
        out: &mut [u8],
    ) -> Result<(usize, u16), CodecError> {
        self.ensure_connected()?;
        if topics.is_empty() {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        if self.pending.is_full() {
            return Err(MqttError::InflightFull);
        }
        let packet_id = self.next_packet_id()?;
        let mut packet = Unsubscribe::new(packet_id, topics[0]);
        for topic in &topics[1..] {
            packet
                .topics
                .push(*topic)
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }
        let len = packet.encode(out)?;
        let _ = self.pending.push((packet_id, PendingKind::Unsubscribe));
        self.sent(now);
        Ok((len, packet_id))
    }

    /// Encodes DISCONNECT. In-flight publishes are kept for a resumed session.
    pub fn disconnect(&mut self, out: &mut [u8]) -> Result<usize, CodecError> {
        let len = Disconnect.encode(out)?;
        self.connection_lost();
        Ok(len)
    }

    /// Marks the connection as gone without sending anything.
    ///
    /// In-flight publishes and inbound QoS 2 state survive until the next CONNACK
    /// says whether the broker kept the session.
    pub fn connection_lost(&mut self) {
        self.state = SessionState::Disconnected;
        self.pending.clear();
        self.ping_sent_at = None;
    }

    /// Applies one decoded packet from the broker.
    ///
    /// Acknowledgements the handshake requires are written to `out` and reported in
    /// [`Incoming::reply`]. Stray acknowledgements are ignored. Packets a broker never
    /// sends to a client are a protocol error, as is a refused CONNACK.
    pub fn handle_packet<'a>(
        &mut self,
        packet: Packet<'a>,
        now: Instant,
        out: &mut [u8],
    ) -> Result<Incoming<'a>, CodecError> {
        let packet_type = packet.packet_type();
        match packet {
            Packet::ConnAck(connack) => self.handle_connack(connack),
            Packet::Publish(publish) => self.handle_publish(publish, out),
            Packet::PubAck(ack) => Ok(self.handle_puback(ack.packet_id)),
            Packet::PubRec(ack) => self.handle_pubrec(ack.packet_id, now, out),
            Packet::PubRel(ack) => {
                if let Some(index) = self.awaiting_pubrel.iter().position(|id| *id == ack.packet_id)
                {
                    self.awaiting_pubrel.swap_remove(index);
                }
                // PUBCOMP is owed even for an identifier we no longer track
                let len = Ack::new(ack.packet_id).encode(PacketType::PubComp, out)?;
                Ok(Incoming {
                    reply: Some(len),
                    event: None,
                })
            }
            Packet::PubComp(ack) => Ok(self.handle_pubcomp(ack.packet_id)),
            Packet::SubAck(suback) => Ok(self.handle_suback(suback)),
            Packet::UnsubAck(ack) => {
                if self.take_pending(ack.packet_id, PendingKind::Unsubscribe) {
                    Ok(Incoming::event(SessionEvent::Unsubscribed {
                        packet_id: ack.packet_id,
                    }))
                } else {
                    debug!("Ignoring stray UNSUBACK {}", ack.packet_id);
                    Ok(Incoming::none())
                }
            }
            Packet::PingResp => {
                self.ping_sent_at = None;
                Ok(Incoming::event(SessionEvent::Pong))
            }
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingReq
            | Packet::Disconnect => {
                warn!("Broker sent {:?}", packet_type);
                Err(MqttError::Protocol(ProtocolError::UnexpectedPacket))
            }
        }
    }

    fn handle_connack<'a>(&mut self, connack: ConnAck) -> Result<Incoming<'a>, CodecError> {
        if self.state != SessionState::Connecting {
            return Err(MqttError::Protocol(ProtocolError::UnexpectedPacket));
        }
        if connack.return_code != ConnectReasonCode::Success {
            self.state = SessionState::Disconnected;
            return Err(MqttError::ConnectionRefused(connack.return_code));
        }
        self.state = SessionState::Connected;

        if connack.session_present {
            for record in self.inflight.iter_mut().filter(|r| !r.lost) {
                record.resend_now = true;
            }
        } else {
            // records stay until handle_tick reports them, so none can go unreported
            for record in self.inflight.iter_mut() {
                record.lost = true;
                record.resend_now = false;
            }
            self.awaiting_pubrel.clear();
        }
        info!(
            "Session established (present: {}, in flight: {})",
            connack.session_present,
            self.inflight.len()
        );
        Ok(Incoming::event(SessionEvent::Connected {
            session_present: connack.session_present,
        }))
    }

    fn handle_publish<'a>(
        &mut self,
        publish: Publish<'a>,
        out: &mut [u8],
    ) -> Result<Incoming<'a>, CodecError> {
        match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => Ok(Incoming::event(SessionEvent::Message(publish))),
            (QoS::AtLeastOnce, Some(id)) => {
                let len = Ack::new(id).encode(PacketType::PubAck, out)?;
                Ok(Incoming {
                    reply: Some(len),
                    event: Some(SessionEvent::Message(publish)),
                })
            }
            (QoS::ExactlyOnce, Some(id)) => {
                let duplicate = self.awaiting_pubrel.contains(&id);
                if !duplicate && self.awaiting_pubrel.push(id).is_err() {
                    // Not acknowledged, so the broker will send it again later.
                    warn!("No room to track inbound QoS 2 publish {}", id);
                    return Ok(Incoming::none());
                }
                let len = Ack::new(id).encode(PacketType::PubRec, out)?;
                if duplicate {
                    debug!("Suppressing duplicate QoS 2 publish {}", id);
                }
                Ok(Incoming {
                    reply: Some(len),
                    event: (!duplicate).then_some(SessionEvent::Message(publish)),
                })
            }
            (_, None) => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }

    fn handle_puback<'a>(&mut self, packet_id: u16) -> Incoming<'a> {
        match self.inflight.iter().position(|r| {
            r.packet_id == packet_id
                && r.qos == QoS::AtLeastOnce
                && r.stage == PublishStage::Sent
                && !r.lost
        }) {
            Some(index) => {
                self.inflight.swap_remove(index);
                Incoming::event(SessionEvent::Published { packet_id })
            }
            None => {
                debug!("Ignoring stray PUBACK {}", packet_id);
                Incoming::none()
            }
        }
    }

    fn handle_pubrec<'a>(
        &mut self,
        packet_id: u16,
        now: Instant,
        out: &mut [u8],
    ) -> Result<Incoming<'a>, CodecError> {
        let Some(record) = self
            .inflight
            .iter_mut()
            .find(|r| r.packet_id == packet_id && r.qos == QoS::ExactlyOnce && !r.lost)
        else {
            debug!("Ignoring stray PUBREC {}", packet_id);
            return Ok(Incoming::none());
        };

        if record.stage == PublishStage::Sent {
            record.stage = PublishStage::Received;
        }
        let len = Ack::new(packet_id).encode(PacketType::PubRel, out)?;
        if record.stage == PublishStage::Received {
            record.stage = PublishStage::Released;
            record.sent_at = now;
            record.retries = 0;
            record.resend_now = false;
        }
        self.sent(now);
        Ok(Incoming {
            reply: Some(len),
            event: None,
        })
    }

    fn handle_pubcomp<'a>(&mut self, packet_id: u16) -> Incoming<'a> {
        match self
            .inflight
            .iter()
            .position(|r| r.packet_id == packet_id && r.stage == PublishStage::Released && !r.lost)
        {
            Some(index) => {
                self.inflight.swap_remove(index);
                Incoming::event(SessionEvent::Published { packet_id })
            }
            None => {
                debug!("Ignoring PUBCOMP {} without outstanding PUBREL", packet_id);
                Incoming::none()
            }
        }
    }

    fn handle_suback<'a>(&mut self, suback: SubAck) -> Incoming<'a> {
        if !self.take_pending(suback.packet_id, PendingKind::Subscribe) {
            debug!("Ignoring stray SUBACK {}", suback.packet_id);
            return Incoming::none();
        }
        if suback
            .return_codes
            .iter()
            .any(|c| *c == SubscribeReturnCode::Failure)
        {
            warn!("Broker rejected a filter of SUBSCRIBE {}", suback.packet_id);
        }
        Incoming::event(SessionEvent::Subscribed {
            packet_id: suback.packet_id,
            return_codes: suback.return_codes,
        })
    }

    fn take_pending(&mut self, packet_id: u16, kind: PendingKind) -> bool {
        match self
            .pending
            .iter()
            .position(|entry| *entry == (packet_id, kind))
        {
            Some(index) => {
                self.pending.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Runs time-driven work due at `now`: failure reports, keep-alive and
    /// retransmissions. Returns at most one action; call again until `None`.
    pub fn handle_tick(
        &mut self,
        now: Instant,
        out: &mut [u8],
    ) -> Result<Option<TickAction>, CodecError> {
        if let Some(index) = self.inflight.iter().position(|r| r.lost) {
            let packet_id = self.inflight.remove(index).packet_id;
            warn!("Publish {} lost with the session", packet_id);
            return Ok(Some(TickAction::PublishFailed { packet_id }));
        }
        if !self.is_connected() {
            return Ok(None);
        }

        let keep_alive = self.config.keep_alive;
        if keep_alive.as_ticks() > 0 {
            match self.ping_sent_at {
                Some(at) if now.saturating_duration_since(at) >= keep_alive => {
                    warn!("No PINGRESP within {} ms", keep_alive.as_millis());
                    return Err(MqttError::Protocol(ProtocolError::KeepAliveTimeout));
                }
                None if now.saturating_duration_since(self.last_sent) >= keep_alive => {
                    let len = PingReq.encode(out)?;
                    self.ping_sent_at = Some(now);
                    self.sent(now);
                    return Ok(Some(TickAction::PingRequest { len }));
                }
                _ => {}
            }
        }

        self.retransmit(now, out)
    }

    fn retransmit(&mut self, now: Instant, out: &mut [u8]) -> Result<Option<TickAction>, CodecError> {
        let timeout = self.config.retransmit_timeout;
        let Some(index) = self
            .inflight
            .iter()
            .position(|r| r.resend_now || now.saturating_duration_since(r.sent_at) >= timeout)
        else {
            return Ok(None);
        };

        let max_retries = self.config.max_retries;
        let record = &mut self.inflight[index];
        let packet_id = record.packet_id;
        if !record.resend_now && record.retries >= max_retries {
            self.inflight.swap_remove(index);
            warn!("Publish {} not acknowledged after {} retries", packet_id, max_retries);
            return Ok(Some(TickAction::PublishFailed { packet_id }));
        }

        // encode first: a failed encode must not use up a retry
        let len = match record.stage {
            PublishStage::Sent => {
                let len = record.bytes.len();
                let target = out.get_mut(..len).ok_or(MqttError::BufferTooSmall)?;
                record.bytes[0] |= DUP_FLAG;
                target.copy_from_slice(&record.bytes);
                len
            }
            PublishStage::Received | PublishStage::Released => {
                let len = Ack::new(packet_id).encode(PacketType::PubRel, out)?;
                record.stage = PublishStage::Released;
                len
            }
        };
        if record.resend_now {
            record.resend_now = false;
        } else {
            record.retries += 1;
        }
        debug!(
            "Retransmitting {} ({:?}, attempt {})",
            packet_id, record.stage, record.retries
        );
        record.sent_at = now;
        self.sent(now);
        Ok(Some(TickAction::Resend { packet_id, len }))
    }

    /// Earliest instant at which [`handle_tick`](Self::handle_tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.inflight.iter().any(|r| r.lost) {
            return Some(Instant::MIN);
        }
        if !self.is_connected() {
            return None;
        }
        if self.inflight.iter().any(|r| r.resend_now) {
            return Some(Instant::MIN);
        }

        let mut next: Option<Instant> = None;
        let mut consider = |at: Instant| next = Some(next.map_or(at, |n| n.min(at)));
        let keep_alive = self.config.keep_alive;
        if keep_alive.as_ticks() > 0 {
            consider(deadline(self.ping_sent_at.unwrap_or(self.last_sent), keep_alive));
        }
        for record in &self.inflight {
            consider(deadline(record.sent_at, self.config.retransmit_timeout));
        }
        next
    }
}

/// `from + after`, pinned to [`Instant::MAX`] when a huge interval would overflow.
fn deadline(from: Instant, after: Duration) -> Instant {
    from.checked_add(after).unwrap_or(Instant::MAX)
}
