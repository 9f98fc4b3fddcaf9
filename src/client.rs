//! # Async MQTT Client
//!
//! [`MqttClient`] drives a [`Session`] over an [`MqttTransport`]: it reassembles
//! packets from transport reads, decodes them, sends the acknowledgements the session
//! asks for and runs retransmission and keep-alive timers while it waits for data.
//!
//! QoS 1/2 publishes don't wait for their handshake. [`MqttClient::publish`] returns
//! the packet identifier and completion shows up later from [`MqttClient::poll`] as
//! [`MqttEvent::Published`] or [`MqttEvent::PublishFailed`].
//!
//! ```ignore
//! let options = MqttOptions::new("sensor-42").with_keep_alive(Duration::from_secs(15));
//! let mut client = MqttClient::<_, 4, 1024>::new(transport, options);
//! client.connect().await?;
//! client.subscribe("sensor/42/cmd", QoS::AtLeastOnce).await?;
//! loop {
//!     if let MqttEvent::Message(msg) = client.poll().await? {
//!         handle(msg.topic, msg.payload);
//!     }
//! }
//! ```

use core::future::{Future, pending};
use core::mem;
use core::pin::pin;

use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use heapless::Vec;

use crate::error::{MqttError, ProtocolError};
use crate::packet::{
    Connect, LastWill, MAX_TOPICS_PER_PACKET, Packet, PacketDecoder, PacketReader, PacketType,
    Publish, QoS, SubscribeReturnCode,
};
use crate::session::{Session, SessionConfig, SessionEvent, TickAction};
use crate::transport::MqttTransport;

type ClientError<T> = MqttError<<T as MqttTransport>::Error>;

/// Connection options, built up from [`MqttOptions::new`].
#[derive(Debug, Clone)]
pub struct MqttOptions<'a> {
    client_id: &'a str,
    keep_alive: Duration,
    clean_session: bool,
    username: Option<&'a str>,
    password: Option<&'a [u8]>,
    will: Option<LastWill<'a>>,
    retransmit_timeout: Duration,
    max_retries: u8,
    connect_timeout: Duration,
}

impl<'a> MqttOptions<'a> {
    /// Options with a 60 s keep-alive, a clean session and the default retry policy.
    pub fn new(client_id: &'a str) -> Self {
        let session = SessionConfig::default();
        Self {
            client_id,
            keep_alive: session.keep_alive,
            clean_session: true,
            username: None,
            password: None,
            will: None,
            retransmit_timeout: session.retransmit_timeout,
            max_retries: session.max_retries,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Keep-alive interval, sent to the broker in whole seconds. Zero disables it.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_credentials(mut self, username: &'a str, password: &'a [u8]) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// With `false` the broker keeps subscriptions and in-flight messages across
    /// reconnects, and unacknowledged publishes are sent again after CONNACK.
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_last_will(mut self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) -> Self {
        self.will = Some(LastWill {
            topic,
            payload,
            qos,
            retain,
        });
        self
    }

    /// How long to wait for PUBACK, PUBREC or PUBCOMP before sending again.
    pub fn with_retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit_timeout = timeout;
        self
    }

    /// Retransmissions allowed before a publish is reported failed.
    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// How long [`MqttClient::connect`] waits for CONNACK.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn client_id(&self) -> &'a str {
        self.client_id
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            keep_alive: self.keep_alive,
            retransmit_timeout: self.retransmit_timeout,
            max_retries: self.max_retries,
        }
    }

    fn connect_packet(&self) -> Connect<'a> {
        let keep_alive = self.keep_alive.as_secs().min(u64::from(u16::MAX)) as u16;
        let mut connect = Connect::new(self.client_id, keep_alive, self.clean_session);
        connect.will = self.will;
        connect.username = self.username;
        connect.password = self.password;
        connect
    }
}

/// What [`MqttClient::poll`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent<'a> {
    /// An application message, borrowed from the client's receive buffer.
    Message(Publish<'a>),
    Published {
        packet_id: u16,
    },
    /// Retries ran out, or the broker dropped the session holding the publish.
    PublishFailed {
        packet_id: u16,
    },
    Subscribed {
        packet_id: u16,
        return_codes: Vec<SubscribeReturnCode, MAX_TOPICS_PER_PACKET>,
    },
    Unsubscribed {
        packet_id: u16,
    },
}

/// Outcome of handling one packet, with nothing borrowed from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ready {
    Connected(bool),
    /// The PUBLISH is still at the front of the reader.
    Message,
    Published(u16),
    PublishFailed(u16),
    Subscribed(u16, Vec<SubscribeReturnCode, MAX_TOPICS_PER_PACKET>),
    Unsubscribed(u16),
}

impl Ready {
    fn from_event(event: SessionEvent<'_>) -> Option<Self> {
        match event {
            SessionEvent::Connected { session_present } => Some(Ready::Connected(session_present)),
            SessionEvent::Message(_) => Some(Ready::Message),
            SessionEvent::Published { packet_id } => Some(Ready::Published(packet_id)),
            SessionEvent::Subscribed {
                packet_id,
                return_codes,
            } => Some(Ready::Subscribed(packet_id, return_codes)),
            SessionEvent::Unsubscribed { packet_id } => Some(Ready::Unsubscribed(packet_id)),
            SessionEvent::Pong => None,
        }
    }
}

/// MQTT 3.1.1 client.
///
/// - `INFLIGHT`: outbound QoS 1/2 publishes in flight at once, and likewise inbound
///   QoS 2 publishes awaiting PUBREL.
/// - `BUF_SIZE`: largest packet sent or received.
pub struct MqttClient<'a, T, const INFLIGHT: usize, const BUF_SIZE: usize> {
    transport: T,
    options: MqttOptions<'a>,
    session: Session<INFLIGHT, INFLIGHT, BUF_SIZE>,
    reader: PacketReader<BUF_SIZE>,
    tx: [u8; BUF_SIZE],
    /// The front packet backs the last returned event; drop it before reading on.
    release_pending: bool,
}

impl<'a, T, const INFLIGHT: usize, const BUF_SIZE: usize> MqttClient<'a, T, INFLIGHT, BUF_SIZE>
where
    T: MqttTransport,
{
    pub fn new(transport: T, options: MqttOptions<'a>) -> Self {
        Self {
            session: Session::new(options.session_config()),
            transport,
            options,
            reader: PacketReader::new(),
            tx: [0; BUF_SIZE],
            release_pending: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn options(&self) -> &MqttOptions<'a> {
        &self.options
    }

    pub fn session(&self) -> &Session<INFLIGHT, INFLIGHT, BUF_SIZE> {
        &self.session
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends CONNECT and waits for CONNACK. Returns whether the broker resumed an
    /// earlier session.
    pub async fn connect(&mut self) -> Result<bool, ClientError<T>> {
        self.reader.clear();
        self.release_pending = false;

        let connect = self.options.connect_packet();
        let len = self
            .session
            .connect(&connect, Instant::now(), &mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.send_tx(len).await?;
        debug!("CONNECT sent as {}", self.options.client_id);

        match with_timeout(self.options.connect_timeout, self.await_connack()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No CONNACK within {} ms", self.options.connect_timeout.as_millis());
                self.session.connection_lost();
                Err(MqttError::Timeout)
            }
        }
    }

    async fn await_connack(&mut self) -> Result<bool, ClientError<T>> {
        loop {
            self.fill_reader().await?;
            if let Some(Some(Ready::Connected(session_present))) = self.process_packet().await? {
                info!("Connected, session present: {}", session_present);
                return Ok(session_present);
            }
        }
    }

    /// Publishes `payload` to `topic`. Returns the packet identifier for QoS 1/2.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<Option<u16>, ClientError<T>> {
        self.publish_packet(&Publish::new(topic, payload, qos)).await
    }

    /// Publishes a prepared message, honouring its `retain` flag.
    pub async fn publish_packet(&mut self, publish: &Publish<'_>) -> Result<Option<u16>, ClientError<T>> {
        let (len, packet_id) = self
            .session
            .publish(publish, Instant::now(), &mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.send_tx(len).await?;
        trace!("PUBLISH {} ({} bytes) id={:?}", publish.topic, publish.payload.len(), packet_id);
        Ok(packet_id)
    }

    /// Publishes a QoS 1/2 message under a caller-chosen identifier.
    ///
    /// Fails with [`MqttError::PacketIdInUse`] while that identifier is still in flight.
    pub async fn publish_with_id(
        &mut self,
        publish: &Publish<'_>,
        packet_id: u16,
    ) -> Result<(), ClientError<T>> {
        let len = self
            .session
            .publish_with_id(publish, packet_id, Instant::now(), &mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.send_tx(len).await
    }

    /// Subscribes to one topic filter. The SUBACK arrives through [`poll`](Self::poll).
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, ClientError<T>> {
        self.subscribe_many(&[(topic, qos)]).await
    }

    /// Subscribes to up to [`MAX_TOPICS_PER_PACKET`] filters in one SUBSCRIBE.
    pub async fn subscribe_many(&mut self, topics: &[(&str, QoS)]) -> Result<u16, ClientError<T>> {
        let (len, packet_id) = self
            .session
            .subscribe(topics, Instant::now(), &mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.send_tx(len).await?;
        debug!("SUBSCRIBE id={} ({} filters)", packet_id, topics.len());
        Ok(packet_id)
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<u16, ClientError<T>> {
        let (len, packet_id) = self
            .session
            .unsubscribe(&[topic], Instant::now(), &mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.send_tx(len).await?;
        Ok(packet_id)
    }

    /// Sends DISCONNECT. In-flight publishes stay queued for a resumed session.
    pub async fn disconnect(&mut self) -> Result<(), ClientError<T>> {
        let len = self
            .session
            .disconnect(&mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        self.transport
            .send(&self.tx[..len])
            .await
            .map_err(MqttError::Transport)?;
        info!("Disconnected");
        Ok(())
    }

    /// Waits for the next event, sending acknowledgements, retransmissions and
    /// keep-alive pings along the way.
    pub async fn poll(&mut self) -> Result<MqttEvent<'_>, ClientError<T>> {
        let ready = loop {
            if let Some(ready) = self.next_ready(pending::<()>()).await? {
                break ready;
            }
        };
        self.event_for(ready)
    }

    /// Like [`poll`](Self::poll), but gives up with `None` once `wake` completes.
    ///
    /// `wake` only races the wait for incoming data, so a packet is never half sent
    /// when it fires.
    pub async fn poll_until<W: Future>(&mut self, wake: W) -> Result<Option<MqttEvent<'_>>, ClientError<T>> {
        match self.next_ready(wake).await? {
            Some(ready) => self.event_for(ready).map(Some),
            None => Ok(None),
        }
    }

    async fn next_ready<W: Future>(&mut self, wake: W) -> Result<Option<Ready>, ClientError<T>> {
        self.release();
        if !self.session.is_connected() {
            return Err(MqttError::NotConnected);
        }
        let mut wake = pin!(wake);
        loop {
            if let Some(ready) = self.run_timers().await? {
                return Ok(Some(ready));
            }
            match self.process_packet().await? {
                Some(Some(Ready::Connected(_))) | Some(None) => continue,
                Some(Some(ready)) => return Ok(Some(ready)),
                None => {}
            }

            let wanted = match self.reader.wanted_amount() {
                Ok(wanted) => wanted,
                Err(e) => return Err(self.stream_lost(MqttError::cast_transport_error(e))),
            };
            let deadline = self.session.next_deadline().unwrap_or(Instant::MAX);
            let space = self.reader.space();
            let len = wanted.min(space.len());
            let received = select3(
                self.transport.recv(&mut space[..len]),
                Timer::at(deadline),
                wake.as_mut(),
            )
            .await;
            match received {
                Either3::First(Ok(0)) => {
                    return Err(self.stream_lost(ProtocolError::ConnectionClosed.into()));
                }
                Either3::First(Ok(n)) => self.reader.commit(n),
                // an idle read timing out only means the timers get a turn
                Either3::First(Err(e)) if T::is_timeout(&e) => {}
                Either3::First(Err(e)) => return Err(self.stream_lost(MqttError::Transport(e))),
                Either3::Second(()) => {}
                Either3::Third(_) => return Ok(None),
            }
        }
    }

    fn event_for(&mut self, ready: Ready) -> Result<MqttEvent<'_>, ClientError<T>> {
        Ok(match ready {
            Ready::Message => {
                self.release_pending = true;
                let raw = self
                    .reader
                    .next_packet()
                    .map_err(MqttError::cast_transport_error)?
                    .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
                // already validated when it was handled
                match Packet::from_raw(PacketType::Publish, &raw) {
                    Ok(Packet::Publish(publish)) => MqttEvent::Message(publish),
                    _ => return Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
                }
            }
            Ready::Published(packet_id) => MqttEvent::Published { packet_id },
            Ready::PublishFailed(packet_id) => MqttEvent::PublishFailed { packet_id },
            Ready::Subscribed(packet_id, return_codes) => MqttEvent::Subscribed {
                packet_id,
                return_codes,
            },
            Ready::Unsubscribed(packet_id) => MqttEvent::Unsubscribed { packet_id },
            Ready::Connected(_) => return Err(MqttError::Protocol(ProtocolError::UnexpectedPacket)),
        })
    }

    /// Sends everything the session's timers have due.
    async fn run_timers(&mut self) -> Result<Option<Ready>, ClientError<T>> {
        loop {
            let action = match self.session.handle_tick(Instant::now(), &mut self.tx) {
                Ok(action) => action,
                Err(e) => {
                    self.session.connection_lost();
                    return Err(MqttError::cast_transport_error(e));
                }
            };
            match action {
                None => return Ok(None),
                Some(TickAction::Resend { len, .. }) | Some(TickAction::PingRequest { len }) => {
                    self.send_tx(len).await?
                }
                Some(TickAction::PublishFailed { packet_id }) => {
                    return Ok(Some(Ready::PublishFailed(packet_id)));
                }
            }
        }
    }

    /// Handles the packet at the front of the reader, if it is complete.
    ///
    /// `None` means there was no complete packet. A handled PUBLISH that must reach
    /// the application stays buffered until the next read.
    async fn process_packet(&mut self) -> Result<Option<Option<Ready>>, ClientError<T>> {
        let raw = match self.reader.next_packet() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.session.connection_lost();
                return Err(MqttError::cast_transport_error(e));
            }
        };
        let Some(packet) = PacketDecoder::decode_packet(&raw) else {
            self.reader.consume();
            return Ok(Some(None));
        };

        let incoming = match self.session.handle_packet(packet, Instant::now(), &mut self.tx) {
            Ok(incoming) => incoming,
            Err(e) => {
                self.session.connection_lost();
                return Err(MqttError::cast_transport_error(e));
            }
        };
        let reply = incoming.reply;
        let ready = incoming.event.and_then(Ready::from_event);

        if ready == Some(Ready::Message) {
            self.release_pending = true;
        } else {
            self.reader.consume();
        }
        if let Some(len) = reply {
            self.send_tx(len).await?;
        }
        Ok(Some(ready))
    }

    /// Reads until the front packet is complete. Read timeouts are retried; the
    /// caller bounds the whole wait.
    async fn fill_reader(&mut self) -> Result<(), ClientError<T>> {
        self.release();
        loop {
            let wanted = match self.reader.wanted_amount() {
                Ok(0) => return Ok(()),
                Ok(wanted) => wanted,
                Err(e) => return Err(self.stream_lost(MqttError::cast_transport_error(e))),
            };
            let space = self.reader.space();
            let len = wanted.min(space.len());
            let received = self.transport.recv(&mut space[..len]).await;
            match received {
                Ok(0) => return Err(self.stream_lost(ProtocolError::ConnectionClosed.into())),
                Ok(n) => self.reader.commit(n),
                Err(e) if T::is_timeout(&e) => trace!("Read timed out while connecting"),
                Err(e) => return Err(self.stream_lost(MqttError::Transport(e))),
            }
        }
    }

    /// Marks the session down after the stream became unusable and hands `err` back.
    fn stream_lost(&mut self, err: ClientError<T>) -> ClientError<T> {
        self.session.connection_lost();
        err
    }

    fn release(&mut self) {
        if mem::take(&mut self.release_pending) {
            self.reader.consume();
        }
    }

    async fn send_tx(&mut self, len: usize) -> Result<(), ClientError<T>> {
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            warn!("Send of {} bytes failed", len);
            self.session.connection_lost();
            return Err(MqttError::Transport(e));
        }
        Ok(())
    }
}
