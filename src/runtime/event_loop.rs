//! The runtime task body: one client, fed and drained through the queue fabric.

use core::future::{pending, poll_fn};

use heapless::Vec;

use super::publisher::{MqttData, OwnedPublishRequest};
use super::registry::TopicRegistry;
use crate::client::{MqttClient, MqttEvent};
use crate::error::MqttError;
use crate::ipc::{Publisher, Queue};
use crate::packet::{MAX_TOPICS_PER_PACKET, QoS, SubscribeReturnCode};
use crate::transport::MqttTransport;

type RuntimeError<T> = MqttError<<T as MqttTransport>::Error>;

/// Drives an [`MqttClient`] on behalf of other tasks.
///
/// After connecting it subscribes every topic in the [`TopicRegistry`]. From then on
/// inbound messages are copied into [`MqttData`] and broadcast through `inbound`,
/// and publish requests pushed into `outbound` are sent in FIFO order. The runtime
/// never waits on a subscriber; a full subscriber queue loses that message.
///
/// ```ignore
/// static OUTBOX: Queue<OwnedPublishRequest<64, 256>, 4> = Queue::new();
/// static INBOX: Queue<MqttData<64, 256>, 4> = Queue::new();
/// static MESSAGES: Publisher<MqttData<64, 256>, 2> = Publisher::new();
///
/// let _link = Link::new(&MESSAGES, &INBOX)?;
/// let mut runtime = MqttRuntime::new(client, topics, &MESSAGES, &OUTBOX);
/// runtime.run().await?;
/// ```
pub struct MqttRuntime<
    'r,
    'q,
    T,
    const INFLIGHT: usize,
    const BUF_SIZE: usize,
    const MAX_TOPICS: usize,
    const TOPIC_SIZE: usize,
    const PAYLOAD_SIZE: usize,
    const OUTBOX: usize,
    const SUBS: usize,
> {
    client: MqttClient<'r, T, INFLIGHT, BUF_SIZE>,
    topics: TopicRegistry<MAX_TOPICS>,
    inbound: &'r Publisher<'q, MqttData<TOPIC_SIZE, PAYLOAD_SIZE>, SUBS>,
    outbound: &'r Queue<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, OUTBOX>,
}

impl<
    'r,
    'q,
    T,
    const INFLIGHT: usize,
    const BUF_SIZE: usize,
    const MAX_TOPICS: usize,
    const TOPIC_SIZE: usize,
    const PAYLOAD_SIZE: usize,
    const OUTBOX: usize,
    const SUBS: usize,
> MqttRuntime<'r, 'q, T, INFLIGHT, BUF_SIZE, MAX_TOPICS, TOPIC_SIZE, PAYLOAD_SIZE, OUTBOX, SUBS>
where
    T: MqttTransport,
{
    pub fn new(
        client: MqttClient<'r, T, INFLIGHT, BUF_SIZE>,
        topics: TopicRegistry<MAX_TOPICS>,
        inbound: &'r Publisher<'q, MqttData<TOPIC_SIZE, PAYLOAD_SIZE>, SUBS>,
        outbound: &'r Queue<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, OUTBOX>,
    ) -> Self {
        Self {
            client,
            topics,
            inbound,
            outbound,
        }
    }

    pub fn client(&self) -> &MqttClient<'r, T, INFLIGHT, BUF_SIZE> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut MqttClient<'r, T, INFLIGHT, BUF_SIZE> {
        &mut self.client
    }

    pub fn into_client(self) -> MqttClient<'r, T, INFLIGHT, BUF_SIZE> {
        self.client
    }

    /// Connects, subscribes and then serves both directions until the connection fails.
    pub async fn run(&mut self) -> Result<(), RuntimeError<T>> {
        self.start().await?;
        loop {
            self.step().await?;
        }
    }

    /// Connects and subscribes every registered topic.
    pub async fn start(&mut self) -> Result<(), RuntimeError<T>> {
        let session_present = self.client.connect().await?;
        info!(
            "MQTT runtime started, {} topics, session present: {}",
            self.topics.len(),
            session_present
        );
        self.subscribe_all().await
    }

    /// Subscribes in batches of [`MAX_TOPICS_PER_PACKET`], one SUBSCRIBE in flight at
    /// a time, so any number of topics fits the acknowledgement table.
    async fn subscribe_all(&mut self) -> Result<(), RuntimeError<T>> {
        let mut batch: Vec<(&str, QoS), MAX_TOPICS_PER_PACKET> = Vec::new();
        let mut topics = self.topics.iter().peekable();
        while let Some(topic) = topics.next() {
            let _ = batch.push(topic);
            if batch.is_full() || topics.peek().is_none() {
                let packet_id = self.client.subscribe_many(&batch).await?;
                batch.clear();
                Self::await_suback(&mut self.client, self.inbound, packet_id).await?;
            }
        }
        Ok(())
    }

    /// Polls until the SUBACK for `packet_id`, forwarding whatever else arrives.
    async fn await_suback(
        client: &mut MqttClient<'r, T, INFLIGHT, BUF_SIZE>,
        inbound: &Publisher<'q, MqttData<TOPIC_SIZE, PAYLOAD_SIZE>, SUBS>,
        packet_id: u16,
    ) -> Result<(), RuntimeError<T>> {
        loop {
            let event = client.poll().await?;
            let acked = matches!(event, MqttEvent::Subscribed { packet_id: id, .. } if id == packet_id);
            Self::dispatch(inbound, event);
            if acked {
                return Ok(());
            }
        }
    }

    /// Sends queued publish requests, then waits for one client event or a new request.
    pub async fn step(&mut self) -> Result<(), RuntimeError<T>> {
        while self.has_inflight_room() {
            let Some(request) = self.outbound.pop() else {
                break;
            };
            self.send_request(&request).await?;
        }

        let outbound = self.outbound;
        let event = if self.has_inflight_room() {
            self.client
                .poll_until(poll_fn(|cx| outbound.poll_ready(cx)))
                .await?
        } else {
            // requests wait for acknowledgements to free a slot
            self.client.poll_until(pending::<()>()).await?
        };

        if let Some(event) = event {
            Self::dispatch(self.inbound, event);
        }
        Ok(())
    }

    fn dispatch(
        inbound: &Publisher<'q, MqttData<TOPIC_SIZE, PAYLOAD_SIZE>, SUBS>,
        event: MqttEvent<'_>,
    ) {
        match event {
            MqttEvent::Message(publish) => match MqttData::from_publish(&publish) {
                Some(data) => {
                    inbound.publish(data);
                }
                None => warn!(
                    "Dropping message on {}: {} bytes don't fit",
                    publish.topic,
                    publish.payload.len()
                ),
            },
            MqttEvent::Subscribed {
                packet_id,
                return_codes,
            } => {
                if return_codes.contains(&SubscribeReturnCode::Failure) {
                    warn!("Broker refused part of subscription {}", packet_id);
                }
            }
            MqttEvent::PublishFailed { packet_id } => {
                warn!("Publish {} was not delivered", packet_id);
            }
            MqttEvent::Published { .. } | MqttEvent::Unsubscribed { .. } => {}
        }
    }

    fn has_inflight_room(&self) -> bool {
        self.client.session().inflight_len() < INFLIGHT
    }

    async fn send_request(
        &mut self,
        request: &OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>,
    ) -> Result<(), RuntimeError<T>> {
        match self.client.publish_packet(&request.as_publish()).await {
            Ok(_) => Ok(()),
            Err(MqttError::BufferTooSmall) => {
                warn!("Publish to {} exceeds the packet buffer", request.topic.as_str());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
