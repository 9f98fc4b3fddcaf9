//! Owned messages crossing task boundaries, and the handle other tasks publish with.
//!
//! The client's events borrow its receive buffer, so anything that has to outlive
//! one `poll` call is copied into fixed-size inline storage first.

use embassy_time::Duration;
use heapless::{String, Vec};

use crate::ipc::Queue;
use crate::packet::{Publish, QoS};

/// A request to publish a message, queued by any task and sent by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPublishRequest<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    pub topic: String<TOPIC_SIZE>,
    pub payload: Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
    pub retain: bool,
}

impl<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE> {
    /// Copies `topic` and `payload`. `None` if either doesn't fit.
    pub fn new(topic: &str, payload: &[u8], qos: QoS) -> Option<Self> {
        let mut owned_topic = String::new();
        owned_topic.push_str(topic).ok()?;
        let owned_payload = Vec::from_slice(payload).ok()?;
        Some(Self {
            topic: owned_topic,
            payload: owned_payload,
            qos,
            retain: false,
        })
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Borrowed view for encoding.
    pub fn as_publish(&self) -> Publish<'_> {
        let mut publish = Publish::new(&self.topic, &self.payload, self.qos);
        publish.retain = self.retain;
        publish
    }
}

/// An inbound application message, copied out of the client's receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttData<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    pub topic: String<TOPIC_SIZE>,
    pub payload: Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
    pub retain: bool,
}

impl<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> MqttData<TOPIC_SIZE, PAYLOAD_SIZE> {
    /// Copies `publish`. `None` if its topic or payload doesn't fit.
    pub fn from_publish(publish: &Publish<'_>) -> Option<Self> {
        let mut topic = String::new();
        topic.push_str(publish.topic).ok()?;
        let payload = Vec::from_slice(publish.payload).ok()?;
        Some(Self {
            topic,
            payload,
            qos: publish.qos,
            retain: publish.retain,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Lets any task publish through the runtime without access to the client.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'q, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize, const DEPTH: usize> {
    queue: &'q Queue<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, DEPTH>,
}

impl<'q, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize, const DEPTH: usize>
    PublisherHandle<'q, TOPIC_SIZE, PAYLOAD_SIZE, DEPTH>
{
    pub fn new(queue: &'q Queue<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, DEPTH>) -> Self {
        Self { queue }
    }

    /// Queues a publish without waiting.
    ///
    /// Returns `false` if the queue is full or the message doesn't fit a request.
    pub fn try_publish(&self, topic: &str, payload: &[u8], qos: QoS) -> bool {
        match OwnedPublishRequest::new(topic, payload, qos) {
            Some(request) => self.queue.try_push(request).is_ok(),
            None => {
                warn!("Publish to {} doesn't fit a request", topic);
                false
            }
        }
    }

    /// Queues a publish, waiting up to `timeout` for room.
    pub async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, timeout: Duration) -> bool {
        self.send(OwnedPublishRequest::new(topic, payload, qos), timeout)
            .await
    }

    /// Like [`publish`](Self::publish), with the retain flag set.
    pub async fn publish_retained(&self, topic: &str, payload: &[u8], qos: QoS, timeout: Duration) -> bool {
        let request = OwnedPublishRequest::new(topic, payload, qos).map(|r| r.with_retain(true));
        self.send(request, timeout).await
    }

    async fn send(
        &self,
        request: Option<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>>,
        timeout: Duration,
    ) -> bool {
        match request {
            Some(request) => self.queue.push_timeout(request, timeout).await.is_ok(),
            None => {
                warn!("Publish request doesn't fit");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_request_rejects_oversized_parts() {
        assert!(OwnedPublishRequest::<4, 4>::new("abcde", b"x", QoS::AtMostOnce).is_none());
        assert!(OwnedPublishRequest::<8, 2>::new("a", b"xyz", QoS::AtMostOnce).is_none());
        let request = OwnedPublishRequest::<8, 8>::new("a/b", b"on", QoS::AtLeastOnce)
            .unwrap()
            .with_retain(true);
        let publish = request.as_publish();
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.payload, b"on");
        assert!(publish.retain);
    }

    #[test]
    fn test_data_copies_publish() {
        let mut publish = Publish::new("light/set", b"{\"on\":true}", QoS::AtLeastOnce);
        publish.retain = true;
        let data = MqttData::<16, 32>::from_publish(&publish).unwrap();
        assert_eq!(data.topic(), "light/set");
        assert_eq!(data.payload(), b"{\"on\":true}");
        assert!(data.retain);
        assert!(MqttData::<4, 32>::from_publish(&publish).is_none());
    }

    #[test]
    fn test_handle_queues_requests_in_order() {
        let queue = Queue::<OwnedPublishRequest<16, 16>, 2>::new();
        let handle = PublisherHandle::new(&queue);

        assert!(handle.try_publish("a", b"1", QoS::AtMostOnce));
        assert!(block_on(handle.publish_retained(
            "b",
            b"2",
            QoS::AtLeastOnce,
            Duration::from_millis(10)
        )));
        assert!(!handle.try_publish("c", b"3", QoS::AtMostOnce));
        assert!(!block_on(handle.publish("c", b"3", QoS::AtMostOnce, Duration::from_millis(10))));

        assert_eq!(queue.pop().unwrap().topic.as_str(), "a");
        let second = queue.pop().unwrap();
        assert_eq!(second.topic.as_str(), "b");
        assert!(second.retain);
    }
}
