//! MQTT Runtime Module
//!
//! Runs an [`MqttClient`](crate::client::MqttClient) as a task of its own and connects
//! it to the rest of the application through the [`ipc`](crate::ipc) fabric:
//!
//! - topics to subscribe are collected up front in a [`TopicRegistry`];
//! - inbound messages are copied into [`MqttData`] and broadcast through a
//!   [`Publisher`](crate::ipc::Publisher), so each interested task links its own queue;
//! - any task publishes by pushing an [`OwnedPublishRequest`] into the runtime's
//!   outbound [`Queue`](crate::ipc::Queue), usually through a [`PublisherHandle`].
//!
//! The network task never blocks on a consumer, and consumers never touch the client.

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod registry;

pub use event_loop::MqttRuntime;
pub use publisher::{MqttData, OwnedPublishRequest, PublisherHandle};
pub use registry::{MAX_TOPIC_LEN, TopicRegistry};
