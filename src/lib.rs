//! # Protocol Engines for Embedded Systems
//!
//! `myrtio-netkit` is a `no_std`, allocation-free toolkit for devices that talk to the
//! network from one task and act on what they hear from others. It is built on the
//! [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **MQTT 3.1.1 client** with QoS 0, 1 and 2, retransmission with DUP, keep-alive and
//!   session resumption. The protocol state lives in a sans-IO [`Session`] that the
//!   async [`MqttClient`] drives over any [`MqttTransport`](transport::MqttTransport).
//! - **Packet codec**: typed, bounds-checked views over received bytes and a
//!   [`PacketDecoder`](packet::PacketDecoder) that drops anything malformed.
//! - **WebSocket framing**: a resumable [`FrameDecoder`](websocket::FrameDecoder) that
//!   copes with frames split across any number of reads and hands out unmasked payload
//!   in bounded chunks.
//! - **Inter-task messaging**: bounded [`Queue`](ipc::Queue)s, a broadcast
//!   [`Publisher`](ipc::Publisher) with RAII [`Link`](ipc::Link)s, and
//!   [`TaskEventQueue`](ipc::TaskEventQueue) for one-item-per-wakeup delivery.
//! - **Network status** published through the same fabric by
//!   [`Connectivity`](network::Connectivity).
//!
//! ## Architecture
//!
//! ### 1. Direct Client Usage
//!
//! ```ignore
//! let mut client = MqttClient::<_, 4, 1024>::new(transport, options);
//! client.connect().await?;
//! client.subscribe("topic", QoS::AtLeastOnce).await?;
//! client.publish("topic", b"payload", QoS::AtLeastOnce).await?;
//! ```
//!
//! ### 2. Runtime over the Queue Fabric
//!
//! [`MqttRuntime`](runtime::MqttRuntime) owns the client in its own task. Other tasks
//! link a queue into its inbound [`Publisher`](ipc::Publisher) and push publish
//! requests into its outbound queue, so no task ever shares the client.
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to get diagnostics.
//! Without any of them logging compiles to nothing.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod client;
pub mod error;
pub mod ipc;
pub mod network;
pub mod packet;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod util;
pub mod websocket;

// Re-export key types for easier access at the crate root.
pub use client::{MqttClient, MqttEvent, MqttOptions};
pub use error::{CodecError, MqttError, ProtocolError};
pub use packet::{Packet, PacketDecoder, QoS};
pub use session::{Session, SessionConfig};
pub use transport::TcpTransport;
