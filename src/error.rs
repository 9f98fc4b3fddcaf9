//! # Error Types
//!
//! This module defines the error types used by the MQTT side of the crate, from
//! transport failures to protocol violations and acknowledgement bookkeeping.
//!
//! Packet encoding and decoding never touch the transport, so they return
//! [`CodecError`], an `MqttError` whose transport slot is uninhabited. Widening it into
//! a client's concrete error type is total and cannot fail.

use core::convert::Infallible;
use core::fmt;

use crate::transport;

/// Error returned by packet encoders, decoders and the sans-IO session.
pub type CodecError = MqttError<Infallible>;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, UART).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// An operation timed out.
    Timeout,
    /// The packet identifier is still owned by an unacknowledged packet.
    PacketIdInUse(u16),
    /// Every pending-acknowledgement slot is taken.
    InflightFull,
    /// A QoS 1/2 publish ran out of retransmissions.
    PublishFailed(u16),
}

/// Implements the `From` trait to allow for automatic conversion of any transport
/// error into an `MqttError`. This is what allows the `?` operator to work
/// seamlessly on `Result`s from the transport layer.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> From<ProtocolError> for MqttError<T> {
    fn from(err: ProtocolError) -> Self {
        MqttError::Protocol(err)
    }
}

impl<T> MqttError<T> {
    /// Widens a codec error into an error carrying the transport type `T`.
    ///
    /// Codec errors can't hold a transport error, so every variant maps one to one.
    pub fn cast_transport_error(other: CodecError) -> MqttError<T> {
        match other {
            MqttError::Transport(never) => match never {},
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
            MqttError::PacketIdInUse(id) => MqttError::PacketIdInUse(id),
            MqttError::InflightFull => MqttError::InflightFull,
            MqttError::PublishFailed(id) => MqttError::PublishFailed(id),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for MqttError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttError::Transport(e) => write!(f, "transport error: {:?}", e),
            MqttError::Protocol(e) => write!(f, "protocol error: {:?}", e),
            MqttError::ConnectionRefused(c) => write!(f, "connection refused: {:?}", c),
            MqttError::NotConnected => write!(f, "not connected"),
            MqttError::BufferTooSmall => write!(f, "buffer too small"),
            MqttError::Timeout => write!(f, "timed out"),
            MqttError::PacketIdInUse(id) => write!(f, "packet identifier {} in use", id),
            MqttError::InflightFull => write!(f, "in-flight table full"),
            MqttError::PublishFailed(id) => write!(f, "publish {} not acknowledged", id),
        }
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl From<ConnectReasonCode> for u8 {
    fn from(code: ConnectReasonCode) -> Self {
        match code {
            ConnectReasonCode::Success => 0,
            ConnectReasonCode::UnacceptableProtocolVersion => 1,
            ConnectReasonCode::IdentifierRejected => 2,
            ConnectReasonCode::ServerUnavailable => 3,
            ConnectReasonCode::BadUserNameOrPassword => 4,
            ConnectReasonCode::NotAuthorized => 5,
            ConnectReasonCode::Other(val) => val,
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The remaining-length field disagrees with the bytes that follow it.
    InvalidRemainingLength,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// A packet arrived that the client role never expects, e.g. CONNACK twice.
    UnexpectedPacket,
    /// The broker did not answer a PINGREQ within the keep-alive interval.
    KeepAliveTimeout,
}
