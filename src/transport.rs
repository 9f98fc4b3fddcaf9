//! # Byte Stream Transports
//!
//! [`MqttTransport`] is the seam between the client and whatever carries its bytes:
//! a TCP socket, TLS, a UART, a WebSocket tunnel. The client owns all protocol timing,
//! so a transport only has to move bytes and say which of its errors are harmless.
//!
//! A transport may bound each read with its own timeout. Such errors are not fatal:
//! when [`MqttTransport::is_timeout`] recognises one, the client runs its keep-alive
//! and retransmission timers and reads again.

use core::future::Future;
use core::pin::pin;

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use futures::future::{Either, select};

use crate::error::MqttError;

/// A reliable, ordered byte stream.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    type Error: core::fmt::Debug;

    /// Writes all of `buf`.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Reads at most `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Whether `error` only says a read gave up waiting. The stream stays usable.
    fn is_timeout(_error: &Self::Error) -> bool {
        false
    }
}

/// Marks error types that convert into [`MqttError::Transport`] with `?`.
pub trait TransportError: core::fmt::Debug {}

impl<T: core::fmt::Debug> TransportError for MqttError<T> {}

impl TransportError for TcpError {}

/// Races `read` against `timeout`, reporting expiry as [`MqttError::Timeout`].
pub async fn recv_within<F, E>(read: F, timeout: Duration) -> Result<usize, MqttError<E>>
where
    F: Future<Output = Result<usize, E>>,
{
    match select(pin!(read), pin!(Timer::after(timeout))).await {
        Either::Left((result, _)) => result.map_err(MqttError::Transport),
        Either::Right(((), _)) => Err(MqttError::Timeout),
    }
}

/// [`MqttTransport`] over an embassy-net [`TcpSocket`].
///
/// Reads give up after `read_timeout` so a stalled peer can't park the caller
/// forever; the client treats that as a wake-up, not a lost connection.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    read_timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    pub fn new(socket: TcpSocket<'a>, read_timeout: Duration) -> Self {
        Self {
            socket,
            read_timeout,
        }
    }

    pub fn socket_mut(&mut self) -> &mut TcpSocket<'a> {
        &mut self.socket
    }
}

impl MqttTransport for TcpTransport<'_> {
    type Error = MqttError<TcpError>;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("TCP TX {} bytes", buf.len());
        if let Err(e) = self.socket.write_all(buf).await {
            warn!("TCP write of {} bytes failed", buf.len());
            return Err(MqttError::Transport(e));
        }
        self.socket.flush().await.map_err(MqttError::Transport)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let result = recv_within(self.socket.read(buf), self.read_timeout).await;
        match &result {
            Ok(0) => debug!("TCP connection closed by peer"),
            Ok(n) => trace!("TCP RX {} bytes", n),
            Err(MqttError::Timeout) => trace!("TCP read idle for {} ms", self.read_timeout.as_millis()),
            Err(_) => warn!("TCP read failed"),
        }
        result
    }

    fn is_timeout(error: &Self::Error) -> bool {
        matches!(error, MqttError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::future::{pending, ready};
    use embassy_futures::block_on;

    #[test]
    fn test_recv_within_passes_reads_through() {
        let read = ready(Ok::<_, TcpError>(7));
        assert_eq!(block_on(recv_within(read, Duration::from_secs(5))), Ok(7));

        let reset = ready(Err::<usize, _>(TcpError::ConnectionReset));
        assert_eq!(
            block_on(recv_within(reset, Duration::from_secs(5))),
            Err(MqttError::Transport(TcpError::ConnectionReset))
        );
    }

    #[test]
    fn test_recv_within_times_out_idle_reads() {
        let idle = pending::<Result<usize, TcpError>>();
        assert_eq!(
            block_on(recv_within(idle, Duration::from_millis(10))),
            Err(MqttError::Timeout)
        );
    }

    #[test]
    fn test_only_read_timeouts_are_harmless_for_tcp() {
        assert!(TcpTransport::is_timeout(&MqttError::Timeout));
        assert!(!TcpTransport::is_timeout(&MqttError::Transport(TcpError::ConnectionReset)));
        assert!(!TcpTransport::is_timeout(&MqttError::NotConnected));
    }
}
