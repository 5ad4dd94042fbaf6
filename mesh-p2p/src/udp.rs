//! udp.rs
//!
//! Transport over UDP datagrams, standing in for the radio modem on hosts
//! without one. Each hardware address maps to a socket endpoint; frames from
//! endpoints outside that map are discarded.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mesh_common::HwAddress;

use crate::{
    error::{TransmitError, TransportError},
    ports::{ReceiveHandler, Transport},
};

/// Default maximum frame size, in bytes.
pub const DEFAULT_MAX_FRAME: usize = 256;

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);
const RECV_MAX_CONSECUTIVE_ERRORS: u32 = 100;

/// Pause schedule for the receive pump after `recv_from` errors. Doubles per
/// consecutive failure and resets on the next good datagram.
#[derive(Debug, Default)]
struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    /// Delay before the next receive, or `None` once the socket looks dead.
    fn on_error(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > RECV_MAX_CONSECUTIVE_ERRORS {
            return None;
        }
        let shift = (self.failures - 1).min(16);
        Some(RECV_BACKOFF_MIN.saturating_mul(1 << shift).min(RECV_BACKOFF_MAX))
    }

    fn on_success(&mut self) {
        self.failures = 0;
    }
}

pub struct UdpTransport {
    local: HwAddress,
    bind: SocketAddr,
    peers: HashMap<HwAddress, SocketAddr>,
    max_frame: usize,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    handler: Arc<Mutex<Option<ReceiveHandler>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.local)
            .field("bind", &self.bind)
            .field("peers", &self.peers.len())
            .field("max_frame", &self.max_frame)
            .finish()
    }
}

impl UdpTransport {
    pub fn new(local: HwAddress, bind: SocketAddr, peers: HashMap<HwAddress, SocketAddr>) -> Self {
        Self {
            local,
            bind,
            peers,
            max_frame: DEFAULT_MAX_FRAME,
            socket: Mutex::new(None),
            handler: Arc::new(Mutex::new(None)),
            pump: Mutex::new(None),
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Actual bound address, once open. Useful when binding to port 0.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.current_socket().and_then(|s| s.local_addr().ok())
    }

    fn current_socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.current_socket().is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let socket = Arc::new(UdpSocket::bind(self.bind).await?);
        info!("[{}] UDP transport bound on {}", self.local, socket.local_addr()?);

        let by_endpoint: HashMap<SocketAddr, HwAddress> =
            self.peers.iter().map(|(hw, sa)| (*sa, *hw)).collect();
        let handler = Arc::clone(&self.handler);
        let rx_socket = Arc::clone(&socket);
        let local = self.local;
        // Oversized datagrams are truncated by the OS and then fail to decode.
        let buf_len = self.max_frame + 1;

        let pump = tokio::spawn(async move {
            let mut buf = vec![0u8; buf_len];
            let mut backoff = RecvBackoff::default();
            loop {
                let (len, from) = match rx_socket.recv_from(&mut buf).await {
                    Ok(r) => {
                        backoff.on_success();
                        r
                    }
                    Err(e) => match backoff.on_error() {
                        Some(delay) => {
                            warn!("[{}] UDP receive error: {} (retrying in {:?})", local, e, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            error!("[{}] UDP receive keeps failing, pump stopped: {}", local, e);
                            break;
                        }
                    },
                };
                let Some(sender) = by_endpoint.get(&from).copied() else {
                    debug!("[{}] datagram from unknown endpoint {} ignored", local, from);
                    continue;
                };
                let h = handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(h) = h {
                    h(buf[..len].to_vec(), sender);
                }
            }
        });

        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket);
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.socket.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }

    fn local_address(&self) -> HwAddress {
        self.local
    }

    async fn send_unicast(&self, dest: HwAddress, bytes: &[u8]) -> Result<(), TransmitError> {
        if bytes.len() > self.max_frame {
            return Err(TransmitError::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_frame,
            });
        }
        let endpoint = *self.peers.get(&dest).ok_or(TransmitError::UnknownAddress(dest))?;
        let socket = self.current_socket().ok_or(TransmitError::Closed)?;
        socket
            .send_to(bytes, endpoint)
            .await
            .map(|_| ())
            .map_err(|e| TransmitError::Io(e.to_string()))
    }

    fn register_receive_callback(&self, handler: ReceiveHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn free_port() -> SocketAddr {
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_datagram_round_trip_identifies_sender() {
        let (addr_a, addr_b) = (free_port().await, free_port().await);
        let peers = HashMap::from([(HwAddress(1), addr_a), (HwAddress(2), addr_b)]);

        let a = UdpTransport::new(HwAddress(1), addr_a, peers.clone());
        let b = UdpTransport::new(HwAddress(2), addr_b, peers);

        let (tx, mut rx) = mpsc::unbounded_channel();
        b.register_receive_callback(Arc::new(move |bytes, from| {
            let _ = tx.send((bytes, from));
        }));
        a.open().await.unwrap();
        b.open().await.unwrap();

        a.send_unicast(HwAddress(2), b"ping").await.unwrap();
        let (bytes, from) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"ping");
        assert_eq!(from, HwAddress(1));

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_limits_and_unknown_peers() {
        let addr = free_port().await;
        let t = UdpTransport::new(HwAddress(1), addr, HashMap::from([(HwAddress(2), addr)]))
            .with_max_frame(8);

        assert_eq!(t.send_unicast(HwAddress(2), b"x").await, Err(TransmitError::Closed));

        t.open().await.unwrap();
        assert_eq!(
            t.send_unicast(HwAddress(2), b"123456789").await,
            Err(TransmitError::PayloadTooLarge { size: 9, max: 8 })
        );
        assert_eq!(
            t.send_unicast(HwAddress(7), b"x").await,
            Err(TransmitError::UnknownAddress(HwAddress(7)))
        );
        t.close().await.unwrap();
    }

    #[test]
    fn test_receive_errors_back_off_then_give_up() {
        let mut backoff = RecvBackoff::default();
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(40)));

        backoff.on_success();
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(10)));

        let mut delays = vec![];
        while let Some(d) = backoff.on_error() {
            delays.push(d);
        }
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(1)));
        assert_eq!(delays.last(), Some(&Duration::from_secs(1)));
        assert_eq!(delays.len() as u32, RECV_MAX_CONSECUTIVE_ERRORS - 1);
    }
}
