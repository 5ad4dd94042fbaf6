//! in_memory.rs
//!
//! Process-local radio: every endpoint is an mpsc channel registered in a
//! shared hub. Links can be cut (sender sees a transmit failure) or filtered
//! (frame silently lost), which is enough to reproduce the failure modes of
//! the real link in tests and simulations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use mesh_common::HwAddress;

use crate::{
    error::{TransmitError, TransportError},
    ports::{ReceiveHandler, Transport},
};

/// A frame as it left the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub from: HwAddress,
    pub to: HwAddress,
    pub bytes: Vec<u8>,
}

/// Returns true for frames that should be lost in the air.
pub type DropFilter = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

type Inbound = (Vec<u8>, HwAddress);

#[derive(Default)]
struct HubState {
    endpoints: HashMap<HwAddress, mpsc::UnboundedSender<Inbound>>,
    cut: HashSet<(HwAddress, HwAddress)>,
    filter: Option<DropFilter>,
    loss_rate: f64,
    sent: Vec<Frame>,
}

#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl fmt::Debug for InMemoryHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryHub")
            .field("endpoints", &state.endpoints.len())
            .field("cut", &state.cut.len())
            .field("loss_rate", &state.loss_rate)
            .finish()
    }
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a transport attached to this hub. It joins the air on `open()`.
    pub fn transport(&self, addr: HwAddress) -> InMemoryTransport {
        InMemoryTransport {
            addr,
            hub: self.clone(),
            handler: Arc::new(Mutex::new(None)),
            pump: Mutex::new(None),
        }
    }

    /// Cuts the link in both directions; senders see `TransmitError::NoAck`.
    pub fn cut_link(&self, a: HwAddress, b: HwAddress) {
        let mut state = self.state();
        state.cut.insert((a, b));
        state.cut.insert((b, a));
    }

    pub fn restore_link(&self, a: HwAddress, b: HwAddress) {
        let mut state = self.state();
        state.cut.remove(&(a, b));
        state.cut.remove(&(b, a));
    }

    pub fn set_drop_filter(&self, filter: DropFilter) {
        self.state().filter = Some(filter);
    }

    pub fn clear_drop_filter(&self) {
        self.state().filter = None;
    }

    /// Probability in `[0, 1]` that any frame is silently lost.
    pub fn set_loss_rate(&self, rate: f64) {
        self.state().loss_rate = rate.clamp(0.0, 1.0);
    }

    /// Every transmission attempt seen by the hub, in order.
    pub fn frames_sent(&self) -> Vec<Frame> {
        self.state().sent.clone()
    }

    /// Delivers raw bytes to `to` as if `from` had sent them, bypassing cuts,
    /// filters and the sent log. Returns false if `to` is not listening.
    pub fn inject(&self, to: HwAddress, from: HwAddress, bytes: Vec<u8>) -> bool {
        match self.state().endpoints.get(&to) {
            Some(tx) => tx.send((bytes, from)).is_ok(),
            None => false,
        }
    }

    fn attach(&self, addr: HwAddress, tx: mpsc::UnboundedSender<Inbound>) {
        self.state().endpoints.insert(addr, tx);
    }

    fn detach(&self, addr: HwAddress) {
        self.state().endpoints.remove(&addr);
    }

    fn deliver(&self, frame: Frame) -> Result<(), TransmitError> {
        let mut state = self.state();
        state.sent.push(frame.clone());

        if state.cut.contains(&(frame.from, frame.to)) {
            return Err(TransmitError::NoAck(frame.to));
        }
        let tx = match state.endpoints.get(&frame.to) {
            Some(tx) => tx.clone(),
            None => return Err(TransmitError::NoAck(frame.to)),
        };
        if let Some(filter) = &state.filter {
            if filter(&frame) {
                debug!("hub: frame {} -> {} lost (filter)", frame.from, frame.to);
                return Ok(());
            }
        }
        if state.loss_rate > 0.0 && rand::random::<f64>() < state.loss_rate {
            debug!("hub: frame {} -> {} lost (loss)", frame.from, frame.to);
            return Ok(());
        }
        drop(state);

        tx.send((frame.bytes, frame.from))
            .map_err(|_| TransmitError::NoAck(frame.to))
    }
}

pub struct InMemoryTransport {
    addr: HwAddress,
    hub: InMemoryHub,
    handler: Arc<Mutex<Option<ReceiveHandler>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .finish()
    }
}

impl InMemoryTransport {
    pub fn is_open(&self) -> bool {
        self.pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if pump.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
        self.hub.attach(self.addr, tx);

        let handler = Arc::clone(&self.handler);
        let addr = self.addr;
        *pump = Some(tokio::spawn(async move {
            while let Some((bytes, from)) = rx.recv().await {
                let h = handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match h {
                    Some(h) => h(bytes, from),
                    None => debug!("[{}] frame from {} dropped: no receive callback", addr, from),
                }
            }
        }));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.hub.detach(self.addr);
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        Ok(())
    }

    fn local_address(&self) -> HwAddress {
        self.addr
    }

    async fn send_unicast(&self, dest: HwAddress, bytes: &[u8]) -> Result<(), TransmitError> {
        if !self.is_open() {
            return Err(TransmitError::Closed);
        }
        self.hub.deliver(Frame {
            from: self.addr,
            to: dest,
            bytes: bytes.to_vec(),
        })
    }

    fn register_receive_callback(&self, handler: ReceiveHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn listening(hub: &InMemoryHub, addr: u64) -> (InMemoryTransport, UnboundedReceiver<Inbound>) {
        let t = hub.transport(HwAddress(addr));
        let (tx, rx) = mpsc::unbounded_channel();
        t.register_receive_callback(Arc::new(move |bytes, from| {
            let _ = tx.send((bytes, from));
        }));
        t.open().await.unwrap();
        (t, rx)
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_destination() {
        let hub = InMemoryHub::new();
        let (a, _rx_a) = listening(&hub, 1).await;
        let (_b, mut rx_b) = listening(&hub, 2).await;
        let (_c, mut rx_c) = listening(&hub, 3).await;

        a.send_unicast(HwAddress(2), b"hello").await.unwrap();

        let (bytes, from) = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, HwAddress(1));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cut_link_reports_no_ack_and_restores() {
        let hub = InMemoryHub::new();
        let (a, _rx_a) = listening(&hub, 1).await;
        let (_b, mut rx_b) = listening(&hub, 2).await;

        hub.cut_link(HwAddress(1), HwAddress(2));
        assert_eq!(
            a.send_unicast(HwAddress(2), b"x").await,
            Err(TransmitError::NoAck(HwAddress(2)))
        );

        hub.restore_link(HwAddress(1), HwAddress(2));
        a.send_unicast(HwAddress(2), b"y").await.unwrap();
        let (bytes, _) = rx_b.recv().await.unwrap();
        assert_eq!(bytes, b"y");
    }

    #[tokio::test]
    async fn test_filtered_frames_vanish_silently() {
        let hub = InMemoryHub::new();
        let (a, _rx_a) = listening(&hub, 1).await;
        let (_b, mut rx_b) = listening(&hub, 2).await;

        hub.set_drop_filter(Arc::new(|f: &Frame| f.bytes == b"lost"));
        a.send_unicast(HwAddress(2), b"lost").await.unwrap();
        a.send_unicast(HwAddress(2), b"kept").await.unwrap();

        let (bytes, _) = rx_b.recv().await.unwrap();
        assert_eq!(bytes, b"kept");
        assert_eq!(hub.frames_sent().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_transport_cannot_send_or_receive() {
        let hub = InMemoryHub::new();
        let (a, _rx_a) = listening(&hub, 1).await;
        let (b, _rx_b) = listening(&hub, 2).await;

        b.close().await.unwrap();
        assert_eq!(
            a.send_unicast(HwAddress(2), b"x").await,
            Err(TransmitError::NoAck(HwAddress(2)))
        );

        a.close().await.unwrap();
        assert_eq!(a.send_unicast(HwAddress(2), b"x").await, Err(TransmitError::Closed));
    }

    #[tokio::test]
    async fn test_double_open_is_rejected() {
        let hub = InMemoryHub::new();
        let (a, _rx) = listening(&hub, 1).await;
        assert!(matches!(a.open().await, Err(TransportError::AlreadyOpen)));
    }
}
