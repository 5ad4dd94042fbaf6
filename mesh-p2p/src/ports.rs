use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use mesh_common::HwAddress;

use crate::error::{TransmitError, TransportError};

/// Invoked for every inbound frame with the raw bytes and the sender's hardware
/// address. Runs on a task owned by the transport, so it must not block.
pub type ReceiveHandler = Arc<dyn Fn(Vec<u8>, HwAddress) + Send + Sync>;

/// Unreliable unicast radio primitive the mesh core is built on.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn open(&self) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
    fn local_address(&self) -> HwAddress;
    async fn send_unicast(&self, dest: HwAddress, bytes: &[u8]) -> Result<(), TransmitError>;
    fn register_receive_callback(&self, handler: ReceiveHandler);
}
