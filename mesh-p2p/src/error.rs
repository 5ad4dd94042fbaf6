use thiserror::Error;

use mesh_common::HwAddress;

/// Failure to bring the transport up or down.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport already open")]
    AlreadyOpen,

    #[error("Failed to open transport: {0}")]
    Open(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single unicast frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error("No delivery confirmation from {0}")]
    NoAck(HwAddress),

    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Address {0} is not reachable through this transport")]
    UnknownAddress(HwAddress),

    #[error("Transport is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(String),
}

impl TransmitError {
    /// Permanent failures are not worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TransmitError::PayloadTooLarge { .. }
                | TransmitError::UnknownAddress(_)
                | TransmitError::Closed
        )
    }
}

impl From<TransportError> for mesh_common::MeshError {
    fn from(e: TransportError) -> Self {
        mesh_common::MeshError::Transport(e.to_string())
    }
}
