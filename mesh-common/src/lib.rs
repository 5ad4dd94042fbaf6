pub mod address;
pub mod env;
pub mod error;
pub mod utils;

pub use address::HwAddress;
pub use env::identity::NodeIdentity;
pub use env::message::{MessageEnvelope, MessageId, PROTOCOL_VERSION};
pub use error::{MeshError, Result};
pub use utils::NodeId;
