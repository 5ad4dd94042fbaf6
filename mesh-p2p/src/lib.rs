pub mod address_book;
pub mod codec;
pub mod dedup;
pub mod error;
pub mod in_memory;
pub mod ports;
pub mod retry;
pub mod routing;
pub mod udp;

pub use address_book::AddressBook;
pub use dedup::DedupCache;
pub use error::{TransmitError, TransportError};
pub use in_memory::{InMemoryHub, InMemoryTransport};
pub use ports::{ReceiveHandler, Transport};
pub use retry::RetryPolicy;
pub use routing::{DropReason, Router};
pub use udp::UdpTransport;
