//! runtime
//!
//! The node runtime owns the transport, the receive path and all protocol
//! state of one mesh node.
//!
//! Inbound frames are posted by the transport callback into a channel and
//! processed in arrival order by a single receive task. That task only
//! updates shared state, wakes waiters and queues outbound envelopes; the
//! actual transmissions happen on a separate outbound task. Driver calls
//! (`send_and_wait`, `run_consensus`) wait on a notification raced against
//! their deadline.

pub mod builder;
pub mod dispatch;
pub mod exchange;
pub mod link;
pub mod node;
pub mod shared;
pub mod simulation;

pub use builder::{build_runtime, build_udp_transport};
pub use exchange::ExchangeResult;
pub use node::NodeRuntime;
pub use shared::{DeliveredMessage, PendingExchange};
pub use simulation::{simulate, simulate_on, SimulationReport};
