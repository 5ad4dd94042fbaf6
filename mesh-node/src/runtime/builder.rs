use std::sync::Arc;

use tracing::info;

use mesh_common::{NodeId, Result};
use mesh_p2p::{Transport, UdpTransport};

use crate::config::{MeshConfig, NodeSettings};
use crate::runtime::node::NodeRuntime;

/// Validates `id` against the mesh description and wires a runtime around
/// `transport`. Configuration errors surface here, before anything starts.
pub fn build_runtime(
    config: &MeshConfig,
    id: &NodeId,
    transport: Arc<dyn Transport>,
    settings: NodeSettings,
) -> Result<NodeRuntime> {
    let identity = config.identity(id)?;
    info!(
        "[{}] identity loaded: addr={} neighbours={} routes={}",
        identity.id,
        identity.hw_address,
        identity.neighbors.len(),
        identity.routes.len()
    );
    Ok(NodeRuntime::new(identity, config.address_book(), transport, settings))
}

/// UDP transport for `id`, bound to its configured endpoint.
pub fn build_udp_transport(config: &MeshConfig, id: &NodeId, max_frame: usize) -> Result<UdpTransport> {
    let identity = config.identity(id)?;
    let bind = config.endpoint(id)?;
    Ok(UdpTransport::new(identity.hw_address, bind, config.peer_endpoints()).with_max_frame(max_frame))
}
