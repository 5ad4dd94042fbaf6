pub mod cli;
pub mod config;
pub mod runtime;

pub use config::{MeshConfig, NodeConfig, NodeSettings};
pub use runtime::builder::build_runtime;
pub use runtime::{ExchangeResult, NodeRuntime};
