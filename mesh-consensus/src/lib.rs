pub mod consensus;
pub mod ports;

pub use consensus::engine::{ConsensusEngine, ConsensusReport, EnginePhase};
pub use consensus::round_buffer::{RecordOutcome, RoundBuffer};
pub use consensus::state::{ConsensusParams, ConsensusState, RoundOutcome, RoundStatus};
pub use ports::RoundLink;
