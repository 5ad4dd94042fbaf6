//! consensus
//!
//! Synchronized iterative averaging over a static neighbour graph.
//!
//! Each round a node broadcasts its current value, collects its neighbours'
//! values for the same round into a round-scoped buffer, and applies a
//! first-order Laplacian step when (and only when) every neighbour answered
//! before the round deadline. The round budget is the only stopping criterion.

pub mod engine;
pub mod round_buffer;
pub mod state;
