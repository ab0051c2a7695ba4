// MPC Core Engine
// ===============
// The execution core of the secure multi-party computation framework: the
// circuit registry shared by the protocol threads, and the square-pair
// provider that precomputes correlated randomness over batched oblivious
// transfers before the online phase starts.

pub mod config;
pub mod correlated_randomness;
pub mod error;
pub mod loopback_ot;
pub mod ot;
pub mod registry;
pub mod stats;
pub mod sync;
pub mod transport;
pub mod types;

pub use config::Config;
pub use correlated_randomness::{SpProvider, SpProviderFromOts, SquarePairs, MAX_BATCH};
pub use error::{EngineError, Result};
pub use registry::Registry;
pub use sync::Completion;
pub use types::{Gate, GateId, GateKind, SharingId, Wire, WireId};
