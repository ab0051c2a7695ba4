use thiserror::Error;

/// Errors surfaced by the engine. The engine never retries; every failure
/// is reported to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller passed something the engine cannot work with, e.g. a
    /// message addressed to the local party or a zero-sized allocation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The protocol state diverged from what the peers agreed on, e.g.
    /// oblivious-transfer outputs of unexpected length.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A transport handler failed to deliver a message. Unrecoverable at
    /// this level.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Square pairs were requested before the setup phase finished.
    #[error("square pairs are not ready, setup has not finished")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, EngineError>;
