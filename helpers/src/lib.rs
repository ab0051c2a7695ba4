// Shared Helpers
// ==============
// Primitives used by the engine crates: bit strings for oblivious-transfer
// payloads, width-generic machine words, and config file reading.

pub mod bits;
pub mod read_config;
pub mod words;

pub use bits::BitString;
pub use words::SpWord;
