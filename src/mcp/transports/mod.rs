//! Tool-call transports
//!
//! Only stdio is built in; the tool surface itself is transport-agnostic.

mod stdio;

pub use stdio::serve_stdio;
