use thiserror::Error;

use crate::engine::EngineError;

/// Process exit codes. Matched exactly once, at the top of `main`.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const USAGE: i32 = 14;
    pub const BIND: i32 = 7;
    pub const ENGINE_START: i32 = 11;
    pub const ENGINE_DEATH: i32 = 5;
}

/// Startup-phase failures. Anything that can happen once the server is
/// actually serving clients either goes through [`EngineError`] (fatal,
/// handled by [`crate::engine::EngineDriver::die`]) or the client-facing
/// [`crate::protocol::ErrorKind`] (local, non-fatal).
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("unable to bind listening socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("unable to start communication with chess engine: {0}")]
    EngineStart(#[source] EngineError),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => exit_code::USAGE,
            Error::Bind(_) => exit_code::BIND,
            Error::EngineStart(_) => exit_code::ENGINE_START,
        }
    }

    /// The `uqchessserver: ...` line to print to the diagnostic stream
    /// before exiting.
    pub fn diagnostic(&self) -> String {
        match self {
            Error::Usage(msg) => format!("uqchessserver: {}", msg),
            Error::Bind(e) => format!("uqchessserver: unable to bind listening socket: {}", e),
            Error::EngineStart(_) => {
                "uqchessserver: unable to start communication with chess engine".to_string()
            }
        }
    }
}
