use std::time::Duration;

use shakmaty::Color;

// =============================================================================
// Constants
// =============================================================================

/// Timeout for the initial `isready`/`uci` handshake.
pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for any single request/response round trip once the engine is up.
pub const ENGINE_ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed search parameters used for `move` and `hint best` (spec: movetime 500, depth 15).
pub const BEST_MOVE_MOVETIME_MS: u32 = 500;
pub const BEST_MOVE_DEPTH: u32 = 15;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the external engine process.
///
/// This is distinct from the four-member client-facing error taxonomy in
/// [`crate::protocol::ErrorKind`]; session code maps the two where a wire
/// reply is needed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine handshake timed out")]
    InitTimeout,

    #[error("engine did not respond within the round-trip timeout")]
    Timeout,

    #[error("no stdin handle available for engine process")]
    NoStdin,

    #[error("no stdout handle available for engine process")]
    NoStdout,

    #[error("engine closed its output stream unexpectedly")]
    Eof,

    #[error("engine reply did not match the expected protocol: {0}")]
    MalformedReply(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Core Types
// =============================================================================

/// A snapshot of the board after `d` has been parsed: the verbatim rendered
/// board block, the FEN the engine reports, whether any side-to-move piece
/// is giving check, and whose turn it now is.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub board_block: String,
    pub fen: String,
    pub in_check: bool,
    pub side_to_move: Color,
}

impl BoardSnapshot {
    /// Winner if the game ended right now: the side NOT to move.
    pub fn winner(&self) -> Color {
        match self.side_to_move {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}
