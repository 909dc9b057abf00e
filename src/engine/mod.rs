// =============================================================================
// Chess Engine Module
// =============================================================================
//
// Everything needed to run a single external chess engine subprocess as a
// shared, serialized resource.
//
// ## Module Responsibilities
//
// - **types**: shared error type, board-snapshot type, and search/timeout
//   constants
// - **process**: low-level process management (spawn, line I/O, handshake,
//   shutdown) with no protocol-level sequencing
// - **driver**: the `EngineDriver`, which builds `SetPosition`/`BestMove`/
//   `AllMoves`/`BoardAndFen`/`ApplyMove` on top of `process`, holds the
//   exclusivity lock, and owns the engine-death notification path

pub mod driver;
pub mod process;
pub mod types;

pub use driver::{EngineDriver, EXIT_ENGINE_DEATH};
pub use process::EngineIo;
pub use types::{BoardSnapshot, EngineError, EngineResult};
