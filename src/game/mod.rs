//! Game state shared by one or two sessions for the duration of a match.

pub mod state;

pub use state::{GameState, PlayerHandle, STARTING_FEN};
