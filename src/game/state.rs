use shakmaty::Color;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use crate::registry::SessionId;

/// The FEN of the standard chess starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A reference to one of a game's two human participants: enough for the
/// opponent side to relay a line to it.
#[derive(Clone)]
pub struct PlayerHandle {
    pub session_id: SessionId,
    pub outbox: UnboundedSender<String>,
}

/// Single source of truth for an in-progress game's position and
/// participants.
///
/// No engine calls happen while any of this state's locks are held; callers
/// acquire the engine lock first and this one second (never the reverse).
pub struct GameState {
    white: Mutex<Option<PlayerHandle>>,
    black: Mutex<Option<PlayerHandle>>,
    started: Mutex<bool>,
    fen: Mutex<String>,
}

impl GameState {
    /// A fresh, unstarted game with nobody in either slot.
    pub fn new_provisional() -> Self {
        Self {
            white: Mutex::new(None),
            black: Mutex::new(None),
            started: Mutex::new(false),
            fen: Mutex::new(STARTING_FEN.to_string()),
        }
    }

    pub async fn slot(&self, color: Color) -> Option<PlayerHandle> {
        match color {
            Color::White => self.white.lock().await.clone(),
            Color::Black => self.black.lock().await.clone(),
        }
    }

    pub async fn set_slot(&self, color: Color, handle: PlayerHandle) {
        match color {
            Color::White => *self.white.lock().await = Some(handle),
            Color::Black => *self.black.lock().await = Some(handle),
        }
    }

    pub async fn clear_slot(&self, color: Color) {
        match color {
            Color::White => *self.white.lock().await = None,
            Color::Black => *self.black.lock().await = None,
        }
    }

    /// The other occupied slot, if any, relative to `color`.
    pub async fn opponent_of(&self, color: Color) -> Option<PlayerHandle> {
        let other = match color {
            Color::White => Color::Black,
            Color::Black => Color::White,
        };
        self.slot(other).await
    }

    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    pub async fn mark_started(&self) {
        *self.started.lock().await = true;
    }

    pub async fn current_fen(&self) -> String {
        self.fen.lock().await.clone()
    }

    pub async fn set_fen(&self, fen: String) {
        *self.fen.lock().await = fen;
    }

    /// Whose turn it is right now, derived from the current FEN's
    /// side-to-move field.
    pub async fn whose_turn(&self) -> Color {
        side_to_move(&self.current_fen().await)
    }
}

/// Extract the side-to-move field from a FEN. The FEN stored on a
/// `GameState` always originates from the engine's own `d` output, so a
/// malformed field here indicates an internal bug rather than bad input.
fn side_to_move(fen: &str) -> Color {
    match fen.split_whitespace().nth(1) {
        Some("w") => Color::White,
        Some("b") => Color::Black,
        other => panic!("GameState holds a FEN with an invalid side-to-move field: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_game_starts_unstarted_at_the_standard_position() {
        let game = GameState::new_provisional();
        assert!(!game.is_started().await);
        assert_eq!(game.current_fen().await, STARTING_FEN);
        assert_eq!(game.whose_turn().await, Color::White);
    }

    #[tokio::test]
    async fn whose_turn_follows_the_fen() {
        let game = GameState::new_provisional();
        game.set_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string())
            .await;
        assert_eq!(game.whose_turn().await, Color::Black);
    }

    #[tokio::test]
    async fn opponent_of_reads_the_other_slot() {
        let game = GameState::new_provisional();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        game.set_slot(Color::White, PlayerHandle { session_id: 1, outbox: tx })
            .await;
        let opp = game.opponent_of(Color::Black).await;
        assert_eq!(opp.unwrap().session_id, 1);
        assert!(game.opponent_of(Color::White).await.is_none());
    }
}
