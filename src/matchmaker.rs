use std::collections::VecDeque;
use std::sync::Arc;

use log::info;
use shakmaty::Color;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use crate::game::{GameState, PlayerHandle};
use crate::protocol::{ColorPref, ServerReply};
use crate::registry::SessionId;

struct WaitingEntry {
    session_id: SessionId,
    pref: ColorPref,
    game: Arc<GameState>,
    outbox: UnboundedSender<String>,
}

/// Outcome of a `start human <pref>` request.
pub enum PairResult {
    /// Paired immediately with a waiting client; `color` is this caller's
    /// assigned colour and `game` is the (already started) shared state.
    Paired { color: Color, game: Arc<GameState> },
    /// No compatible partner was waiting; `game` is the caller's own
    /// provisional state, now sitting in the wait list.
    Waiting { game: Arc<GameState> },
}

/// The process-lifetime queue of human clients waiting for a colour-
/// compatible opponent.
pub struct WaitList {
    entries: Mutex<VecDeque<WaitingEntry>>,
}

impl WaitList {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to pair `session_id` (preference `pref`) against the wait list.
    /// On success the matched waiter is removed, both game slots are
    /// filled, the game is marked started, and the waiter is sent its
    /// `started <color>` line directly (the caller sends its own). On
    /// failure, `provisional_game` is enqueued as this session's future
    /// game state.
    pub async fn start_human(
        &self,
        session_id: SessionId,
        pref: ColorPref,
        outbox: UnboundedSender<String>,
        provisional_game: Arc<GameState>,
    ) -> PairResult {
        let mut entries = self.entries.lock().await;

        let matched = entries.iter().position(|w| compatible(pref, w.pref));

        let Some(index) = matched else {
            info!("session {} joins the wait list (pref {:?})", session_id, pref);
            entries.push_back(WaitingEntry {
                session_id,
                pref,
                game: provisional_game.clone(),
                outbox,
            });
            return PairResult::Waiting { game: provisional_game };
        };

        let waiter = entries.remove(index).unwrap();
        drop(entries);

        let (l_color, w_color) = assign_colors(pref, waiter.pref);

        waiter
            .game
            .set_slot(
                w_color,
                PlayerHandle { session_id: waiter.session_id, outbox: waiter.outbox.clone() },
            )
            .await;
        waiter
            .game
            .set_slot(l_color, PlayerHandle { session_id, outbox })
            .await;
        waiter.game.mark_started().await;

        let _ = waiter.outbox.send(ServerReply::Started(w_color).render());

        info!(
            "paired session {} (white={}) with session {} (white={})",
            session_id,
            l_color == Color::White,
            waiter.session_id,
            w_color == Color::White
        );

        PairResult::Paired { color: l_color, game: waiter.game }
    }

    /// Remove a session from the wait list, e.g. because it disconnected
    /// before being paired.
    pub async fn remove(&self, session_id: SessionId) {
        let mut entries = self.entries.lock().await;
        entries.retain(|entry| entry.session_id != session_id);
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}

/// Two preferences are compatible unless both name the same specific
/// colour.
fn compatible(a: ColorPref, b: ColorPref) -> bool {
    !matches!(
        (a, b),
        (ColorPref::White, ColorPref::White) | (ColorPref::Black, ColorPref::Black)
    )
}

/// Resolve concrete colours for the incoming client `l` and the matched
/// waiter `w`, given they are `compatible`.
fn assign_colors(l: ColorPref, w: ColorPref) -> (Color, Color) {
    match (l, w) {
        (ColorPref::Either, ColorPref::Either) => (Color::Black, Color::White),
        (ColorPref::Either, ColorPref::White) => (Color::Black, Color::White),
        (ColorPref::Either, ColorPref::Black) => (Color::White, Color::Black),
        (ColorPref::White, ColorPref::Either) => (Color::White, Color::Black),
        (ColorPref::Black, ColorPref::Either) => (Color::Black, Color::White),
        (ColorPref::White, ColorPref::Black) => (Color::White, Color::Black),
        (ColorPref::Black, ColorPref::White) => (Color::Black, Color::White),
        (ColorPref::White, ColorPref::White) | (ColorPref::Black, ColorPref::Black) => {
            unreachable!("compatible() excludes same-specific-colour pairings")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_outbox() -> UnboundedSender<String> {
        tokio::sync::mpsc::unbounded_channel().0
    }

    #[test]
    fn either_pairs_resolve_waiter_white_caller_black() {
        assert_eq!(
            assign_colors(ColorPref::Either, ColorPref::Either),
            (Color::Black, Color::White)
        );
    }

    #[test]
    fn either_takes_the_opposite_of_a_specific_partner() {
        assert_eq!(assign_colors(ColorPref::Either, ColorPref::White), (Color::Black, Color::White));
        assert_eq!(assign_colors(ColorPref::Either, ColorPref::Black), (Color::White, Color::Black));
        assert_eq!(assign_colors(ColorPref::White, ColorPref::Either), (Color::White, Color::Black));
    }

    #[test]
    fn opposite_specific_colours_pair_directly() {
        assert_eq!(assign_colors(ColorPref::White, ColorPref::Black), (Color::White, Color::Black));
        assert_eq!(assign_colors(ColorPref::Black, ColorPref::White), (Color::Black, Color::White));
    }

    #[test]
    fn same_specific_colour_is_incompatible() {
        assert!(!compatible(ColorPref::White, ColorPref::White));
        assert!(!compatible(ColorPref::Black, ColorPref::Black));
        assert!(compatible(ColorPref::White, ColorPref::Black));
        assert!(compatible(ColorPref::Either, ColorPref::White));
    }

    #[tokio::test]
    async fn first_client_waits_second_pairs() {
        let list = WaitList::new();
        let game_l = Arc::new(GameState::new_provisional());
        match list.start_human(1, ColorPref::White, noop_outbox(), game_l).await {
            PairResult::Waiting { .. } => {}
            PairResult::Paired { .. } => panic!("expected to wait"),
        }

        let game_w = Arc::new(GameState::new_provisional());
        match list.start_human(2, ColorPref::Black, noop_outbox(), game_w).await {
            PairResult::Paired { color, game } => {
                assert_eq!(color, Color::Black);
                assert!(game.is_started().await);
            }
            PairResult::Waiting { .. } => panic!("expected to pair"),
        }
    }

    #[tokio::test]
    async fn incompatible_preference_keeps_both_waiting() {
        let list = WaitList::new();
        let game_l = Arc::new(GameState::new_provisional());
        list.start_human(1, ColorPref::White, noop_outbox(), game_l).await;

        let game_w = Arc::new(GameState::new_provisional());
        match list.start_human(2, ColorPref::White, noop_outbox(), game_w).await {
            PairResult::Waiting { .. } => {}
            PairResult::Paired { .. } => panic!("same specific colour must not pair"),
        }
    }

    #[tokio::test]
    async fn remove_drops_a_waiting_session() {
        let list = WaitList::new();
        let game = Arc::new(GameState::new_provisional());
        list.start_human(1, ColorPref::White, noop_outbox(), game).await;
        list.remove(1).await;

        let game_w = Arc::new(GameState::new_provisional());
        match list.start_human(2, ColorPref::Black, noop_outbox(), game_w).await {
            PairResult::Waiting { .. } => {}
            PairResult::Paired { .. } => panic!("session 1 should have been removed"),
        }
    }
}
