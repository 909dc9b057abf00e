use std::sync::Arc;

use log::{info, warn};
use shakmaty::Color;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

use crate::engine::{BoardSnapshot, EngineDriver};
use crate::game::{GameState, PlayerHandle};
use crate::matchmaker::{PairResult, WaitList};
use crate::protocol::{self, ClientCommand, ColorPref, ErrorKind, HintKind, OpponentKind, ServerReply};
use crate::registry::{ClientRegistry, SessionId};

/// Where one connection is in its lifecycle. A client with no game at all
/// is `Pregame`; one on the wait list for a human opponent is `Waiting`;
/// one in an active game (human or computer opponent) is `Playing`.
enum SessionState {
    Pregame,
    Waiting { game: Arc<GameState> },
    Playing { game: Arc<GameState>, color: Color, vs_computer: bool },
}

/// Drives one client connection end to end: reads commands, applies the
/// state machine in §4.4, and writes replies. Runs as its own task, spawned
/// once per accepted connection.
pub struct ClientSession {
    id: SessionId,
    outbox_tx: tokio::sync::mpsc::UnboundedSender<String>,
    engine: Arc<EngineDriver>,
    registry: Arc<ClientRegistry>,
    wait_list: Arc<WaitList>,
    state: SessionState,
}

impl ClientSession {
    pub async fn run(
        socket: TcpStream,
        engine: Arc<EngineDriver>,
        registry: Arc<ClientRegistry>,
        wait_list: Arc<WaitList>,
    ) {
        let (id, outbox_tx, mut pushed) = registry.register();
        let mut session = ClientSession {
            id,
            outbox_tx,
            engine,
            registry: registry.clone(),
            wait_list,
            state: SessionState::Pregame,
        };

        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            session.handle_line(&line, &mut write_half).await;
                        }
                        Ok(None) => {
                            info!("session {} disconnected", id);
                            session.handle_eof().await;
                            break;
                        }
                        Err(e) => {
                            warn!("session {} read error: {}", id, e);
                            session.handle_eof().await;
                            break;
                        }
                    }
                }
                pushed_line = pushed.recv() => {
                    match pushed_line {
                        Some(text) => {
                            if write_half.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                            let _ = write_half.flush().await;
                            session.on_pushed_line(&text);
                            if text.starts_with("error engine") {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        registry.unregister(id);
    }

    /// Called whenever a line is delivered out-of-band (not in response to
    /// this session's own command): a matchmaker pairing or an opponent's
    /// move/game-end notice. The only state transition this can drive is
    /// `Waiting` -> `Playing`, once the matched `started <color>` line
    /// arrives.
    fn on_pushed_line(&mut self, text: &str) {
        if let SessionState::Waiting { game } = &self.state {
            if let Some(color) = parse_started_color(text) {
                self.state = SessionState::Playing { game: game.clone(), color, vs_computer: false };
            }
        }
    }

    async fn handle_line(&mut self, line: &str, write_half: &mut OwnedWriteHalf) {
        let command = match protocol::parse(line) {
            Ok(command) => command,
            Err(_) => {
                self.reply(write_half, ServerReply::Error(ErrorKind::Command)).await;
                return;
            }
        };

        match command {
            ClientCommand::Start { opponent, pref } => self.handle_start(opponent, pref, write_half).await,
            ClientCommand::Board => self.handle_board(write_half).await,
            ClientCommand::Move(mv) => self.handle_move(&mv, write_half).await,
            ClientCommand::Hint(kind) => self.handle_hint(kind, write_half).await,
            ClientCommand::Resign => self.handle_resign(write_half).await,
        }
    }

    async fn handle_start(&mut self, opponent: OpponentKind, pref: ColorPref, write_half: &mut OwnedWriteHalf) {
        self.abandon_current_game().await;

        match opponent {
            OpponentKind::Computer => {
                let game = Arc::new(GameState::new_provisional());
                let color = match pref {
                    ColorPref::White => Color::White,
                    ColorPref::Black => Color::Black,
                    // No opponent to negotiate with; white is as good a default as any.
                    ColorPref::Either => Color::White,
                };
                game.set_slot(color, self.own_handle()).await;
                game.mark_started().await;

                self.reply(write_half, ServerReply::Started(color)).await;
                self.state = SessionState::Playing { game: game.clone(), color, vs_computer: true };

                if color == Color::Black {
                    self.make_computer_move(write_half).await;
                }
            }
            OpponentKind::Human => {
                let provisional = Arc::new(GameState::new_provisional());
                match self.wait_list.start_human(self.id, pref, self.outbox(), provisional).await {
                    PairResult::Paired { color, game } => {
                        self.reply(write_half, ServerReply::Started(color)).await;
                        self.state = SessionState::Playing { game, color, vs_computer: false };
                    }
                    PairResult::Waiting { game } => {
                        self.state = SessionState::Waiting { game };
                    }
                }
            }
        }
    }

    async fn handle_board(&mut self, write_half: &mut OwnedWriteHalf) {
        let fen = match &self.state {
            SessionState::Pregame => {
                self.reply(write_half, ServerReply::Error(ErrorKind::Game)).await;
                return;
            }
            SessionState::Waiting { game } | SessionState::Playing { game, .. } => game.current_fen().await,
        };
        let snapshot = self.engine.board_and_fen(&fen).await;
        self.reply(write_half, ServerReply::Board(snapshot.board_block)).await;
    }

    async fn handle_hint(&mut self, kind: HintKind, write_half: &mut OwnedWriteHalf) {
        let fen = match &self.state {
            SessionState::Playing { game, .. } => game.current_fen().await,
            _ => {
                self.reply(write_half, ServerReply::Error(ErrorKind::Game)).await;
                return;
            }
        };
        let reply = match kind {
            HintKind::Best => ServerReply::Moves(vec![self.engine.best_move(&fen).await]),
            HintKind::All => ServerReply::Moves(self.engine.all_moves(&fen).await),
        };
        self.reply(write_half, reply).await;
    }

    async fn handle_move(&mut self, mv: &str, write_half: &mut OwnedWriteHalf) {
        let (game, color, vs_computer) = match &self.state {
            SessionState::Playing { game, color, vs_computer } => (game.clone(), *color, *vs_computer),
            _ => {
                self.reply(write_half, ServerReply::Error(ErrorKind::Game)).await;
                return;
            }
        };

        if !protocol::move_is_syntactically_valid(mv) {
            self.reply(write_half, ServerReply::Error(ErrorKind::Command)).await;
            return;
        }

        if game.whose_turn().await != color {
            self.reply(write_half, ServerReply::Error(ErrorKind::Turn)).await;
            return;
        }

        let fen = game.current_fen().await;
        let Some(snapshot) = self.engine.apply_move(&fen, mv).await else {
            self.reply(write_half, ServerReply::Error(ErrorKind::Move)).await;
            return;
        };

        self.reply(write_half, ServerReply::Ok).await;
        game.set_fen(snapshot.fen.clone()).await;

        if let Some(opponent) = game.opponent_of(color).await {
            self.registry.send_to(opponent.session_id, ServerReply::Moved(mv.to_string()).render());
        }

        let continues = self.evaluate_position(&game, &snapshot, write_half).await;

        if continues && vs_computer {
            self.make_computer_move(write_half).await;
        }
    }

    async fn handle_resign(&mut self, write_half: &mut OwnedWriteHalf) {
        match &self.state {
            SessionState::Playing { color, .. } => {
                let winner = opposite(*color);
                self.reply(write_half, ServerReply::GameOverResignation(winner)).await;
                self.abandon_current_game().await;
            }
            SessionState::Waiting { .. } => {
                self.wait_list.remove(self.id).await;
                self.state = SessionState::Pregame;
                self.reply(write_half, ServerReply::Ok).await;
            }
            SessionState::Pregame => {
                self.reply(write_half, ServerReply::Error(ErrorKind::Game)).await;
            }
        }
    }

    /// Ask the engine for its move, commit it with `apply_move`, relay it
    /// to the client, and run the usual post-move evaluation. The engine is
    /// assumed to always offer a legal move; a rejection here would mean
    /// the engine and our notion of the current position have diverged,
    /// which we treat as an engine fault rather than a silent no-op.
    async fn make_computer_move(&mut self, write_half: &mut OwnedWriteHalf) {
        let (game, _color, _) = match &self.state {
            SessionState::Playing { game, color, vs_computer } => (game.clone(), *color, *vs_computer),
            _ => return,
        };

        let fen = game.current_fen().await;
        let best = self.engine.best_move(&fen).await;
        match self.engine.apply_move(&fen, &best).await {
            Some(snapshot) => {
                game.set_fen(snapshot.fen.clone()).await;
                self.reply(write_half, ServerReply::Moved(best)).await;
                self.evaluate_position(&game, &snapshot, write_half).await;
            }
            None => {
                warn!("engine's own best move {} was rejected applying it", best);
            }
        }
    }

    /// Check the position after a committed move for check/checkmate/
    /// stalemate and notify both players. Returns whether the game is
    /// still in progress.
    async fn evaluate_position(
        &mut self,
        game: &Arc<GameState>,
        snapshot: &BoardSnapshot,
        write_half: &mut OwnedWriteHalf,
    ) -> bool {
        let remaining_moves = self.engine.all_moves(&snapshot.fen).await;

        if remaining_moves.is_empty() {
            let winner = snapshot.winner();
            let reply = if snapshot.in_check {
                ServerReply::GameOverCheckmate(winner)
            } else {
                ServerReply::GameOverStalemate
            };
            self.notify_both(game, &reply, write_half).await;
            self.state = SessionState::Pregame;
            false
        } else if snapshot.in_check {
            self.notify_both(game, &ServerReply::Check, write_half).await;
            true
        } else {
            true
        }
    }

    /// Send `reply` to this client's own socket and, if a human opponent is
    /// present, to theirs via the registry.
    async fn notify_both(&mut self, game: &Arc<GameState>, reply: &ServerReply, write_half: &mut OwnedWriteHalf) {
        self.reply_ref(write_half, reply).await;
        if let Some(color) = self.current_color() {
            if let Some(opponent) = game.opponent_of(color).await {
                self.registry.send_to(opponent.session_id, reply.render());
            }
        }
    }

    fn current_color(&self) -> Option<Color> {
        match &self.state {
            SessionState::Playing { color, .. } => Some(*color),
            _ => None,
        }
    }

    /// Resignation-equivalent teardown of whatever game this session is
    /// currently in, used by an explicit `resign`, an abandoning `start`,
    /// and peer disconnect. Notifies a human opponent, clears this side's
    /// slot, and returns the session to `Pregame`. Does not write anything
    /// to this session's own socket; callers that need a reply to
    /// themselves (an explicit `resign`) send it first.
    async fn abandon_current_game(&mut self) {
        match &self.state {
            SessionState::Playing { game, color, .. } => {
                let winner = opposite(*color);
                if let Some(opponent) = game.opponent_of(*color).await {
                    self.registry
                        .send_to(opponent.session_id, ServerReply::GameOverResignation(winner).render());
                }
                game.clear_slot(*color).await;
            }
            SessionState::Waiting { .. } => {
                self.wait_list.remove(self.id).await;
            }
            SessionState::Pregame => {}
        }
        self.state = SessionState::Pregame;
    }

    async fn handle_eof(&mut self) {
        self.abandon_current_game().await;
    }

    fn own_handle(&self) -> PlayerHandle {
        PlayerHandle { session_id: self.id, outbox: self.outbox() }
    }

    fn outbox(&self) -> tokio::sync::mpsc::UnboundedSender<String> {
        self.outbox_tx.clone()
    }

    async fn reply(&self, write_half: &mut OwnedWriteHalf, reply: ServerReply) {
        let _ = protocol::write_reply(write_half, &reply).await;
    }

    async fn reply_ref(&self, write_half: &mut OwnedWriteHalf, reply: &ServerReply) {
        let _ = protocol::write_reply(write_half, reply).await;
    }
}

fn opposite(color: Color) -> Color {
    match color {
        Color::White => Color::Black,
        Color::Black => Color::White,
    }
}

fn parse_started_color(line: &str) -> Option<Color> {
    match line.trim() {
        "started white" => Some(Color::White),
        "started black" => Some(Color::Black),
        _ => None,
    }
}
