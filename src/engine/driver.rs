use std::path::Path;
use std::sync::Arc;

use log::{debug, error, warn};
use shakmaty::Color;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::process::EngineIo;
use super::types::{
    EngineError, EngineResult, BoardSnapshot, BEST_MOVE_DEPTH, BEST_MOVE_MOVETIME_MS,
    ENGINE_ROUND_TRIP_TIMEOUT,
};
use crate::registry::ClientRegistry;

/// Exit code used when the engine subprocess dies or otherwise fails a
/// round trip irrecoverably. There is no restart path; the whole server
/// goes down with it.
pub const EXIT_ENGINE_DEATH: i32 = 5;

/// Serializes every interaction with the single external engine process and
/// turns its line-oriented replies into structured results.
///
/// Every public method here acquires the exclusivity lock for its whole
/// round trip: nothing else may write a command or read a reply until the
/// call returns. Any I/O failure (write, flush, EOF, or a round trip that
/// outlives its timeout) is treated as the engine having died: every public
/// method diverges through [`EngineDriver::die`] rather than returning an
/// error, because there is no meaningful way for a caller to keep serving
/// clients once the single shared engine is gone.
pub struct EngineDriver {
    // `None` only after `die` has taken the child out to reap it, which
    // happens immediately before the process exits.
    io: Mutex<Option<EngineIo>>,
    registry: Arc<ClientRegistry>,
}

impl EngineDriver {
    /// Spawn the engine at `path` and run the startup handshake. Failure
    /// here is reported to the caller (an engine-start error), not treated
    /// as a fatal in-flight death, since the server hasn't bound its socket
    /// yet.
    pub async fn start(path: &Path, registry: Arc<ClientRegistry>) -> EngineResult<Arc<Self>> {
        let mut io = EngineIo::spawn(path)?;
        io.handshake().await?;
        Ok(Arc::new(Self {
            io: Mutex::new(Some(io)),
            registry,
        }))
    }

    /// Build a driver directly over an already-connected [`EngineIo`],
    /// skipping the startup handshake. Used to exercise the driver (and, in
    /// `crate::session`'s tests, a whole client session) against an
    /// in-process fake engine.
    #[cfg(test)]
    pub(crate) fn for_test(io: EngineIo) -> Self {
        Self {
            io: Mutex::new(Some(io)),
            registry: Arc::new(ClientRegistry::new()),
        }
    }

    /// Notify every live session that the engine is gone, reap the child so
    /// it isn't left a zombie, log the fatal condition, and terminate the
    /// process. Never returns.
    async fn die(&self, err: EngineError) -> ! {
        error!("chess engine exited unexpectedly: {}", err);
        eprintln!("uqchessserver: chess engine exited unexpectedly");
        if let Some(io) = self.io.lock().await.take() {
            io.reap().await;
        }
        self.registry.broadcast_engine_error().await;
        std::process::exit(EXIT_ENGINE_DEATH);
    }

    /// Send `ucinewgame`, re-handshake with `isready`/`readyok`, then load
    /// `fen` as the current position.
    async fn set_position(&self, io: &mut EngineIo, fen: &str) -> EngineResult<()> {
        io.write_line("ucinewgame").await?;
        io.wait_ready().await?;
        io.write_line(&format!("position fen {}", fen)).await?;
        Ok(())
    }

    /// Send `d` and parse its reply into a [`BoardSnapshot`]: everything
    /// before the `Fen:` line is the board block, the `Fen:` line gives the
    /// position, and the `Checkers:` line (the last field we care about)
    /// gives check status. Any intervening lines (e.g. a `Key:` line some
    /// engines emit) are skipped.
    async fn read_board_snapshot(&self, io: &mut EngineIo) -> EngineResult<BoardSnapshot> {
        io.write_line("d").await?;

        let mut board_lines = Vec::new();
        let fen = loop {
            let line = io.read_line().await?;
            if let Some(rest) = line.strip_prefix("Fen:") {
                break rest.trim().to_string();
            }
            board_lines.push(line);
        };

        let checkers = loop {
            let line = io.read_line().await?;
            if let Some(rest) = line.strip_prefix("Checkers:") {
                break rest.trim().to_string();
            }
        };

        let side_to_move = side_to_move_from_fen(&fen)?;

        Ok(BoardSnapshot {
            board_block: board_lines.join("\n"),
            fen,
            in_check: !checkers.is_empty(),
            side_to_move,
        })
    }

    /// `BestMove(fen)`: load the position, ask for a fixed-depth/movetime
    /// search, and return the move after `bestmove`.
    pub async fn best_move(&self, fen: &str) -> String {
        match self.try_best_move(fen).await {
            Ok(m) => m,
            Err(e) => self.die(e).await,
        }
    }

    async fn try_best_move(&self, fen: &str) -> EngineResult<String> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().expect("engine io already reaped");
        let fut = async {
            self.set_position(io, fen).await?;
            io.write_line(&format!(
                "go movetime {} depth {}",
                BEST_MOVE_MOVETIME_MS, BEST_MOVE_DEPTH
            ))
            .await?;
            loop {
                let line = io.read_line().await?;
                if let Some(rest) = line.strip_prefix("bestmove ") {
                    let mv = rest.split_whitespace().next().unwrap_or_default();
                    return Ok(mv.to_string());
                }
            }
        };
        timeout(ENGINE_ROUND_TRIP_TIMEOUT, fut)
            .await
            .unwrap_or(Err(EngineError::Timeout))
    }

    /// `AllMoves(fen)`: load the position, run `go perft 1`, and collect
    /// every `<move>: <count>` line until one is seen that doesn't match
    /// that shape.
    pub async fn all_moves(&self, fen: &str) -> Vec<String> {
        match self.try_all_moves(fen).await {
            Ok(moves) => moves,
            Err(e) => self.die(e).await,
        }
    }

    async fn try_all_moves(&self, fen: &str) -> EngineResult<Vec<String>> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().expect("engine io already reaped");
        let fut = async {
            self.set_position(io, fen).await?;
            io.write_line("go perft 1").await?;
            let mut moves = Vec::new();
            loop {
                let line = io.read_line().await?;
                match parse_perft_move_line(&line) {
                    Some(mv) => moves.push(mv),
                    None => {
                        if !moves.is_empty() || line.trim().is_empty() {
                            return Ok(moves);
                        }
                        if line.starts_with("Nodes searched") {
                            return Ok(moves);
                        }
                    }
                }
            }
        };
        timeout(ENGINE_ROUND_TRIP_TIMEOUT, fut)
            .await
            .unwrap_or(Err(EngineError::Timeout))
    }

    /// `BoardAndFen(fen)`: load the position and read back a snapshot via
    /// `d`.
    pub async fn board_and_fen(&self, fen: &str) -> BoardSnapshot {
        match self.try_board_and_fen(fen).await {
            Ok(snap) => snap,
            Err(e) => self.die(e).await,
        }
    }

    async fn try_board_and_fen(&self, fen: &str) -> EngineResult<BoardSnapshot> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().expect("engine io already reaped");
        let fut = async {
            self.set_position(io, fen).await?;
            self.read_board_snapshot(io).await
        };
        timeout(ENGINE_ROUND_TRIP_TIMEOUT, fut)
            .await
            .unwrap_or(Err(EngineError::Timeout))
    }

    /// `ApplyMove(fen, move)`: re-handshake, load `fen` with `move` appended
    /// to its move list, and read the resulting position. A move the engine
    /// silently ignores (the FEN doesn't change) is rejected.
    pub async fn apply_move(&self, fen: &str, mv: &str) -> Option<BoardSnapshot> {
        match self.try_apply_move(fen, mv).await {
            Ok(snap) => snap,
            Err(e) => self.die(e).await,
        }
    }

    async fn try_apply_move(&self, fen: &str, mv: &str) -> EngineResult<Option<BoardSnapshot>> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().expect("engine io already reaped");
        let fut = async {
            io.write_line("ucinewgame").await?;
            io.handshake().await?;
            io.write_line(&format!("position fen {} moves {}", fen, mv))
                .await?;
            let snapshot = self.read_board_snapshot(io).await?;
            if snapshot.fen == fen {
                debug!("move {} rejected by engine (fen unchanged)", mv);
                Ok(None)
            } else {
                Ok(Some(snapshot))
            }
        };
        timeout(ENGINE_ROUND_TRIP_TIMEOUT, fut)
            .await
            .unwrap_or(Err(EngineError::Timeout))
    }

    /// Shut the engine down cleanly. Used only on the ordinary exit path;
    /// the engine-death path goes through [`EngineDriver::die`] instead.
    pub async fn shutdown(self: Arc<Self>) {
        match Arc::try_unwrap(self) {
            Ok(driver) => {
                if let Some(io) = driver.io.into_inner() {
                    io.shutdown().await;
                }
            }
            Err(_) => warn!("engine driver still has outstanding references at shutdown"),
        }
    }
}

/// Parse a `go perft 1` move line of the shape `<move>: <count>` and return
/// the move token, or `None` if `line` doesn't match.
fn parse_perft_move_line(line: &str) -> Option<String> {
    let (mv, count) = line.split_once(':')?;
    let mv = mv.trim();
    let count = count.trim();
    if mv.is_empty() || mv.contains(char::is_whitespace) {
        return None;
    }
    if count.is_empty() || !count.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(mv.to_string())
}

/// Extract the side-to-move field (the second space-separated field) from
/// a FEN string.
fn side_to_move_from_fen(fen: &str) -> EngineResult<Color> {
    let field = fen
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| EngineError::MalformedReply(format!("FEN missing side-to-move field: {}", fen)))?;
    match field {
        "w" => Ok(Color::White),
        "b" => Ok(Color::Black),
        other => Err(EngineError::MalformedReply(format!(
            "unexpected side-to-move field {:?} in FEN: {}",
            other, fen
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Spawn a task that speaks the engine side of the line protocol over
    /// `stream`: for each line it reads, `responder` returns the lines to
    /// write back (possibly none).
    fn spawn_fake_engine(
        stream: tokio::io::DuplexStream,
        mut responder: impl FnMut(&str) -> Vec<String> + Send + 'static,
    ) {
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(stream);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                for reply in responder(&line) {
                    if write_half.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                    if write_half.write_all(b"\n").await.is_err() {
                        return;
                    }
                }
            }
        });
    }

    fn fake_driver(
        responder: impl FnMut(&str) -> Vec<String> + Send + 'static,
    ) -> EngineDriver {
        let (driver_side, engine_side) = tokio::io::duplex(8192);
        spawn_fake_engine(engine_side, responder);
        EngineDriver::for_test(EngineIo::from_duplex(driver_side))
    }

    #[tokio::test]
    async fn best_move_round_trips_against_a_fake_engine() {
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            l if l.starts_with("go movetime") => vec!["bestmove e2e4".to_string()],
            _ => vec![],
        });

        assert_eq!(driver.best_move(STARTING_FEN).await, "e2e4");
    }

    #[tokio::test]
    async fn all_moves_collects_perft_lines_until_the_summary() {
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            "go perft 1" => vec![
                "e2e4: 1".to_string(),
                "e2e3: 1".to_string(),
                "".to_string(),
                "Nodes searched: 20".to_string(),
            ],
            _ => vec![],
        });

        let moves = driver.all_moves(STARTING_FEN).await;
        assert_eq!(moves, vec!["e2e4".to_string(), "e2e3".to_string()]);
    }

    #[tokio::test]
    async fn all_moves_is_empty_for_a_position_with_no_legal_moves() {
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            "go perft 1" => vec!["Nodes searched: 0".to_string()],
            _ => vec![],
        });

        assert!(driver.all_moves(STARTING_FEN).await.is_empty());
    }

    #[tokio::test]
    async fn board_and_fen_parses_the_d_command_reply() {
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            "d" => vec![
                "  +---+---+".to_string(),
                "  | r | n |".to_string(),
                format!("Fen: {}", STARTING_FEN),
                "Key: 12345".to_string(),
                "Checkers:".to_string(),
            ],
            _ => vec![],
        });

        let snapshot = driver.board_and_fen(STARTING_FEN).await;
        assert_eq!(snapshot.fen, STARTING_FEN);
        assert!(!snapshot.in_check);
        assert_eq!(snapshot.side_to_move, Color::White);
        assert!(snapshot.board_block.contains("| r | n |"));
    }

    #[tokio::test]
    async fn apply_move_returns_the_snapshot_of_the_resulting_position() {
        const AFTER_E4: &str =
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            "uci" => vec!["uciok".to_string()],
            "d" => vec![
                "board".to_string(),
                format!("Fen: {}", AFTER_E4),
                "Checkers:".to_string(),
            ],
            _ => vec![],
        });

        let snapshot = driver.apply_move(STARTING_FEN, "e2e4").await;
        let snapshot = snapshot.expect("e2e4 should be accepted from the starting position");
        assert_eq!(snapshot.fen, AFTER_E4);
        assert_eq!(snapshot.side_to_move, Color::Black);
    }

    #[tokio::test]
    async fn apply_move_returns_none_when_the_engine_rejects_the_move() {
        let driver = fake_driver(|line| match line {
            "isready" => vec!["readyok".to_string()],
            "uci" => vec!["uciok".to_string()],
            "d" => vec![
                "board".to_string(),
                format!("Fen: {}", STARTING_FEN),
                "Checkers:".to_string(),
            ],
            _ => vec![],
        });

        assert!(driver.apply_move(STARTING_FEN, "a1a8").await.is_none());
    }

    #[test]
    fn perft_line_parses_move_and_count() {
        assert_eq!(parse_perft_move_line("e2e4: 1"), Some("e2e4".to_string()));
        assert_eq!(parse_perft_move_line("a7a8q: 1"), Some("a7a8q".to_string()));
    }

    #[test]
    fn perft_line_rejects_non_move_lines() {
        assert_eq!(parse_perft_move_line(""), None);
        assert_eq!(parse_perft_move_line("Nodes searched: 20"), None);
    }

    #[test]
    fn side_to_move_reads_second_fen_field() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(side_to_move_from_fen(fen).unwrap(), Color::White);

        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1";
        assert_eq!(side_to_move_from_fen(fen).unwrap(), Color::Black);
    }

    #[test]
    fn side_to_move_rejects_malformed_fen() {
        assert!(side_to_move_from_fen("not a fen").is_err());
    }
}
