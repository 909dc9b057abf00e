use std::fmt;

use shakmaty::Color;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The four-member client-facing error taxonomy. Distinct from
/// [`crate::engine::EngineError`]; session code maps specific internal
/// failures down to whichever of these is closest rather than leaking
/// internal detail over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Engine,
    Command,
    Game,
    Turn,
    Move,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            ErrorKind::Engine => "engine",
            ErrorKind::Command => "command",
            ErrorKind::Game => "game",
            ErrorKind::Turn => "turn",
            ErrorKind::Move => "move",
        };
        f.write_str(word)
    }
}

fn color_word(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Every line (or, for `Board`, multi-line block) the server can send to a
/// client.
#[derive(Debug, Clone)]
pub enum ServerReply {
    Started(Color),
    Moved(String),
    Ok,
    Check,
    GameOverCheckmate(Color),
    GameOverStalemate,
    GameOverResignation(Color),
    Moves(Vec<String>),
    Board(String),
    Error(ErrorKind),
}

impl ServerReply {
    /// Render the exact bytes to write to the client's socket, including
    /// trailing `\n`.
    pub fn render(&self) -> String {
        match self {
            ServerReply::Started(color) => format!("started {}\n", color_word(*color)),
            ServerReply::Moved(mv) => format!("moved {}\n", mv),
            ServerReply::Ok => "ok\n".to_string(),
            ServerReply::Check => "check\n".to_string(),
            ServerReply::GameOverCheckmate(winner) => {
                format!("gameover checkmate {}\n", color_word(*winner))
            }
            ServerReply::GameOverStalemate => "gameover stalemate\n".to_string(),
            ServerReply::GameOverResignation(winner) => {
                format!("gameover resignation {}\n", color_word(*winner))
            }
            ServerReply::Moves(moves) => {
                if moves.is_empty() {
                    "moves\n".to_string()
                } else {
                    format!("moves {}\n", moves.join(" "))
                }
            }
            ServerReply::Board(block) => format!("startboard\n{}\nendboard\n", block),
            ServerReply::Error(kind) => format!("error {}\n", kind),
        }
    }
}

/// Write a reply to a client socket and flush it. Any write failure here is
/// a broken-pipe-class error and is deliberately swallowed by the caller
/// (the session simply exits on its next read).
pub async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &ServerReply,
) -> std::io::Result<()> {
    writer.write_all(reply.render().as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_simple_replies() {
        assert_eq!(ServerReply::Ok.render(), "ok\n");
        assert_eq!(ServerReply::Check.render(), "check\n");
        assert_eq!(ServerReply::Started(Color::White).render(), "started white\n");
        assert_eq!(ServerReply::Moved("e2e4".to_string()).render(), "moved e2e4\n");
        assert_eq!(ServerReply::Error(ErrorKind::Turn).render(), "error turn\n");
    }

    #[test]
    fn renders_gameover_variants() {
        assert_eq!(
            ServerReply::GameOverCheckmate(Color::Black).render(),
            "gameover checkmate black\n"
        );
        assert_eq!(ServerReply::GameOverStalemate.render(), "gameover stalemate\n");
        assert_eq!(
            ServerReply::GameOverResignation(Color::White).render(),
            "gameover resignation white\n"
        );
    }

    #[test]
    fn renders_moves_list_including_empty() {
        assert_eq!(ServerReply::Moves(vec![]).render(), "moves\n");
        assert_eq!(
            ServerReply::Moves(vec!["e2e4".to_string(), "d2d4".to_string()]).render(),
            "moves e2e4 d2d4\n"
        );
    }

    #[test]
    fn renders_board_block_between_markers() {
        let block = "r n b q k b n r\np p p p p p p p".to_string();
        assert_eq!(
            ServerReply::Board(block.clone()).render(),
            format!("startboard\n{}\nendboard\n", block)
        );
    }
}
