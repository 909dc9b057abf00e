use once_cell::sync::Lazy;
use regex::Regex;

static MOVE_SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{4,5}$").unwrap());

/// Requested opponent in a `start` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentKind {
    Human,
    Computer,
}

/// Requested colour in a `start` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPref {
    White,
    Black,
    Either,
}

/// Which flavour of hint was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintKind {
    Best,
    All,
}

/// A parsed client command. Parsing here is purely syntactic at the
/// word-boundary level: it does not check whether a `move` token is a
/// well-formed move, since that check only applies while the session is
/// actually playing and must be ordered ahead of the turn check (see
/// `move_is_syntactically_valid`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Start { opponent: OpponentKind, pref: ColorPref },
    Board,
    Move(String),
    Hint(HintKind),
    Resign,
}

/// Marker for any line that isn't one of the five recognized commands, or
/// is a recognized command with the wrong number/shape of arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrecognizedCommand;

/// Parse one client line (already stripped of its trailing `\n`) into a
/// command.
pub fn parse(line: &str) -> Result<ClientCommand, UnrecognizedCommand> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("start") => {
            let opponent = match tokens.next() {
                Some("human") => OpponentKind::Human,
                Some("computer") => OpponentKind::Computer,
                _ => return Err(UnrecognizedCommand),
            };
            let pref = match tokens.next() {
                Some("white") => ColorPref::White,
                Some("black") => ColorPref::Black,
                Some("either") => ColorPref::Either,
                _ => return Err(UnrecognizedCommand),
            };
            if tokens.next().is_some() {
                return Err(UnrecognizedCommand);
            }
            Ok(ClientCommand::Start { opponent, pref })
        }
        Some("board") => {
            if tokens.next().is_some() {
                return Err(UnrecognizedCommand);
            }
            Ok(ClientCommand::Board)
        }
        Some("move") => {
            let mv = tokens.next().ok_or(UnrecognizedCommand)?;
            if tokens.next().is_some() {
                return Err(UnrecognizedCommand);
            }
            Ok(ClientCommand::Move(mv.to_string()))
        }
        Some("hint") => {
            let kind = match tokens.next() {
                Some("best") => HintKind::Best,
                Some("all") => HintKind::All,
                _ => return Err(UnrecognizedCommand),
            };
            if tokens.next().is_some() {
                return Err(UnrecognizedCommand);
            }
            Ok(ClientCommand::Hint(kind))
        }
        Some("resign") => {
            if tokens.next().is_some() {
                return Err(UnrecognizedCommand);
            }
            Ok(ClientCommand::Resign)
        }
        _ => Err(UnrecognizedCommand),
    }
}

/// Whether `mv` matches the wire syntax for a move token: 4 or 5
/// alphanumeric characters (e.g. `e2e4`, `a7a8q`).
pub fn move_is_syntactically_valid(mv: &str) -> bool {
    MOVE_SYNTAX.is_match(mv)
}
