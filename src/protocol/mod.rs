//! The line-oriented client protocol: command parsing and reply rendering.

pub mod command;
pub mod reply;

pub use command::{parse, move_is_syntactically_valid, ClientCommand, ColorPref, HintKind, OpponentKind, UnrecognizedCommand};
pub use reply::{write_reply, ErrorKind, ServerReply};
