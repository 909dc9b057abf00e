use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

/// Multi-client chess mediation server.
#[derive(Parser, Debug)]
#[command(name = "uqchessserver", version, about, long_about = None)]
pub struct Cli {
    /// TCP port to listen on. Omitted or 0 means an OS-assigned ephemeral
    /// port, printed on the diagnostic stream once bound. May be given at
    /// most once.
    #[arg(long, action = ArgAction::Append)]
    listen: Vec<u16>,

    /// Path to the external chess engine binary. Falls back to
    /// `UQCHESSSERVER_ENGINE` if not given on the command line.
    #[arg(long, env = "UQCHESSSERVER_ENGINE")]
    pub engine: PathBuf,
}

impl Cli {
    /// Parse `std::env::args_os()`, rejecting a repeated `--listen` as a
    /// usage error rather than silently keeping the last occurrence (clap's
    /// default `ArgAction::Set` behavior).
    pub fn try_parse_checked() -> Result<Self, clap::Error> {
        let cli = <Self as Parser>::try_parse()?;
        cli.check_listen_occurrences()?;
        Ok(cli)
    }

    fn check_listen_occurrences(&self) -> Result<(), clap::Error> {
        if self.listen.len() > 1 {
            return Err(clap::Error::raw(
                ErrorKind::ArgumentConflict,
                "the argument '--listen <LISTEN>' cannot be used multiple times\n",
            ));
        }
        Ok(())
    }

    /// The port to bind: the requested port, or 0 (ephemeral) if none was
    /// given.
    pub fn listen_port(&self) -> u16 {
        self.listen.first().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listen_defaults_to_ephemeral() {
        let cli = Cli::parse_from(["uqchessserver", "--engine", "/bin/true"]);
        assert_eq!(cli.listen_port(), 0);
    }

    #[test]
    fn listen_port_is_honored() {
        let cli = Cli::parse_from(["uqchessserver", "--engine", "/bin/true", "--listen", "9000"]);
        assert_eq!(cli.listen_port(), 9000);
    }

    #[test]
    fn repeated_listen_is_a_usage_error() {
        let cli = Cli::try_parse_from([
            "uqchessserver",
            "--engine",
            "/bin/true",
            "--listen",
            "9000",
            "--listen",
            "9001",
        ])
        .expect("clap itself accepts repeated --listen");
        assert!(cli.check_listen_occurrences().is_err());
    }
}
