use std::sync::Arc;

use log::error;

use uqchessserver_lib::cli::Cli;
use uqchessserver_lib::engine::EngineDriver;
use uqchessserver_lib::error::{exit_code, Error};
use uqchessserver_lib::listener;
use uqchessserver_lib::matchmaker::WaitList;
use uqchessserver_lib::registry::ClientRegistry;

#[tokio::main]
async fn main() {
    env_logger::init();

    // `Cli::parse()` would print clap's own message and exit on its own
    // terms (not our documented usage-error code), so argument parsing is
    // routed through `Error::Usage` instead.
    let cli = match Cli::try_parse_checked() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(exit_code::USAGE);
        }
    };

    listener::install_broken_pipe_policy();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("{}", e.diagnostic());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let registry = Arc::new(ClientRegistry::new());
    let wait_list = Arc::new(WaitList::new());

    let engine = EngineDriver::start(&cli.engine, registry.clone())
        .await
        .map_err(Error::EngineStart)?;

    let tcp_listener = listener::bind(cli.listen_port()).await.map_err(Error::Bind)?;

    listener::serve(tcp_listener, engine, registry, wait_list).await
}
