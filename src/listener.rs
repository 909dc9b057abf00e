use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{info, warn};
use tokio::net::TcpListener;

use crate::engine::EngineDriver;
use crate::matchmaker::WaitList;
use crate::registry::ClientRegistry;
use crate::session::ClientSession;

/// Rust's runtime already ignores `SIGPIPE` on Unix before `main` runs, so a
/// write to a vanished client surfaces as an ordinary `Err` rather than
/// killing the process. This call site exists to document that policy
/// explicitly at the point the spec calls for it, ahead of binding.
pub fn install_broken_pipe_policy() {
    info!("broken-pipe-class write failures are handled as ordinary I/O errors");
}

/// Bind the listening socket and print the bound port to the diagnostic
/// stream (stderr — the same stream startup errors are reported on). The
/// only failure mode reported to the caller is the bind itself; once bound,
/// the accept loop runs forever and logs (rather than propagates)
/// per-connection accept errors.
pub async fn bind(listen_port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], listen_port));
    let listener = TcpListener::bind(addr).await?;
    let bound_port = listener.local_addr()?.port();

    eprintln!("{}", bound_port);
    std::io::stderr().flush().ok();
    info!("listening on 127.0.0.1:{}", bound_port);

    Ok(listener)
}

/// Accept connections forever, spawning one task per client. Never returns.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<EngineDriver>,
    registry: Arc<ClientRegistry>,
    wait_list: Arc<WaitList>,
) -> ! {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept a connection: {}", e);
                continue;
            }
        };
        info!("accepted connection from {}", peer);

        let engine = engine.clone();
        let registry = registry.clone();
        let wait_list = wait_list.clone();

        tokio::spawn(async move {
            ClientSession::run(socket, engine, registry, wait_list).await;
        });
    }
}
