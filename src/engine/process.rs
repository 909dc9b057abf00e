use std::path::Path;
use std::process::Stdio;

use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use super::types::{EngineError, EngineResult, ENGINE_INIT_TIMEOUT};

/// Low-level handle on the running engine conversation: a writable half, a
/// line reader over the readable half, and (when backed by a real
/// subprocess) the `Child` itself, kept so the process can be reaped on
/// shutdown or death.
///
/// `EngineIo` does no protocol-level sequencing; it only knows how to spawn
/// the child, write a line, and read a line. [`super::driver::EngineDriver`]
/// builds the `isready`/`go`/`d` conversations on top of it. The read/write
/// halves are boxed trait objects so the same conversation logic can run
/// against a real child process or, in tests, an in-memory duplex pipe
/// speaking the same line protocol.
pub struct EngineIo {
    child: Option<Child>,
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
    lines: Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>,
}

impl EngineIo {
    /// Spawn the engine binary at `path` with piped stdio and drain its
    /// stderr to the log so a chatty engine can't fill its pipe buffer and
    /// deadlock.
    pub fn spawn(path: &Path) -> EngineResult<Self> {
        info!("spawning chess engine: {:?}", path);

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(EngineError::NoStdout)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut stderr_lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = stderr_lines.next_line().await {
                    warn!("[engine-stderr] {}", line);
                }
            });
        }

        Ok(Self::new(Some(child), stdin, stdout))
    }

    fn new(
        child: Option<Child>,
        stdin: impl AsyncWrite + Unpin + Send + 'static,
        stdout: impl AsyncRead + Unpin + Send + 'static,
    ) -> Self {
        let boxed_stdout: Box<dyn AsyncRead + Unpin + Send> = Box::new(stdout);
        Self {
            child,
            stdin: Box::new(stdin),
            lines: BufReader::new(boxed_stdout).lines(),
        }
    }

    /// Build an `EngineIo` over an in-memory duplex pipe instead of a real
    /// subprocess, for exercising the handshake/conversation logic against a
    /// fake engine task in tests.
    #[cfg(test)]
    pub(crate) fn from_duplex(stream: tokio::io::DuplexStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::new(None, write_half, read_half)
    }

    /// Write one line (a newline is appended) and flush immediately so the
    /// engine sees it without buffering delay.
    pub async fn write_line(&mut self, line: &str) -> EngineResult<()> {
        trace!("[engine-stdin] {}", line);
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one line from the engine's stdout, bounded by
    /// `ENGINE_ROUND_TRIP_TIMEOUT` by the caller. Returns
    /// [`EngineError::Eof`] if the stream closed.
    pub async fn read_line(&mut self) -> EngineResult<String> {
        match self.lines.next_line().await? {
            Some(line) => {
                trace!("[engine-stdout] {}", line);
                Ok(line)
            }
            None => {
                error!("engine closed its stdout unexpectedly");
                Err(EngineError::Eof)
            }
        }
    }

    /// Read lines until one equals `expected` exactly, discarding the rest.
    pub async fn read_until(&mut self, expected: &str) -> EngineResult<()> {
        loop {
            let line = self.read_line().await?;
            if line == expected {
                return Ok(());
            }
        }
    }

    /// Run the `isready` / `readyok` exchange.
    pub async fn wait_ready(&mut self) -> EngineResult<()> {
        self.write_line("isready").await?;
        self.read_until("readyok").await
    }

    /// Perform the full startup handshake: `isready`/`readyok` followed by
    /// `uci`/`uciok`, each bounded by `ENGINE_INIT_TIMEOUT`.
    pub async fn handshake(&mut self) -> EngineResult<()> {
        timeout(ENGINE_INIT_TIMEOUT, self.wait_ready())
            .await
            .map_err(|_| EngineError::InitTimeout)??;
        self.write_line("uci").await?;
        timeout(ENGINE_INIT_TIMEOUT, self.read_until("uciok"))
            .await
            .map_err(|_| EngineError::InitTimeout)??;
        debug!("engine handshake complete");
        Ok(())
    }

    /// Terminate the child, best-effort: ask it to `quit`, then kill if it
    /// doesn't exit on its own. A no-op when there is no backing process
    /// (the in-memory test harness).
    pub async fn shutdown(mut self) {
        let _ = self.write_line("quit").await;
        let Some(mut child) = self.child.take() else {
            return;
        };
        match tokio::time::timeout(std::time::Duration::from_millis(500), child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }
    }

    /// Reap the child after it has already died (stdout EOF observed).
    pub async fn reap(mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.wait().await;
        }
    }
}
