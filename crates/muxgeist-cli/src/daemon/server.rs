//! Unix socket server and control loop for the daemon process.
//!
//! Everything runs on one task. The loop alternates between refreshing the
//! registry and serving queries:
//!
//! ```text
//! Starting -> Listening -> (Polling <-> Serving) -> ShuttingDown -> Stopped
//! ```
//!
//! While serving, the loop waits for a connection no longer than the time
//! left until the next tick. Each connection gets one request and one
//! response, then is closed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use muxgeist_core::aggregate::PaneAggregator;
use muxgeist_core::multiplexer::MultiplexerClient;
use muxgeist_core::protocol::{Command, Response};
use muxgeist_core::registry::SessionRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::daemon::config::DaemonConfig;
use crate::daemon::paths;
use crate::daemon::poll::PollLoop;
use crate::daemon::shutdown::ShutdownToken;

/// Requests longer than this are cut; every valid request is far shorter.
const MAX_REQUEST_SIZE: usize = 8 * 1024;

/// Pause after a failed `accept` before waiting for connections again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    Starting,
    Listening,
    Polling,
    Serving,
    ShuttingDown,
    Stopped,
}

/// What ended a wait for a connection.
enum Wake {
    Connection(UnixStream),
    AcceptError,
    Tick,
    Shutdown,
}

/// The daemon: socket, registry and poll loop, owned by a single task.
pub struct DaemonServer<C> {
    listener: UnixListener,
    socket_path: PathBuf,
    pid_path: PathBuf,
    registry: SessionRegistry,
    poller: PollLoop<C>,
    poll_interval: Duration,
    request_timeout: Duration,
    phase: DaemonPhase,
}

impl<C: MultiplexerClient> DaemonServer<C> {
    /// Bind the socket described by `config`.
    ///
    /// Uses a bind-first approach to avoid TOCTOU race conditions:
    /// 1. Try to bind directly
    /// 2. If the socket is in use, try to connect to it
    /// 3. If nothing accepts, remove the stale socket and retry
    /// 4. Otherwise return an error
    ///
    /// A leftover PID file does not keep a dead socket alive: after a crash
    /// its PID may belong to an unrelated process.
    pub async fn bind(config: &DaemonConfig, client: C) -> Result<Self> {
        let socket_path = config.socket_path.clone();
        let pid_path = config.pid_path.clone();
        debug!(phase = ?DaemonPhase::Starting, "binding {:?}", socket_path);

        paths::ensure_socket_dir(&socket_path)
            .with_context(|| format!("Failed to create socket directory for {:?}", socket_path))?;

        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if accepts_connections(&socket_path) {
                    anyhow::bail!(
                        "Daemon already running (socket {:?} accepts connections)",
                        socket_path
                    );
                }

                if let Some(pid) = running_pid(&pid_path) {
                    info!(
                        "PID file {:?} names running process {}, but its socket is dead",
                        pid_path, pid
                    );
                }

                remove_stale_socket(&socket_path)?;

                UnixListener::bind(&socket_path)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path))?
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path));
            }
        };

        // Written right after bind so a concurrent starter never sees our
        // socket without a PID file.
        std::fs::write(&pid_path, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file: {:?}", pid_path))?;

        info!("Daemon listening on {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
            pid_path,
            registry: SessionRegistry::new(config.max_sessions, config.buffer_capacity),
            poller: PollLoop::new(client, PaneAggregator::new(config.aggregator_config())),
            poll_interval: config.poll_interval,
            request_timeout: config.request_timeout,
            phase: DaemonPhase::Listening,
        })
    }

    pub fn phase(&self) -> DaemonPhase {
        self.phase
    }

    /// Run until `shutdown` is cancelled, then remove the socket and PID file.
    ///
    /// Cancellation is observed between iterations: a tick or a request in
    /// progress finishes first.
    pub async fn run(&mut self, shutdown: &ShutdownToken) -> Result<()> {
        if self.phase == DaemonPhase::Stopped {
            anyhow::bail!("Daemon already stopped");
        }

        let mut next_tick = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let now = Instant::now();
            if now >= next_tick {
                self.phase = DaemonPhase::Polling;
                // Discovery failures are logged by the poll loop; the next
                // tick retries.
                if let Ok(report) = self.poller.tick(&mut self.registry).await {
                    debug!(
                        tracked = self.registry.len(),
                        discovered = report.discovered,
                        created = report.created,
                        rejected = report.rejected,
                        refreshed = report.refreshed,
                        failed = report.failed,
                        "tick complete"
                    );
                }
                next_tick = Instant::now() + self.poll_interval;
                continue;
            }

            self.phase = DaemonPhase::Serving;
            let wake = tokio::select! {
                _ = shutdown.cancelled() => Wake::Shutdown,
                accepted = timeout(next_tick - now, self.listener.accept()) => match accepted {
                    Ok(Ok((stream, _addr))) => Wake::Connection(stream),
                    Ok(Err(e)) => {
                        warn!("Accept error: {}", e);
                        Wake::AcceptError
                    }
                    Err(_elapsed) => Wake::Tick,
                },
            };

            match wake {
                Wake::Connection(stream) => self.serve(stream).await,
                Wake::AcceptError => {
                    tokio::time::sleep(accept_backoff(next_tick, Instant::now())).await;
                }
                Wake::Tick => {}
                Wake::Shutdown => break,
            }
        }

        info!("Shutdown requested, stopping daemon");
        self.stop();
        Ok(())
    }

    async fn serve(&self, mut stream: UnixStream) {
        let request = match read_request(&mut stream, self.request_timeout).await {
            Ok(request) => request,
            Err(e) => {
                debug!("Dropping connection: {:#}", e);
                return;
            }
        };

        let response = handle_request(&self.registry, &request);
        if response.is_error() {
            debug!("Request {:?} answered with {}", request, response);
        }

        if let Err(e) = write_response(&mut stream, &response).await {
            debug!("Failed to send response: {:#}", e);
        }
    }
}

impl<C> DaemonServer<C> {
    /// Remove the socket and PID file. Idempotent.
    pub fn stop(&mut self) {
        if self.phase == DaemonPhase::Stopped {
            return;
        }
        self.phase = DaemonPhase::ShuttingDown;
        debug!(phase = ?self.phase, "removing {:?} and {:?}", self.socket_path, self.pid_path);
        if self.socket_path.exists() && std::fs::remove_file(&self.socket_path).is_err() {
            warn!("Failed to remove socket on shutdown");
        }
        if self.pid_path.exists() && std::fs::remove_file(&self.pid_path).is_err() {
            warn!("Failed to remove PID file on shutdown");
        }
        self.phase = DaemonPhase::Stopped;
        info!("Daemon stopped");
    }
}

impl<C> Drop for DaemonServer<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parse one raw request and answer it from `registry`.
fn handle_request(registry: &SessionRegistry, request: &str) -> Response {
    let command = Command::parse(request);
    debug!(?command, "handling request");
    Response::for_command(registry, &command)
}

/// Read a single request.
///
/// Clients send the request in one write without waiting for EOF, so this
/// performs one read and keeps everything before the first newline.
async fn read_request(stream: &mut UnixStream, limit: Duration) -> Result<String> {
    let mut buf = vec![0u8; MAX_REQUEST_SIZE];
    let n = timeout(limit, stream.read(&mut buf))
        .await
        .context("Timed out waiting for request")?
        .context("Failed to read request")?;

    let bytes = &buf[..n];
    let end = bytes.iter().position(|&b| b == b'\n').unwrap_or(n);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
    stream
        .write_all(response.to_string().as_bytes())
        .await
        .context("Failed to write response")?;
    stream.shutdown().await.context("Failed to close connection")?;
    Ok(())
}

/// How long to pause after an accept error: the backoff, or less if the next
/// tick is due sooner.
fn accept_backoff(next_tick: Instant, now: Instant) -> Duration {
    ACCEPT_ERROR_BACKOFF.min(next_tick.saturating_duration_since(now))
}

/// The PID recorded in `pid_path`, if that process is still running
/// (verified via kill(pid, 0)). Only used for diagnostics.
fn running_pid(pid_path: &Path) -> Option<i32> {
    let pid: i32 = std::fs::read_to_string(pid_path)
        .ok()
        .and_then(|s| s.trim().parse().ok())?;
    if pid <= 0 {
        return None;
    }

    // SAFETY: kill with signal 0 only checks that the process exists and may
    // be signalled; nothing is delivered.
    let alive = unsafe { libc::kill(pid, 0) == 0 };
    alive.then_some(pid)
}

/// Whether a live daemon is accepting connections on `socket_path`.
fn accepts_connections(socket_path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Remove a leftover socket, refusing anything that is not a socket.
fn remove_stale_socket(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    // Don't follow symlinks.
    let metadata = std::fs::symlink_metadata(socket_path)
        .with_context(|| format!("Failed to stat socket path: {:?}", socket_path))?;

    if metadata.file_type().is_symlink() {
        anyhow::bail!(
            "Socket path {:?} is a symlink, refusing to delete for safety",
            socket_path
        );
    }

    if !metadata.file_type().is_socket() {
        anyhow::bail!(
            "Path {:?} exists but is not a socket file (type: {:?}); move or delete it, or start with --socket <PATH>",
            socket_path,
            metadata.file_type()
        );
    }

    info!("Removing stale socket from dead daemon");
    std::fs::remove_file(socket_path)
        .with_context(|| format!("Failed to remove stale socket: {:?}", socket_path))
}
