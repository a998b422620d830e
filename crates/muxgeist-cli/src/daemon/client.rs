//! Client for querying a running daemon.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use muxgeist_core::protocol::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

/// How long to wait for the daemon to answer.
///
/// The daemon finishes its current tick before it accepts, so this covers a
/// slow refresh as well as the reply itself.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// One-shot connection to the daemon.
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {:?} (is `muxgeist daemon` running?)",
                socket_path
            )
        })?;
        debug!("Connected to daemon at {:?}", socket_path);
        Ok(Self { stream })
    }

    /// Send `command` and return the raw response text.
    pub async fn request(self, command: &Command) -> Result<String> {
        self.request_with_timeout(command, RESPONSE_TIMEOUT).await
    }

    /// Send `command` and wait at most `timeout_duration` for the response.
    pub async fn request_with_timeout(
        mut self,
        command: &Command,
        timeout_duration: Duration,
    ) -> Result<String> {
        let request = command.to_wire();
        debug!("Sending: {}", request);

        self.stream
            .write_all(request.as_bytes())
            .await
            .context("Failed to write request")?;
        self.stream
            .shutdown()
            .await
            .context("Failed to finish request")?;

        let mut response = Vec::new();
        timeout(timeout_duration, self.stream.read_to_end(&mut response))
            .await
            .context("Request timed out")?
            .context("Failed to read response")?;

        if response.is_empty() && !matches!(command, Command::List) {
            bail!("Daemon closed connection without a response");
        }

        debug!("Received: {} bytes", response.len());
        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::daemon::config::DaemonConfig;
    use crate::daemon::server::DaemonServer;
    use crate::daemon::shutdown::ShutdownToken;
    use muxgeist_core::fake::{FakeMultiplexer, FakeSession};
    use muxgeist_core::protocol::ContextReport;
    use uuid::Uuid;

    fn temp_socket() -> (PathBuf, PathBuf) {
        let short_id = Uuid::new_v4().simple().to_string();
        let base_dir =
            PathBuf::from("/tmp").join(format!("muxgeist-client-test-{}", &short_id[..8]));
        (base_dir.join("muxgeist.sock"), base_dir)
    }

    #[tokio::test]
    async fn test_client_round_trip() {
        let (socket_path, base_dir) = temp_socket();
        let config = DaemonConfig::default().with_socket(socket_path.clone());

        let fake = FakeMultiplexer::new();
        fake.add_session(
            "work",
            FakeSession::new("%2", "/srv/work").with_active_content("x\n"),
        );

        let mut server = DaemonServer::bind(&config, fake)
            .await
            .expect("Failed to bind server");
        let shutdown = ShutdownToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { server.run(&token).await });

        let status = DaemonClient::connect(&socket_path)
            .await
            .expect("Failed to connect")
            .request(&Command::Status)
            .await
            .expect("Request failed");
        assert_eq!(status, "OK: 1 sessions tracked");

        let context = DaemonClient::connect(&socket_path)
            .await
            .expect("Failed to connect")
            .request(&Command::Context {
                session: "work".to_string(),
            })
            .await
            .expect("Request failed");
        let report = ContextReport::parse(&context).expect("parse report");
        assert_eq!(report.session_id, "work");
        assert_eq!(report.working_directory, "/srv/work");
        assert_eq!(report.active_pane_id, "%2");
        // No panes listed, so the active pane's raw capture is the context.
        assert_eq!(report.context, "x\n");

        shutdown.cancel();
        let _ = timeout(Duration::from_secs(2), handle).await;
        let _ = std::fs::remove_dir_all(&base_dir);
    }

    #[tokio::test]
    async fn test_connect_without_daemon_fails() {
        let (socket_path, _base_dir) = temp_socket();
        let err = match DaemonClient::connect(&socket_path).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Failed to connect to daemon"));
    }
}
