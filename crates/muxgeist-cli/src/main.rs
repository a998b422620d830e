//! muxgeist CLI and daemon entry point.

mod args;
mod daemon;

use anyhow::Context;
use clap::Parser;
use muxgeist_core::protocol::{Command, ContextReport};
use tracing::{debug, error, info};

use crate::args::{Cli, Commands};
use crate::daemon::bridge::ProcessBridge;
use crate::daemon::paths;
use crate::daemon::tmux::TmuxClient;
use crate::daemon::{DaemonClient, DaemonConfig, DaemonServer, ShutdownToken};

fn main() {
    // Logs go to stderr so query output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Daemon(args) = &cli.command {
        let config = DaemonConfig::from_args(cli.socket.as_deref(), args);
        if let Err(e) = run_daemon(config) {
            error!("Failed to run daemon: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = run_client_command(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Convert CLI args to a protocol Command, plus whether to print JSON.
///
/// Returns None for commands that don't query the daemon.
fn cli_to_command(command: &Commands) -> Option<(Command, bool)> {
    match command {
        Commands::Status => Some((Command::Status, false)),
        Commands::List => Some((Command::List, false)),
        Commands::Context(args) => Some((
            Command::Context {
                session: args.session.clone(),
            },
            args.json,
        )),
        Commands::Daemon(_) => None,
    }
}

/// Send one query and print the answer.
///
/// Daemon-side errors (`ERROR: ...`) are printed like any other response;
/// only transport failures are returned as errors.
fn run_client_command(cli: Cli) -> anyhow::Result<()> {
    let Some((command, json)) = cli_to_command(&cli.command) else {
        return Ok(());
    };
    let socket_path = paths::get_socket_path(cli.socket.as_deref());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let response = runtime.block_on(async {
        DaemonClient::connect(&socket_path)
            .await?
            .request(&command)
            .await
    })?;

    if json {
        print_json(&response)
    } else {
        print_text(&response);
        Ok(())
    }
}

fn print_text(response: &str) {
    let text = response.strip_suffix('\n').unwrap_or(response);
    if !text.is_empty() {
        println!("{}", text);
    }
}

/// Print a `context:` response as structured JSON, or as-is when it is not
/// a context block.
fn print_json(response: &str) -> anyhow::Result<()> {
    let report = match ContextReport::parse(response) {
        Ok(report) => report,
        Err(e) => {
            debug!("Not a context block: {}", e);
            print_text(response);
            return Ok(());
        }
    };

    let value = serde_json::json!({
        "panes": report.pane_sections(),
        "report": report,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialize report")?
    );
    Ok(())
}

/// Run the daemon in the foreground until SIGINT or SIGTERM.
///
/// Everything runs on one current-thread runtime. The signal listener only
/// cancels the shutdown token; the daemon loop notices it between
/// iterations and cleans up the socket and PID files itself.
fn run_daemon(config: DaemonConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let client = TmuxClient::new(
            config.tmux_program.clone(),
            ProcessBridge::new(config.command_timeout),
            config.buffer_capacity,
        );
        let mut server = DaemonServer::bind(&config, client)
            .await
            .context("Failed to start daemon")?;

        let shutdown = ShutdownToken::new();
        let signals = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
                _ = sigterm() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
            }
            signals.cancel();
        });

        server.run(&shutdown).await?;
        debug!(phase = ?server.phase(), "daemon exited");
        Ok(())
    })
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, daemon will only respond to SIGINT",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
