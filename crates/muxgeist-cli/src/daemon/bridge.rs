//! Bounded, timed execution of external query commands.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use muxgeist_core::error::MultiplexerError;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::trace;

/// Default timeout for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Output of one external command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output, truncated to the caller's limit, minus one trailing
    /// newline.
    pub stdout: String,
    pub status: ExitStatus,
    /// Whether output beyond the limit was discarded.
    pub truncated: bool,
}

/// Runs read-only external commands with an output limit and a timeout.
///
/// Calls are awaited in place; the daemon's control loop does not move on
/// until the command finishes or the timeout fires. A timed-out child is
/// killed.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    timeout: Duration,
}

impl Default for ProcessBridge {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl ProcessBridge {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` with `args`, keeping at most `limit` bytes of stdout.
    ///
    /// Oversized output is truncated silently. A non-zero exit status is not
    /// an error here; callers decide what it means.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        limit: usize,
    ) -> Result<CommandOutput, MultiplexerError> {
        let command = describe(program, args);
        trace!(command = %command, "running");

        match tokio::time::timeout(self.timeout, run_bounded(program, args, limit, &command)).await
        {
            Ok(result) => result,
            // Dropping the future drops the child, which kills it.
            Err(_elapsed) => Err(MultiplexerError::TimedOut {
                command,
                timeout: self.timeout,
            }),
        }
    }
}

async fn run_bounded(
    program: &str,
    args: &[&str],
    limit: usize,
    command: &str,
) -> Result<CommandOutput, MultiplexerError> {
    let read_error = |source: std::io::Error| MultiplexerError::Read {
        command: command.to_string(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MultiplexerError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        read_error(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout was not captured",
        ))
    })?;

    // Read one byte past the limit to learn whether anything was cut.
    let mut bytes = Vec::new();
    (&mut stdout)
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut bytes)
        .await
        .map_err(read_error)?;

    let truncated = bytes.len() > limit;
    if truncated {
        bytes.truncate(limit);
        // Drain the rest so the child can exit instead of blocking on a full pipe.
        tokio::io::copy(&mut stdout, &mut tokio::io::sink())
            .await
            .map_err(read_error)?;
    }
    drop(stdout);

    let status = child.wait().await.map_err(read_error)?;

    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }

    Ok(CommandOutput {
        stdout: decode_output(bytes),
        status,
        truncated,
    })
}

/// Decode command output as UTF-8.
///
/// An incomplete character at the very end (from truncation) is dropped;
/// any other invalid byte becomes U+FFFD.
fn decode_output(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let utf8_error = err.utf8_error();
            let bytes = err.into_bytes();
            if utf8_error.error_len().is_none() {
                let valid = utf8_error.valid_up_to();
                String::from_utf8_lossy(&bytes[..valid]).into_owned()
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }
}

fn describe(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_strips_exactly_one_trailing_newline() {
        let bridge = ProcessBridge::default();
        let output = bridge
            .run("sh", &["-c", "printf 'hello\\n\\n'"], 1024)
            .await
            .expect("run");

        assert_eq!(output.stdout, "hello\n");
        assert!(output.status.success());
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_reads_all_lines() {
        let bridge = ProcessBridge::default();
        let output = bridge
            .run("sh", &["-c", "printf 'one\\ntwo\\nthree\\n'"], 1024)
            .await
            .expect("run");

        assert_eq!(output.stdout, "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn test_truncates_large_output() {
        let bridge = ProcessBridge::default();
        let output = bridge
            .run("sh", &["-c", "yes muxgeist | head -c 100000"], 100)
            .await
            .expect("run");

        assert!(output.truncated);
        assert_eq!(output.stdout.len(), 100);
        assert!(output.stdout.starts_with("muxgeist\nmuxgeist\n"));
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn test_unbounded_limit_reads_everything() {
        let bridge = ProcessBridge::default();
        let output = bridge
            .run("sh", &["-c", "echo hi"], usize::MAX)
            .await
            .expect("run");

        assert_eq!(output.stdout, "hi");
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_reports_exit_status() {
        let bridge = ProcessBridge::default();
        let output = bridge
            .run("sh", &["-c", "echo partial; exit 3"], 1024)
            .await
            .expect("run");

        assert_eq!(output.stdout, "partial");
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let bridge = ProcessBridge::default();
        let err = bridge
            .run("muxgeist-definitely-not-a-program", &["x"], 1024)
            .await
            .expect_err("should fail");

        assert!(matches!(err, MultiplexerError::Spawn { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to start 'muxgeist-definitely-not-a-program x'"));
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let bridge = ProcessBridge::new(Duration::from_millis(100));
        let start = std::time::Instant::now();
        let err = bridge
            .run("sleep", &["5"], 1024)
            .await
            .expect_err("should time out");

        assert!(matches!(err, MultiplexerError::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_decode_drops_split_trailing_char() {
        // "日" is e6 97 a5; keep "a" and drop the incomplete char.
        assert_eq!(decode_output(vec![b'a', 0xe6, 0x97]), "a");
        assert_eq!(decode_output(vec![b'a', 0xff, b'b']), "a\u{FFFD}b");
        assert_eq!(decode_output(b"plain".to_vec()), "plain");
    }
}
