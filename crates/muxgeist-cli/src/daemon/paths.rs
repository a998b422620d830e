//! Socket and PID file path resolution.
//!
//! Priority for the socket path:
//! 1. `--socket` on the command line
//! 2. `MUXGEIST_SOCKET` (ignored when empty)
//! 3. `/tmp/muxgeist.sock`
//!
//! The PID file lives next to the socket with a `.pid` extension.

use std::env;
use std::path::{Path, PathBuf};

/// Well-known socket path shared with the companion UI.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/muxgeist.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "MUXGEIST_SOCKET";

/// Resolve the socket path, preferring an explicit override.
pub fn get_socket_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    PathBuf::from(DEFAULT_SOCKET_PATH)
}

/// PID file path for a socket path.
pub fn pid_path_for(socket_path: &Path) -> PathBuf {
    socket_path.with_extension("pid")
}

/// Make sure the socket's parent directory exists.
///
/// A directory created here gets 0700 permissions. An existing directory
/// (such as `/tmp`) is left alone.
pub fn ensure_socket_dir(socket_path: &Path) -> std::io::Result<()> {
    let dir = match socket_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => return Ok(()),
    };

    if dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}
