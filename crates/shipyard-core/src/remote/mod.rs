//! Command channel to the host that carries the project root.
//!
//! The lifecycle core only talks to the host through [`Executor`]. Two
//! implementations ship with the crate:
//! - [`LocalExecutor`]: the local filesystem plus `sh -c`
//! - [`SshExecutor`]: the `ssh` and `scp` binaries

mod local;
mod ssh;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use local::LocalExecutor;
pub use ssh::{SshExecutor, SshTarget};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A directory entry as listed on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Blocking operations against one host.
///
/// Paths are absolute paths on the host. Every call returns once its effect
/// is durable on the host.
pub trait Executor: Send + Sync {
    /// Run a shell command. A non-zero exit is reported in the output, not
    /// as an error.
    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Copy a local file to the host.
    fn upload(&self, local: &Path, remote: &Path) -> Result<(), RemoteError>;

    /// Copy a host file to the local machine.
    fn download(&self, remote: &Path, local: &Path) -> Result<(), RemoteError>;

    /// Whether anything (including a dangling symlink) exists at `path`.
    fn exists(&self, path: &Path) -> Result<bool, RemoteError>;

    /// Create `link` pointing at `target`. Fails if `link` exists.
    fn symlink(&self, target: &Path, link: &Path) -> Result<(), RemoteError>;

    /// Target of the symlink at `path`, or `None` if there is no symlink.
    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, RemoteError>;

    /// Remove a file, symlink (not its target) or directory tree. Missing
    /// paths are not an error.
    fn remove(&self, path: &Path) -> Result<(), RemoteError>;

    /// Rename `from` to `to`, atomically replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), RemoteError>;

    /// Create a single directory. Fails with [`RemoteError::AlreadyExists`]
    /// if anything is already at `path`; this is the exclusive primitive the
    /// layout and lock rely on.
    fn create_dir(&self, path: &Path) -> Result<(), RemoteError>;

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), RemoteError>;

    /// Append one line to a file, creating it and its parent directory.
    fn append_line(&self, path: &Path, line: &str) -> Result<(), RemoteError>;

    /// Real directories (not symlinks) directly under `path`.
    fn list_dirs(&self, path: &Path) -> Result<Vec<DirEntry>, RemoteError>;

    /// Unpack a local tar archive into an existing host directory.
    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<(), RemoteError>;

    /// Last `lines` lines of a host file; empty if the file is missing.
    fn tail(&self, path: &Path, lines: usize) -> Result<Vec<String>, RemoteError>;

    /// Run a command and treat a non-zero exit as an error.
    fn run_checked(&self, command: &str) -> Result<String, RemoteError> {
        let output = self.run(command)?;
        if !output.success() {
            return Err(RemoteError::CommandFailed {
                command: command.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// Quote a value for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '=' | ':' | '@' | '+' | ','))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// [`shell_quote`] for a path.
pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}
