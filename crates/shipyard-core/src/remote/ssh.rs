//! Executor over the `ssh` and `scp` binaries.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};

use super::{CommandOutput, DirEntry, Executor, RemoteError, quote_path, shell_quote};

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// `user@host` or an alias from the ssh config.
    pub destination: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
}

impl SshTarget {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            port: None,
            identity_file: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }
}

/// Runs every operation on a remote host, one ssh process per call.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    target: SshTarget,
}

impl SshExecutor {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=15"]);
        if let Some(port) = self.target.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(ref identity) = self.target.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(&self.target.destination).arg("--");
        cmd
    }

    fn scp_command(&self) -> Command {
        let mut cmd = Command::new("scp");
        cmd.args(["-q", "-o", "BatchMode=yes"]);
        if let Some(port) = self.target.port {
            cmd.arg("-P").arg(port.to_string());
        }
        if let Some(ref identity) = self.target.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd
    }

    /// scp runs in SFTP mode, which takes remote paths literally.
    fn remote_spec(&self, path: &Path) -> String {
        format!("{}:{}", self.target.destination, path.display())
    }

    fn spawn(program: &str, cmd: &mut Command) -> Result<CommandOutput, RemoteError> {
        let output = cmd.output().map_err(|source| RemoteError::Spawn {
            program: program.to_string(),
            source,
        })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(-1),
        })
    }

    fn scp(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        let mut cmd = self.scp_command();
        cmd.arg(from).arg(to);
        let output = Self::spawn("scp", &mut cmd)?;
        if !output.success() {
            return Err(RemoteError::CommandFailed {
                command: format!("scp {} {}", from, to),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    fn test_path(&self, flag: &str, path: &Path) -> Result<bool, RemoteError> {
        let command = format!("test {} {}", flag, quote_path(path));
        let output = self.run(&command)?;
        answer(command, &output)
    }
}

impl Executor for SshExecutor {
    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        tracing::debug!(host = %self.target.destination, %command, "ssh");
        let mut cmd = self.ssh_command();
        cmd.arg(command);
        Self::spawn("ssh", &mut cmd)
    }

    fn upload(&self, local: &Path, remote: &Path) -> Result<(), RemoteError> {
        self.scp(&local.to_string_lossy(), &self.remote_spec(remote))
    }

    fn download(&self, remote: &Path, local: &Path) -> Result<(), RemoteError> {
        if !self.exists(remote)? {
            return Err(RemoteError::NotFound(remote.to_path_buf()));
        }
        self.scp(&self.remote_spec(remote), &local.to_string_lossy())
    }

    fn exists(&self, path: &Path) -> Result<bool, RemoteError> {
        Ok(self.test_path("-e", path)? || self.test_path("-L", path)?)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), RemoteError> {
        if self.exists(link)? {
            return Err(RemoteError::AlreadyExists(link.to_path_buf()));
        }
        self.run_checked(&format!(
            "ln -s -- {} {}",
            quote_path(target),
            quote_path(link)
        ))?;
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, RemoteError> {
        let command = format!("readlink -- {}", quote_path(path));
        let output = self.run(&command)?;
        if !answer(command, &output)? {
            return Ok(None);
        }
        let target = output.stdout.trim_end_matches('\n');
        if target.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(target)))
    }

    fn remove(&self, path: &Path) -> Result<(), RemoteError> {
        self.run_checked(&format!("rm -rf -- {}", quote_path(path)))?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        self.run_checked(&format!("mv -T -- {} {}", quote_path(from), quote_path(to)))?;
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<(), RemoteError> {
        let command = format!("mkdir -- {}", quote_path(path));
        let output = self.run(&command)?;
        if output.success() {
            return Ok(());
        }
        if self.exists(path)? {
            return Err(RemoteError::AlreadyExists(path.to_path_buf()));
        }
        Err(RemoteError::CommandFailed {
            command,
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        if !self.exists(from)? {
            return Err(RemoteError::NotFound(from.to_path_buf()));
        }
        self.run_checked(&format!("cp -- {} {}", quote_path(from), quote_path(to)))?;
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), RemoteError> {
        let parent = path.parent().unwrap_or(Path::new("/"));
        self.run_checked(&format!(
            "mkdir -p -- {} && printf '%s\\n' {} >> {}",
            quote_path(parent),
            shell_quote(line),
            quote_path(path)
        ))?;
        Ok(())
    }

    fn list_dirs(&self, path: &Path) -> Result<Vec<DirEntry>, RemoteError> {
        let stdout = self.run_checked(&format!(
            "find {} -mindepth 1 -maxdepth 1 -type d -printf '%T@ %f\\n'",
            quote_path(path)
        ))?;
        Ok(parse_find_output(&stdout))
    }

    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<(), RemoteError> {
        let file = File::open(archive).map_err(|source| RemoteError::Io {
            action: "open archive",
            path: archive.to_path_buf(),
            source,
        })?;
        let command = format!("tar -xf - -C {}", quote_path(dest));
        let mut cmd = self.ssh_command();
        cmd.arg(&command).stdin(Stdio::from(file));
        let output = Self::spawn("ssh", &mut cmd)?;
        if !output.success() {
            return Err(RemoteError::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    fn tail(&self, path: &Path, lines: usize) -> Result<Vec<String>, RemoteError> {
        if !self.test_path("-f", path)? {
            return Ok(Vec::new());
        }
        let stdout = self.run_checked(&format!("tail -n {} -- {}", lines, quote_path(path)))?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// Read a yes/no command: exit 0 is yes, exit 1 is no. Anything else,
/// including ssh's own 255 on connection or authentication failure, is an
/// error rather than a "no".
fn answer(command: String, output: &CommandOutput) -> Result<bool, RemoteError> {
    match output.code {
        0 => Ok(true),
        1 => Ok(false),
        code => Err(RemoteError::CommandFailed {
            command,
            code,
            stderr: output.stderr.trim().to_string(),
        }),
    }
}

/// Parse `find -printf '%T@ %f\n'` output.
fn parse_find_output(stdout: &str) -> Vec<DirEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let (time, name) = line.split_once(' ')?;
            let (secs, frac) = time.split_once('.').unwrap_or((time, "0"));
            let secs: i64 = secs.parse().ok()?;
            let nanos: u32 = format!("{:0<9}", &frac[..frac.len().min(9)]).parse().ok()?;
            let modified = DateTime::<Utc>::from_timestamp(secs, nanos)?;
            Some(DirEntry {
                name: name.to_string(),
                modified,
            })
        })
        .collect()
}
