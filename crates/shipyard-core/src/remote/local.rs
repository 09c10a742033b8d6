//! Executor over the local filesystem.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};

use super::{CommandOutput, DirEntry, Executor, RemoteError};

/// Runs every operation on this machine.
///
/// Used for `host = "local"` environments and as the real-filesystem
/// backend in tests.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    workdir: Option<PathBuf>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self { workdir: None }
    }

    /// Run shell commands from `dir` instead of the process working directory.
    pub fn with_workdir(dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> RemoteError {
    let path = path.to_path_buf();
    move |source| RemoteError::Io {
        action,
        path,
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), RemoteError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
    }
    Ok(())
}

impl Executor for LocalExecutor {
    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(ref dir) = self.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().map_err(|source| RemoteError::Spawn {
            program: "sh".to_string(),
            source,
        })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(-1),
        })
    }

    fn upload(&self, local: &Path, remote: &Path) -> Result<(), RemoteError> {
        ensure_parent(remote)?;
        fs::copy(local, remote).map_err(io_err("upload", local))?;
        Ok(())
    }

    fn download(&self, remote: &Path, local: &Path) -> Result<(), RemoteError> {
        if !remote.exists() {
            return Err(RemoteError::NotFound(remote.to_path_buf()));
        }
        ensure_parent(local)?;
        fs::copy(remote, local).map_err(io_err("download", remote))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool, RemoteError> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err("stat", path)(err)),
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), RemoteError> {
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(target, link);
        #[cfg(windows)]
        let result = std::os::windows::fs::symlink_dir(target, link);

        result.map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                RemoteError::AlreadyExists(link.to_path_buf())
            } else {
                io_err("create symlink", link)(err)
            }
        })
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, RemoteError> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => fs::read_link(path)
                .map(Some)
                .map_err(io_err("read symlink", path)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err("stat", path)(err)),
        }
    }

    fn remove(&self, path: &Path) -> Result<(), RemoteError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_err("stat", path)(err)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(io_err("remove directory", path))
        } else {
            fs::remove_file(path).map_err(io_err("remove", path))
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        fs::rename(from, to).map_err(io_err("rename", from))
    }

    fn create_dir(&self, path: &Path) -> Result<(), RemoteError> {
        fs::create_dir(path).map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => RemoteError::AlreadyExists(path.to_path_buf()),
            io::ErrorKind::NotFound => RemoteError::NotFound(path.to_path_buf()),
            _ => io_err("create directory", path)(err),
        })
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        if !from.exists() {
            return Err(RemoteError::NotFound(from.to_path_buf()));
        }
        fs::copy(from, to).map_err(io_err("copy", from))?;
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), RemoteError> {
        ensure_parent(path)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err("open", path))?;
        writeln!(file, "{}", line).map_err(io_err("append to", path))
    }

    fn list_dirs(&self, path: &Path) -> Result<Vec<DirEntry>, RemoteError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(io_err("list", path))? {
            let entry = entry.map_err(io_err("list", path))?;
            let meta = fs::symlink_metadata(entry.path()).map_err(io_err("stat", &entry.path()))?;
            if !meta.is_dir() {
                continue;
            }
            let modified = meta.modified().map_err(io_err("stat", &entry.path()))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(entries)
    }

    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<(), RemoteError> {
        if !dest.is_dir() {
            return Err(RemoteError::NotFound(dest.to_path_buf()));
        }
        let file = fs::File::open(archive).map_err(io_err("open archive", archive))?;
        tar::Archive::new(file)
            .unpack(dest)
            .map_err(io_err("unpack archive into", dest))
    }

    fn tail(&self, path: &Path, lines: usize) -> Result<Vec<String>, RemoteError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err("read", path)(err)),
        };
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].iter().map(|l| l.to_string()).collect())
    }
}
