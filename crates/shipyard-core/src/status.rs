//! Read-only overview of a project root.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::AuditLog;
use crate::error::Result;
use crate::lock::DeployLock;
use crate::pipeline::InstanceState;
use crate::remote::{Executor, quote_path};
use crate::stamp::Stamp;
use crate::store::InstanceStore;

pub const DEFAULT_LOG_LINES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub stamp: Stamp,
    pub created: DateTime<Utc>,
    /// `active`, `previous` or `obsolete`.
    pub state: InstanceState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project_root: PathBuf,
    /// Disk usage of the whole project root as reported by `du -sh`.
    pub size: Option<String>,
    pub current: Option<Stamp>,
    pub previous: Option<Stamp>,
    /// Oldest first.
    pub instances: Vec<InstanceStatus>,
    pub locked: bool,
    pub log: Vec<String>,
}

impl StatusReport {
    pub fn collect(
        executor: &dyn Executor,
        store: &InstanceStore,
        audit: &AuditLog,
        log_lines: usize,
    ) -> Result<Self> {
        let layout = store.layout();
        let current = store.current_stamp()?;
        let previous = store.previous_stamp()?;

        let instances = store
            .instances()?
            .into_iter()
            .map(|entry| {
                let state = if current.as_ref() == Some(&entry.stamp) {
                    InstanceState::Active
                } else if previous.as_ref() == Some(&entry.stamp) {
                    InstanceState::Previous
                } else {
                    InstanceState::Obsolete
                };
                InstanceStatus {
                    stamp: entry.stamp,
                    created: entry.created,
                    state,
                }
            })
            .collect();

        Ok(Self {
            project_root: layout.root().to_path_buf(),
            size: disk_usage(executor, layout.root()),
            current,
            previous,
            instances,
            locked: DeployLock::is_held(executor, layout)?,
            log: audit.tail(log_lines)?,
        })
    }
}

fn disk_usage(executor: &dyn Executor, path: &std::path::Path) -> Option<String> {
    match executor.run_checked(&format!("du -sh {}", quote_path(path))) {
        Ok(stdout) => stdout.split_whitespace().next().map(str::to_string),
        Err(err) => {
            tracing::debug!(error = %err, "could not measure project size");
            None
        }
    }
}
