//! Append-only record of task outcomes in `log/fabric.log`.
//!
//! Line format:
//! `[YYYY-MM-DD HH:MM] <TASK> <SUCCESS|FAILED> in <ENVIRONMENT> by <ACTOR> for <STAMP>`

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::remote::Executor;
use crate::stamp::Stamp;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success { Outcome::Success } else { Outcome::Failed }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("SUCCESS"),
            Outcome::Failed => f.write_str("FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: NaiveDateTime,
    pub task: String,
    pub outcome: Outcome,
    pub environment: String,
    pub actor: String,
    pub stamp: Option<Stamp>,
}

impl AuditRecord {
    /// Record stamped with the current local time, truncated to the minute.
    pub fn now(
        task: &str,
        outcome: Outcome,
        environment: &str,
        actor: &str,
        stamp: Option<&Stamp>,
    ) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            task: word(task),
            outcome,
            environment: word(environment),
            actor: word(actor),
            stamp: stamp.cloned(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "[{}] {} {} in {} by {} for {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.task,
            self.outcome,
            self.environment,
            self.actor,
            self.stamp.as_ref().map(Stamp::as_str).unwrap_or("-")
        )
    }

    /// Parse a line written by [`AuditRecord::to_line`].
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once("] ")?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

        let mut words = rest.split(' ');
        let task = words.next()?.to_string();
        let outcome = match words.next()? {
            "SUCCESS" => Outcome::Success,
            "FAILED" => Outcome::Failed,
            _ => return None,
        };
        if words.next()? != "in" {
            return None;
        }
        let environment = words.next()?.to_string();
        if words.next()? != "by" {
            return None;
        }
        let actor = words.next()?.to_string();
        if words.next()? != "for" {
            return None;
        }
        let stamp = match words.next()? {
            "-" => None,
            value => Some(Stamp::new(value).ok()?),
        };

        Some(Self {
            timestamp,
            task,
            outcome,
            environment,
            actor,
            stamp,
        })
    }
}

/// One uppercase field of a log line. Inner whitespace becomes `_` so the
/// line still splits into its fixed fields.
fn word(value: &str) -> String {
    let joined = value.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        return "-".to_string();
    }
    joined.to_uppercase()
}

/// Best-effort writer: a failed append is logged and swallowed so it can
/// never fail the task it documents.
#[derive(Clone)]
pub struct AuditLog {
    executor: Arc<dyn Executor>,
    path: PathBuf,
    environment: String,
    actor: String,
}

impl AuditLog {
    pub fn new(
        executor: Arc<dyn Executor>,
        path: PathBuf,
        environment: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            path,
            environment: environment.into(),
            actor: actor.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn record(&self, task: &str, outcome: Outcome, stamp: Option<&Stamp>) {
        let record = AuditRecord::now(task, outcome, &self.environment, &self.actor, stamp);
        self.append(&record);
    }

    pub fn append(&self, record: &AuditRecord) {
        if let Err(err) = self.executor.append_line(&self.path, &record.to_line()) {
            tracing::warn!(path = %self.path.display(), error = %err, "could not write audit record");
        }
    }

    /// Most recent lines, oldest first.
    pub fn tail(&self, lines: usize) -> crate::error::Result<Vec<String>> {
        Ok(self.executor.tail(&self.path, lines)?)
    }
}
