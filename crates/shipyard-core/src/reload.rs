//! Signal to the running application that the live instance changed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::remote::{Executor, quote_path};

pub trait ReloadSignal: Send + Sync {
    fn notify(&self) -> anyhow::Result<()>;
}

/// Touches a marker file the application server watches for a graceful
/// restart.
pub struct TouchReload {
    executor: Arc<dyn Executor>,
    marker: PathBuf,
}

impl TouchReload {
    pub fn new(executor: Arc<dyn Executor>, marker: PathBuf) -> Self {
        Self { executor, marker }
    }
}

impl ReloadSignal for TouchReload {
    fn notify(&self) -> anyhow::Result<()> {
        self.executor
            .run_checked(&format!("touch -- {}", quote_path(&self.marker)))
            .with_context(|| format!("Failed to touch {}", self.marker.display()))?;
        Ok(())
    }
}
