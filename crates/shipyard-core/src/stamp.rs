//! Instance identifiers and reference resolution.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vcs::Vcs;

/// Immutable identifier of one deployed revision.
///
/// Used verbatim as the instance directory name, so it must be a single
/// path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stamp(String);

impl Stamp {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidStamp(value))
        }
    }

    /// Whether `value` can name an instance directory.
    pub fn is_valid(value: &str) -> bool {
        !value.is_empty()
            && !value.starts_with('.')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Stamp {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Stamp::new(value)
    }
}

impl From<Stamp> for String {
    fn from(stamp: Stamp) -> Self {
        stamp.0
    }
}

/// What the operator asked to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// The local checkout's HEAD.
    Head,
    /// A branch or tag name (or abbreviated revision) needing lookup.
    Named(String),
    /// A full revision id, used as-is.
    Revision(String),
}

impl Reference {
    pub fn parse(reference: Option<&str>) -> Self {
        match reference.map(str::trim) {
            None | Some("") | Some("HEAD") => Reference::Head,
            Some(value) if is_full_revision(value) => Reference::Revision(value.to_string()),
            Some(value) => Reference::Named(value.to_string()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Head => f.write_str("HEAD"),
            Reference::Named(name) => f.write_str(name),
            Reference::Revision(rev) => f.write_str(rev),
        }
    }
}

/// SHA-1 or SHA-256 object id in hex.
pub fn is_full_revision(value: &str) -> bool {
    matches!(value.len(), 40 | 64) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Turns user references into stamps. Pure lookup, no side effects.
#[derive(Clone)]
pub struct StampResolver {
    vcs: Arc<dyn Vcs>,
}

impl StampResolver {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self { vcs }
    }

    pub fn resolve(&self, reference: Option<&str>) -> Result<Stamp> {
        let reference = Reference::parse(reference);
        let revision = match &reference {
            Reference::Revision(rev) => rev.clone(),
            Reference::Head | Reference::Named(_) => {
                let name = reference.to_string();
                self.vcs
                    .resolve_ref(&name)
                    .map_err(|source| Error::RefNotFound {
                        reference: name,
                        source,
                    })?
            }
        };
        tracing::debug!(%reference, %revision, "resolved reference");
        Stamp::new(revision)
    }
}
