//! The unit of data moved through the gateway: a byte payload plus
//! key/value attributes, and the outcome it is routed to.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Attribute key carrying the attachment filename.
pub const FILENAME_ATTRIBUTE: &str = "filename";

/// Outcome an artifact is routed to after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The invocation produced (or delivered) an artifact.
    Success,
    /// Inbound only: nothing in the mailbox matched.
    NoNewData,
    /// The invocation failed; the artifact is penalized.
    Failure,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoNewData => "no-new-data",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte payload with attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub content: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    /// Set when a failed invocation hands the artifact back.
    pub penalized: bool,
}

impl Artifact {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.attributes.get(FILENAME_ATTRIBUTE).map(String::as_str)
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.attributes
            .insert(FILENAME_ATTRIBUTE.to_string(), filename.into());
    }

    pub fn penalize(mut self) -> Self {
        self.penalized = true;
        self
    }

    /// Load a file as an artifact, carrying its name as the filename attribute.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = fs::read(path)?;
        let mut artifact = Self::new(content);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            artifact.set_filename(name);
        }
        Ok(artifact)
    }

    /// Write the payload into `dir` under its filename attribute.
    ///
    /// Only the final path component of the filename is used, so a name
    /// like `../../etc/passwd` lands in `dir` as `passwd`.
    pub fn write_to_dir(&self, dir: &Path, fallback: &str) -> std::io::Result<PathBuf> {
        let name = self
            .filename()
            .and_then(|f| Path::new(f).file_name())
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback);
        let path = dir.join(name);
        fs::write(&path, &self.content)?;
        Ok(path)
    }
}

/// An artifact together with the route it takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub artifact: Artifact,
    pub route: Route,
}
