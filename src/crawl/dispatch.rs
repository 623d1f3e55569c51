//! Per-node routing.

use crate::descriptor::ResourceDescriptor;

/// Suffixes of transient artifacts skipped by default.
pub const DEFAULT_IGNORED_SUFFIXES: &[&str] = &[".log", ".tmp"];

/// What to do with one node of the remote tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Fetch and parse as a listing.
    Recurse,
    /// Produce nothing.
    Skip,
    /// Write to local storage.
    Download,
}

/// Routes descriptors by file flag and name suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatcher {
    ignored_suffixes: Vec<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_SUFFIXES.iter().copied())
    }
}

impl Dispatcher {
    /// Creates a dispatcher skipping files whose name ends with any of `suffixes`.
    ///
    /// Empty suffixes are dropped; matching is case-sensitive.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ignored_suffixes = suffixes
            .into_iter()
            .map(Into::into)
            .filter(|suffix: &String| !suffix.is_empty())
            .collect();
        Self { ignored_suffixes }
    }

    /// Ignored suffixes in configuration order.
    #[must_use]
    pub fn ignored_suffixes(&self) -> &[String] {
        &self.ignored_suffixes
    }

    /// Classifies a descriptor.
    ///
    /// Directories recurse, ignored files are skipped and every other file
    /// is downloaded.
    #[must_use]
    pub fn classify(&self, descriptor: &ResourceDescriptor) -> Dispatch {
        if !descriptor.is_regular_file() {
            return Dispatch::Recurse;
        }
        let name = descriptor.name();
        if self
            .ignored_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
        {
            Dispatch::Skip
        } else {
            Dispatch::Download
        }
    }
}
