//! Remote resource descriptors.
//!
//! A [`ResourceDescriptor`] identifies one remote node of a directory-index
//! tree, either a leaf file or a directory, without its content. Descriptors
//! are validated once at construction and never mutated afterwards; a node
//! that needs different metadata gets a new descriptor.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use index_mirror::descriptor::ResourceDescriptor;
//! use url::Url;
//!
//! let modified = NaiveDate::from_ymd_opt(2022, 6, 30)
//!     .and_then(|d| d.and_hms_opt(13, 39, 0))
//!     .unwrap();
//! let file = ResourceDescriptor::builder(Url::parse("https://example.org/deliver/ts.pdf").unwrap())
//!     .size(2_073_472)
//!     .last_modified(modified)
//!     .build()
//!     .unwrap();
//! assert!(file.is_regular_file());
//! assert_eq!(file.name(), "ts.pdf");
//! ```

mod error;
mod version;

use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDateTime, Timelike};
use url::Url;

pub use error::DescriptorError;
pub use version::{UNVERSIONED, pack_version, unpack_version, version_name};

/// Metadata for one remote node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    uri: Url,
    version: u64,
    size: Option<u64>,
    last_modified: Option<NaiveDateTime>,
    regular_file: bool,
}

impl ResourceDescriptor {
    /// Starts building a descriptor for `uri`.
    #[must_use]
    pub fn builder(uri: Url) -> DescriptorBuilder {
        DescriptorBuilder {
            uri,
            version: None,
            size: None,
            last_modified: None,
            regular_file: None,
        }
    }

    /// Descriptor for a directory (or a node whose kind is not known yet).
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::NotHierarchical`] for URIs without a path.
    pub fn directory(uri: Url) -> Result<Self, DescriptorError> {
        Self::builder(uri).regular_file(false).build()
    }

    /// Absolute URI of the node.
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Packed version of the last path segment, [`UNVERSIONED`] when absent.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.version != UNVERSIONED
    }

    /// Byte size, known only for regular files.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Modification time truncated to whole seconds.
    ///
    /// Always present on regular files; directories carry one when the
    /// listing row supplied it.
    #[must_use]
    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        self.last_modified
    }

    #[must_use]
    pub fn is_regular_file(&self) -> bool {
        self.regular_file
    }

    /// Last non-empty path segment, still percent-encoded.
    ///
    /// Empty for the host root.
    #[must_use]
    pub fn name(&self) -> &str {
        last_segment(&self.uri)
    }

    /// Path of the containing directory, always ending in `/`.
    ///
    /// Siblings in the same listing share this value, which is what groups
    /// version directories into a family.
    #[must_use]
    pub fn parent_path(&self) -> &str {
        let path = self.uri.path().trim_end_matches('/');
        match path.rfind('/') {
            Some(index) => &path[..=index],
            None => "/",
        }
    }

    /// Percent-decoded path of the node relative to the host root.
    ///
    /// Empty and dot segments are dropped, so the result can be joined onto a
    /// destination directory without escaping it.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        let mut relative = PathBuf::new();
        let Some(segments) = self.uri.path_segments() else {
            return relative;
        };
        for segment in segments {
            let decoded = urlencoding::decode(segment)
                .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
            if decoded.is_empty() || decoded == "." || decoded == ".." || decoded.contains('/') {
                continue;
            }
            relative.push(decoded);
        }
        relative
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)?;
        if let Some(name) = version_name(self.version) {
            write!(f, " [version {name}]")?;
        }
        if let Some(size) = self.size {
            write!(f, " [{size} bytes]")?;
        }
        if let Some(modified) = self.last_modified {
            write!(f, " [{modified}]")?;
        }
        if !self.regular_file {
            write!(f, " [dir]")?;
        }
        Ok(())
    }
}

/// Builder for [`ResourceDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    uri: Url,
    version: Option<u64>,
    size: Option<u64>,
    last_modified: Option<NaiveDateTime>,
    regular_file: Option<bool>,
}

impl DescriptorBuilder {
    /// Overrides the version derived from the last path segment.
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn last_modified(mut self, last_modified: NaiveDateTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Sets the node kind explicitly.
    ///
    /// When left unset the node is a regular file if a size or a timestamp
    /// was supplied, and a directory otherwise.
    #[must_use]
    pub fn regular_file(mut self, regular_file: bool) -> Self {
        self.regular_file = Some(regular_file);
        self
    }

    /// Validates the invariants and builds the descriptor.
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::NotHierarchical`] if the URI cannot carry a path
    /// - [`DescriptorError::DirectoryWithSize`] if a directory has a size
    /// - [`DescriptorError::MissingSize`] / [`DescriptorError::MissingTimestamp`]
    ///   if a regular file lacks either
    pub fn build(self) -> Result<ResourceDescriptor, DescriptorError> {
        let Self {
            uri,
            version,
            size,
            last_modified,
            regular_file,
        } = self;

        if uri.cannot_be_a_base() {
            return Err(DescriptorError::NotHierarchical {
                uri: uri.to_string(),
            });
        }

        let regular_file = regular_file.unwrap_or(size.is_some() || last_modified.is_some());
        if regular_file {
            if size.is_none() {
                return Err(DescriptorError::MissingSize {
                    uri: uri.to_string(),
                });
            }
            if last_modified.is_none() {
                return Err(DescriptorError::MissingTimestamp {
                    uri: uri.to_string(),
                });
            }
        } else if let Some(size) = size {
            return Err(DescriptorError::DirectoryWithSize {
                uri: uri.to_string(),
                size,
            });
        }

        let version = version.unwrap_or_else(|| pack_version(last_segment(&uri)));
        let last_modified = last_modified.map(|t| t.with_nanosecond(0).unwrap_or(t));

        Ok(ResourceDescriptor {
            uri,
            version,
            size,
            last_modified,
            regular_file,
        })
    }
}

fn last_segment(uri: &Url) -> &str {
    uri.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("")
}
