//! Version-family resolution.

use std::collections::BTreeMap;

use tracing::debug;

use crate::descriptor::{ResourceDescriptor, version_name};

/// Outcome of resolving one listing's children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Unversioned children plus the current member of every version family.
    pub keep: Vec<ResourceDescriptor>,
    /// Superseded version-family members.
    pub expired: Vec<ResourceDescriptor>,
}

/// Keeps the newest member of each version family and expires the rest.
///
/// Unversioned children pass straight into `keep`. Versioned children are
/// grouped by parent path; within a group the highest packed version wins.
/// Two members with the same version (e.g. `1.0.0_60` and `01.00.00_60`) are
/// ordered by URI so the choice is stable across runs.
///
/// Every input lands in exactly one of `keep` or `expired`.
///
/// # Examples
///
/// ```
/// use index_mirror::descriptor::ResourceDescriptor;
/// use index_mirror::listing::resolve_versions;
/// use url::Url;
///
/// let children = ["16.00.00_60", "17.00.00_60"]
///     .iter()
///     .map(|v| ResourceDescriptor::directory(Url::parse(&format!("http://h/doc/{v}/")).unwrap()).unwrap())
///     .collect();
/// let resolution = resolve_versions(children);
/// assert_eq!(resolution.keep[0].name(), "17.00.00_60");
/// assert_eq!(resolution.expired[0].name(), "16.00.00_60");
/// ```
#[must_use]
pub fn resolve_versions(children: Vec<ResourceDescriptor>) -> Resolution {
    let mut resolution = Resolution::default();
    let mut families: BTreeMap<String, Vec<ResourceDescriptor>> = BTreeMap::new();

    for child in children {
        if child.is_versioned() {
            families
                .entry(child.parent_path().to_string())
                .or_default()
                .push(child);
        } else {
            resolution.keep.push(child);
        }
    }

    for (family, mut members) in families {
        let Some(winner) = members
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.version()
                    .cmp(&b.version())
                    .then_with(|| a.uri().as_str().cmp(b.uri().as_str()))
            })
            .map(|(index, _)| index)
        else {
            continue;
        };

        let current = members.swap_remove(winner);
        debug!(
            family = %family,
            current = version_name(current.version()).as_deref().unwrap_or("-"),
            expired = members.len(),
            "resolved version family"
        );
        resolution.keep.push(current);
        resolution.expired.extend(members);
    }

    resolution
}
