//! Packed version numbers for version-family directories.
//!
//! A versioned name is four integer components separated by `.` or `_`
//! (for example `17.00.00_60`). Each component is masked to 12 bits and the
//! four are packed most-significant-first into a single `u64`, so integer
//! order matches component order.
//!
//! Components of 4096 or more wrap silently when masked. Zero is reserved for
//! "unversioned", which makes a literal `00.00.00_00` indistinguishable from a
//! plain name.

use std::sync::LazyLock;

use regex::Regex;

/// Sentinel for names that do not carry a version.
pub const UNVERSIONED: u64 = 0;

const COMPONENT_BITS: u32 = 12;
const COMPONENT_MASK: u64 = 0xFFF;
const COMPONENTS: usize = 4;

#[allow(clippy::expect_used)]
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)[._](\d+)[._](\d+)[._](\d+)$").expect("version regex is valid") // Static pattern, safe to panic
});

/// Packs the version carried by `name`, or returns [`UNVERSIONED`].
///
/// # Examples
///
/// ```
/// use index_mirror::descriptor::{UNVERSIONED, pack_version, version_name};
///
/// let version = pack_version("17.00.00_60");
/// assert_ne!(version, UNVERSIONED);
/// assert_eq!(version_name(version).as_deref(), Some("17.00.00_60"));
/// assert_eq!(pack_version("ts_129078v170000p.pdf"), UNVERSIONED);
/// ```
#[must_use]
pub fn pack_version(name: &str) -> u64 {
    let Some(captures) = VERSION_PATTERN.captures(name) else {
        return UNVERSIONED;
    };

    let mut packed = 0u64;
    for index in 1..=COMPONENTS {
        // A component too long for u64 cannot be masked meaningfully.
        let Some(component) = captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            return UNVERSIONED;
        };
        packed = (packed << COMPONENT_BITS) | (component & COMPONENT_MASK);
    }
    packed
}

/// Splits a packed version back into its four components.
///
/// Returns `None` for [`UNVERSIONED`].
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unpack_version(version: u64) -> Option<[u16; 4]> {
    if version == UNVERSIONED {
        return None;
    }
    let mut components = [0u16; COMPONENTS];
    for (position, slot) in components.iter_mut().enumerate() {
        let shift = COMPONENT_BITS * (COMPONENTS - 1 - position) as u32;
        // Masked to 12 bits, always fits.
        *slot = ((version >> shift) & COMPONENT_MASK) as u16;
    }
    Some(components)
}

/// Renders a packed version as `NN.NN.NN_NN` with two-digit zero padding.
#[must_use]
pub fn version_name(version: u64) -> Option<String> {
    unpack_version(version).map(|[a, b, c, d]| format!("{a:02}.{b:02}.{c:02}_{d:02}"))
}
