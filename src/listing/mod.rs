//! Directory-listing parsing and version resolution.
//!
//! [`parse_listing`] turns fetched index content into child descriptors and
//! [`resolve_versions`] splits those children into the ones to mirror and the
//! superseded version directories.

mod parser;
mod resolver;

pub use parser::{parse_listing, parse_listing_with_charset};
pub use resolver::{Resolution, resolve_versions};
