//! Small fixture helpers shared across crates.

use zed_proto::v1::Relationship;

/// Parses a canonical relationship string, panicking on bad fixtures.
///
/// # Panics
///
/// Panics when `s` is not a valid canonical relationship.
#[must_use]
pub fn rel(s: &str) -> Relationship {
    zed_core::tuple::parse(s).unwrap_or_else(|err| panic!("bad fixture \"{s}\": {err}"))
}

/// A two-definition schema used across pipeline tests.
#[must_use]
pub fn sample_schema() -> &'static str {
    "definition user {}\n\ndefinition document {\n\trelation viewer: user\n\tpermission view = viewer\n}"
}
