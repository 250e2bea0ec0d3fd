//! Composite identifiers.
//!
//! Every managed resource is persisted under a single opaque identity string.
//! Resources addressed by more than one remote key (a project and a hook id, a
//! group and a variable key, ...) join those keys with [`DELIMITER`]:
//!
//! ```text
//! 99:42                       project 99, hook 42
//! foo/bar:priority::high      project foo/bar, label "priority::high"
//! group:foo/bar:42            deploy token 42 owned by group foo/bar
//! ```
//!
//! No escaping is applied when encoding. Decoding instead splits into at most
//! the expected number of parts, and one end of the string absorbs any extra
//! delimiters verbatim. Which end absorbs is a per-shape choice, see
//! [`SplitFrom`]. The wire format is stable: persisted state and external
//! tooling depend on it.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_gitlab::id::{build_two_part_id, parse_two_part_id};
//!
//! let id = build_two_part_id("foo/bar", "priority::high");
//! assert_eq!(id, "foo/bar:priority::high");
//!
//! let (project, label) = parse_two_part_id(&id).unwrap();
//! assert_eq!(project, "foo/bar");
//! assert_eq!(label, "priority::high");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{ProviderError, Result};

/// The component delimiter of every composite identifier.
pub const DELIMITER: char = ':';

/// Which delimiters a decoder honours when the string holds more than needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitFrom {
    /// Split on the first delimiters; the last component keeps the rest.
    Start,
    /// Split on the last delimiters; the first component keeps the rest.
    End,
}

/// Encoder/decoder for one identity shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCodec {
    parts: usize,
    split: SplitFrom,
}

impl IdCodec {
    /// Create a codec for `parts` components (at least two).
    pub const fn new(parts: usize, split: SplitFrom) -> Self {
        assert!(parts >= 2, "a composite identifier has at least two parts");
        Self { parts, split }
    }

    /// The number of components of this shape.
    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Join components in order. The caller supplies exactly [`parts`](Self::parts)
    /// components.
    pub fn encode<S: AsRef<str>>(&self, components: &[S]) -> String {
        debug_assert_eq!(components.len(), self.parts);
        let mut out = String::new();
        for (i, component) in components.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            out.push_str(component.as_ref());
        }
        out
    }

    /// Split an identity into exactly [`parts`](Self::parts) non-empty components.
    pub fn decode<'a>(&self, id: &'a str) -> Result<Vec<&'a str>> {
        let components: Vec<&str> = match self.split {
            SplitFrom::Start => id.splitn(self.parts, DELIMITER).collect(),
            SplitFrom::End => {
                let mut parts: Vec<&str> = id.rsplitn(self.parts, DELIMITER).collect();
                parts.reverse();
                parts
            }
        };
        if components.len() != self.parts {
            return Err(ProviderError::malformed(
                id,
                format!(
                    "expected {} parts separated by '{}', got {}",
                    self.parts,
                    DELIMITER,
                    components.len()
                ),
            ));
        }
        if let Some(pos) = components.iter().position(|c| c.is_empty()) {
            return Err(ProviderError::malformed(
                id,
                format!("component {} is empty", pos + 1),
            ));
        }
        Ok(components)
    }
}

const TWO_PART: IdCodec = IdCodec::new(2, SplitFrom::Start);

/// Build a `parent:child` identifier.
pub fn build_two_part_id(parent: &str, child: &str) -> String {
    TWO_PART.encode(&[parent, child])
}

/// Decode a `parent:child` identifier, splitting on the first delimiter.
pub fn parse_two_part_id(id: &str) -> Result<(String, String)> {
    let parts = TWO_PART.decode(id)?;
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Decode a `parent:child` identifier whose child is an integer.
pub fn parse_two_part_int_id(id: &str) -> Result<(String, i64)> {
    let (parent, child) = parse_two_part_id(id)?;
    let child = parse_int_component(id, &child)?;
    Ok((parent, child))
}

/// Build an `a:b:c` identifier.
pub fn build_three_part_id(a: &str, b: &str, c: &str) -> String {
    IdCodec::new(3, SplitFrom::Start).encode(&[a, b, c])
}

/// Decode an `a:b:c` identifier with the given split direction.
pub fn parse_three_part_id(id: &str, split: SplitFrom) -> Result<(String, String, String)> {
    let parts = IdCodec::new(3, split).decode(id)?;
    Ok((
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
    ))
}

/// Parse one identity component as an integer.
pub fn parse_int_component(id: &str, component: &str) -> Result<i64> {
    component.parse::<i64>().map_err(|_| {
        ProviderError::malformed(id, format!("'{}' is not an integer", component))
    })
}

/// The kind of namespace that owns a scoped resource.
///
/// This is the fixed leading discriminator of `kind:parent:id` identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKind {
    /// A project, addressed by numeric id or full path.
    Project,
    /// A group, addressed by numeric id or full path.
    Group,
}

impl ParentKind {
    /// The discriminator as written in identities and state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Group => "group",
        }
    }

    /// The REST collection the parent lives in.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Group => "groups",
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParentKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(Self::Project),
            "group" => Ok(Self::Group),
            other => Err(ProviderError::malformed(
                other,
                "discriminator must be 'project' or 'group'",
            )),
        }
    }
}

/// A `kind:parent:id` identity for resources that exist on both projects and
/// groups.
///
/// The discriminator is split off first; the remainder follows the two-part
/// rule, so `parent` must not contain the delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedId {
    /// Project or group.
    pub kind: ParentKind,
    /// Id or full path of the owning namespace.
    pub parent: String,
    /// Remote id of the resource inside the parent.
    pub id: i64,
}

impl ScopedId {
    /// Create a new scoped id.
    pub fn new(kind: ParentKind, parent: impl Into<String>, id: i64) -> Self {
        Self {
            kind,
            parent: parent.into(),
            id,
        }
    }

    /// Encode as `kind:parent:id`.
    pub fn encode(&self) -> String {
        let id = self.id.to_string();
        IdCodec::new(3, SplitFrom::Start).encode(&[
            self.kind.as_str(),
            self.parent.as_str(),
            id.as_str(),
        ])
    }

    /// Decode a `kind:parent:id` identity.
    pub fn decode(id: &str) -> Result<Self> {
        let (kind, rest) = parse_two_part_id(id)?;
        let kind: ParentKind = kind
            .parse()
            .map_err(|e: ProviderError| ProviderError::malformed(id, e.message().to_string()))?;
        let (parent, child) = parse_two_part_int_id(&rest)
            .map_err(|e| ProviderError::malformed(id, e.message().to_string()))?;
        Ok(Self::new(kind, parent, child))
    }
}

impl fmt::Display for ScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_part_splits_on_first_delimiter() {
        let (project, label) = parse_two_part_id("foo/bar:priority::high").unwrap();
        assert_eq!(project, "foo/bar");
        assert_eq!(label, "priority::high");
    }

    #[test]
    fn test_two_part_rejects_missing_delimiter() {
        let err = parse_two_part_id("not-enough-parts").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier { .. }));
        assert!(err.to_string().contains("not-enough-parts"));
    }

    #[test]
    fn test_two_part_rejects_empty_component() {
        assert!(parse_two_part_id(":42").is_err());
        assert!(parse_two_part_id("99:").is_err());
    }

    #[test]
    fn test_two_part_int_id() {
        assert_eq!(
            parse_two_part_int_id("99:42").unwrap(),
            ("99".to_string(), 42)
        );

        let err = parse_two_part_int_id("99:abc").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier { .. }));
        assert!(err.to_string().contains("'abc' is not an integer"));
    }

    #[test]
    fn test_three_part_from_start_and_end() {
        let id = "group/project:v1.0:7";
        assert_eq!(
            parse_three_part_id(id, SplitFrom::Start).unwrap(),
            ("group/project".into(), "v1.0".into(), "7".into())
        );

        // Extra delimiters land in the absorbing end.
        let (a, b, c) = parse_three_part_id("p:KEY:scope:with:colons", SplitFrom::Start).unwrap();
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("p", "KEY", "scope:with:colons"));

        let (a, b, c) = parse_three_part_id("odd:prefix:tag:7", SplitFrom::End).unwrap();
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("odd:prefix", "tag", "7"));
    }

    #[test]
    fn test_three_part_rejects_two_parts() {
        assert!(parse_three_part_id("a:b", SplitFrom::Start).is_err());
        assert!(parse_three_part_id("a:b", SplitFrom::End).is_err());
    }

    #[test]
    fn test_scoped_id() {
        let id = ScopedId::new(ParentKind::Group, "foo/bar", 42);
        assert_eq!(id.encode(), "group:foo/bar:42");
        assert_eq!(ScopedId::decode("group:foo/bar:42").unwrap(), id);
        assert_eq!(
            ScopedId::decode("project:99:7").unwrap(),
            ScopedId::new(ParentKind::Project, "99", 7)
        );
    }

    #[test]
    fn test_scoped_id_rejects_unknown_discriminator() {
        let err = ScopedId::decode("user:foo:1").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier { ref id, .. } if id == "user:foo:1"));
        assert!(ScopedId::decode("project:foo").is_err());
        assert!(ScopedId::decode("project:foo:bar").is_err());
    }

    #[test]
    fn test_parent_kind_roundtrip_names() {
        assert_eq!("project".parse::<ParentKind>().unwrap(), ParentKind::Project);
        assert_eq!(ParentKind::Group.to_string(), "group");
        assert_eq!(ParentKind::Group.collection(), "groups");
        assert!("Project".parse::<ParentKind>().is_err());
    }

    proptest! {
        #[test]
        fn two_part_round_trip(a in "[A-Za-z0-9_./-]{1,24}", b in "[A-Za-z0-9_:./ -]{1,24}") {
            let id = build_two_part_id(&a, &b);
            prop_assert_eq!(parse_two_part_id(&id).unwrap(), (a, b));
        }

        #[test]
        fn three_part_round_trip(
            a in "[A-Za-z0-9_./-]{1,24}",
            b in "[A-Za-z0-9_]{1,24}",
            c in "[A-Za-z0-9_:*/-]{1,24}",
        ) {
            let id = build_three_part_id(&a, &b, &c);
            prop_assert_eq!(parse_three_part_id(&id, SplitFrom::Start).unwrap(), (a, b, c));
        }

        #[test]
        fn three_part_round_trip_from_end(
            a in "[A-Za-z0-9_:./-]{1,24}",
            b in "[A-Za-z0-9_.-]{1,24}",
            c in 1i64..1_000_000,
        ) {
            let id = build_three_part_id(&a, &b, &c.to_string());
            prop_assert_eq!(
                parse_three_part_id(&id, SplitFrom::End).unwrap(),
                (a, b, c.to_string())
            );
        }

        #[test]
        fn scoped_round_trip(
            group in any::<bool>(),
            parent in "[A-Za-z0-9_./-]{1,24}",
            id in 0i64..i64::MAX,
        ) {
            let kind = if group { ParentKind::Group } else { ParentKind::Project };
            let scoped = ScopedId::new(kind, parent, id);
            prop_assert_eq!(ScopedId::decode(&scoped.encode()).unwrap(), scoped);
        }

        #[test]
        fn decode_never_returns_partial_tuple(s in "[^:]{0,32}") {
            prop_assert!(parse_two_part_id(&s).is_err());
        }
    }
}
