//! Document version tags for multi-version wire compatibility.
//!
//! Every root-stored document carries a reserved element at position 0
//! holding the version of the schema catalog that wrote it, either as a
//! numeric array `[major, minor, patch, label?]` or an equivalent string
//! form. The version-stamping codec reads this tag back so that fix-up
//! hooks can migrate decoded models programmatically.

use bson::Bson;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{MappingError, MappingResult};

/// A document/schema version, ordered numerically by major, then minor,
/// then patch. The label is informational only and never participates in
/// precedence beyond tie-breaking for a consistent total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
    /// Patch version component.
    pub patch: u32,
    /// Optional informational label (e.g. a pre-release marker).
    pub label: Option<String>,
}

impl DocumentVersion {
    /// Creates a version without a label.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            label: None,
        }
    }

    /// Attaches an informational label to this version.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Renders the version as its numeric-array wire form.
    pub fn to_bson(&self) -> Bson {
        let mut parts = vec![
            Bson::Int32(self.major as i32),
            Bson::Int32(self.minor as i32),
            Bson::Int32(self.patch as i32),
        ];
        if let Some(label) = &self.label {
            parts.push(Bson::String(label.clone()));
        }
        Bson::Array(parts)
    }

    /// Parses a version tag from its wire form.
    ///
    /// Accepts the numeric-array form and the dotted-string form.
    ///
    /// # Errors
    ///
    /// Returns a decode error for any other BSON shape or an unparseable
    /// string.
    pub fn from_bson(value: &Bson) -> MappingResult<Self> {
        match value {
            Bson::Array(parts) => {
                let component = |idx: usize| -> MappingResult<u32> {
                    match parts.get(idx) {
                        Some(Bson::Int32(n)) if *n >= 0 => Ok(*n as u32),
                        Some(Bson::Int64(n)) if *n >= 0 => Ok(*n as u32),
                        other => Err(MappingError::Decode(format!(
                            "invalid version component at index {idx}: {other:?}"
                        ))),
                    }
                };
                let mut version =
                    DocumentVersion::new(component(0)?, component(1)?, component(2)?);
                if let Some(Bson::String(label)) = parts.get(3) {
                    version.label = Some(label.clone());
                }
                Ok(version)
            }
            Bson::String(s) => s.parse(),
            other => Err(MappingError::Decode(format!(
                "invalid version tag: {other:?}"
            ))),
        }
    }
}

impl PartialOrd for DocumentVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            // Labels are informational; compared only to keep Ord consistent
            // with Eq when the numeric triples match.
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(label) = &self.label {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

impl FromStr for DocumentVersion {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, label) = match s.split_once('-') {
            Some((n, l)) => (n, Some(l.to_string())),
            None => (s, None),
        };
        let mut parts = numbers.split('.');
        let mut component = || -> MappingResult<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| MappingError::Decode(format!("invalid version string: {s}")))
        };
        let version = DocumentVersion {
            major: component()?,
            minor: component()?,
            patch: component()?,
            label,
        };
        if parts.next().is_some() {
            return Err(MappingError::Decode(format!(
                "invalid version string: {s}"
            )));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_component_ordering() {
        // 1.2.0 < 1.10.0 numerically, even though "10" < "2" lexically.
        assert!(DocumentVersion::new(1, 2, 0) < DocumentVersion::new(1, 10, 0));
        assert!(DocumentVersion::new(2, 0, 0) > DocumentVersion::new(1, 99, 99));
        assert!(DocumentVersion::new(1, 0, 2) > DocumentVersion::new(1, 0, 1));
    }

    #[test]
    fn label_does_not_outrank_numbers() {
        let released = DocumentVersion::new(1, 3, 0);
        let labelled = DocumentVersion::new(1, 2, 0).with_label("rc1");
        assert!(labelled < released);
    }

    #[test]
    fn array_wire_form_round_trip() {
        let version = DocumentVersion::new(2, 4, 1).with_label("beta");
        let parsed = DocumentVersion::from_bson(&version.to_bson()).unwrap();
        assert_eq!(parsed, version);
    }

    #[test]
    fn string_wire_form_round_trip() {
        let version = DocumentVersion::new(0, 9, 12).with_label("legacy");
        let parsed = DocumentVersion::from_bson(&Bson::String(version.to_string())).unwrap();
        assert_eq!(parsed, version);
        assert!("1.2".parse::<DocumentVersion>().is_err());
        assert!("1.2.3.4".parse::<DocumentVersion>().is_err());
    }

    #[test]
    fn rejects_malformed_tags() {
        assert!(DocumentVersion::from_bson(&Bson::Int32(3)).is_err());
        assert!(
            DocumentVersion::from_bson(&Bson::Array(vec![Bson::Int32(1), Bson::Int32(-2)]))
                .is_err()
        );
    }
}
