use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::Error;

lazy_static! {
    static ref VERSION_LITERAL_REGEX: Regex = Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").unwrap();
}

/// A `major.minor.patch` version literal.
///
/// The grammar is deliberately stricter than semver: exactly three
/// dot-separated non-negative integers, no prerelease or build metadata.
/// Ordering is lexicographic over `(major, minor, patch)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
}

impl SemanticVersion {
    /// Constructs a version from its components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion {
            major,
            minor,
            patch,
        }
    }

    /// The major component.
    pub fn major(&self) -> u64 {
        self.major
    }

    /// The minor component.
    pub fn minor(&self) -> u64 {
        self.minor
    }

    /// The patch component.
    pub fn patch(&self) -> u64 {
        self.patch
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_LITERAL_REGEX
            .captures(s)
            .ok_or_else(|| Error::Parse(s.to_string()))?;
        // The regex guarantees digit-only captures; parse can only fail on
        // u64 overflow, which is malformed input all the same.
        let component = |i: usize| {
            captures[i]
                .parse::<u64>()
                .map_err(|_| Error::Parse(s.to_string()))
        };
        Ok(SemanticVersion {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("1.2.3", 1, 2, 3)]
    #[test_case("0.0.0", 0, 0, 0)]
    #[test_case("10.20.30", 10, 20, 30)]
    #[test_case("01.2.3", 1, 2, 3; "leading zeros are tolerated")]
    fn parses_valid_literals(input: &str, major: u64, minor: u64, patch: u64) {
        let version: SemanticVersion = input.parse().unwrap();
        assert_eq!(version, SemanticVersion::new(major, minor, patch));
    }

    #[test_case(""; "empty")]
    #[test_case("1"; "major only")]
    #[test_case("1.2"; "missing patch")]
    #[test_case("1.2.3.4"; "extra component")]
    #[test_case("1.2.x"; "non numeric patch")]
    #[test_case("a.b.c"; "non numeric components")]
    #[test_case("1.2.3-alpha"; "prerelease tag")]
    #[test_case("1.2.3+build"; "build metadata")]
    #[test_case(" 1.2.3"; "leading whitespace")]
    #[test_case("1.2.3 "; "trailing whitespace")]
    #[test_case("v1.2.3"; "v prefix")]
    #[test_case("1..3"; "empty component")]
    #[test_case("-1.2.3"; "negative component")]
    fn rejects_malformed_literals(input: &str) {
        let result = input.parse::<SemanticVersion>();
        assert_eq!(result, Err(Error::Parse(input.to_string())));
    }

    #[test]
    fn parse_error_names_the_input() {
        let err = "1.2".parse::<SemanticVersion>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid version '1.2'");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let parse = |s: &str| s.parse::<SemanticVersion>().unwrap();

        assert!(parse("1.2.3") < parse("1.2.4"));
        assert!(parse("1.2.4") < parse("1.3.0"));
        assert!(parse("1.3.0") < parse("2.0.0"));
        assert!(parse("1.2.3") >= parse("1.2.3"));
        assert!(!(parse("0.2.3") > parse("1.2.3")));
        assert!(parse("10.0.0") > parse("9.9.9"), "components compare numerically");
    }

    #[test]
    fn serde_uses_the_string_form() {
        let version: SemanticVersion = serde_json::from_str(r#""1.2.3""#).unwrap();
        assert_eq!(version, SemanticVersion::new(1, 2, 3));
        assert_eq!(serde_json::to_string(&version).unwrap(), r#""1.2.3""#);

        assert!(serde_json::from_str::<SemanticVersion>(r#""1.2""#).is_err());
    }

    proptest! {
        #[test]
        fn round_trips_all_triples(major in 0u64..10_000, minor in 0u64..10_000, patch in 0u64..10_000) {
            let rendered = format!("{}.{}.{}", major, minor, patch);
            let parsed: SemanticVersion = rendered.parse().unwrap();
            prop_assert_eq!(parsed, SemanticVersion::new(major, minor, patch));
            prop_assert_eq!(parsed.to_string(), rendered);
        }

        #[test]
        fn never_parses_non_numeric_components(junk in "[a-zA-Z][a-zA-Z0-9]*") {
            let candidate = format!("1.2.{}", junk);
            prop_assert!(candidate.parse::<SemanticVersion>().is_err());
        }
    }
}
