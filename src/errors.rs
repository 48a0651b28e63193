use itertools::Itertools;
use thiserror::Error;

/// Error is the failure taxonomy for parameter evaluation and registry
/// operations.
///
/// Every failure is returned to the caller; nothing in this crate retries or
/// swallows an error. [Error::Conflict] is the only retryable variant, raised
/// when a concurrent update lost a race at the storage layer.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// A version literal did not match the `major.minor.patch` grammar.
    #[error("Invalid version '{0}'")]
    Parse(String),

    /// A context field, filter, rule or parameter invariant was violated.
    /// The message names the offending field/operator/value verbatim.
    #[error("{0}")]
    Validation(String),

    /// No parameter is registered under the requested name.
    #[error("Platform parameter not found: '{0}'")]
    NotFound(String),

    /// A concurrent update to the same parameter won the commit race.
    #[error("Conflicting update to platform parameter '{name}'")]
    Conflict {
        /// Name of the parameter whose commit was rejected as stale.
        name: String,
    },

    /// Evaluation was requested for names outside the known set. Lists every
    /// offending name, not just the first.
    #[error("Feature flag(s) do not exist: [{}]", .0.join(", "))]
    UnknownNames(Vec<String>),
}

impl Error {
    /// Whether the caller may meaningfully retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

pub(crate) fn invalid_enum_value(field: &str, value: &str, allowed: &[&str]) -> Error {
    Error::Validation(format!(
        "Invalid {} '{}', must be one of [{}]",
        field,
        value,
        allowed.iter().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn display_forms() {
        assert_eq!(
            Error::Parse("1.2".to_string()).to_string(),
            "Invalid version '1.2'"
        );
        assert_eq!(
            Error::NotFound("promo_bar".to_string()).to_string(),
            "Platform parameter not found: 'promo_bar'"
        );
        assert_eq!(
            Error::UnknownNames(vec!["a".to_string(), "b".to_string()]).to_string(),
            "Feature flag(s) do not exist: [a, b]"
        );
        assert_eq!(
            invalid_enum_value("client_type", "iOS", &["Web", "Android"]).to_string(),
            "Invalid client_type 'iOS', must be one of [Web, Android]"
        );
    }

    #[test]
    fn only_conflict_is_retryable() {
        asserting!("conflicts are retryable")
            .that(&Error::Conflict {
                name: "promo_bar".to_string(),
            }
            .is_retryable())
            .is_true();
        asserting!("validation failures are not")
            .that(&Error::Validation("nope".to_string()).is_retryable())
            .is_false();
    }
}
