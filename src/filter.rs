use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::context::{
    EvaluationContext, ALLOWED_BROWSER_TYPES, ALLOWED_CLIENT_TYPES, ALLOWED_SERVER_MODES,
    ALLOWED_USER_LOCALES,
};
use crate::errors::{invalid_enum_value, Error};
use crate::version::SemanticVersion;

/// The context attribute a filter matches against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// The running environment of the evaluating process.
    ServerMode,
    /// The client type, e.g. 'Web' or 'Android'.
    ClientType,
    /// The browser type, e.g. 'Chrome'.
    BrowserType,
    /// The native application version; the only type with ordering operators.
    AppVersion,
    /// The locale code, e.g. 'en'.
    UserLocale,
}

impl FilterType {
    fn as_str(&self) -> &'static str {
        match self {
            FilterType::ServerMode => "server_mode",
            FilterType::ClientType => "client_type",
            FilterType::BrowserType => "browser_type",
            FilterType::AppVersion => "app_version",
            FilterType::UserLocale => "user_locale",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition operator. Only `=` is legal for enum-valued filter types;
/// `app_version` filters additionally support the ordering operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Op {
    /// Exact equality.
    #[serde(rename = "=")]
    Equal,
    /// Version strictly below the condition value.
    #[serde(rename = "<")]
    LessThan,
    /// Version at or below the condition value.
    #[serde(rename = "<=")]
    LessThanOrEqual,
    /// Version strictly above the condition value.
    #[serde(rename = ">")]
    GreaterThan,
    /// Version at or above the condition value.
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Equal => "=",
            Op::LessThan => "<",
            Op::LessThanOrEqual => "<=",
            Op::GreaterThan => ">",
            Op::GreaterThanOrEqual => ">=",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, value)` pair. Serializes as a two-element array,
/// e.g. `["=", "dev"]` or `[">=", "1.2.0"]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Condition(pub Op, pub String);

/// A predicate over one context attribute, evaluated as an OR across its
/// listed conditions. Insertion order of conditions is preserved but has no
/// effect on the outcome.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PlatformParameterFilter {
    #[serde(rename = "type")]
    pub(crate) kind: FilterType,
    pub(crate) conditions: Vec<Condition>,
}

impl PlatformParameterFilter {
    /// Constructs a filter over the given attribute.
    pub fn new<C: Into<Vec<Condition>>>(kind: FilterType, conditions: C) -> Self {
        PlatformParameterFilter {
            kind,
            conditions: conditions.into(),
        }
    }

    /// The context attribute this filter matches against.
    pub fn kind(&self) -> FilterType {
        self.kind
    }

    /// The conditions of this filter, in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Tries to match the given context against this filter. True iff any
    /// condition is satisfied.
    pub fn evaluate(&self, context: &EvaluationContext) -> bool {
        self.conditions
            .iter()
            .any(|condition| self.evaluate_condition(condition, context))
    }

    fn evaluate_condition(&self, condition: &Condition, context: &EvaluationContext) -> bool {
        let Condition(op, value) = condition;
        match self.kind {
            FilterType::AppVersion => match_version(*op, value, context.app_version()),
            // Equality is the only operator for the remaining types; an
            // absent context field never matches.
            FilterType::ServerMode => {
                *op == Op::Equal && context.server_mode().as_str() == value.as_str()
            }
            FilterType::ClientType => {
                *op == Op::Equal && context.client_type() == Some(value.as_str())
            }
            FilterType::BrowserType => {
                *op == Op::Equal && context.browser_type() == Some(value.as_str())
            }
            FilterType::UserLocale => {
                *op == Op::Equal && context.user_locale() == Some(value.as_str())
            }
        }
    }

    /// Validates this filter: conditions must be non-empty, the operator
    /// must be supported for the filter type, and every value must be valid
    /// for its type.
    pub fn validate(&self) -> Result<(), Error> {
        if self.conditions.is_empty() {
            return Err(Error::Validation(format!(
                "Filter of type '{}' must have at least one condition",
                self.kind
            )));
        }
        for Condition(op, value) in &self.conditions {
            if self.kind != FilterType::AppVersion && *op != Op::Equal {
                return Err(Error::Validation(format!(
                    "Unsupported operator '{}' for filter of type '{}'",
                    op, self.kind
                )));
            }
            match self.kind {
                FilterType::ServerMode => {
                    if !ALLOWED_SERVER_MODES.contains(&value.as_str()) {
                        return Err(invalid_enum_value(
                            "server_mode",
                            value,
                            ALLOWED_SERVER_MODES,
                        ));
                    }
                }
                FilterType::ClientType => {
                    if !ALLOWED_CLIENT_TYPES.contains(&value.as_str()) {
                        return Err(invalid_enum_value(
                            "client_type",
                            value,
                            ALLOWED_CLIENT_TYPES,
                        ));
                    }
                }
                FilterType::BrowserType => {
                    if !ALLOWED_BROWSER_TYPES.contains(&value.as_str()) {
                        return Err(invalid_enum_value(
                            "browser_type",
                            value,
                            ALLOWED_BROWSER_TYPES,
                        ));
                    }
                }
                FilterType::UserLocale => {
                    if !ALLOWED_USER_LOCALES.contains(&value.as_str()) {
                        return Err(invalid_enum_value(
                            "user_locale",
                            value,
                            ALLOWED_USER_LOCALES,
                        ));
                    }
                }
                FilterType::AppVersion => {
                    SemanticVersion::from_str(value)?;
                }
            }
        }
        Ok(())
    }
}

/// An unknown context version never matches, whatever the operator.
fn match_version(op: Op, expected: &str, actual: Option<&str>) -> bool {
    let actual = match actual {
        Some(actual) => actual,
        None => return false,
    };
    let (client, target) = match (
        SemanticVersion::from_str(actual),
        SemanticVersion::from_str(expected),
    ) {
        (Ok(client), Ok(target)) => (client, target),
        _ => {
            warn!(
                "skipping app_version condition: cannot compare '{}' against '{}'",
                actual, expected
            );
            return false;
        }
    };
    match op {
        Op::Equal => client == target,
        Op::LessThan => client < target,
        Op::LessThanOrEqual => client <= target,
        Op::GreaterThan => client > target,
        Op::GreaterThanOrEqual => client >= target,
    }
}
