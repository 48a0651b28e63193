use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::errors::Error;
use crate::filter::{FilterType, PlatformParameterFilter};
use crate::value::ParameterValue;

/// An ordered list of filters paired with the value the parameter takes when
/// all of them match.
///
/// An empty filter list matches unconditionally; such a rule shadows
/// everything after it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PlatformParameterRule {
    pub(crate) filters: Vec<PlatformParameterFilter>,
    pub(crate) value_when_matched: ParameterValue,
}

impl PlatformParameterRule {
    /// Constructs a rule from its filters and outcome value.
    pub fn new<V: Into<ParameterValue>>(
        filters: Vec<PlatformParameterFilter>,
        value_when_matched: V,
    ) -> Self {
        PlatformParameterRule {
            filters,
            value_when_matched: value_when_matched.into(),
        }
    }

    /// The filters of the rule, in insertion order.
    pub fn filters(&self) -> &[PlatformParameterFilter] {
        &self.filters
    }

    /// The value the parameter takes when this rule matches.
    pub fn value_when_matched(&self) -> &ParameterValue {
        &self.value_when_matched
    }

    /// Tries to match the given context against this rule.
    pub fn evaluate(&self, context: &EvaluationContext) -> bool {
        // rules match if _all_ of their filters do
        for filter in &self.filters {
            if !filter.evaluate(context) {
                return false;
            }
        }
        true
    }

    /// Whether any contained filter matches on `server_mode`.
    pub fn has_server_mode_filter(&self) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.kind() == FilterType::ServerMode)
    }

    /// Validates every contained filter, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), Error> {
        for filter in &self.filters {
            filter.validate()?;
        }
        Ok(())
    }
}
