use std::fmt;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{EvaluationContext, ALLOWED_SERVER_MODES};
use crate::errors::Error;
use crate::filter::{Condition, FilterType};
use crate::rule::PlatformParameterRule;
use crate::value::{DataType, ParameterValue};

/// The schema version this build reads and writes for persisted rule dicts.
/// Payloads tagged with any other version are rejected, never coerced.
pub const CURRENT_RULE_SCHEMA_VERSION: u32 = 1;

const SUPPORTED_DATA_TYPES: &[&str] = &["bool", "string", "number"];

lazy_static! {
    static ref PARAMETER_NAME_REGEX: Regex = Regex::new(r"^[a-z0-9_]{1,50}$").unwrap();
}

/// The most stable environment a feature may be enabled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStage {
    /// Enabled in development environments only.
    Dev,
    /// Enabled in development and test environments.
    Test,
    /// Enabled anywhere.
    Prod,
}

impl fmt::Display for FeatureStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FeatureStage::Dev => "dev",
            FeatureStage::Test => "test",
            FeatureStage::Prod => "prod",
        };
        f.write_str(name)
    }
}

/// Marks a parameter as a feature flag and records its rollout stage.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct FeatureMetadata {
    /// When true the parameter is a feature flag, subject to the stage
    /// safety invariants checked by [PlatformParameter::validate].
    pub is_feature: bool,
    /// The stage of the feature; required when `is_feature` is true.
    pub feature_stage: Option<FeatureStage>,
}

/// A named, typed configuration entity holding an ordered rule list and a
/// default value.
///
/// Evaluation walks the rules in order and returns the first match's value,
/// falling back to the default. Instances handed out by the registry are
/// read-only snapshots; rule changes go through
/// [crate::Registry::update_rules] as one validated, versioned revision.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PlatformParameter {
    /// The parameter name; lowercase letters, digits and underscores.
    pub name: String,
    /// Human-readable description of what the parameter controls.
    pub description: String,
    /// The declared type of the default and every rule outcome.
    pub data_type: DataType,
    pub(crate) rules: Vec<PlatformParameterRule>,
    pub(crate) default_value: ParameterValue,
    /// The schema version of the persisted rule dicts.
    pub rule_schema_version: u32,
    #[serde(default)]
    pub(crate) metadata: FeatureMetadata,
}

impl PlatformParameter {
    pub(crate) fn new_definition(
        name: &str,
        description: &str,
        data_type: DataType,
        metadata: FeatureMetadata,
    ) -> Self {
        PlatformParameter {
            name: name.to_string(),
            description: description.to_string(),
            data_type,
            rules: vec![],
            default_value: data_type.default_value(),
            rule_schema_version: CURRENT_RULE_SCHEMA_VERSION,
            metadata,
        }
    }

    /// The rules of the parameter, in evaluation order.
    pub fn rules(&self) -> &[PlatformParameterRule] {
        &self.rules
    }

    /// The value returned when no rule matches.
    pub fn default_value(&self) -> &ParameterValue {
        &self.default_value
    }

    /// The feature metadata of the parameter.
    pub fn metadata(&self) -> &FeatureMetadata {
        &self.metadata
    }

    /// The deterministic distributed-cache key for a parameter name.
    pub fn cache_key(name: &str) -> String {
        format!("parameter:{}", name)
    }

    /// Evaluates the parameter in the given context: the value of the first
    /// matched rule, else the default value. No side effects.
    pub fn evaluate(&self, context: &EvaluationContext) -> ParameterValue {
        for rule in &self.rules {
            if rule.evaluate(context) {
                return rule.value_when_matched.clone();
            }
        }
        self.default_value.clone()
    }

    /// Validates the parameter as a whole: name pattern, value/type
    /// conformance, every rule, and the feature-flag safety invariants.
    pub fn validate(&self) -> Result<(), Error> {
        if !PARAMETER_NAME_REGEX.is_match(&self.name) {
            return Err(Error::Validation(format!(
                "Invalid parameter name '{}'",
                self.name
            )));
        }
        for rule in &self.rules {
            if !self.data_type.matches(&rule.value_when_matched) {
                return Err(Error::Validation(format!(
                    "Expected {}, received {} in value_when_matched",
                    self.data_type, rule.value_when_matched
                )));
            }
        }
        if !self.data_type.matches(&self.default_value) {
            return Err(Error::Validation(format!(
                "Expected {}, received {} in default value",
                self.data_type, self.default_value
            )));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        if self.metadata.is_feature {
            self.validate_feature_flag()?;
        }
        Ok(())
    }

    /// The stage invariant: a feature must not leak into an environment more
    /// stable than its declared stage, and every enabling rule must name the
    /// environments it enables.
    fn validate_feature_flag(&self) -> Result<(), Error> {
        if self.data_type != DataType::Bool {
            return Err(Error::Validation(format!(
                "Data type of feature flags must be bool, got {} instead",
                self.data_type
            )));
        }
        let stage = self.metadata.feature_stage.ok_or_else(|| {
            Error::Validation(format!(
                "Invalid feature stage, must be one of [{}]",
                ALLOWED_SERVER_MODES.iter().join(", ")
            ))
        })?;

        let enabling_rules = self
            .rules
            .iter()
            .filter(|rule| rule.value_when_matched.is_true());
        for rule in enabling_rules {
            if !rule.has_server_mode_filter() {
                return Err(Error::Validation(
                    "Rules that enable a feature must have a server_mode filter".to_string(),
                ));
            }
            let mode_filters = rule
                .filters()
                .iter()
                .filter(|filter| filter.kind() == FilterType::ServerMode);
            for filter in mode_filters {
                for Condition(_, mode) in filter.conditions() {
                    match stage {
                        FeatureStage::Dev if mode == "test" || mode == "prod" => {
                            return Err(Error::Validation(
                                "Feature in dev stage cannot be enabled in test or production \
                                 environment"
                                    .to_string(),
                            ));
                        }
                        FeatureStage::Test if mode == "prod" => {
                            return Err(Error::Validation(
                                "Feature in test stage cannot be enabled in production \
                                 environment"
                                    .to_string(),
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes a parameter from its dict form, rejecting payloads whose
    /// `rule_schema_version` differs from [CURRENT_RULE_SCHEMA_VERSION].
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        if let Some(data_type) = value.get("data_type").and_then(Value::as_str) {
            if !SUPPORTED_DATA_TYPES.contains(&data_type) {
                return Err(Error::Validation(format!(
                    "Unsupported data type: '{}'",
                    data_type
                )));
            }
        }
        let schema_version = value
            .get("rule_schema_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::Validation("Missing rule schema version in parameter dict".to_string())
            })?;
        if schema_version != u64::from(CURRENT_RULE_SCHEMA_VERSION) {
            return Err(Error::Validation(format!(
                "Expected rule schema version {}, received {}",
                CURRENT_RULE_SCHEMA_VERSION, schema_version
            )));
        }
        serde_json::from_value(value.clone()).map_err(|e| Error::Validation(e.to_string()))
    }

    /// The dict form of the parameter; the exact inverse of [Self::from_value].
    pub fn to_value(&self) -> Result<Value, Error> {
        serde_json::to_value(self).map_err(|e| Error::Validation(e.to_string()))
    }
}
