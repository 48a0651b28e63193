#![cfg(test)]

use std::sync::Arc;

use serde_json::{json, Value};

use crate::filter::{Condition, FilterType, Op, PlatformParameterFilter};
use crate::parameter::{FeatureMetadata, PlatformParameter, CURRENT_RULE_SCHEMA_VERSION};
use crate::registry::Registry;
use crate::store::{InMemoryCache, InMemoryStore};
use crate::value::{DataType, ParameterValue};

pub fn mode_filter(modes: &[&str]) -> PlatformParameterFilter {
    PlatformParameterFilter::new(
        FilterType::ServerMode,
        modes
            .iter()
            .map(|mode| Condition(Op::Equal, mode.to_string()))
            .collect::<Vec<_>>(),
    )
}

pub fn string_parameter(name: &str, default: &str) -> PlatformParameter {
    PlatformParameter {
        name: name.to_string(),
        description: "A string parameter".to_string(),
        data_type: DataType::String,
        rules: vec![],
        default_value: ParameterValue::from(default),
        rule_schema_version: CURRENT_RULE_SCHEMA_VERSION,
        metadata: FeatureMetadata::default(),
    }
}

pub fn mode_rule_dict(mode: &str, value: Value) -> Value {
    json!({
        "filters": [
            {"type": "server_mode", "conditions": [["=", mode]]}
        ],
        "value_when_matched": value
    })
}

pub fn catch_all_rule_dict(value: Value) -> Value {
    json!({
        "filters": [],
        "value_when_matched": value
    })
}

pub fn new_registry() -> (Registry, Arc<InMemoryStore>, Arc<InMemoryCache>) {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let registry = Registry::new(store.clone(), cache.clone());
    (registry, store, cache)
}
