use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use log::warn;
use serde_json::Value;

use crate::context::EvaluationContext;
use crate::errors::Error;
use crate::parameter::{
    FeatureMetadata, FeatureStage, PlatformParameter, CURRENT_RULE_SCHEMA_VERSION,
};
use crate::store::{ParameterCache, ParameterSnapshot, ParameterStore};
use crate::value::{DataType, ParameterValue};

/// The process-wide catalog of platform parameters.
///
/// The registry owns parameter lifecycle: creation, typed validation, cached
/// retrieval and versioned, audited rule updates. It is an explicit service
/// object; construct one at process start with the store and cache
/// collaborators injected, and share it behind an `Arc`.
///
/// Reads are served through two cache layers: an in-process memo of decoded
/// parameters, then the distributed cache, then the durable store. Cached
/// entries are only ever replaced wholesale, so concurrent reads need no
/// coordination beyond the internal locks. Updates invalidate; they never
/// eagerly repopulate.
pub struct Registry {
    store: Arc<dyn ParameterStore>,
    cache: Arc<dyn ParameterCache>,
    definitions: RwLock<HashMap<String, PlatformParameter>>,
    memo: RwLock<HashMap<String, PlatformParameter>>,
}

impl Registry {
    /// A registry backed by the given store and cache collaborators.
    pub fn new(store: Arc<dyn ParameterStore>, cache: Arc<dyn ParameterCache>) -> Self {
        Registry {
            store,
            cache,
            definitions: RwLock::new(HashMap::new()),
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Creates and registers a parameter with an empty rule list and the
    /// type-appropriate zero default. Fails if the name is taken or the
    /// definition does not validate.
    pub fn create_parameter(
        &self,
        name: &str,
        description: &str,
        data_type: DataType,
        is_feature: bool,
        feature_stage: Option<FeatureStage>,
    ) -> Result<PlatformParameter, Error> {
        let parameter = PlatformParameter::new_definition(
            name,
            description,
            data_type,
            FeatureMetadata {
                is_feature,
                feature_stage,
            },
        );
        parameter.validate()?;

        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if definitions.contains_key(name) {
            return Err(Error::Validation(format!(
                "Parameter with name '{}' already exists",
                name
            )));
        }
        definitions.insert(name.to_string(), parameter.clone());
        Ok(parameter)
    }

    /// Creates a feature flag: a bool parameter with `is_feature` set and
    /// the given stage.
    pub fn create_feature_flag(
        &self,
        name: &str,
        description: &str,
        stage: FeatureStage,
    ) -> Result<PlatformParameter, Error> {
        self.create_parameter(name, description, DataType::Bool, true, Some(stage))
    }

    /// Returns a read-only snapshot of the named parameter.
    ///
    /// Read-through: in-process memo, then distributed cache, then the
    /// latest committed revision merged into the registered definition,
    /// then the definition itself. Both cache layers are populated on the
    /// way out.
    pub fn get_parameter(&self, name: &str) -> Result<PlatformParameter, Error> {
        if let Some(parameter) = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(parameter.clone());
        }

        let key = PlatformParameter::cache_key(name);
        if let Some(bytes) = self.cache.get(&key) {
            match decode_cache_entry(&bytes) {
                Ok(parameter) => {
                    self.memoize(name, parameter.clone());
                    return Ok(parameter);
                }
                // A cache entry is a memo, not a source of truth: discard
                // anything unreadable (including schema drift) and re-read.
                Err(e) => warn!("discarding unreadable cache entry for '{}': {}", name, e),
            }
        }

        let definition = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let parameter = match (self.store.load_latest(name)?, definition) {
            (Some(snapshot), Some(definition)) => with_stored_rules(definition, snapshot)?,
            (_, Some(definition)) => definition,
            (_, None) => return Err(Error::NotFound(name.to_string())),
        };

        let bytes =
            serde_json::to_vec(&parameter).map_err(|e| Error::Validation(e.to_string()))?;
        self.cache.set(&key, bytes);
        self.memoize(name, parameter.clone());
        Ok(parameter)
    }

    /// The names of every registered parameter, sorted.
    pub fn get_all_parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Dict representations of every registered feature flag, keyed by name.
    pub fn get_feature_flag_dicts(&self) -> Result<BTreeMap<String, Value>, Error> {
        let feature_names: Vec<String> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, parameter)| parameter.metadata().is_feature)
            .map(|(name, _)| name.clone())
            .collect();

        let mut result = BTreeMap::new();
        for name in feature_names {
            let parameter = self.get_parameter(&name)?;
            result.insert(name, parameter.to_value()?);
        }
        Ok(result)
    }

    /// Replaces the named parameter's rule list with `new_rule_dicts` as one
    /// audited revision.
    ///
    /// The candidate rule set is decoded at the current schema version and
    /// validated as a whole before anything is persisted; an invalid set
    /// fails with no side effect. On success the revision is committed,
    /// tagged with the committer and message, and both cache layers for the
    /// name are invalidated. A commit lost to a concurrent update surfaces
    /// as [Error::Conflict].
    pub fn update_rules(
        &self,
        name: &str,
        committer_id: &str,
        commit_message: &str,
        new_rule_dicts: &[Value],
    ) -> Result<(), Error> {
        let current = self.get_parameter(name)?;

        let mut candidate_dict = current.to_value()?;
        candidate_dict["rules"] = Value::Array(new_rule_dicts.to_vec());
        candidate_dict["rule_schema_version"] = CURRENT_RULE_SCHEMA_VERSION.into();
        let candidate = PlatformParameter::from_value(&candidate_dict)?;
        candidate.validate()?;

        self.store.commit(
            name,
            committer_id,
            commit_message,
            new_rule_dicts.to_vec(),
            CURRENT_RULE_SCHEMA_VERSION,
        )?;

        self.cache
            .delete_many(&[PlatformParameter::cache_key(name)]);
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }

    /// Evaluates every registered parameter against the context.
    pub fn evaluate_all(
        &self,
        context: &EvaluationContext,
    ) -> Result<BTreeMap<String, ParameterValue>, Error> {
        let names = self.get_all_parameter_names();
        self.evaluate_names(names, context)
    }

    /// Evaluates the named subset of parameters against the context.
    ///
    /// Unknown names fail up front with [Error::UnknownNames] listing every
    /// offender; either all named parameters are evaluated or none.
    pub fn evaluate_selected<S: AsRef<str>>(
        &self,
        names: &[S],
        context: &EvaluationContext,
    ) -> Result<BTreeMap<String, ParameterValue>, Error> {
        let unknown: Vec<String> = {
            let definitions = self
                .definitions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            names
                .iter()
                .map(|name| name.as_ref())
                .filter(|name| !definitions.contains_key(*name))
                .map(|name| name.to_string())
                .collect()
        };
        if !unknown.is_empty() {
            return Err(Error::UnknownNames(unknown));
        }
        self.evaluate_names(
            names.iter().map(|name| name.as_ref().to_string()).collect(),
            context,
        )
    }

    /// Drops every registered definition and memoized read, and purges the
    /// distributed-cache entries of every known name. Test-harness lifecycle
    /// only; production registries live for the whole process.
    pub fn reset(&self) {
        let keys: Vec<String> = self
            .get_all_parameter_names()
            .iter()
            .map(|name| PlatformParameter::cache_key(name))
            .collect();
        self.cache.delete_many(&keys);
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn evaluate_names(
        &self,
        names: Vec<String>,
        context: &EvaluationContext,
    ) -> Result<BTreeMap<String, ParameterValue>, Error> {
        let mut results = BTreeMap::new();
        for name in names {
            let parameter = self.get_parameter(&name)?;
            let value = parameter.evaluate(context);
            results.insert(name, value);
        }
        Ok(results)
    }

    fn memoize(&self, name: &str, parameter: PlatformParameter) {
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), parameter);
    }
}

fn decode_cache_entry(bytes: &[u8]) -> Result<PlatformParameter, Error> {
    let dict: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Validation(e.to_string()))?;
    PlatformParameter::from_value(&dict)
}

fn with_stored_rules(
    definition: PlatformParameter,
    snapshot: ParameterSnapshot,
) -> Result<PlatformParameter, Error> {
    let mut dict = definition.to_value()?;
    dict["rules"] = Value::Array(snapshot.rules);
    dict["rule_schema_version"] = snapshot.rule_schema_version.into();
    // from_value enforces the schema gate, so a drifted stored payload is
    // rejected rather than coerced.
    PlatformParameter::from_value(&dict)
}
