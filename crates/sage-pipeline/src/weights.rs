use std::collections::BTreeMap;

use sage_models::config::SageConfig;
use sage_models::request::Cadence;
use sage_models::weight_set::WeightSet;

use crate::error::PipelineError;

/// Resolve the WeightSet for one analysis run.
///
/// Absent or blank input selects the cadence-specific default table;
/// explicit input replaces the defaults wholesale (no merging). No
/// normalization happens here or anywhere downstream: the literal
/// values are embedded into the consolidated prompt as qualitative
/// hints for the LLM.
pub fn resolve(
    cadence: Cadence,
    raw_weights_json: Option<&str>,
    config: &SageConfig,
) -> Result<WeightSet, PipelineError> {
    let raw = raw_weights_json.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Ok(config.weights.defaults_for(cadence).clone());
    };

    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| PipelineError::InvalidWeights(format!("not valid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::InvalidWeights("weights must be a JSON object".into()))?;

    let mut table = BTreeMap::new();
    for (source, weight) in object {
        let number = weight.as_f64().ok_or_else(|| {
            PipelineError::InvalidWeights(format!("weight for '{source}' is not a number"))
        })?;
        table.insert(source.clone(), number);
    }

    let set = WeightSet::new(table).map_err(PipelineError::InvalidWeights)?;
    check_sources_known(&set, config)?;
    Ok(set)
}

/// Resolve from an already-typed override, as carried on an
/// `AnalysisRequest`. Same replace-not-merge semantics as [`resolve`].
pub fn resolve_set(
    cadence: Cadence,
    override_weights: Option<&WeightSet>,
    config: &SageConfig,
) -> Result<WeightSet, PipelineError> {
    match override_weights {
        None => Ok(config.weights.defaults_for(cadence).clone()),
        Some(set) => {
            check_sources_known(set, config)?;
            Ok(set.clone())
        }
    }
}

fn check_sources_known(set: &WeightSet, config: &SageConfig) -> Result<(), PipelineError> {
    for source in set.sources() {
        if !config.is_known_source(source) {
            return Err(PipelineError::InvalidWeights(format!(
                "unknown signal source '{source}'"
            )));
        }
    }
    Ok(())
}
