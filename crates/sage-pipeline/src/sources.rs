use std::collections::BTreeMap;

use async_trait::async_trait;

use sage_models::request::AnalysisRequest;

use crate::error::PipelineError;

/// Supplies the raw per-source payload fed into a Stage-1 prompt.
///
/// Acquisition of that data (market feeds, news scrapers, broker APIs)
/// lives outside this crate; callers hand the pipeline a provider for
/// whatever they already collected.
#[async_trait]
pub trait SourceDataProvider: Send + Sync {
    async fn fetch(
        &self,
        source: &str,
        request: &AnalysisRequest,
    ) -> Result<serde_json::Value, PipelineError>;
}

/// Provider backed by a fixed source-name to payload map. This is what
/// the CLI builds from its input document, and what tests use.
#[derive(Debug, Default)]
pub struct StaticPayloads(BTreeMap<String, serde_json::Value>);

impl StaticPayloads {
    pub fn new(payloads: BTreeMap<String, serde_json::Value>) -> Self {
        Self(payloads)
    }
}

impl FromIterator<(String, serde_json::Value)> for StaticPayloads {
    fn from_iter<T: IntoIterator<Item = (String, serde_json::Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[async_trait]
impl SourceDataProvider for StaticPayloads {
    async fn fetch(
        &self,
        source: &str,
        _request: &AnalysisRequest,
    ) -> Result<serde_json::Value, PipelineError> {
        self.0.get(source).cloned().ok_or_else(|| {
            PipelineError::SourceData(format!("no payload for source '{source}'"))
        })
    }
}
