pub mod config;
pub mod request;
pub mod result;
pub mod result_schema;
pub mod weight_set;

pub use config::{LlmConfig, SageConfig, SourceConfig, StoreConfig, TemplatesConfig, WeightsConfig};
pub use request::{AnalysisRequest, Cadence};
pub use result::{
    AnalysisResult, AnalysisVariant, PipelineReport, PipelineStatus, RunOutcome, SourceReport,
    SourceStatus,
};
pub use result_schema::NaturalKey;
pub use weight_set::WeightSet;
