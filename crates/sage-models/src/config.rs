use serde::{Deserialize, Serialize};

use crate::request::Cadence;
use crate::weight_set::WeightSet;

/// Top-level configuration for SAGE. Constructed once at startup and
/// passed into the pipeline explicitly; there is no ambient global state.
/// Omitted sections in a config file fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SageConfig {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub weights: WeightsConfig,
    pub templates: TemplatesConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for SageConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            llm: LlmConfig::default(),
            weights: WeightsConfig::default(),
            templates: TemplatesConfig::default(),
            sources: vec![
                SourceConfig::enabled("technical_analysis"),
                SourceConfig::enabled("analysts_rating"),
                SourceConfig::enabled("news_analysis"),
            ],
        }
    }
}

impl SageConfig {
    /// Names of the sources Stage 1 will evaluate, in configured order.
    pub fn enabled_sources(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Whether `name` is a configured signal source (enabled or not).
    pub fn is_known_source(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name == name)
    }
}

/// One signal source feeding Stage-1 analyses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub enabled: bool,
}

impl SourceConfig {
    pub fn enabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
        }
    }
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/sage_results.db".to_string(),
        }
    }
}

/// LLM provider settings. The API is OpenAI chat-completions compatible;
/// `base_url` can point at any conforming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// API key; when empty the `SAGE_API_KEY` environment variable is used.
    pub api_key: String,
    /// Active model identifier, used when a request does not name one.
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
            max_tokens: 1000,
            temperature: 0.0,
        }
    }
}

/// Per-cadence default weight tables. Day and week defaults are
/// independent; an explicit request override replaces a table wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightsConfig {
    pub day: WeightSet,
    pub week: WeightSet,
}

impl WeightsConfig {
    pub fn defaults_for(&self, cadence: Cadence) -> &WeightSet {
        match cadence {
            Cadence::Day => &self.day,
            Cadence::Week => &self.week,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            day: [
                ("technical_analysis".to_string(), 0.4),
                ("analysts_rating".to_string(), 0.3),
                ("news_analysis".to_string(), 0.3),
            ]
            .into_iter()
            .collect(),
            week: [
                ("technical_analysis".to_string(), 0.3),
                ("analysts_rating".to_string(), 0.3),
                ("news_analysis".to_string(), 0.4),
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// System-message templates, keyed by cadence. A missing entry is a
/// configuration defect reported as `MissingTemplate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TemplatesConfig {
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub week: Option<String>,
}

impl TemplatesConfig {
    pub fn for_cadence(&self, cadence: Cadence) -> Option<&str> {
        match cadence {
            Cadence::Day => self.day.as_deref(),
            Cadence::Week => self.week.as_deref(),
        }
    }

    /// The built-in daily/weekly analyst templates. These instruct the
    /// structured wire format the parser expects: topic prose followed by
    /// a single trailing grade token.
    pub fn builtin() -> Self {
        Self {
            day: Some(analyst_template("DAILY", "the last 24 hours")),
            week: Some(analyst_template("WEEKLY", "the last 7 calendar days")),
        }
    }
}

fn analyst_template(horizon: &str, window: &str) -> String {
    format!(
        "You are StockAnalyst. Write a concise {horizon} outlook for the single stock \
         ticker named by the user, using information from {window} only.\n\
         Reply with one single paragraph covering, in order: technical picture, company \
         news, world news, industry conditions, competitors, legal matters, and financials. \
         Up to four sentences per topic; write exactly \"No significant data.\" for a topic \
         with nothing relevant. If a weights dictionary is provided, let it qualitatively \
         steer how much each topic influences your conclusion.\n\
         After the financial section, append one space and a single numeric grade from 1.0 \
         (bearish) to 10.0 (bullish) with one decimal place. Nothing may follow the number."
    )
}
