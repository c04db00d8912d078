use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::weight_set::WeightSet;

pub const MAX_INSTRUMENT_LEN: usize = 10;

/// Whether an analysis cycle is a daily or weekly assessment.
/// Selects the system-message template and the default weight table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Day,
    Week,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Day => "day",
            Cadence::Week => "week",
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input to one pipeline run.
///
/// `event_date` is the calendar date the analysis pertains to, which is
/// not necessarily the date the run executes. `weights` overrides the
/// configured per-cadence defaults when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub event_date: NaiveDate,
    pub instrument_id: String,
    pub cadence: Cadence,
    /// Model identifier; callers may fill this from configuration when
    /// the incoming document leaves it empty.
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightSet>,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_label: Option<String>,
}

impl AnalysisRequest {
    /// Validate the request fields that the pipeline depends on.
    pub fn validate(&self) -> Result<(), String> {
        let ticker = self.instrument_id.trim();
        if ticker.is_empty() || ticker.len() > MAX_INSTRUMENT_LEN {
            return Err(format!(
                "instrument_id must be 1-{MAX_INSTRUMENT_LEN} characters, got {:?}",
                self.instrument_id
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err("model_id must be non-empty".to_string());
        }
        if self.test_label.is_some() && !self.is_test {
            return Err("test_label requires is_test".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ticker: &str) -> AnalysisRequest {
        AnalysisRequest {
            event_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            instrument_id: ticker.to_string(),
            cadence: Cadence::Day,
            model_id: "gpt-4o-mini".to_string(),
            weights: None,
            is_test: false,
            test_label: None,
        }
    }

    #[test]
    fn valid_request() {
        assert!(request("AAPL").validate().is_ok());
    }

    #[test]
    fn empty_instrument_rejected() {
        assert!(request("").validate().is_err());
        assert!(request("   ").validate().is_err());
    }

    #[test]
    fn long_instrument_rejected() {
        assert!(request("TOOLONGTICKER").validate().is_err());
        assert!(request("ABCDEFGHIJ").validate().is_ok()); // exactly 10
    }

    #[test]
    fn test_label_without_test_flag_rejected() {
        let mut req = request("AAPL");
        req.test_label = Some("experiment".to_string());
        assert!(req.validate().is_err());
        req.is_test = true;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn cadence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Cadence::Day).unwrap(), r#""day""#);
        assert_eq!(serde_json::to_string(&Cadence::Week).unwrap(), r#""week""#);
    }

    #[test]
    fn request_json_roundtrip() {
        let req = AnalysisRequest {
            weights: Some(
                [("technical_analysis".to_string(), 0.6)]
                    .into_iter()
                    .collect(),
            ),
            is_test: true,
            test_label: Some("backfill".to_string()),
            ..request("MSFT")
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: AnalysisRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = r#"{
            "event_date": "2024-01-15",
            "instrument_id": "AAPL",
            "cadence": "week",
            "model_id": "gpt-4o-mini"
        }"#;
        let req: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.cadence, Cadence::Week);
        assert!(req.weights.is_none());
        assert!(!req.is_test);
        assert!(req.test_label.is_none());
    }
}
