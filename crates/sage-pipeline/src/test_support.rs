//! Scripted pipeline collaborators for tests. Compiled into the crate
//! so integration suites and downstream crates can drive the
//! orchestrator without a live LLM endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use sage_models::request::AnalysisRequest;

use crate::error::PipelineError;
use crate::llm::{LlmClient, LlmReply};

/// One scripted LLM turn.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Successful reply with this raw text.
    Text(String),
    /// Reply with only whitespace content.
    Empty,
    /// Transport-level failure with this detail.
    Unavailable(String),
}

/// LLM stand-in that answers from a fixed script, in order. Running off
/// the end of the script is reported as an unavailable backend, which
/// also makes over-calling visible in tests.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script that answers every call with the same graded reply.
    pub fn repeating(text: &str, turns: usize) -> Self {
        Self::new(vec![ScriptedReply::Text(text.to_string()); turns])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(
        &self,
        _system_message: &str,
        _user_message: &str,
        _model_id: &str,
    ) -> Result<LlmReply, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(ScriptedReply::Text(raw_text)) => Ok(LlmReply {
                raw_text,
                prompt_tokens: 100,
                completion_tokens: 40,
            }),
            Some(ScriptedReply::Empty) => Err(PipelineError::LlmEmptyResponse),
            Some(ScriptedReply::Unavailable(detail)) => {
                Err(PipelineError::LlmUnavailable(detail))
            }
            None => Err(PipelineError::LlmUnavailable("script exhausted".to_string())),
        }
    }
}

/// Reply text in the wire format the parser accepts: prose followed by
/// one trailing grade token.
pub fn graded_reply(narrative: &str, grade: f64) -> String {
    format!("{narrative} {grade:.1}")
}

/// Source provider that fails every fetch.
#[derive(Debug, Default)]
pub struct FailingProvider;

#[async_trait]
impl crate::sources::SourceDataProvider for FailingProvider {
    async fn fetch(
        &self,
        source: &str,
        _request: &AnalysisRequest,
    ) -> Result<serde_json::Value, PipelineError> {
        Err(PipelineError::SourceData(format!(
            "fetch for '{source}' failed"
        )))
    }
}
