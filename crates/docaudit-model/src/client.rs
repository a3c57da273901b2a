use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use docaudit_core::{clip, strip_markup, AttemptLog, AttemptStatus, AttemptTrace, Rule};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::parse::parse_findings;
use crate::prompt::{build_prompt, build_repair_prompt, GenerateRequest};
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Largest document sent inline (5 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

const OUTPUT_EXCERPT_CHARS: usize = 1800;
const RAW_EXCERPT_CHARS: usize = 3000;
const REPAIR_INPUT_CHARS: usize = 5000;
const HTTP_SNIPPET_CHARS: usize = 500;

const ATTEMPT_PRIMARY: &str = "attempt_1_primary";
const ATTEMPT_STRICT: &str = "attempt_2_strict";
const ATTEMPT_REPAIR: &str = "attempt_3_repair";

/// Evaluates a batch of rules against one document.
#[async_trait]
pub trait ComplianceModel: Send + Sync {
    /// Returns the raw (unnormalized) findings array. `log` is reset on entry
    /// and holds the attempt trace of this call when it returns.
    async fn evaluate(
        &self,
        framework: &str,
        document_url: &str,
        rules: &[Rule],
        log: &mut AttemptLog,
    ) -> Result<Vec<Value>, ModelError>;
}

pub struct GeminiClient {
    config: ModelConfig,
    transport: Arc<dyn HttpTransport>,
}

/// What the attempts of one call have seen so far.
#[derive(Default)]
struct CallState {
    last_text: String,
    last_error: Option<ModelError>,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(config.fetch_timeout_secs),
            Duration::from_secs(config.generate_timeout_secs),
        )?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ModelConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, ModelError> {
        let resp = self.transport.fetch(url, MAX_DOCUMENT_BYTES).await?;
        if !resp.is_success() {
            return Err(ModelError::Fetch(format!("HTTP {}", resp.status)));
        }
        if resp.body.is_empty() {
            return Err(ModelError::Fetch("empty body".to_string()));
        }
        if resp.body.len() > MAX_DOCUMENT_BYTES {
            return Err(ModelError::Size { bytes: resp.body.len() });
        }
        Ok(resp.body)
    }

    /// One generation round trip. Returns the findings on success; otherwise
    /// records why in `state` and `log`.
    async fn attempt(
        &self,
        label: &str,
        api_key: &str,
        request: &GenerateRequest<'_>,
        state: &mut CallState,
        log: &mut AttemptLog,
    ) -> Option<Vec<Value>> {
        let outcome = match self.transport.generate(&self.config.endpoint(), api_key, request).await {
            Ok(resp) => self.read_response(label, resp, state, log),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(found) => found,
            Err(err) => {
                debug!(attempt = label, error = %err, "model attempt failed");
                log.record(AttemptTrace::failed(label, err.to_string()));
                state.last_error = Some(err);
                None
            }
        }
    }

    fn read_response(
        &self,
        label: &str,
        resp: HttpResponse,
        state: &mut CallState,
        log: &mut AttemptLog,
    ) -> Result<Option<Vec<Value>>, ModelError> {
        let raw = String::from_utf8_lossy(&resp.body);
        match resp.status {
            429 => return Err(ModelError::RateLimit),
            s if s >= 500 => return Err(ModelError::Server(s)),
            s if !resp.is_success() => {
                let snippet = clip(&strip_markup(&raw), HTTP_SNIPPET_CHARS);
                return Err(ModelError::Http { status: s, snippet });
            }
            _ => {}
        }

        let envelope: Value = match serde_json::from_str(&raw) {
            Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
            _ => return Err(ModelError::InvalidEnvelope),
        };
        let text = candidate_text(&envelope);
        if !text.is_empty() {
            state.last_text = text.clone();
        }

        let found = parse_findings(&text);
        let status = if found.is_some() {
            AttemptStatus::Ok
        } else {
            AttemptStatus::InvalidJson
        };
        debug!(attempt = label, code = resp.status, ?status, "model attempt answered");
        log.record(AttemptTrace {
            attempt: label.to_string(),
            status,
            response_code: Some(resp.status),
            output_excerpt: clip(&text, OUTPUT_EXCERPT_CHARS),
            raw_excerpt: clip(&raw, RAW_EXCERPT_CHARS),
            error: None,
            at: Utc::now(),
        });
        if found.is_none() {
            state.last_error = Some(ModelError::Parse);
        }
        Ok(found)
    }
}

/// First textual part of the first candidate, trimmed.
fn candidate_text(envelope: &Value) -> String {
    envelope
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.iter().find_map(|p| p.get("text").and_then(Value::as_str)))
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl ComplianceModel for GeminiClient {
    async fn evaluate(
        &self,
        framework: &str,
        document_url: &str,
        rules: &[Rule],
        log: &mut AttemptLog,
    ) -> Result<Vec<Value>, ModelError> {
        log.reset();

        let api_key = self.config.api_key().ok_or(ModelError::Config)?;
        if rules.is_empty() {
            return Err(ModelError::Input);
        }

        let document = self.fetch_document(document_url).await?;
        let encoded = STANDARD.encode(&document);
        drop(document);
        info!(url = %document_url, rules = rules.len(), "evaluating document");

        let mut state = CallState::default();

        let primary = GenerateRequest::with_document(&encoded, build_prompt(framework, rules, false), self.config.primary());
        if let Some(found) = self.attempt(ATTEMPT_PRIMARY, api_key, &primary, &mut state, log).await {
            return Ok(found);
        }

        let strict = GenerateRequest::with_document(&encoded, build_prompt(framework, rules, true), self.config.strict());
        if let Some(found) = self.attempt(ATTEMPT_STRICT, api_key, &strict, &mut state, log).await {
            return Ok(found);
        }

        if !state.last_text.is_empty() {
            let previous = clip(&state.last_text, REPAIR_INPUT_CHARS);
            let repair = GenerateRequest::text_only(build_repair_prompt(rules, &previous), self.config.repair());
            if let Some(found) = self.attempt(ATTEMPT_REPAIR, api_key, &repair, &mut state, log).await {
                return Ok(found);
            }
        }

        Err(state.last_error.unwrap_or(ModelError::Parse))
    }
}
