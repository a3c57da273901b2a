use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docaudit_core::{AttemptLog, AttemptStatus, Rule};
use docaudit_model::{
    ComplianceModel, GeminiClient, GenerateRequest, HttpResponse, HttpTransport, ModelConfig, ModelError,
    MAX_DOCUMENT_BYTES,
};
use serde_json::{json, Value};

/// Serves one document and replays canned generation responses in order.
struct ScriptedTransport {
    document: HttpResponse,
    replies: Mutex<VecDeque<Result<HttpResponse, ModelError>>>,
    requests: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    fn new(document: HttpResponse, replies: Vec<Result<HttpResponse, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            document,
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(vec![]),
        })
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn fetch(&self, _url: &str, _max_bytes: usize) -> Result<HttpResponse, ModelError> {
        Ok(self.document.clone())
    }

    async fn generate(
        &self,
        _endpoint: &str,
        api_key: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<HttpResponse, ModelError> {
        assert_eq!(api_key, "test-key");
        self.requests.lock().unwrap().push(serde_json::to_value(request).unwrap());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".into())))
    }
}

fn pdf() -> HttpResponse {
    HttpResponse { status: 200, body: b"%PDF-1.7 fake".to_vec() }
}

fn answer(text: &str) -> Result<HttpResponse, ModelError> {
    let envelope = json!({"candidates": [{"content": {"parts": [{"text": text}]}}]});
    Ok(HttpResponse { status: 200, body: envelope.to_string().into_bytes() })
}

fn status(code: u16, body: &str) -> Result<HttpResponse, ModelError> {
    Ok(HttpResponse { status: code, body: body.as_bytes().to_vec() })
}

fn rules() -> Vec<Rule> {
    vec![
        Rule::new("INDAS-01-001", "Compliance statement", "State compliance with Ind AS."),
        Rule::new("INDAS-07-001", "Cash flows", "Present a statement of cash flows."),
    ]
}

fn config() -> ModelConfig {
    ModelConfig { api_key: Some("test-key".into()), ..Default::default() }
}

fn client(transport: Arc<ScriptedTransport>) -> GeminiClient {
    GeminiClient::with_transport(config(), transport)
}

#[tokio::test]
async fn primary_success_short_circuits() {
    let t = ScriptedTransport::new(pdf(), vec![answer(r#"[{"rule_code":"INDAS-01-001","status":"pass"}]"#)]);
    let mut log = AttemptLog::new();
    let found = client(t.clone()).evaluate("indas", "https://x/doc.pdf", &rules(), &mut log).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(log.len(), 1);
    assert_eq!(log.to_vec()[0].status, AttemptStatus::Ok);
    assert_eq!(log.to_vec()[0].attempt, "attempt_1_primary");

    let reqs = t.requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0]["contents"][0]["parts"][0]["inlineData"]["data"], "JVBERi0xLjcgZmFrZQ==");
    assert_eq!(reqs[0]["generationConfig"]["maxOutputTokens"], 2048);
}

#[tokio::test]
async fn strict_attempt_recovers_from_prose() {
    let t = ScriptedTransport::new(
        pdf(),
        vec![answer("Sure! Everything looks compliant."), answer(r#"{"findings": []}"#)],
    );
    let mut log = AttemptLog::new();
    let found = client(t.clone()).evaluate("indas", "u", &rules(), &mut log).await.unwrap();

    assert!(found.is_empty());
    let trace = log.to_vec();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].status, AttemptStatus::InvalidJson);
    assert_eq!(trace[1].attempt, "attempt_2_strict");
    let strict_prompt = t.requests()[1]["contents"][0]["parts"][1]["text"].as_str().unwrap().to_string();
    assert!(strict_prompt.contains("STRICT MODE"));
}

#[tokio::test]
async fn repair_attempt_is_text_only_and_sees_last_output() {
    let t = ScriptedTransport::new(
        pdf(),
        vec![
            answer("INDAS-01-001 passes"),
            answer("INDAS-01-001: pass, INDAS-07-001: fail"),
            answer(r#"[{"rule_code":"INDAS-01-001","status":"pass"},{"rule_code":"INDAS-07-001","status":"fail"}]"#),
        ],
    );
    let mut log = AttemptLog::new();
    let found = client(t.clone()).evaluate("indas", "u", &rules(), &mut log).await.unwrap();

    assert_eq!(found.len(), 2);
    let reqs = t.requests();
    assert_eq!(reqs.len(), 3);
    let parts = reqs[2]["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert!(parts[0]["text"].as_str().unwrap().ends_with("INDAS-01-001: pass, INDAS-07-001: fail"));
    assert_eq!(reqs[2]["generationConfig"]["temperature"], 0.0);
}

#[tokio::test]
async fn three_attempt_exhaustion_fails_with_parse_error() {
    let t = ScriptedTransport::new(pdf(), vec![answer("nope"), answer("still nope"), answer("not json either")]);
    let mut log = AttemptLog::new();
    let err = client(t).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();

    assert_eq!(err, ModelError::Parse);
    assert_eq!(err.to_string(), "model did not return valid JSON");
    let trace = log.to_vec();
    assert_eq!(trace.len(), 3);
    assert!(trace
        .iter()
        .all(|e| matches!(e.status, AttemptStatus::InvalidJson | AttemptStatus::Error)));
}

#[tokio::test]
async fn repair_is_skipped_without_any_text() {
    let t = ScriptedTransport::new(pdf(), vec![status(503, "unavailable"), status(429, "slow down")]);
    let mut log = AttemptLog::new();
    let err = client(t.clone()).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();

    assert_eq!(err, ModelError::RateLimit);
    assert_eq!(t.requests().len(), 2);
    let trace = log.to_vec();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].error.as_deref(), Some("model server error (503)"));
    assert_eq!(trace[1].status, AttemptStatus::Error);
}

#[tokio::test]
async fn http_error_snippet_is_stripped_of_markup() {
    let t = ScriptedTransport::new(
        pdf(),
        vec![status(400, "<html><body><h1>Bad   request</h1></body></html>"), status(400, "")],
    );
    let mut log = AttemptLog::new();
    let err = client(t).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();

    assert_eq!(err.to_string(), "model HTTP error 400.");
    assert_eq!(log.to_vec()[0].error.as_deref(), Some("model HTTP error 400: Bad request"));
}

#[tokio::test]
async fn non_json_envelope_is_an_attempt_error() {
    let t = ScriptedTransport::new(pdf(), vec![status(200, "<html>proxy</html>"), answer("[]")]);
    let mut log = AttemptLog::new();
    let found = client(t).evaluate("indas", "u", &rules(), &mut log).await.unwrap();

    assert!(found.is_empty());
    let trace = log.to_vec();
    assert_eq!(trace[0].status, AttemptStatus::Error);
    assert_eq!(trace[0].error.as_deref(), Some("model response was not valid JSON"));
}

#[tokio::test]
async fn oversize_document_never_reaches_generation() {
    let big = HttpResponse { status: 200, body: vec![b'x'; MAX_DOCUMENT_BYTES + 1] };
    let t = ScriptedTransport::new(big, vec![answer("[]")]);
    let mut log = AttemptLog::new();
    let err = client(t.clone()).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();

    assert_eq!(err, ModelError::Size { bytes: MAX_DOCUMENT_BYTES + 1 });
    assert!(t.requests().is_empty());
    assert!(log.is_empty());
}

#[tokio::test]
async fn document_at_the_ceiling_is_accepted() {
    let exact = HttpResponse { status: 200, body: vec![b'x'; MAX_DOCUMENT_BYTES] };
    let t = ScriptedTransport::new(exact, vec![answer("[]")]);
    let mut log = AttemptLog::new();
    assert!(client(t).evaluate("indas", "u", &rules(), &mut log).await.is_ok());
}

#[tokio::test]
async fn fetch_failures_are_reported() {
    let not_found = ScriptedTransport::new(HttpResponse { status: 404, body: b"missing".to_vec() }, vec![]);
    let mut log = AttemptLog::new();
    let err = client(not_found).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();
    assert_eq!(err, ModelError::Fetch("HTTP 404".into()));

    let empty = ScriptedTransport::new(HttpResponse { status: 200, body: vec![] }, vec![]);
    let err = client(empty).evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();
    assert_eq!(err, ModelError::Fetch("empty body".into()));
}

#[tokio::test]
async fn missing_key_and_empty_rules_fail_fast() {
    let t = ScriptedTransport::new(pdf(), vec![]);
    let mut log = AttemptLog::new();

    let keyless = GeminiClient::with_transport(ModelConfig::default(), t.clone());
    let err = keyless.evaluate("indas", "u", &rules(), &mut log).await.unwrap_err();
    assert_eq!(err, ModelError::Config);

    let err = client(t.clone()).evaluate("indas", "u", &[], &mut log).await.unwrap_err();
    assert_eq!(err, ModelError::Input);
    assert!(t.requests().is_empty());
}

#[tokio::test]
async fn log_is_reset_between_calls() {
    let t = ScriptedTransport::new(pdf(), vec![answer("x"), answer("[]"), answer("[]")]);
    let c = client(t);
    let mut log = AttemptLog::new();
    c.evaluate("indas", "u", &rules(), &mut log).await.unwrap();
    assert_eq!(log.len(), 2);
    c.evaluate("indas", "u", &rules(), &mut log).await.unwrap();
    assert_eq!(log.len(), 1);
}
