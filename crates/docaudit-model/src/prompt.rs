use docaudit_core::Rule;
use serde::Serialize;

use crate::config::AttemptBudget;

const FALLBACK_SCHEMA_CODE: &str = "INDAS-01-001";

fn rules_json(rules: &[Rule]) -> String {
    serde_json::to_string(rules).unwrap_or_else(|_| "[]".to_string())
}

/// Document prompt for the primary and strict attempts.
pub fn build_prompt(framework: &str, rules: &[Rule], strict: bool) -> String {
    let schema_code = rules
        .first()
        .map(|r| r.rule_code.as_str())
        .unwrap_or(FALLBACK_SCHEMA_CODE);
    let strict_line = if strict {
        "STRICT MODE: Output ONLY JSON array text. NO markdown. NO notes. NO extra text.\n"
    } else {
        ""
    };
    let count = rules.len();

    format!(
        "You are a compliance assistant.\n\
         Framework: {framework}\n\n\
         Return ONLY a valid JSON array.\n\
         {strict_line}\
         Schema (exact keys):\n\
         [\n  {{\"rule_code\":\"{schema_code}\",\"status\":\"pass|fail|unknown\",\"reason\":\"...\",\"evidence\":[{{\"page\":1,\"snippet\":\"...\"}}]}}\n]\n\
         Rules:\n\
         - Provide exactly {count} items.\n\
         - Every rule_code from Rules JSON must appear exactly once.\n\
         - Use ONLY provided rule_code values from Rules JSON. Do not invent new codes.\n\
         - status must be one of pass, fail, unknown.\n\
         - evidence must be an array (can be empty).\n\n\
         Rules JSON:\n{}\n",
        rules_json(rules)
    )
}

/// Text-only prompt asking the model to turn its previous answer into JSON.
/// `previous_output` is expected to be clipped already.
pub fn build_repair_prompt(rules: &[Rule], previous_output: &str) -> String {
    format!(
        "Convert the text below into a valid JSON array only.\n\
         Do not include markdown or any explanation.\n\
         Use only these rule codes from Rules JSON.\n\n\
         Rules JSON:\n{}\n\n\
         Text to repair:\n{previous_output}",
        rules_json(rules)
    )
}

/// Body of one `generateContent` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub contents: Vec<Content<'a>>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub role: &'static str,
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part<'a> {
    #[serde(rename_all = "camelCase")]
    InlineData { mime_type: &'static str, data: &'a str },
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub response_mime_type: &'static str,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    fn json(budget: AttemptBudget) -> Self {
        Self {
            temperature: budget.temperature,
            response_mime_type: "application/json",
            max_output_tokens: budget.max_output_tokens,
        }
    }
}

impl<'a> GenerateRequest<'a> {
    /// Inline PDF part followed by the prompt. `encoded_pdf` is borrowed so one
    /// base64 encoding serves every attempt.
    pub fn with_document(encoded_pdf: &'a str, prompt: String, budget: AttemptBudget) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::InlineData { mime_type: "application/pdf", data: encoded_pdf },
                    Part::Text(prompt),
                ],
            }],
            generation_config: GenerationConfig::json(budget),
        }
    }

    pub fn text_only(prompt: String, budget: AttemptBudget) -> Self {
        Self {
            contents: vec![Content { role: "user", parts: vec![Part::Text(prompt)] }],
            generation_config: GenerationConfig::json(budget),
        }
    }
}
