use serde::{Deserialize, Serialize};

/// Sampling temperature and output ceiling for one attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttemptBudget {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// `[model]` section of `docaudit.toml`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub fetch_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub primary_max_tokens: u32,
    pub strict_max_tokens: u32,
    pub repair_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-3-flash-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            fetch_timeout_secs: 60,
            generate_timeout_secs: 180,
            primary_max_tokens: 2048,
            strict_max_tokens: 1400,
            repair_max_tokens: 1400,
        }
    }
}

impl ModelConfig {
    /// Trimmed key, `None` when absent or blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model.trim()
        )
    }

    pub fn primary(&self) -> AttemptBudget {
        AttemptBudget { temperature: 0.2, max_output_tokens: self.primary_max_tokens }
    }

    pub fn strict(&self) -> AttemptBudget {
        AttemptBudget { temperature: 0.1, max_output_tokens: self.strict_max_tokens }
    }

    pub fn repair(&self) -> AttemptBudget {
        AttemptBudget { temperature: 0.0, max_output_tokens: self.repair_max_tokens }
    }
}
