//! Model client: fetches a document, asks the generation endpoint for a
//! findings array and tolerates the ways model output goes wrong.

mod client;
mod config;
mod error;
mod parse;
mod prompt;
mod transport;

pub use client::{ComplianceModel, GeminiClient, MAX_DOCUMENT_BYTES};
pub use config::{AttemptBudget, ModelConfig};
pub use error::ModelError;
pub use parse::parse_findings;
pub use prompt::{build_prompt, build_repair_prompt, GenerateRequest};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
