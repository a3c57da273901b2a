//! Maps raw model output onto the exact rule set that was requested.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::{strip_markup, truncate_chars, Evidence, Finding, FindingStatus, Rule};

pub const MAX_SNIPPET_CHARS: usize = 800;
pub const NO_REASON: &str = "No reason provided.";
pub const NOT_ENOUGH_EVIDENCE: &str = "Not enough evidence in the document excerpt.";

/// Normalize `raw` findings against `rules`.
///
/// The result always has exactly one finding per rule, in rule order. Raw
/// entries with empty or unrequested codes are dropped, the first entry per
/// code wins, and rules nobody answered become `unknown`.
pub fn normalize(rules: &[Rule], raw: &[Value]) -> Vec<Finding> {
    let mut picked: HashMap<String, Finding> = HashMap::new();
    let allowed: HashSet<String> = rules
        .iter()
        .map(|r| clean_code(&r.rule_code))
        .filter(|code| !code.is_empty())
        .collect();

    for entry in raw {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let code = obj.get("rule_code").map(scalar_text).unwrap_or_default();
        let code = clean_code(&code);
        if code.is_empty() || !allowed.contains(&code) || picked.contains_key(&code) {
            continue;
        }

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .map(FindingStatus::coerce)
            .unwrap_or(FindingStatus::Unknown);

        let mut reason = obj
            .get("reason")
            .map(|v| strip_markup(&scalar_text(v)))
            .unwrap_or_default();
        if reason.is_empty() {
            reason = NO_REASON.to_string();
        }

        let evidence = obj
            .get("evidence")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(evidence_entry).collect())
            .unwrap_or_default();

        picked.insert(
            code.clone(),
            Finding {
                rule_code: code,
                status,
                reason,
                evidence,
            },
        );
    }

    rules
        .iter()
        .map(|rule| {
            let code = clean_code(&rule.rule_code);
            picked
                .remove(&code)
                .unwrap_or_else(|| unknown_finding(&code, NOT_ENOUGH_EVIDENCE))
        })
        .collect()
}

/// `unknown` findings for every rule, used when a batch could not be evaluated.
pub fn unknown_findings(rules: &[Rule], reason: &str) -> Vec<Finding> {
    rules
        .iter()
        .map(|r| clean_code(&r.rule_code))
        .filter(|code| !code.is_empty())
        .map(|code| unknown_finding(&code, reason))
        .collect()
}

fn unknown_finding(code: &str, reason: &str) -> Finding {
    Finding {
        rule_code: code.to_string(),
        status: FindingStatus::Unknown,
        reason: reason.to_string(),
        evidence: vec![],
    }
}

fn clean_code(code: &str) -> String {
    strip_markup(code).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// String and number values as text; everything else is empty.
fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn evidence_entry(v: &Value) -> Option<Evidence> {
    let obj = v.as_object()?;
    let snippet = obj
        .get("snippet")
        .map(|s| strip_markup(&scalar_text(s)))
        .unwrap_or_default();
    if snippet.is_empty() {
        return None;
    }
    Some(Evidence {
        page: obj.get("page").and_then(page_number),
        snippet: truncate_chars(&snippet, MAX_SNIPPET_CHARS),
    })
}

fn page_number(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> Vec<Rule> {
        vec![
            Rule::new("R-1", "one", "first"),
            Rule::new("R-2", "two", "second"),
            Rule::new("R-3", "three", "third"),
        ]
    }

    #[test]
    fn empty_output_yields_one_unknown_per_rule() {
        let out = normalize(&rules(), &[]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|f| f.status == FindingStatus::Unknown));
        assert!(out.iter().all(|f| f.reason == NOT_ENOUGH_EVIDENCE));
        assert_eq!(out[2].rule_code, "R-3");
    }

    #[test]
    fn output_follows_rule_order_not_model_order() {
        let raw = vec![
            json!({"rule_code": "R-3", "status": "fail", "reason": "missing"}),
            json!({"rule_code": "R-1", "status": "pass", "reason": "present"}),
        ];
        let out = normalize(&rules(), &raw);
        let codes: Vec<_> = out.iter().map(|f| f.rule_code.as_str()).collect();
        assert_eq!(codes, ["R-1", "R-2", "R-3"]);
        assert_eq!(out[0].status, FindingStatus::Pass);
        assert_eq!(out[1].status, FindingStatus::Unknown);
        assert_eq!(out[2].status, FindingStatus::Fail);
    }

    #[test]
    fn first_occurrence_wins_and_strangers_are_dropped() {
        let raw = vec![
            json!({"rule_code": "R-1", "status": "fail", "reason": "first"}),
            json!({"rule_code": "R-1", "status": "pass", "reason": "second"}),
            json!({"rule_code": "X-9", "status": "pass", "reason": "invented"}),
            json!({"rule_code": "", "status": "pass"}),
            json!("not an object"),
            json!(42),
        ];
        let out = normalize(&rules(), &raw);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].reason, "first");
        assert_eq!(out[0].status, FindingStatus::Fail);
        assert!(out.iter().all(|f| f.rule_code != "X-9"));
    }

    #[test]
    fn status_reason_and_evidence_are_cleaned() {
        let long = "x".repeat(MAX_SNIPPET_CHARS + 50);
        let raw = vec![json!({
            "rule_code": " R-2 ",
            "status": " WARN ",
            "reason": "<p> </p>",
            "evidence": [
                {"page": "7", "snippet": "<i>Note 4</i> going concern"},
                {"page": "n/a", "snippet": long},
                {"page": 3, "snippet": "   "},
                {"page": 2.0, "snippet": "float page"},
                "garbage"
            ]
        })];
        let out = normalize(&rules(), &raw);
        let f = &out[1];
        assert_eq!(f.status, FindingStatus::Unknown);
        assert_eq!(f.reason, NO_REASON);
        assert_eq!(f.evidence.len(), 3);
        assert_eq!(f.evidence[0], Evidence { page: Some(7), snippet: "Note 4 going concern".into() });
        assert_eq!(f.evidence[1].page, None);
        assert_eq!(f.evidence[1].snippet.chars().count(), MAX_SNIPPET_CHARS);
        assert_eq!(f.evidence[2].page, Some(2));
    }

    #[test]
    fn numeric_codes_and_missing_status_are_tolerated() {
        let rules = vec![Rule::new("101", "numeric", "numeric code")];
        let out = normalize(&rules, &[json!({"rule_code": 101, "reason": "ok"})]);
        assert_eq!(out[0].rule_code, "101");
        assert_eq!(out[0].status, FindingStatus::Unknown);
        assert_eq!(out[0].reason, "ok");
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let raw = vec![
            json!({"rule_code": "R-1", "status": "Pass", "reason": "<b>ok</b>", "evidence": [{"page": "1", "snippet": "s"}]}),
            json!({"rule_code": "R-2", "status": "warn"}),
        ];
        let once = normalize(&rules(), &raw);
        let as_values: Vec<Value> = once.iter().map(|f| serde_json::to_value(f).unwrap()).collect();
        let twice = normalize(&rules(), &as_values);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_findings_cover_the_batch() {
        let out = unknown_findings(&rules(), "could not evaluate");
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|f| f.status == FindingStatus::Unknown && f.evidence.is_empty()));
        assert_eq!(normalize(&rules(), &out.iter().map(|f| serde_json::to_value(f).unwrap()).collect::<Vec<_>>()), out);
    }
}
