//! Static, versioned rule catalog.
//!
//! Every lookup resolves to a non-empty rule list; unknown framework keys
//! fall back to the default set. Rule order is the canonical order used by
//! the normalizer.

use crate::Rule;

pub const DEFAULT_FRAMEWORK: &str = "indas";

#[derive(Clone, Copy, Debug)]
pub struct Framework {
    pub key: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    rules: &'static [(&'static str, &'static str, &'static str)],
}

impl Framework {
    pub fn rules(&self) -> Vec<Rule> {
        self.rules
            .iter()
            .map(|(code, title, requirement)| Rule::new(code, title, requirement))
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

const INDAS_RULES: &[(&str, &str, &str)] = &[
    (
        "INDAS-01-001",
        "Complete set of financial statements",
        "Balance Sheet, P&L, Cash Flow, Statement of Changes in Equity, and Notes are presented.",
    ),
    (
        "INDAS-01-002",
        "Current versus non-current classification",
        "Assets and liabilities are classified as current/non-current or liquidity presentation is explained.",
    ),
    (
        "INDAS-01-003",
        "Material accounting policies disclosed",
        "Material accounting policy information is disclosed in notes.",
    ),
    (
        "INDAS-01-004",
        "Comparative information presented",
        "Comparative figures for prior period are disclosed for all primary statements.",
    ),
    (
        "INDAS-01-005",
        "Going concern basis",
        "Financial statements state going concern basis or disclose uncertainty.",
    ),
    (
        "INDAS-07-001",
        "Cash flow statement present",
        "Cash flow statement is included for the period.",
    ),
    (
        "INDAS-07-002",
        "Operating investing financing sections",
        "Cash flows are classified under operating, investing, and financing activities.",
    ),
    (
        "INDAS-08-001",
        "Changes in accounting policies disclosed",
        "Nature and effect of accounting policy changes are disclosed.",
    ),
    (
        "INDAS-10-001",
        "Events after reporting period",
        "Material adjusting/non-adjusting events after reporting period are disclosed.",
    ),
    (
        "INDAS-12-001",
        "Current and deferred tax disclosures",
        "Current tax and deferred tax amounts and basis are disclosed.",
    ),
    (
        "INDAS-16-001",
        "Property plant equipment reconciliation",
        "Opening to closing carrying amount reconciliation for PPE is disclosed.",
    ),
    (
        "INDAS-24-001",
        "Related party disclosures",
        "Related parties and material transactions/balances are disclosed.",
    ),
    (
        "INDAS-33-001",
        "EPS disclosure",
        "Basic and diluted earnings per share are disclosed when applicable.",
    ),
    (
        "INDAS-36-001",
        "Impairment assessment disclosure",
        "Indicators or impairment testing and outcomes are disclosed where required.",
    ),
    (
        "INDAS-37-001",
        "Provisions and contingencies",
        "Nature, timing, and uncertainty of material provisions/contingent liabilities are disclosed.",
    ),
];

const FRAMEWORKS: &[Framework] = &[Framework {
    key: DEFAULT_FRAMEWORK,
    name: "Indian Accounting Standards (Ind AS) disclosure checklist",
    version: "2024.1",
    rules: INDAS_RULES,
}];

pub fn frameworks() -> &'static [Framework] {
    FRAMEWORKS
}

/// Resolve a framework key (case-insensitive, trimmed). `default`, blank and
/// unknown keys resolve to the default framework.
pub fn resolve_framework(framework_key: &str) -> &'static Framework {
    let key = framework_key.trim().to_ascii_lowercase();
    FRAMEWORKS
        .iter()
        .find(|f| f.key == key)
        .unwrap_or(&FRAMEWORKS[0])
}

pub fn get_rules(framework_key: &str) -> Vec<Rule> {
    resolve_framework(framework_key).rules()
}
