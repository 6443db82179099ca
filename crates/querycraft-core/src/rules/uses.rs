use anyhow::Result;
use querycraft_types::CriterionResult;
use regex::Regex;

use crate::evaluator::CriterionRule;

/// "… uses <word> …": the first word after "uses" must appear in the answer.
/// Matching is case-insensitive on both sides.
pub struct UsesRule {
    pattern: Regex,
}

impl UsesRule {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"(?i)\buses\s+(\S+)")?,
        })
    }
}

impl CriterionRule for UsesRule {
    fn name(&self) -> &'static str {
        "uses"
    }

    fn grade(&self, criterion: &str, answer: &str) -> Option<CriterionResult> {
        let required = self.pattern.captures(criterion)?.get(1)?.as_str().to_lowercase();
        if answer.to_lowercase().contains(&required) {
            Some(CriterionResult::pass(criterion))
        } else {
            Some(CriterionResult::fail(criterion, format!("Missing: {required}")))
        }
    }
}
