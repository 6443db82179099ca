use anyhow::Result;
use querycraft_types::CriterionResult;
use regex::Regex;

use crate::evaluator::CriterionRule;

/// "Returns exactly N": the digits of N must appear verbatim in the answer.
///
/// Plain substring test, so "17" satisfies "Returns exactly 7".
pub struct ReturnsExactlyRule {
	pattern: Regex,
}

impl ReturnsExactlyRule {
	pub fn new() -> Result<Self> {
		Ok(Self {
			pattern: Regex::new(r"Returns exactly (\d+)")?,
		})
	}
}

impl CriterionRule for ReturnsExactlyRule {
	fn name(&self) -> &'static str {
		"returns_exactly"
	}

	fn grade(&self, criterion: &str, answer: &str) -> Option<CriterionResult> {
		let expected = self.pattern.captures(criterion)?.get(1)?.as_str();
		if answer.contains(expected) {
			Some(CriterionResult::pass(criterion))
		} else {
			Some(CriterionResult::fail(criterion, format!("Expected {expected} not found")))
		}
	}
}
