use querycraft_types::CriterionResult;

use crate::evaluator::CriterionRule;

const PREFIX: &str = "Does NOT";

/// "Does NOT <word> …": the first word after the phrase must not occur in the
/// answer (case-insensitive).
pub struct DoesNotRule;

impl CriterionRule for DoesNotRule {
    fn name(&self) -> &'static str {
        "does_not"
    }

    fn grade(&self, criterion: &str, answer: &str) -> Option<CriterionResult> {
        let rest = criterion.strip_prefix(PREFIX)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let forbidden = rest
            .split_whitespace()
            .next()?
            .to_lowercase();

        if answer.to_lowercase().contains(&forbidden) {
            Some(CriterionResult::fail(criterion, format!("Found forbidden: {forbidden}")))
        } else {
            Some(CriterionResult::pass(criterion))
        }
    }
}
