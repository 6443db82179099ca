use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use querycraft_types::CriterionResult;

use crate::rules::{DoesNotRule, ReturnsExactlyRule, UsesRule};

/// Grades a final answer against a case's pass criteria.
///
/// Implementations return one result per criterion, in the same order.
#[async_trait]
pub trait CriteriaEvaluator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(&self, answer: &str, criteria: &[String]) -> Result<Vec<CriterionResult>>;
}

/// One textual grading heuristic.
///
/// `grade` returns `None` when the rule does not recognise the criterion, so
/// the next rule gets a chance.
pub trait CriterionRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn grade(&self, criterion: &str, answer: &str) -> Option<CriterionResult>;
}

/// First-match-wins chain of [`CriterionRule`]s. Criteria no rule recognises
/// need manual review.
///
/// These are string heuristics, not a semantic grader: "Returns exactly 7"
/// is satisfied by an answer mentioning "17".
pub struct RuleEvaluator {
    rules: Vec<Arc<dyn CriterionRule>>,
}

impl RuleEvaluator {
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn CriterionRule>>,
    {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// The stock rule order: "Returns exactly N", then "Does NOT …", then "uses …".
    pub fn standard() -> Result<Self> {
        let rules: Vec<Arc<dyn CriterionRule>> = vec![
            Arc::new(ReturnsExactlyRule::new()?),
            Arc::new(DoesNotRule),
            Arc::new(UsesRule::new()?),
        ];
        Ok(Self::new(rules))
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn grade(&self, criterion: &str, answer: &str) -> CriterionResult {
        self.rules
            .iter()
            .find_map(|rule| rule.grade(criterion, answer))
            .unwrap_or_else(|| CriterionResult::review(criterion))
    }
}

#[async_trait]
impl CriteriaEvaluator for RuleEvaluator {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn evaluate(&self, answer: &str, criteria: &[String]) -> Result<Vec<CriterionResult>> {
        Ok(criteria.iter().map(|c| self.grade(c, answer)).collect())
    }
}
