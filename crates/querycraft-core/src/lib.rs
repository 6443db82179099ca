//! querycraft-core: eval harness for data-analysis agents.
//! Load a catalog, run each question through the agent subprocess while
//! streaming its progress, grade the final answer, and write a report.
//! See `examples/grade_answer.rs` for grading without an agent.

pub mod agent;
pub mod catalog;
pub mod config;
pub mod console;
pub mod evaluator;
pub mod prompt;
pub mod render;
pub mod report;
pub mod runner;
pub mod stream;
pub mod testing;

pub mod rules {
    mod does_not;
    mod returns_exactly;
    mod uses;

    pub use does_not::DoesNotRule;
    pub use returns_exactly::ReturnsExactlyRule;
    pub use uses::UsesRule;
}

pub use agent::{Agent, AgentOutcome, AgentProcess, InvocationError, ProcessAgent, ToolPolicy};
pub use catalog::{CaseFilter, CatalogError};
pub use config::{AgentConfig, ConfigError, HarnessConfig};
pub use evaluator::{CriteriaEvaluator, CriterionRule, RuleEvaluator};
pub use prompt::build_prompt;
pub use render::{EventObserver, NullObserver, ProgressRenderer};
pub use report::{Report, ReportError, ReportWriter};
pub use runner::{CaseState, RunOutcome, Runner, RunnerBuilder};
pub use stream::{AssistantBlock, EventStream, StreamEvent, ToolResult};
pub use querycraft_types::{
    CriterionResult, DatabaseSchema, Difficulty, EvalCase, EvalResult, EvalSet, RunSummary,
    Scoring, TableSchema, TierSummary, Verdict,
};
