use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use querycraft_types::{CriterionResult, DatabaseSchema, EvalCase, EvalResult, EvalSet, RunSummary, Verdict};

use crate::agent::Agent;
use crate::console;
use crate::evaluator::{CriteriaEvaluator, RuleEvaluator};
use crate::prompt::build_prompt;
use crate::render::{EventObserver, ProgressRenderer};
use crate::stream::StreamEvent;

/// Lifecycle of one case. Every case ends in `Recorded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
	Pending,
	Invoking,
	Streaming,
	Grading,
	Recorded,
}

impl fmt::Display for CaseState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CaseState::Pending => "pending",
			CaseState::Invoking => "invoking",
			CaseState::Streaming => "streaming",
			CaseState::Grading => "grading",
			CaseState::Recorded => "recorded",
		};
		f.write_str(s)
	}
}

struct CaseTracker<'a> {
	case_id: &'a str,
	state: CaseState,
}

impl<'a> CaseTracker<'a> {
	fn new(case_id: &'a str) -> Self {
		Self { case_id, state: CaseState::Pending }
	}

	fn advance(&mut self, next: CaseState) {
		tracing::debug!(case_id = self.case_id, from = %self.state, to = %next, "case state");
		self.state = next;
	}
}

/// Forwards events to the renderer and notes when the agent starts talking.
struct StreamingObserver<'a, 'id, O> {
	tracker: &'a mut CaseTracker<'id>,
	inner: O,
}

impl<O: EventObserver> EventObserver for StreamingObserver<'_, '_, O> {
	fn on_event(&mut self, event: &StreamEvent) {
		if self.tracker.state == CaseState::Invoking {
			self.tracker.advance(CaseState::Streaming);
		}
		self.inner.on_event(event);
	}
}

pub struct RunnerBuilder {
	agent: Option<Arc<dyn Agent>>,
	evaluator: Option<Arc<dyn CriteriaEvaluator>>,
	database: DatabaseSchema,
	output_cap: usize,
	verbose: bool,
}

impl RunnerBuilder {
	pub fn new() -> Self {
		Self {
			agent: None,
			evaluator: None,
			database: DatabaseSchema::default(),
			output_cap: 3000,
			verbose: false,
		}
	}

	pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
		self.agent = Some(agent);
		self
	}

	pub fn evaluator(mut self, evaluator: Arc<dyn CriteriaEvaluator>) -> Self {
		self.evaluator = Some(evaluator);
		self
	}

	/// Database described in prompts when the eval set does not name its own.
	pub fn database(mut self, database: DatabaseSchema) -> Self {
		self.database = database;
		self
	}

	pub fn output_cap(mut self, cap: usize) -> Self {
		self.output_cap = cap;
		self
	}

	pub fn verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	pub fn build(self) -> Result<Runner> {
		let evaluator = match self.evaluator {
			Some(evaluator) => evaluator,
			None => Arc::new(RuleEvaluator::standard()?),
		};
		Ok(Runner {
			agent: self.agent.ok_or_else(|| anyhow::anyhow!("agent must be set"))?,
			evaluator,
			database: self.database,
			output_cap: self.output_cap,
			verbose: self.verbose,
		})
	}
}

impl Default for RunnerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
	pub results: Vec<EvalResult>,
	pub summary: RunSummary,
}

/// Drives cases one at a time: invoke, stream, grade, record.
pub struct Runner {
	agent: Arc<dyn Agent>,
	evaluator: Arc<dyn CriteriaEvaluator>,
	database: DatabaseSchema,
	output_cap: usize,
	verbose: bool,
}

impl Runner {
	pub fn builder() -> RunnerBuilder {
		RunnerBuilder::new()
	}

	pub async fn run(&self, set: &EvalSet, cases: &[&EvalCase], out: &mut (dyn Write + Send)) -> RunOutcome {
		console::print_header(out, &set.name, cases.len());
		let database = set.database.as_ref().unwrap_or(&self.database);

		let mut results = Vec::with_capacity(cases.len());
		for case in cases {
			console::print_case_banner(out, case);
			let result = self.run_case(case, database, out).await;
			console::print_case_status(out, &result, self.verbose);
			results.push(result);
		}

		let summary = RunSummary::summarize(&results, &set.scoring);
		tracing::info!(
			passed = summary.passed,
			failed = summary.failed,
			review = summary.review,
			total = summary.total,
			"run finished"
		);
		RunOutcome { results, summary }
	}

	/// Runs one case to completion. Agent failures become a failing result.
	pub async fn run_case(&self, case: &EvalCase, database: &DatabaseSchema, out: &mut (dyn Write + Send)) -> EvalResult {
		let mut tracker = CaseTracker::new(&case.id);
		let prompt = build_prompt(database, &case.input);
		let started = Instant::now();

		tracker.advance(CaseState::Invoking);
		let _ = writeln!(out);
		let outcome = {
			let mut observer = StreamingObserver {
				tracker: &mut tracker,
				inner: ProgressRenderer::new(&mut *out),
			};
			self.agent.run(&prompt, &mut observer).await
		};
		let _ = writeln!(out);
		let duration_ms = started.elapsed().as_millis() as u64;

		tracker.advance(CaseState::Grading);
		let (answer, error) = match outcome {
			Ok(answer) => (answer, None),
			Err(err) => {
				tracing::warn!(case_id = %case.id, error = %err, timeout = err.is_timeout(), "agent invocation failed");
				(err.sentinel(), Some(err.to_string()))
			}
		};

		let criteria_results = match self.evaluator.evaluate(&answer, &case.pass_criteria).await {
			Ok(results) => results,
			Err(err) => {
				tracing::warn!(case_id = %case.id, evaluator = self.evaluator.name(), error = %err, "evaluator failed");
				case.pass_criteria
					.iter()
					.map(|c| CriterionResult {
						criterion: c.clone(),
						passed: Verdict::Review,
						note: format!("Evaluator error: {err}"),
					})
					.collect()
			}
		};

		let passed = if error.is_some() {
			Verdict::Fail
		} else {
			Verdict::reduce(criteria_results.iter().map(|r| r.passed))
		};

		tracker.advance(CaseState::Recorded);
		EvalResult {
			id: case.id.clone(),
			name: case.name.clone(),
			difficulty: case.difficulty,
			category: case.category.clone(),
			passed,
			output: answer.chars().take(self.output_cap).collect(),
			criteria_results,
			duration_ms,
			error,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::agent::{AgentOutcome, InvocationError};
	use crate::stream::AssistantBlock;
	use async_trait::async_trait;
	use querycraft_types::{Difficulty, Scoring};
	use std::sync::Mutex;

	/// Replies with a canned outcome and records the prompts it was given.
	struct CannedAgent {
		reply: fn() -> AgentOutcome,
		prompts: Mutex<Vec<String>>,
	}

	impl CannedAgent {
		fn new(reply: fn() -> AgentOutcome) -> Arc<Self> {
			Arc::new(Self { reply, prompts: Mutex::new(Vec::new()) })
		}
	}

	#[async_trait]
	impl Agent for CannedAgent {
		async fn run(&self, prompt: &str, observer: &mut (dyn EventObserver + Send)) -> AgentOutcome {
			self.prompts.lock().unwrap().push(prompt.to_string());
			observer.on_event(&StreamEvent::Assistant {
				blocks: vec![AssistantBlock::Text("working on it".to_string())],
			});
			(self.reply)()
		}
	}

	struct BrokenEvaluator;

	#[async_trait]
	impl CriteriaEvaluator for BrokenEvaluator {
		fn name(&self) -> &'static str {
			"broken"
		}

		async fn evaluate(&self, _answer: &str, _criteria: &[String]) -> Result<Vec<CriterionResult>> {
			anyhow::bail!("grader unavailable")
		}
	}

	fn case(id: &str, difficulty: Difficulty, criteria: &[&str]) -> EvalCase {
		EvalCase {
			id: id.to_string(),
			name: format!("case {id}"),
			difficulty,
			category: "aggregation".to_string(),
			input: "What is the total?".to_string(),
			pass_criteria: criteria.iter().map(|c| c.to_string()).collect(),
		}
	}

	fn set(cases: Vec<EvalCase>) -> EvalSet {
		EvalSet { name: "Test Set".to_string(), evals: cases, scoring: Scoring::default(), database: None }
	}

	#[tokio::test]
	async fn test_passing_case() {
		let agent = CannedAgent::new(|| Ok("The total is 42, computed using SUM aggregate.".to_string()));
		let runner = Runner::builder().agent(agent.clone()).build().unwrap();
		let c = case("a", Difficulty::Easy, &["Returns exactly 42", "Does NOT mention refund", "uses SUM aggregate"]);

		let mut out = Vec::<u8>::new();
		let result = runner.run_case(&c, &DatabaseSchema::default(), &mut out).await;

		assert_eq!(result.passed, Verdict::Pass);
		assert!(result.error.is_none());
		assert_eq!(result.criteria_results.len(), 3);
		assert!(String::from_utf8(out).unwrap().contains("working on it"));
		assert!(agent.prompts.lock().unwrap()[0].contains("What is the total?"));
	}

	#[tokio::test]
	async fn test_timeout_is_recorded_as_failure() {
		let agent = CannedAgent::new(|| Err(InvocationError::Timeout { secs: 180 }));
		let runner = Runner::builder().agent(agent).build().unwrap();
		// Only reviewable criteria: the invocation failure alone must fail the case.
		let c = case("a", Difficulty::Hard, &["Explains the methodology"]);

		let result = runner.run_case(&c, &DatabaseSchema::default(), &mut Vec::<u8>::new()).await;
		assert_eq!(result.passed, Verdict::Fail);
		assert_eq!(result.output, "ERROR: Timeout after 180 seconds");
		assert_eq!(result.error.as_deref(), Some("Timeout after 180 seconds"));
		assert_eq!(result.criteria_results[0].passed, Verdict::Review);
	}

	#[tokio::test]
	async fn test_evaluator_error_becomes_review() {
		let agent = CannedAgent::new(|| Ok("42".to_string()));
		let runner = Runner::builder().agent(agent).evaluator(Arc::new(BrokenEvaluator)).build().unwrap();
		let c = case("a", Difficulty::Easy, &["Returns exactly 42"]);

		let result = runner.run_case(&c, &DatabaseSchema::default(), &mut Vec::<u8>::new()).await;
		assert_eq!(result.passed, Verdict::Review);
		assert_eq!(result.criteria_results[0].note, "Evaluator error: grader unavailable");
	}

	#[tokio::test]
	async fn test_output_is_capped() {
		let agent = CannedAgent::new(|| Ok("é".repeat(50)));
		let runner = Runner::builder().agent(agent).output_cap(10).build().unwrap();
		let c = case("a", Difficulty::Easy, &[]);

		let result = runner.run_case(&c, &DatabaseSchema::default(), &mut Vec::<u8>::new()).await;
		assert_eq!(result.output.chars().count(), 10);
		assert_eq!(result.passed, Verdict::Pass);
	}

	#[tokio::test]
	async fn test_run_aggregates_and_uses_set_database() {
		let agent = CannedAgent::new(|| Ok("I cannot access the database.".to_string()));
		let runner = Runner::builder().agent(agent.clone()).build().unwrap();
		let mut eval_set = set(vec![
			case("a", Difficulty::Easy, &["Returns exactly 42"]),
			case("b", Difficulty::Medium, &["Does NOT mention refund"]),
			case("c", Difficulty::Medium, &["Is well written"]),
		]);
		eval_set.database = Some(DatabaseSchema {
			path: "data/sample-sales.db".to_string(),
			..DatabaseSchema::default()
		});
		let cases: Vec<&EvalCase> = eval_set.evals.iter().collect();

		let mut out = Vec::<u8>::new();
		let outcome = runner.run(&eval_set, &cases, &mut out).await;

		let verdicts: Vec<Verdict> = outcome.results.iter().map(|r| r.passed).collect();
		assert_eq!(verdicts, vec![Verdict::Fail, Verdict::Pass, Verdict::Review]);
		assert_eq!((outcome.summary.passed, outcome.summary.failed, outcome.summary.review), (1, 1, 1));
		assert!(agent.prompts.lock().unwrap().iter().all(|p| p.contains("data/sample-sales.db")));

		let console = String::from_utf8(out).unwrap();
		assert!(console.contains("3 evals to run"));
		assert!(console.contains("[a] case a"));
		assert!(console.contains("→ ✗ FAIL"));
	}

	#[tokio::test]
	async fn test_zero_case_run() {
		let agent = CannedAgent::new(|| Ok(String::new()));
		let runner = Runner::builder().agent(agent.clone()).build().unwrap();
		let eval_set = set(vec![case("a", Difficulty::Easy, &[])]);

		let mut out = Vec::<u8>::new();
		let outcome = runner.run(&eval_set, &[], &mut out).await;

		assert!(outcome.results.is_empty());
		assert_eq!(outcome.summary.total, 0);
		assert!(agent.prompts.lock().unwrap().is_empty());
		assert!(String::from_utf8(out).unwrap().contains("0 evals to run"));
	}

	#[test]
	fn test_builder_requires_agent() {
		assert!(Runner::builder().build().is_err());
	}
}
