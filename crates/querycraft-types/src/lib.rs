use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tabled::{Table, Tabled};

/// Difficulty tier of an eval case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
	Easy,
	Medium,
	Hard,
}

impl Difficulty {
	pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

	pub fn as_str(&self) -> &'static str {
		match self {
			Difficulty::Easy => "easy",
			Difficulty::Medium => "medium",
			Difficulty::Hard => "hard",
		}
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Difficulty {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"easy" => Ok(Difficulty::Easy),
			"medium" => Ok(Difficulty::Medium),
			"hard" => Ok(Difficulty::Hard),
			other => Err(format!("unknown difficulty '{other}' (expected easy, medium or hard)")),
		}
	}
}

/// One scenario: a question for the agent plus the criteria its answer is graded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
	pub id: String,
	pub name: String,
	pub difficulty: Difficulty,
	pub category: String,
	pub input: String,
	pub pass_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
	pub name: String,
	pub columns: Vec<String>,
}

impl TableSchema {
	pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
		Self {
			name: name.into(),
			columns: columns.iter().map(|c| c.to_string()).collect(),
		}
	}
}

/// Database the agent is pointed at, as described in the prompt. Never validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
	#[serde(default = "default_engine")]
	pub engine: String,
	pub path: String,
	#[serde(default)]
	pub tables: Vec<TableSchema>,
}

fn default_engine() -> String {
	"SQLite".to_string()
}

impl Default for DatabaseSchema {
	fn default() -> Self {
		Self {
			engine: default_engine(),
			path: "data/startup-funding.db".to_string(),
			tables: vec![
				TableSchema::new(
					"startups",
					&["id", "name", "industry", "sub_industry", "founded_date", "description", "website", "headquarters"],
				),
				TableSchema::new("investors", &["id", "name", "type", "focus_areas", "notable_investments"]),
				TableSchema::new(
					"funding_rounds",
					&["id", "startup_id", "stage", "amount_usd", "funding_date", "lead_investor_id", "valuation_usd", "announced"],
				),
				TableSchema::new(
					"startup_metrics",
					&["id", "startup_id", "metric_date", "arr_usd", "employee_count", "monthly_active_users"],
				),
			],
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
	#[serde(default)]
	pub expected_pass_rates: BTreeMap<Difficulty, f64>,
}

/// A named catalog of eval cases. Case ids are unique within a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSet {
	pub name: String,
	pub evals: Vec<EvalCase>,
	#[serde(default)]
	pub scoring: Scoring,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub database: Option<DatabaseSchema>,
}

impl EvalSet {
	pub fn expected_pass_rate(&self, difficulty: Difficulty) -> Option<f64> {
		self.scoring.expected_pass_rates.get(&difficulty).copied()
	}
}

/// Tri-state outcome for a criterion or a whole case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
	Pass,
	Fail,
	Review,
}

impl Verdict {
	/// Folds per-criterion verdicts into a case verdict.
	///
	/// Any `Fail` wins outright. Otherwise the case passes only when every
	/// criterion passed (an empty list passes), and is `Review` if anything
	/// still needs a human.
	pub fn reduce<I>(verdicts: I) -> Verdict
	where
		I: IntoIterator<Item = Verdict>,
	{
		let mut all_passed = true;
		for v in verdicts {
			match v {
				Verdict::Fail => return Verdict::Fail,
				Verdict::Review => all_passed = false,
				Verdict::Pass => {}
			}
		}
		if all_passed {
			Verdict::Pass
		} else {
			Verdict::Review
		}
	}

	pub fn from_flag(flag: Option<bool>) -> Self {
		match flag {
			Some(true) => Verdict::Pass,
			Some(false) => Verdict::Fail,
			None => Verdict::Review,
		}
	}

	pub fn as_flag(&self) -> Option<bool> {
		match self {
			Verdict::Pass => Some(true),
			Verdict::Fail => Some(false),
			Verdict::Review => None,
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			Verdict::Pass => "PASS",
			Verdict::Fail => "FAIL",
			Verdict::Review => "REVIEW",
		}
	}

	pub fn icon(&self) -> &'static str {
		match self {
			Verdict::Pass => "✓",
			Verdict::Fail => "✗",
			Verdict::Review => "?",
		}
	}
}

impl fmt::Display for Verdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

// Case-level form: true / false / "review".
impl Serialize for Verdict {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.as_flag() {
			Some(flag) => serializer.serialize_bool(flag),
			None => serializer.serialize_str("review"),
		}
	}
}

impl<'de> Deserialize<'de> for Verdict {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		match Value::deserialize(deserializer)? {
			Value::Bool(flag) => Ok(Verdict::from_flag(Some(flag))),
			Value::Null => Ok(Verdict::Review),
			Value::String(s) if s.eq_ignore_ascii_case("review") => Ok(Verdict::Review),
			other => Err(serde::de::Error::custom(format!("invalid verdict: {other}"))),
		}
	}
}

/// Criterion-level form: true / false / null.
pub mod nullable_verdict {
	use super::Verdict;
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S: Serializer>(verdict: &Verdict, serializer: S) -> Result<S::Ok, S::Error> {
		verdict.as_flag().serialize(serializer)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Verdict, D::Error> {
		Ok(Verdict::from_flag(Option::<bool>::deserialize(deserializer)?))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
	pub criterion: String,
	#[serde(with = "nullable_verdict")]
	pub passed: Verdict,
	/// Empty when the criterion passed.
	pub note: String,
}

impl CriterionResult {
	pub fn pass(criterion: impl Into<String>) -> Self {
		Self { criterion: criterion.into(), passed: Verdict::Pass, note: String::new() }
	}

	pub fn fail(criterion: impl Into<String>, note: impl Into<String>) -> Self {
		Self { criterion: criterion.into(), passed: Verdict::Fail, note: note.into() }
	}

	pub fn review(criterion: impl Into<String>) -> Self {
		Self {
			criterion: criterion.into(),
			passed: Verdict::Review,
			note: "Needs manual review".to_string(),
		}
	}
}

/// Outcome of one eval case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
	pub id: String,
	pub name: String,
	pub difficulty: Difficulty,
	pub category: String,
	pub passed: Verdict,
	pub output: String,
	pub criteria_results: Vec<CriterionResult>,
	pub duration_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
	pub difficulty: Difficulty,
	pub passed: usize,
	pub total: usize,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub expected_pass_rate: Option<f64>,
}

impl TierSummary {
	pub fn pass_rate(&self) -> f64 {
		if self.total == 0 { 0.0 } else { self.passed as f64 / self.total as f64 }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
	pub passed: usize,
	pub failed: usize,
	pub review: usize,
	pub total: usize,
	#[serde(default)]
	pub by_difficulty: Vec<TierSummary>,
}

#[derive(Debug, Clone, Tabled)]
struct ResultRow {
	id: String,
	verdict: String,
	difficulty: String,
	seconds: u64,
	output: String,
}

impl RunSummary {
	/// Counts verdicts overall and per tier. Tiers with no results are left out.
	pub fn summarize(results: &[EvalResult], scoring: &Scoring) -> RunSummary {
		let mut summary = RunSummary { total: results.len(), ..RunSummary::default() };
		for r in results {
			match r.passed {
				Verdict::Pass => summary.passed += 1,
				Verdict::Fail => summary.failed += 1,
				Verdict::Review => summary.review += 1,
			}
		}

		for difficulty in Difficulty::ALL {
			let tier: Vec<&EvalResult> = results.iter().filter(|r| r.difficulty == difficulty).collect();
			if tier.is_empty() {
				continue;
			}
			summary.by_difficulty.push(TierSummary {
				difficulty,
				passed: tier.iter().filter(|r| r.passed == Verdict::Pass).count(),
				total: tier.len(),
				expected_pass_rate: scoring.expected_pass_rates.get(&difficulty).copied(),
			});
		}

		summary
	}

	pub fn results_table(results: &[EvalResult]) -> String {
		let rows: Vec<ResultRow> = results.iter().map(|r| ResultRow {
			id: r.id.clone(),
			verdict: format!("{} {}", r.passed.icon(), r.passed.label()),
			difficulty: r.difficulty.to_string(),
			seconds: r.duration_ms / 1000,
			output: truncate(r.output.replace('\n', " "), 64),
		}).collect();

		Table::new(rows).to_string()
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
