use crate::runner::RunOutcome;
use anyhow::Result;
use querycraft_types::RunSummary;

/// Fails if any case failed outright. Cases awaiting review are allowed.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn funding_agent_smoke() -> Result<()> {
///     let set = querycraft_core::catalog::load("data/evals/smoke.json").await?;
///     let cases = CaseFilter::default().select(&set);
///     let runner = Runner::builder().agent(agent).build()?;
///
///     let outcome = runner.run(&set, &cases, &mut std::io::sink()).await;
///     assert_no_failures(&outcome)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_no_failures(outcome: &RunOutcome) -> Result<()> {
    if outcome.summary.failed > 0 {
        let failed: Vec<&str> = outcome
            .results
            .iter()
            .filter(|r| r.passed == querycraft_types::Verdict::Fail)
            .map(|r| r.id.as_str())
            .collect();
        anyhow::bail!(
            "Evaluation failed: {}/{} cases failed ({})\n{}",
            outcome.summary.failed,
            outcome.summary.total,
            failed.join(", "),
            RunSummary::results_table(&outcome.results)
        );
    }
    Ok(())
}

/// Helper to assert every case passed, with nothing left for review.
pub fn assert_all_passed(outcome: &RunOutcome) -> Result<()> {
    if outcome.summary.passed != outcome.summary.total {
        anyhow::bail!(
            "Evaluation failed: {}/{} cases passed\n{}",
            outcome.summary.passed,
            outcome.summary.total,
            RunSummary::results_table(&outcome.results)
        );
    }
    Ok(())
}

/// Helper to assert each difficulty tier meets the pass rate its eval set expects.
///
/// The harness itself treats these baselines as informational; this is for
/// suites that want to gate on them.
pub fn assert_meets_expected_rates(summary: &RunSummary) -> Result<()> {
    for tier in &summary.by_difficulty {
        if let Some(expected) = tier.expected_pass_rate {
            if tier.pass_rate() < expected {
                anyhow::bail!(
                    "Evaluation failed: {} pass rate {:.1}% is below expected {:.1}%",
                    tier.difficulty,
                    tier.pass_rate() * 100.0,
                    expected * 100.0
                );
            }
        }
    }
    Ok(())
}
