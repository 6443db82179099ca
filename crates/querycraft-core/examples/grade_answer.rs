use querycraft_core::{CriteriaEvaluator, RuleEvaluator, Verdict};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let evaluator = RuleEvaluator::standard()?;

    let criteria = vec![
        "Returns exactly 42".to_string(),
        "Does NOT mention refund".to_string(),
        "uses SUM aggregate".to_string(),
        "The explanation should be thorough".to_string(),
    ];

    for answer in [
        "The total is 42, computed using SUM aggregate.",
        "I cannot access the database.",
    ] {
        let results = evaluator.evaluate(answer, &criteria).await?;
        let verdict = Verdict::reduce(results.iter().map(|r| r.passed));

        println!("{answer}\n  => {} {}", verdict.icon(), verdict.label());
        for r in &results {
            let note = if r.note.is_empty() { String::new() } else { format!(" ({})", r.note) };
            println!("     {} {}{}", r.passed.icon(), r.criterion, note);
        }
        println!();
    }

    Ok(())
}
