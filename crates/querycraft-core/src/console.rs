//! Plain-text console output for runs and dry runs.
//!
//! Write failures on the console are ignored: a closed terminal must not
//! change how cases are graded.

use std::io::Write;

use querycraft_types::{EvalCase, EvalResult, RunSummary, Verdict};

use crate::render::{preview, GRAY, RED, RESET};

const HEAVY_RULE: usize = 60;
const LIGHT_RULE: usize = 50;
const INPUT_PREVIEW_CHARS: usize = 80;

pub fn print_header(out: &mut dyn Write, set_name: &str, count: usize) {
    let rule = "=".repeat(HEAVY_RULE);
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "  {set_name}");
    let _ = writeln!(out, "  {count} evals to run");
    let _ = writeln!(out, "{rule}\n");
}

pub fn print_dry_run(out: &mut dyn Write, cases: &[&EvalCase]) {
    let _ = writeln!(out, "DRY RUN - Showing evals without executing:\n");
    for case in cases {
        let _ = writeln!(out, "[{}] {} ({})", case.id, case.name, case.difficulty);
        let _ = writeln!(out, "  Category: {}", case.category);
        let _ = writeln!(out, "  Input: \"{}\"", preview(&case.input, INPUT_PREVIEW_CHARS));
        let _ = writeln!(out, "  Pass criteria:");
        for criterion in &case.pass_criteria {
            let _ = writeln!(out, "    - {criterion}");
        }
        let _ = writeln!(out);
    }
}

pub fn print_case_banner(out: &mut dyn Write, case: &EvalCase) {
    let rule = "─".repeat(LIGHT_RULE);
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "[{}] {}", case.id, case.name);
    let _ = writeln!(out, "{rule}");
}

/// Status line, then the per-criterion breakdown for anything short of a pass
/// (or always, when verbose).
pub fn print_case_status(out: &mut dyn Write, result: &EvalResult, verbose: bool) {
    let _ = writeln!(
        out,
        "\n→ {} {} ({}s)",
        result.passed.icon(),
        result.passed.label(),
        result.duration_ms / 1000
    );

    if let Some(error) = &result.error {
        let _ = writeln!(out, "{RED}  {error}{RESET}");
    }

    if verbose || result.passed != Verdict::Pass {
        for cr in &result.criteria_results {
            let note = if cr.note.is_empty() { String::new() } else { format!(" ({})", cr.note) };
            let _ = writeln!(out, "  {} {}{}", cr.passed.icon(), cr.criterion, note);
        }
        let _ = writeln!(out);
    }
}

pub fn print_summary(out: &mut dyn Write, summary: &RunSummary, results: &[EvalResult]) {
    let rule = "=".repeat(HEAVY_RULE);
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "  RESULTS");
    let _ = writeln!(out, "{rule}\n");

    let total = summary.total;
    let _ = writeln!(out, "  Passed: {}/{}", summary.passed, total);
    let _ = writeln!(out, "  Failed: {}/{}", summary.failed, total);
    let _ = writeln!(out, "  Needs Review: {}/{}", summary.review, total);

    if !summary.by_difficulty.is_empty() {
        let _ = writeln!(out, "\n  By difficulty:");
        for tier in &summary.by_difficulty {
            let actual = (tier.pass_rate() * 100.0).round() as u32;
            let expected = tier
                .expected_pass_rate
                .map(|rate| format!(", expected ~{}%", (rate * 100.0).round() as u32))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    {}: {}/{} ({}%{})",
                tier.difficulty, tier.passed, tier.total, actual, expected
            );
        }
    }

    if !results.is_empty() {
        let _ = writeln!(out, "\n{GRAY}{}{RESET}", RunSummary::results_table(results));
    }
}
