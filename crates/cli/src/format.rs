//! Report → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): one line per scenario plus a closing tally
//! - **JSON** (`--json`): `serde_json::to_string_pretty` of every report

use kvprobe_harness::scenario::fmt_bytes;
use kvprobe_harness::{Outcome, RunSummary, Scenario, ScenarioReport};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Format the scenario registry for `kvprobe list`.
pub fn format_scenarios(scenarios: &[Scenario]) -> String {
    let width = scenarios.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for s in scenarios {
        out.push_str(&format!("{:<width$}  {}\n", s.name, s.description, width = width));
        for (i, step) in s.steps.iter().enumerate() {
            out.push_str(&format!("{:<width$}    {}. {}\n", "", i + 1, step.describe(), width = width));
        }
        let mut bounds = Vec::new();
        if let Some(d) = s.deadline {
            bounds.push(format!("scenario deadline {:?}", d));
        }
        if let Some(d) = s.close_deadline {
            bounds.push(format!("close deadline {:?}", d));
        }
        if !bounds.is_empty() {
            out.push_str(&format!("{:<width$}    [{}]\n", "", bounds.join(", "), width = width));
        }
    }
    out
}

/// Format one report as a single human-readable line.
pub fn format_report_line(report: &ScenarioReport) -> String {
    let status = match &report.outcome {
        Outcome::CompletedOk => "PASS",
        Outcome::CompletedWithError { .. } => "FAIL",
        Outcome::TimedOut { .. } => "TIMEOUT",
    };
    let mut line = format!(
        "{:<7} {} [{}] {:.1}s, {} written",
        status,
        report.scenario,
        report.backend,
        report.elapsed.as_secs_f64(),
        fmt_bytes(report.stats.bytes_written)
    );
    if let Some(reason) = report.outcome.reason() {
        line.push_str(&format!("\n        {}", reason));
    }
    if let Some(close) = &report.close_error {
        line.push_str(&format!("\n        close also failed: {}", close));
    }
    if let Some(cleanup) = &report.cleanup_error {
        line.push_str(&format!("\n        cleanup failed: {}", cleanup));
    }
    line
}

/// Format the whole run.
pub fn format_summary(summary: &RunSummary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&summary.reports)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => {
            let mut out: Vec<String> = summary.reports.iter().map(format_report_line).collect();
            out.push(format!(
                "{} of {} scenarios passed",
                summary.passed(),
                summary.reports.len()
            ));
            out.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kvprobe_harness::scenario;
    use kvprobe_harness::RunStats;
    use std::time::Duration;

    fn report(outcome: Outcome) -> ScenarioReport {
        ScenarioReport {
            scenario: "batch-only".to_string(),
            backend: "log".to_string(),
            outcome,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
            stats: RunStats {
                entries_written: 2,
                bytes_written: 2048,
                ..RunStats::default()
            },
            close_error: None,
            cleanup_error: None,
        }
    }

    #[test]
    fn test_pass_line() {
        let line = format_report_line(&report(Outcome::CompletedOk));
        assert_eq!(line, "PASS    batch-only [log] 1.5s, 2.0 KiB written");
    }

    #[test]
    fn test_timeout_line_names_step() {
        let line = format_report_line(&report(Outcome::TimedOut {
            step: "close".to_string(),
            deadline: Duration::from_secs(30),
        }));
        assert!(line.starts_with("TIMEOUT batch-only"));
        assert!(line.contains("close: exceeded deadline of 30s"));
    }

    #[test]
    fn test_summary_modes() {
        let summary = RunSummary {
            reports: vec![report(Outcome::CompletedOk)],
        };
        assert!(format_summary(&summary, OutputMode::Human).ends_with("1 of 1 scenarios passed"));
        let json: serde_json::Value =
            serde_json::from_str(&format_summary(&summary, OutputMode::Json)).unwrap();
        assert_eq!(json[0]["outcome"]["status"], "completed_ok");
    }

    #[test]
    fn test_scenario_listing_shows_every_builtin() {
        let listing = format_scenarios(&scenario::builtin());
        for s in scenario::builtin() {
            assert!(listing.contains(&s.name));
        }
        assert!(listing.contains("scenario deadline 600s"));
    }
}
