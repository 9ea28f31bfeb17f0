//! Output formatters for bring-up results
//!
//! Provides JSON, Table, and summary output formats.

use std::fmt::Write as _;

use crate::models::{SubsystemResult, SubsystemStatus, TestReport};
use crate::results::{DeployStatus, RunInfo, RunRecord};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colorize {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn verdict(&self, passed: bool) -> String {
        if passed {
            self.paint("PASS", GREEN)
        } else {
            self.paint("FAIL", RED)
        }
    }

    fn status(&self, status: SubsystemStatus) -> String {
        let text = format!("{} {}", status.symbol(), status);
        match status {
            SubsystemStatus::Pass => self.paint(&text, GREEN),
            SubsystemStatus::Fail => self.paint(&text, RED),
            SubsystemStatus::NoSignal => self.paint(&text, YELLOW),
        }
    }

    /// Format a judged report
    pub fn format_report(&self, report: &TestReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Summary => self.format_report_brief(report),
        }
    }

    fn format_subsystem(&self, output: &mut String, result: &SubsystemResult) {
        writeln!(
            output,
            "║  {:16} {}",
            result.subsystem.name(),
            self.status(result.status)
        )
        .unwrap();

        let failed = result.failed_keys();
        if !failed.is_empty() {
            writeln!(output, "║      failed: {}", failed.join(", ")).unwrap();
        }
        for diagnostic in &result.diagnostics {
            writeln!(output, "║      note: {diagnostic}").unwrap();
        }
    }

    fn format_report_table(&self, report: &TestReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        writeln!(
            output,
            "║  Board {} ({})",
            report.board.board_sn, report.board.operator
        )
        .unwrap();
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in report.subsystems() {
            self.format_subsystem(&mut output, result);
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        writeln!(
            output,
            "║  Overall: {} | MAC {} | Message \"{}\"",
            self.verdict(report.passed),
            report.ethernet.mac,
            report.ethernet.message
        )
        .unwrap();
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_report_brief(&self, report: &TestReport) -> String {
        let failed: Vec<&str> = report
            .failed_subsystems()
            .iter()
            .map(|s| s.name())
            .collect();
        let mut line = format!("{} {}", report.board.board_sn, self.verdict(report.passed));
        if !failed.is_empty() {
            write!(line, " ({})", failed.join(", ")).unwrap();
        }
        line
    }

    /// Format a complete station run
    pub fn format_record(&self, record: &RunRecord) -> String {
        match self.format {
            OutputFormat::Table => self.format_record_table(record),
            OutputFormat::Json => serde_json::to_string(record).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Summary => self.format_record_brief(record),
        }
    }

    fn format_record_table(&self, record: &RunRecord) -> String {
        let mut output = self.format_report_table(&record.report);

        writeln!(output, " Run:       {}", record.id).unwrap();
        writeln!(output, " Deployed:  {}", record.deployed).unwrap();
        let deploy = match &record.deploy {
            DeployStatus::Programmed => self.paint("programmed", GREEN),
            DeployStatus::NotAttempted => self.paint("not attempted", YELLOW),
            DeployStatus::Failed(reason) => self.paint(&format!("failed ({reason})"), RED),
        };
        writeln!(output, " Firmware:  {} {}", record.deploy_image.display(), deploy).unwrap();
        if let Some(path) = &record.report_path {
            writeln!(output, " Report:    {}", path.display()).unwrap();
        }
        for pass in &record.passes {
            let outcome = if pass.outcome.is_completed() {
                self.paint("completed", GREEN)
            } else {
                self.paint("aborted", RED)
            };
            writeln!(
                output,
                " {:5} pass: {} in {:?} after {} lines, {}ms",
                pass.kind.name(),
                outcome,
                pass.final_state,
                pass.transcript.len(),
                pass.duration_ms
            )
            .unwrap();
        }
        if !record.phases.is_empty() {
            let phases: Vec<String> = record
                .phases
                .iter()
                .map(|p| format!("{} {}ms", p.phase, p.duration_ms))
                .collect();
            writeln!(output, " Phases:    {}", phases.join(" | ")).unwrap();
        }
        for note in &record.notes {
            writeln!(output, " {} {note}", self.paint("!", YELLOW)).unwrap();
        }

        output
    }

    fn format_record_brief(&self, record: &RunRecord) -> String {
        format!(
            "{} -> {} in {}ms",
            self.format_report_brief(&record.report),
            record.deployed.ip,
            record.duration_ms()
        )
    }

    /// Format stored runs of one board
    pub fn format_runs(&self, runs: &[RunInfo]) -> String {
        let mut output = String::new();

        output.push_str("┌──────────────────────┬──────────────────────┬────────┬─────────────────┐\n");
        output.push_str("│ Run                  │ Started              │ Result │ Deployed IP     │\n");
        output.push_str("├──────────────────────┼──────────────────────┼────────┼─────────────────┤\n");
        for run in runs {
            writeln!(
                output,
                "│ {:20} │ {:20} │ {:6} │ {:15} │",
                run.id,
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                if run.passed { "PASS" } else { "FAIL" },
                run.deployed_ip
            )
            .unwrap();
            if !run.failed.is_empty() {
                writeln!(output, "│   failed: {}", run.failed.join(", ")).unwrap();
            }
        }
        output.push_str("└──────────────────────┴──────────────────────┴────────┴─────────────────┘\n");

        output
    }

    /// Tally of a continuous session
    pub fn format_session(&self, records: &[RunRecord]) -> String {
        let passed = records.iter().filter(|r| r.passed).count();
        let failed = records.len() - passed;
        let rate = if records.is_empty() {
            0.0
        } else {
            passed as f64 / records.len() as f64 * 100.0
        };

        let failed_str = if failed > 0 {
            self.paint(&failed.to_string(), RED)
        } else {
            failed.to_string()
        };
        format!(
            "Session: {} boards | Pass: {} | Fail: {} | Yield: {:.1}%",
            records.len(),
            self.paint(&passed.to_string(), GREEN),
            failed_str,
            rate
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
