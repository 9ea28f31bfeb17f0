//! Test certificate rendering
//!
//! Lays a `TestReport` out as a certificate (board information, summary, one
//! section per subsystem) and writes it as plain text or Markdown.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{SubsystemResult, SubsystemStatus, TestReport};

/// Produces a document artifact for a judged unit
pub trait ReportRenderer {
    /// Render and store the certificate, returning where it was written
    fn render(&self, report: &TestReport) -> Result<PathBuf>;
}

/// Report output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Markdown => "md",
        }
    }
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }
        widths
    }
}

struct Section {
    heading: String,
    tables: Vec<Table>,
    notes: Vec<String>,
}

impl Section {
    fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            tables: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn with_diagnostics(mut self, result: &SubsystemResult) -> Self {
        self.notes.extend(result.diagnostics.iter().cloned());
        self
    }
}

/// Writes `<reports dir>/<board SN>.<ext>` certificates
pub struct CertificateRenderer {
    dir: PathBuf,
    format: ReportFormat,
}

impl CertificateRenderer {
    pub fn new(dir: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn path_for(&self, board_sn: &str) -> PathBuf {
        let name = board_sn.replace(['/', '\\'], "_");
        self.dir.join(format!("{}.{}", name, self.format.extension()))
    }

    /// Full certificate text in the configured format
    pub fn document(&self, report: &TestReport) -> String {
        let title = "Board Bring-up Test Report";
        let sections = sections(report);
        match self.format {
            ReportFormat::Text => format_text(title, &sections),
            ReportFormat::Markdown => format_markdown(title, &sections),
        }
    }
}

impl ReportRenderer for CertificateRenderer {
    fn render(&self, report: &TestReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(&report.board.board_sn);
        write_document(&path, &self.document(report))?;

        info!("Saved report to {}", path.display());
        Ok(path)
    }
}

fn write_document(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn sections(report: &TestReport) -> Vec<Section> {
    let board = &report.board;
    let eth = &report.ethernet;

    let mut info = Table::new(&["Property", "Value"]);
    for (name, value) in [
        ("Operator", board.operator.clone()),
        ("Board SN", board.board_sn.clone()),
        ("Board PN", board.board_pn.clone()),
        ("Manufacturer SN", board.manuf_sn.clone()),
        ("Testboard SN", board.test_board_sn.clone()),
        ("Testboard PN", board.test_board_pn.clone()),
        ("Test SW version", board.test_sw_version.clone()),
        ("IP", eth.target.ip.clone()),
        ("MAC", eth.mac.clone()),
        ("Date", format_datetime(&board.date)),
    ] {
        info.row(vec![name.to_string(), value]);
    }
    let mut header = Section::new("Board Information");
    header.tables.push(info);

    let mut summary_table = Table::new(&["Test", "Result"]);
    for result in report.subsystems() {
        summary_table.row(vec![result.subsystem.name().to_string(), status(result.status)]);
    }
    summary_table.row(vec![
        "Overall".to_string(),
        if report.passed { "PASS" } else { "FAIL" }.to_string(),
    ]);
    let mut summary = Section::new("Test Results");
    summary.tables.push(summary_table);

    let mut led_table = Table::new(&["LED", "LDR read [V]", "Result"]);
    for m in &report.led.measurements {
        led_table.row(vec![m.key.clone(), m.value.to_string(), verdict(m.passed)]);
    }
    let mut led = Section::new("LEDs").with_diagnostics(&report.led);
    led.tables.push(led_table);

    let mut gpio_table = Table::new(&["Pin", "Pin", "Result"]);
    for m in &report.gpio.measurements {
        gpio_table.row(vec![
            m.attribute("pin1").unwrap_or("?").to_string(),
            m.attribute("pin2").unwrap_or("?").to_string(),
            verdict(m.passed),
        ]);
    }
    let mut gpio = Section::new("GPIO Loopback").with_diagnostics(&report.gpio);
    gpio.tables.push(gpio_table);

    let mut ps_table = Table::new(&["Rail", "Measured [V]", "Limits [V]", "Result"]);
    for m in &report.power_supply.measurements {
        let limits = match (m.attribute("nominal"), m.attribute("tolerance")) {
            (Some(n), Some(t)) => format!("{n} ± {t}"),
            _ => "no mask entry".to_string(),
        };
        ps_table.row(vec![m.key.clone(), m.value.to_string(), limits, verdict(m.passed)]);
    }
    let mut power = Section::new("Power Supply").with_diagnostics(&report.power_supply);
    power.tables.push(ps_table);

    let mut pattern_table = Table::new(&["Random Pattern"]);
    for row in report.feram.pattern_rows(16) {
        pattern_table.row(vec![row.to_string()]);
    }
    let mut feram_result = Table::new(&["Result"]);
    feram_result.row(vec![status(report.feram.result.status)]);
    let mut feram = Section::new("FeRAM").with_diagnostics(&report.feram.result);
    feram.tables.push(pattern_table);
    feram.tables.push(feram_result);

    let mut addresses = Table::new(&["", "MAC", "IP", "Gateway", "Mask"]);
    addresses.row(vec![
        "Deployed".to_string(),
        eth.mac.clone(),
        eth.target.ip.clone(),
        eth.target.gateway.clone(),
        eth.target.mask.clone(),
    ]);
    addresses.row(vec![
        "Test".to_string(),
        eth.mac.clone(),
        eth.test.ip.clone(),
        eth.test.gateway.clone(),
        eth.test.mask.clone(),
    ]);
    let mut received = Table::new(&["Received String", "Hexadecimal", "Result"]);
    received.row(vec![
        eth.message.clone(),
        eth.message_hex(),
        status(eth.result.status),
    ]);
    let mut ethernet = Section::new("Ethernet").with_diagnostics(&eth.result);
    ethernet.tables.push(addresses);
    ethernet.tables.push(received);

    vec![header, summary, led, gpio, power, feram, ethernet]
}

fn verdict(passed: bool) -> String {
    if passed { "Pass" } else { "Fail" }.to_string()
}

fn status(status: SubsystemStatus) -> String {
    match status {
        SubsystemStatus::Pass => "Pass",
        SubsystemStatus::Fail => "Fail",
        SubsystemStatus::NoSignal => "Fail (no signal)",
    }
    .to_string()
}

fn format_text(title: &str, sections: &[Section]) -> String {
    let mut output = String::new();

    writeln!(output, "{:=^70}", format!(" {title} ")).unwrap();

    for section in sections {
        writeln!(output, "\n{:-^70}", format!(" {} ", section.heading)).unwrap();
        for table in &section.tables {
            let widths = table.widths();
            let line = |cells: &[String]| {
                cells
                    .iter()
                    .zip(&widths)
                    .map(|(c, &w)| format!("{c:<w$}"))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            };
            writeln!(output).unwrap();
            writeln!(output, "{}", line(&table.headers)).unwrap();
            let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
            writeln!(output, "{}", "-".repeat(total)).unwrap();
            for row in &table.rows {
                writeln!(output, "{}", line(row)).unwrap();
            }
        }
        for note in &section.notes {
            writeln!(output, "  note: {note}").unwrap();
        }
    }

    writeln!(output, "\n{:=^70}", "").unwrap();
    output
}

fn format_markdown(title: &str, sections: &[Section]) -> String {
    let mut output = String::new();

    writeln!(output, "# {title}").unwrap();

    for section in sections {
        writeln!(output, "\n## {}", section.heading).unwrap();
        for table in &section.tables {
            writeln!(output).unwrap();
            writeln!(output, "| {} |", table.headers.join(" | ")).unwrap();
            writeln!(
                output,
                "|{}|",
                vec!["---"; table.headers.len()].join("|")
            )
            .unwrap();
            for row in &table.rows {
                let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
                writeln!(output, "| {} |", cells.join(" | ")).unwrap();
            }
        }
        if !section.notes.is_empty() {
            writeln!(output).unwrap();
            for note in &section.notes {
                writeln!(output, "> {note}").unwrap();
            }
        }
    }

    output
}

fn escape_cell(cell: &str) -> String {
    if cell.is_empty() {
        "`(empty)`".to_string()
    } else {
        cell.replace('|', "\\|")
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
