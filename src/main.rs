//! uc-bringup - Factory bring-up station for microcontroller boards
//!
//! A CLI tool that programs a test image into a freshly assembled board, drives
//! its on-board self-test over the serial console, judges the telemetry against
//! a calibrated mask, commits a network identity and flashes the deploy image.
//!
//! ## Features
//!
//! - Scripted two-pass serial dialogue with hard line, idle and deadline budgets
//! - Judgement of LEDs, GPIO loopback, power rails, FeRAM and Ethernet
//! - Text or Markdown certificates per board
//! - Serial number / IP / MAC allocation across a production session
//! - Stored run records with JSON and CSV export
//!
//! ## Usage
//!
//! ```bash
//! # Test the next board from the allocation table
//! uc-bringup run
//!
//! # Test boards back to back
//! uc-bringup run --continuous --operator "Jane Doe"
//!
//! # Re-judge a captured transcript
//! uc-bringup judge capture.log --mask mask.json
//!
//! # Inspect stored results
//! uc-bringup results list --sn CN00001
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{error, info, warn};

mod cli;
mod config;
mod executor;
mod judge;
mod models;
mod net;
mod output;
mod program;
mod results;
mod serial;
mod utils;

use cli::Args;
use config::{ConfigFile, EnvConfig, StationConfig, TestMask};
use executor::Station;
use judge::Judge;
use models::{BoardInfo, MacAddress, NetworkIdentity, RunPlan, Transcript};
use net::ProbeStatus;
use output::{OutputFormat, ResultFormatter};
use results::{
    CertificateRenderer, ExportFormat, IdentityAllocator, ReportFormat, ReportRenderer,
    ResultsStorage,
};
use utils::{init_logger, LogLevel};

fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(LogLevel::resolve(
        &args.log_level,
        args.verbose || env.verbose == Some(true),
    ));

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(Into::into));
    let mut file = ConfigFile::resolve(config_path.as_deref())?;
    file.station.apply_env(&env);

    match args.command {
        cli::Command::Run(run_args) => {
            run_boards(run_args, file.station, &env)?;
        }
        cli::Command::Judge(judge_args) => {
            judge_transcript(judge_args, &file.station, &env)?;
        }
        cli::Command::Mask(mask_args) => {
            manage_mask(mask_args)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, &file.station)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &file, &env)?;
        }
    }

    Ok(())
}

fn console_formatter(name: &str) -> Result<ResultFormatter> {
    let format =
        OutputFormat::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown output format: {name}"))?;
    let formatter = ResultFormatter::new(format);
    Ok(if io::stdout().is_terminal() {
        formatter
    } else {
        formatter.no_color()
    })
}

/// Allocation table plan with the operator's overrides applied
fn first_plan(args: &cli::RunArgs, allocator: &IdentityAllocator) -> Result<RunPlan> {
    let mut plan = allocator.next_plan()?;

    if let Some(sn) = &args.sn {
        plan.board_sn = sn.clone();
    }
    if let Some(ip) = &args.ip {
        plan.target = allocator.identity(ip.as_str());
    }
    if let Some(mac) = &args.mac {
        plan.mac = mac
            .parse::<MacAddress>()
            .with_context(|| format!("Invalid MAC address: {mac}"))?;
    }

    plan.target
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid target identity: {e}"))?;
    Ok(plan)
}

/// What the operator wants after a board
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NextStep {
    Next,
    Stop,
    Repeat,
}

fn parse_answer(answer: &str) -> Option<NextStep> {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Some(NextStep::Next),
        "n" | "no" => Some(NextStep::Stop),
        "r" | "repeat" => Some(NextStep::Repeat),
        _ => None,
    }
}

fn prompt_next(plan: &RunPlan) -> Result<NextStep> {
    let stdin = io::stdin();
    loop {
        print!("Continue with the next board? (r repeats {}) [Y/n/r] ", plan.board_sn);
        io::stdout().flush()?;

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(NextStep::Stop);
        }
        match parse_answer(&answer) {
            Some(step) => return Ok(step),
            None => println!("Please answer y, n or r."),
        }
    }
}

fn run_boards(args: cli::RunArgs, mut config: StationConfig, env: &EnvConfig) -> Result<()> {
    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(mask) = &args.mask {
        config.mask_path = mask.clone();
    }

    let report_format = ReportFormat::from_str(&args.report_format)
        .ok_or_else(|| anyhow::anyhow!("Unknown report format: {}", args.report_format))?;
    let formatter = console_formatter(&args.format)?;
    let operator = args
        .operator
        .clone()
        .unwrap_or_else(|| env.operator_or("operator"));

    let allocator = IdentityAllocator::open(&config.allocation)?;
    let mut plan = first_plan(&args, &allocator)?;

    let results_dir = config.results_dir.clone();
    let mut station = Station::from_config(config, report_format)?.with_allocator(allocator);
    if !args.no_save {
        station = station.with_storage(ResultsStorage::new(results_dir));
    }

    info!(
        "Station ready on {} with mask {}",
        station.config().serial.port,
        station.config().mask_path.display()
    );

    let mut records = Vec::new();
    loop {
        let board = BoardInfo::new(&operator, &plan.board_sn)
            .with_board_pn(&args.board_pn)
            .with_manuf_sn(&args.manuf_sn);

        match station.run(&plan, board) {
            Ok(record) => {
                println!("{}", formatter.format_record(&record));
                records.push(record);
            }
            Err(e) if args.continuous => {
                error!("Board {} aborted: {}", plan.board_sn, e);
            }
            Err(e) => return Err(e.into()),
        }

        if !args.continuous {
            break;
        }

        match prompt_next(&plan)? {
            NextStep::Next => {
                plan = match station.allocator() {
                    Some(allocator) => allocator.advance(&plan),
                    None => break,
                };
            }
            NextStep::Repeat => info!("Repeating board {}", plan.board_sn),
            NextStep::Stop => break,
        }
    }

    if args.continuous {
        println!("\n{}", formatter.format_session(&records));
    }

    Ok(())
}

fn judge_transcript(args: cli::JudgeArgs, config: &StationConfig, env: &EnvConfig) -> Result<()> {
    let mask_path = args.mask.clone().unwrap_or_else(|| config.mask_path.clone());
    let mask = TestMask::load(&mask_path)?;
    let transcript = Transcript::load(&args.transcript)?;
    let mac: MacAddress = args
        .mac
        .parse()
        .with_context(|| format!("Invalid MAC address: {}", args.mac))?;
    let target = match &args.ip {
        Some(ip) => NetworkIdentity::new(
            ip.as_str(),
            &config.allocation.netmask,
            &config.allocation.gateway,
        ),
        None => mask.ethernet.test_identity(),
    };

    if transcript.is_empty() {
        bail!("Transcript {} is empty", args.transcript.display());
    }
    if !transcript.contains(executor::END_OF_TESTS) {
        warn!("Transcript ends before the unit reported the end of tests");
    }
    info!(
        "Judging {} lines from {}",
        transcript.len(),
        args.transcript.display()
    );

    let board = BoardInfo::new(env.operator_or("operator"), &args.sn)
        .with_test_board(&mask.test_board_sn, &mask.test_board_pn);
    let report =
        Judge::new(&mask).evaluate(&transcript, board, &mac, &target, &ProbeStatus::NotAttempted);

    let formatter = console_formatter(&args.format)?;
    println!("{}", formatter.format_report(&report));

    if let Some(dir) = &args.report_dir {
        let path = CertificateRenderer::new(dir, ReportFormat::Text).render(&report)?;
        println!("✓ Certificate written to: {}", path.display());
    }

    Ok(())
}

fn manage_mask(args: cli::MaskArgs) -> Result<()> {
    match args.action {
        cli::MaskAction::Validate { file } => match TestMask::load(&file) {
            Ok(mask) => {
                println!("✓ Mask is valid: {}", file.display());
                println!("  Test board: {} ({})", mask.test_board_sn, mask.test_board_pn);
                println!("  LED threshold: {}", mask.led.mask);
                for (rail, tol) in &mask.power_supply {
                    println!(
                        "  Rail {:6} {:.3} .. {:.3}",
                        rail,
                        tol.low(),
                        tol.high()
                    );
                }
                println!("  Ethernet message: \"{}\"", mask.ethernet.message);
            }
            Err(e) => {
                println!("✗ Mask is invalid: {}", file.display());
                println!("  Error: {e}");
                return Err(e.into());
            }
        },

        cli::MaskAction::Example { output, yaml } => {
            let mask = TestMask::example();
            match output {
                Some(path) => {
                    mask.save(&path)?;
                    println!("✓ Example mask written to: {}", path.display());
                }
                None if yaml => println!("{}", serde_yaml::to_string(&mask)?),
                None => println!("{}", serde_json::to_string_pretty(&mask)?),
            }
        }
    }

    Ok(())
}

fn show_results(args: cli::ResultsArgs, config: &StationConfig) -> Result<()> {
    let storage = ResultsStorage::new(&config.results_dir);

    match args.action {
        cli::ResultsAction::List { sn: None } => {
            let boards = storage.list_boards()?;
            if boards.is_empty() {
                println!("\n📭 No stored results in {}.", storage.base_dir().display());
                println!("   Test a board with: uc-bringup run");
                return Ok(());
            }

            println!("\n┌──────────────────────┬──────────┬────────┐");
            println!("│ Board                │ Runs     │ Latest │");
            println!("├──────────────────────┼──────────┼────────┤");
            for board in &boards {
                let runs = storage.list_runs(board)?;
                if let Some(latest) = runs.first() {
                    println!(
                        "│ {:20} │ {:4} runs │ {:6} │",
                        board,
                        runs.len(),
                        if latest.passed { "PASS" } else { "FAIL" }
                    );
                }
            }
            println!("└──────────────────────┴──────────┴────────┘");
            println!("\nUse --sn <board> to list the runs of one board.\n");
        }

        cli::ResultsAction::List { sn: Some(sn) } => {
            let runs = storage.list_runs(&sn)?;
            if runs.is_empty() {
                println!("No runs stored for {sn}.");
                return Ok(());
            }
            print!("{}", console_formatter("table")?.format_runs(&runs));
        }

        cli::ResultsAction::Show { sn, run, format } => {
            let record = match run {
                Some(id) => storage.load(&sn, &id)?,
                None => storage
                    .latest(&sn)?
                    .ok_or_else(|| anyhow::anyhow!("No runs stored for {sn}"))?,
            };
            let formatter = console_formatter(&format)?;
            println!("{}", formatter.format_record(&record));
        }

        cli::ResultsAction::Export {
            sn,
            output,
            run,
            format,
        } => {
            let format = match format {
                Some(name) => ExportFormat::from_str(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown export format: {name}"))?,
                None => ExportFormat::from_extension(&output).ok_or_else(|| {
                    anyhow::anyhow!("Cannot infer export format of {}", output.display())
                })?,
            };
            let record = match run {
                Some(id) => storage.load(&sn, &id)?,
                None => storage
                    .latest(&sn)?
                    .ok_or_else(|| anyhow::anyhow!("No runs stored for {sn}"))?,
            };
            storage.export(&record, &output, format)?;
            println!("✓ Run {} exported to: {}", record.id, output.display());
        }

        cli::ResultsAction::Delete { sn, run } => {
            storage.delete(&sn, &run)?;
            println!("✓ Deleted run {run} of {sn}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, file: &ConfigFile, env: &EnvConfig) -> Result<()> {
    use config::print_env_help;

    match args.action {
        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            ConfigFile::example().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show => {
            println!("{}", serde_yaml::to_string(file)?);
        }

        cli::ConfigAction::Env => {
            print_env_help();
            if env.has_any() {
                println!();
                env.print_summary();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("\n"), Some(NextStep::Next));
        assert_eq!(parse_answer("Y\n"), Some(NextStep::Next));
        assert_eq!(parse_answer("n"), Some(NextStep::Stop));
        assert_eq!(parse_answer(" r "), Some(NextStep::Repeat));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn test_first_plan_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut allocation = config::AllocationConfig::default();
        allocation.table_path = dir.path().join("table.json");
        let allocator = IdentityAllocator::open(&allocation).unwrap();

        let args = cli::Args::parse_from([
            "uc-bringup",
            "run",
            "--sn",
            "CN00500",
            "--ip",
            "10.0.18.210",
            "--mac",
            "02:00:00:00:01:F4",
        ]);
        let cli::Command::Run(run) = args.command else {
            panic!("Expected Run command");
        };

        let plan = first_plan(&run, &allocator).unwrap();
        assert_eq!(plan.board_sn, "CN00500");
        assert_eq!(plan.target.ip, "10.0.18.210");
        assert_eq!(plan.target.gateway, "10.0.18.1");
        assert_eq!(plan.mac.raw(), "0200000001F4");
    }

    #[test]
    fn test_first_plan_rejects_bad_ip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut allocation = config::AllocationConfig::default();
        allocation.table_path = dir.path().join("table.json");
        let allocator = IdentityAllocator::open(&allocation).unwrap();

        let args = cli::Args::parse_from(["uc-bringup", "run", "--ip", "10.0.18"]);
        let cli::Command::Run(run) = args.command else {
            panic!("Expected Run command");
        };
        assert!(first_plan(&run, &allocator).is_err());
    }
}
