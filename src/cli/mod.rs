//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Factory bring-up station for microcontroller boards
#[derive(Parser, Debug)]
#[command(name = "uc-bringup")]
#[command(version)]
#[command(about = "Program, self-test, judge and certify microcontroller boards")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output (same as --log-level debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Station configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Test boards on the station
    Run(RunArgs),

    /// Judge a saved transcript offline
    Judge(JudgeArgs),

    /// Inspect test masks
    Mask(MaskArgs),

    /// View stored run records
    Results(ResultsArgs),

    /// Manage station configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Board serial number (default: next in the allocation table)
    #[arg(long)]
    pub sn: Option<String>,

    /// IP address to commit on success (default: next in the pool)
    #[arg(long)]
    pub ip: Option<String>,

    /// MAC address, colon-delimited or raw hex (default: next in the table)
    #[arg(long)]
    pub mac: Option<String>,

    /// Operator name printed on the certificate
    #[arg(long)]
    pub operator: Option<String>,

    /// Board part number
    #[arg(long, default_value = "")]
    pub board_pn: String,

    /// Manufacturer serial number
    #[arg(long, default_value = "")]
    pub manuf_sn: String,

    /// Keep testing boards, prompting between them
    #[arg(long)]
    pub continuous: bool,

    /// Serial port of the unit
    #[arg(short, long)]
    pub port: Option<String>,

    /// Test mask file
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Certificate format (text, markdown)
    #[arg(long, default_value = "text")]
    pub report_format: String,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Do not store the run record
    #[arg(long)]
    pub no_save: bool,
}

/// Arguments for judge command
#[derive(Parser, Debug)]
pub struct JudgeArgs {
    /// Transcript file, one received line per line
    pub transcript: PathBuf,

    /// Test mask file
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Board serial number for the report
    #[arg(long, default_value = "UNKNOWN")]
    pub sn: String,

    /// MAC address sent to the unit
    #[arg(long, default_value = "000000000000")]
    pub mac: String,

    /// IP address that would have been committed
    #[arg(long)]
    pub ip: Option<String>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Also render a certificate into this directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

/// Arguments for mask command
#[derive(Parser, Debug)]
pub struct MaskArgs {
    #[command(subcommand)]
    pub action: MaskAction,
}

#[derive(Subcommand, Debug)]
pub enum MaskAction {
    /// Check a mask file
    Validate {
        /// Mask file (JSON or YAML)
        file: PathBuf,
    },

    /// Print or write an example mask
    Example {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print as YAML
        #[arg(long)]
        yaml: bool,
    },
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List tested boards, or the runs of one board
    List {
        /// Board serial number
        #[arg(long)]
        sn: Option<String>,
    },

    /// Show one run (default: the latest of the board)
    Show {
        /// Board serial number
        sn: String,

        /// Run ID
        #[arg(long)]
        run: Option<String>,

        /// Output format (table, json, json-pretty, summary)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Export one run as JSON or CSV
    Export {
        /// Board serial number
        sn: String,

        /// Destination file
        output: PathBuf,

        /// Run ID (default: latest)
        #[arg(long)]
        run: Option<String>,

        /// Export format (json, csv); inferred from the extension when omitted
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Delete one run
    Delete {
        /// Board serial number
        sn: String,

        /// Run ID
        run: String,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Destination file
        #[arg(default_value = "uc-bringup.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Describe the environment overrides
    Env,
}
