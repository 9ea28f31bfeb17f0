//! Run orchestrator
//!
//! Sequences one unit through the station: mask, test firmware, test pass,
//! judgement, store pass, deploy firmware, certificate, storage.

use chrono::Utc;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::dialogue::{DialogueDriver, PassKind, PassOutcome};
use crate::config::{MaskError, StationConfig, TestMask};
use crate::judge::Judge;
use crate::models::{BoardInfo, RunPlan};
use crate::net::{EthernetVerifier, Prober};
use crate::program::{FirmwareProgrammer, Lpc21Isp, ProgramError};
use crate::results::{
    CertificateRenderer, DeployStatus, EnvironmentInfo, IdentityAllocator, PhaseTiming,
    ReportFormat, ReportRenderer, ResultsStorage, RunRecord,
};
use crate::serial::{ChannelError, ChannelOpener, SerialOpener};
use crate::utils::Stopwatch;

/// Failures that end a run before a verdict exists
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] MaskError),

    #[error("Test firmware programming failed: {0}")]
    Programming(#[from] ProgramError),

    #[error("Serial channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// The bring-up station and its collaborators
pub struct Station {
    config: StationConfig,
    programmer: Box<dyn FirmwareProgrammer>,
    prober: Box<dyn Prober>,
    opener: Box<dyn ChannelOpener>,
    renderer: Box<dyn ReportRenderer>,
    storage: Option<ResultsStorage>,
    allocator: Option<IdentityAllocator>,
}

impl Station {
    pub fn new(
        config: StationConfig,
        programmer: Box<dyn FirmwareProgrammer>,
        prober: Box<dyn Prober>,
        opener: Box<dyn ChannelOpener>,
        renderer: Box<dyn ReportRenderer>,
    ) -> Self {
        Self {
            config,
            programmer,
            prober,
            opener,
            renderer,
            storage: None,
            allocator: None,
        }
    }

    /// Station wired to real hardware
    pub fn from_config(config: StationConfig, format: ReportFormat) -> Result<Self, ProgramError> {
        let programmer = Lpc21Isp::new(&config.programmer)?;
        let prober = EthernetVerifier::new(&config.probe);
        let opener = SerialOpener::new(config.serial.clone());
        let renderer = CertificateRenderer::new(&config.reports_dir, format);

        Ok(Self::new(
            config,
            Box::new(programmer),
            Box::new(prober),
            Box::new(opener),
            Box::new(renderer),
        ))
    }

    pub fn with_storage(mut self, storage: ResultsStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_allocator(mut self, allocator: IdentityAllocator) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn allocator(&self) -> Option<&IdentityAllocator> {
        self.allocator.as_ref()
    }

    /// Run one unit from blank flash to deployed firmware
    pub fn run(&mut self, plan: &RunPlan, board: BoardInfo) -> Result<RunRecord, RunError> {
        let started_at = Utc::now();
        let mut stopwatch = Stopwatch::new();
        let port = self.config.serial.port.clone();
        info!("=== Board {} (MAC {}) ===", plan.board_sn, plan.mac);

        let mask = TestMask::load(&self.config.mask_path)?;
        let board = board.with_test_board(&mask.test_board_sn, &mask.test_board_pn);
        stopwatch.lap("mask");

        self.programmer
            .program(&self.config.firmware.test_image, &port)?;
        stopwatch.lap("test firmware");

        let mut channel = self.opener.open()?;
        let driver = DialogueDriver::new(&self.config.dialogue, self.prober.as_ref());
        let mut notes = Vec::new();

        let test_pass = driver.run_pass(
            channel.as_mut(),
            PassKind::Test,
            &plan.mac,
            &mask.ethernet.test_identity(),
        );
        if let Some(reason) = aborted(&test_pass.outcome) {
            notes.push(format!("test pass aborted: {reason}"));
        }
        stopwatch.lap("test pass");

        let report = Judge::new(&mask).evaluate(
            &test_pass.transcript,
            board,
            &plan.mac,
            &plan.target,
            &test_pass.probe,
        );
        stopwatch.lap("judge");

        let deployed = if report.passed {
            plan.target.clone()
        } else {
            info!("Unit failed, committing the generic identity");
            mask.ethernet.generic_identity()
        };

        let store_pass = driver.run_pass(channel.as_mut(), PassKind::Store, &plan.mac, &deployed);
        if let Some(reason) = aborted(&store_pass.outcome) {
            notes.push(format!("store pass aborted: {reason}"));
        }
        stopwatch.lap("store pass");

        // The bootloader needs the port
        drop(channel);

        let deploy_image = self.config.firmware.deploy_image(&deployed.ip);
        let deploy = self.program_deploy(&deploy_image, &port);
        if let DeployStatus::Failed(reason) = &deploy {
            notes.push(format!("deploy programming failed: {reason}"));
        }
        stopwatch.lap("deploy firmware");

        let mut record = RunRecord::new(
            started_at,
            report,
            vec![test_pass, store_pass],
            deployed,
            EnvironmentInfo::new(&port),
        );
        record.deploy_image = deploy_image;
        record.deploy = deploy;

        match self.renderer.render(&record.report) {
            Ok(path) => record.report_path = Some(path),
            Err(e) => {
                warn!("Report rendering failed: {:#}", e);
                notes.push(format!("report rendering failed: {e:#}"));
            }
        }
        stopwatch.lap("report");

        if let Some(allocator) = self.allocator.as_mut() {
            if let Err(e) = allocator.record(plan, &record.deployed.ip, record.passed) {
                warn!("Failed to update allocation table: {:#}", e);
                notes.push(format!("allocation table not updated: {e:#}"));
            }
        }

        record.notes = notes;
        debug!("Phase timing for {}:\n{}", record.board_sn, stopwatch.format());
        record.phases = stopwatch
            .lap_times()
            .into_iter()
            .map(|(phase, d)| PhaseTiming {
                phase,
                duration_ms: d.as_millis() as u64,
            })
            .collect();
        record.completed_at = Utc::now();

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(&record) {
                error!("Failed to save run record: {:#}", e);
            }
        }

        info!(
            "Board {} finished in {}ms: {}",
            record.board_sn,
            record.duration_ms(),
            if record.passed { "PASS" } else { "FAIL" }
        );
        Ok(record)
    }

    fn program_deploy(&self, image: &Path, port: &str) -> DeployStatus {
        match self.programmer.program(image, port) {
            Ok(()) => DeployStatus::Programmed,
            Err(e) => {
                warn!("Deploy firmware programming failed: {}", e);
                DeployStatus::Failed(e.to_string())
            }
        }
    }
}

fn aborted(outcome: &PassOutcome) -> Option<String> {
    match outcome {
        PassOutcome::Completed => None,
        PassOutcome::Aborted(e) => Some(e.to_string()),
    }
}
