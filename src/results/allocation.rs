//! Serial number and network identity allocation
//!
//! Every tested board is appended to a JSON table; the next board's SN, IP and
//! MAC are derived from the last entry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::AllocationConfig;
use crate::models::{MacAddress, NetworkIdentity, RunPlan};

/// One tested board
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub sn: String,
    pub ip: String,
    pub mac: MacAddress,
    pub result: String,
}

/// Ordered table of tested boards
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationTable {
    entries: Vec<AllocationEntry>,
}

impl AllocationTable {
    /// Load the table; a missing file is an empty table
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("{} not found, a new table will be created", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse allocation table {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&AllocationEntry> {
        self.entries.last()
    }

    #[cfg(test)]
    pub fn find(&self, sn: &str) -> Option<&AllocationEntry> {
        self.entries.iter().find(|e| e.sn == sn)
    }

    /// Record a board; a retested SN replaces its earlier entry
    pub fn upsert(&mut self, entry: AllocationEntry) {
        self.entries.retain(|e| e.sn != entry.sn);
        self.entries.push(entry);
    }
}

/// Increment the last run of digits, keeping its width where possible
pub fn next_serial(sn: &str) -> String {
    let bytes = sn.as_bytes();
    let Some(end) = bytes.iter().rposition(|b| b.is_ascii_digit()).map(|i| i + 1) else {
        return sn.to_string();
    };
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);

    let digits = &sn[start..end];
    let next = match digits.parse::<u128>() {
        Ok(n) => (n + 1).to_string(),
        Err(_) => return sn.to_string(),
    };
    let width = digits.len().max(next.len());
    format!("{}{:0>width$}{}", &sn[..start], next, &sn[end..])
}

/// Next address of the pool, wrapping to the first host past the last one
pub fn next_ip(ip: &str, config: &AllocationConfig) -> String {
    let first = format!("{}{}", config.ip_base, config.first_host);
    let Some((prefix, host)) = ip.rsplit_once('.') else {
        return first;
    };

    match host.parse::<u8>().ok().and_then(|h| h.checked_add(1)) {
        Some(h) if h >= config.first_host && h <= config.last_host => format!("{prefix}.{h}"),
        _ => first,
    }
}

/// Hands out the identity for each board and records the outcome
pub struct IdentityAllocator {
    config: AllocationConfig,
    path: PathBuf,
    table: AllocationTable,
}

impl IdentityAllocator {
    pub fn open(config: &AllocationConfig) -> Result<Self> {
        let table = AllocationTable::load(&config.table_path)?;
        debug!(
            "Allocation table {} has {} entries",
            config.table_path.display(),
            table.entries().len()
        );

        Ok(Self {
            config: config.clone(),
            path: config.table_path.clone(),
            table,
        })
    }

    #[cfg(test)]
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Identity for the next untested board
    pub fn next_plan(&self) -> Result<RunPlan> {
        match self.table.last() {
            Some(last) => Ok(RunPlan {
                board_sn: next_serial(&last.sn),
                mac: last.mac.next(),
                target: self.identity(next_ip(&last.ip, &self.config)),
            }),
            None => Ok(RunPlan {
                board_sn: self.config.first_sn.clone(),
                mac: self
                    .config
                    .first_mac
                    .parse()
                    .with_context(|| format!("Invalid first MAC '{}'", self.config.first_mac))?,
                target: self.identity(format!("{}{}", self.config.ip_base, self.config.first_host)),
            }),
        }
    }

    /// Identity for the board after `plan`
    pub fn advance(&self, plan: &RunPlan) -> RunPlan {
        RunPlan {
            board_sn: next_serial(&plan.board_sn),
            mac: plan.mac.next(),
            target: self.identity(next_ip(&plan.target.ip, &self.config)),
        }
    }

    /// Pool identity for `ip`
    pub fn identity(&self, ip: impl Into<String>) -> NetworkIdentity {
        NetworkIdentity::new(ip, &self.config.netmask, &self.config.gateway)
    }

    /// Append the board's outcome and persist the table
    pub fn record(&mut self, plan: &RunPlan, deployed_ip: &str, passed: bool) -> Result<()> {
        self.table.upsert(AllocationEntry {
            sn: plan.board_sn.clone(),
            ip: deployed_ip.to_string(),
            mac: plan.mac.clone(),
            result: if passed { "pass" } else { "fail" }.to_string(),
        });
        self.table.save(&self.path)?;
        info!("Recorded {} ({}) in {}", plan.board_sn, deployed_ip, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AllocationConfig {
        AllocationConfig {
            table_path: dir.path().join("ip_sn_table.json"),
            ..AllocationConfig::default()
        }
    }

    #[test]
    fn test_next_serial() {
        assert_eq!(next_serial("CN00001"), "CN00002");
        assert_eq!(next_serial("CN00009"), "CN00010");
        assert_eq!(next_serial("CN99"), "CN100");
        assert_eq!(next_serial("A12-B07x"), "A12-B08x");
        assert_eq!(next_serial("NODIGITS"), "NODIGITS");
    }

    #[test]
    fn test_next_ip_wraps_within_pool() {
        let config = AllocationConfig::default();
        assert_eq!(next_ip("10.0.18.201", &config), "10.0.18.202");
        assert_eq!(next_ip("10.0.18.212", &config), "10.0.18.213");
        assert_eq!(next_ip("10.0.18.213", &config), "10.0.18.201");
        assert_eq!(next_ip("192.168.0.50", &config), "10.0.18.201");
        assert_eq!(next_ip("garbage", &config), "10.0.18.201");
        assert_eq!(next_ip("10.0.18.255", &config), "10.0.18.201");
        assert_eq!(next_ip("10.0.18.65535", &config), "10.0.18.201");
    }

    #[test]
    fn test_defaults_for_empty_table() {
        let dir = TempDir::new().unwrap();
        let allocator = IdentityAllocator::open(&config(&dir)).unwrap();
        let plan = allocator.next_plan().unwrap();

        assert_eq!(plan.board_sn, "CN00001");
        assert_eq!(plan.mac.raw(), "020000000001");
        assert_eq!(plan.target.ip, "10.0.18.201");
        assert_eq!(plan.target.gateway, "10.0.18.1");
    }

    #[test]
    fn test_record_then_next() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut allocator = IdentityAllocator::open(&cfg).unwrap();
        let plan = allocator.next_plan().unwrap();
        allocator.record(&plan, "10.0.18.201", true).unwrap();

        let reopened = IdentityAllocator::open(&cfg).unwrap();
        assert_eq!(reopened.table().entries().len(), 1);
        assert_eq!(reopened.table().entries()[0].result, "pass");

        let next = reopened.next_plan().unwrap();
        assert_eq!(next.board_sn, "CN00002");
        assert_eq!(next.mac.raw(), "020000000002");
        assert_eq!(next.target.ip, "10.0.18.202");
        assert_eq!(next, reopened.advance(&plan));
    }

    #[test]
    fn test_failed_board_records_generic_ip() {
        let dir = TempDir::new().unwrap();
        let mut allocator = IdentityAllocator::open(&config(&dir)).unwrap();
        let plan = allocator.next_plan().unwrap();
        allocator.record(&plan, "192.168.0.200", false).unwrap();

        let next = allocator.next_plan().unwrap();
        assert_eq!(next.target.ip, "10.0.18.201");
        assert_eq!(allocator.table().find("CN00001").unwrap().result, "fail");
    }

    #[test]
    fn test_retest_replaces_entry() {
        let mut table = AllocationTable::default();
        let entry = |sn: &str, result: &str| AllocationEntry {
            sn: sn.to_string(),
            ip: "10.0.18.201".to_string(),
            mac: "020000000001".parse().unwrap(),
            result: result.to_string(),
        };
        table.upsert(entry("CN00001", "fail"));
        table.upsert(entry("CN00002", "pass"));
        table.upsert(entry("CN00001", "pass"));

        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.last().unwrap().sn, "CN00001");
        assert_eq!(table.find("CN00001").unwrap().result, "pass");
    }

    #[test]
    fn test_table_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(
            &path,
            r#"[{"sn": "CN00007", "ip": "10.0.18.207", "mac": "02:00:00:00:00:07", "result": "pass"}]"#,
        )
        .unwrap();

        let table = AllocationTable::load(&path).unwrap();
        assert_eq!(table.last().unwrap().mac.raw(), "020000000007");
    }
}
