//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "UC_BRINGUP";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Serial port from UC_BRINGUP_PORT
    pub port: Option<String>,
    /// Mask file from UC_BRINGUP_MASK
    pub mask: Option<String>,
    /// Config file from UC_BRINGUP_CONFIG
    pub config_file: Option<String>,
    /// Operator name from UC_BRINGUP_OPERATOR
    pub operator: Option<String>,
    /// Reports directory from UC_BRINGUP_REPORTS
    pub reports: Option<String>,
    /// Results directory from UC_BRINGUP_RESULTS
    pub results: Option<String>,
    /// Verbose from UC_BRINGUP_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            port: get_env("PORT"),
            mask: get_env("MASK"),
            config_file: get_env("CONFIG"),
            operator: get_env("OPERATOR"),
            reports: get_env("REPORTS"),
            results: get_env("RESULTS"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.port.is_some()
            || self.mask.is_some()
            || self.config_file.is_some()
            || self.operator.is_some()
            || self.reports.is_some()
            || self.results.is_some()
            || self.verbose.is_some()
    }

    /// Get operator with fallback
    pub fn operator_or(&self, default: &str) -> String {
        self.operator.clone().unwrap_or_else(|| default.to_string())
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_PORT:      {:?}", ENV_PREFIX, self.port);
        println!("  {}_MASK:      {:?}", ENV_PREFIX, self.mask);
        println!("  {}_CONFIG:    {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_OPERATOR:  {:?}", ENV_PREFIX, self.operator);
        println!("  {}_REPORTS:   {:?}", ENV_PREFIX, self.reports);
        println!("  {}_RESULTS:   {:?}", ENV_PREFIX, self.results);
        println!("  {}_VERBOSE:   {:?}", ENV_PREFIX, self.verbose);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_PORT"), port.into()));
        self
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_OPERATOR"), operator.into()));
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_VERBOSE"), verbose.to_string()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all UC_BRINGUP environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PORT       Serial port of the unit under test");
    println!("  {ENV_PREFIX}_MASK       Path to the test mask");
    println!("  {ENV_PREFIX}_CONFIG     Path to the station configuration file");
    println!("  {ENV_PREFIX}_OPERATOR   Operator name printed on certificates");
    println!("  {ENV_PREFIX}_REPORTS    Directory for rendered certificates");
    println!("  {ENV_PREFIX}_RESULTS    Directory for stored run records");
    println!("  {ENV_PREFIX}_VERBOSE    Enable debug logging (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_PORT=/dev/ttyUSB1");
    println!("  export {ENV_PREFIX}_OPERATOR=\"Jane Doe\"");
    println!("  uc-bringup run");
}
