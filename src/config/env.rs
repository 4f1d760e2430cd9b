//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::str::FromStr;

use crate::scheduler::StatusSignal;
use crate::utils::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "TALLY";

/// Worker count key kept for compatibility with older runners
const LEGACY_WORKERS_KEY: &str = "N";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Worker count from TALLY_WORKERS, or N
    pub workers: Option<usize>,
    /// Seed from TALLY_SEED
    pub seed: Option<u64>,
    /// Verbose from TALLY_VERBOSE
    pub verbose: Option<bool>,
    /// Unfiltered backtraces from TALLY_DEBUG
    pub debug: Option<bool>,
    /// Skip hint suppression from TALLY_NO_SKIP_MSG
    pub no_skip_message: Option<bool>,
    /// Status signal from TALLY_STATUS_SIGNAL
    pub status_signal: Option<StatusSignal>,
    /// Log level from TALLY_LOG
    pub log_level: Option<LogLevel>,
    /// Config file from TALLY_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            workers: get_env_parse("WORKERS")
                .or_else(|| env::var(LEGACY_WORKERS_KEY).ok()?.parse().ok()),
            seed: get_env_parse("SEED"),
            verbose: get_env_bool("VERBOSE"),
            debug: get_env_bool("DEBUG"),
            no_skip_message: get_env_bool("NO_SKIP_MSG"),
            status_signal: get_env_parse("STATUS_SIGNAL"),
            log_level: get_env_parse("LOG"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.workers.is_some()
            || self.seed.is_some()
            || self.verbose.is_some()
            || self.debug.is_some()
            || self.no_skip_message.is_some()
            || self.status_signal.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
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

/// Builder for setting environment variables (useful for testing)
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: &str, value: impl ToString) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_{name}"), value.to_string()));
        self
    }

    pub fn workers(self, workers: usize) -> Self {
        self.set("WORKERS", workers)
    }

    /// Set the unprefixed worker count key
    pub fn legacy_workers(mut self, workers: usize) -> Self {
        self.vars
            .push((LEGACY_WORKERS_KEY.to_string(), workers.to_string()));
        self
    }

    pub fn seed(self, seed: u64) -> Self {
        self.set("SEED", seed)
    }

    pub fn verbose(self, verbose: bool) -> Self {
        self.set("VERBOSE", verbose)
    }

    pub fn debug(self, debug: bool) -> Self {
        self.set("DEBUG", debug)
    }

    pub fn no_skip_message(self, value: impl Into<String>) -> Self {
        self.set("NO_SKIP_MSG", value.into())
    }

    pub fn status_signal(self, signal: impl Into<String>) -> Self {
        self.set("STATUS_SIGNAL", signal.into())
    }

    pub fn log(self, level: impl Into<String>) -> Self {
        self.set("LOG", level.into())
    }

    pub fn config_file(self, path: impl Into<String>) -> Self {
        self.set("CONFIG", path.into())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

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

/// Text describing every TALLY environment variable
pub fn env_help() -> String {
    let p = ENV_PREFIX;
    [
        "Environment Variables:".to_string(),
        String::new(),
        format!("  {p}_WORKERS        Worker threads for parallel suites (default 2, also N)"),
        format!("  {p}_SEED           Shuffle seed"),
        format!("  {p}_VERBOSE        Verbose progress output (true/false)"),
        format!("  {p}_DEBUG          Show unfiltered backtraces (true/false)"),
        format!("  {p}_NO_SKIP_MSG    Hide the skipped-tests hint (true/false)"),
        format!("  {p}_STATUS_SIGNAL  Signal that dumps current results (usr1, usr2, info)"),
        format!("  {p}_LOG            Log level (error, warn, info, debug, trace)"),
        format!("  {p}_CONFIG         Path to configuration file"),
        String::new(),
        "Example:".to_string(),
        format!("  export {p}_WORKERS=8"),
        format!("  export {p}_SEED=4242"),
        "  tally --name /parse/".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialises tests that touch the process environment
    pub fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::env_lock;
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.workers.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_builder() {
        let _lock = env_lock();
        let _guard = EnvBuilder::new()
            .workers(6)
            .seed(4242)
            .status_signal("usr2")
            .log("debug")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.workers, Some(6));
        assert_eq!(config.seed, Some(4242));
        assert_eq!(config.status_signal, Some(StatusSignal::Usr2));
        assert_eq!(config.log_level, Some(LogLevel::Debug));
        assert!(config.has_any());
    }

    #[test]
    fn test_env_bool_parsing() {
        let _lock = env_lock();
        let _guard = EnvBuilder::new()
            .verbose(true)
            .no_skip_message("enabled")
            .debug(false)
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.verbose, Some(true));
        assert_eq!(config.no_skip_message, Some(true));
        assert_eq!(config.debug, Some(false));
    }

    #[test]
    fn test_legacy_worker_key() {
        let _lock = env_lock();
        let _guard = EnvBuilder::new().legacy_workers(3).apply_scoped();
        assert_eq!(EnvConfig::load().workers, Some(3));

        let _prefixed = EnvBuilder::new().workers(5).apply_scoped();
        assert_eq!(EnvConfig::load().workers, Some(5));
    }

    #[test]
    fn test_guard_restores_previous_values() {
        let _lock = env_lock();
        let key = "TALLY_CONFIG";
        env::remove_var(key);
        {
            let _guard = EnvBuilder::new().config_file("/tmp/tally.yaml").apply_scoped();
            assert_eq!(env::var(key).unwrap(), "/tmp/tally.yaml");
        }
        assert!(env::var(key).is_err());
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let _lock = env_lock();
        let _guard = EnvBuilder::new()
            .status_signal("hup")
            .log("loud")
            .apply_scoped();

        let config = EnvConfig::load();
        assert!(config.status_signal.is_none());
        assert!(config.log_level.is_none());
    }
}
