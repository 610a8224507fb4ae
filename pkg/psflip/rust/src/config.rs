// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::{Generation, parse_env_entries};
use crate::healthcheck::HealthcheckConfig;
use crate::process::WorkerSpec;
use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cmd must not be empty")]
    EmptyCommand,
    #[error("invalid env entry {0:?}: expected KEY=VALUE")]
    InvalidEnv(String),
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    #[error("multiple healthchecks configured: {0}")]
    MultipleHealthchecks(String),
    #[error("healthcheck {0}: cmd must not be empty")]
    EmptyHealthcheckCommand(&'static str),
    #[error("healthcheck {0}: interval must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("proxy entry {0}: listen and backend are required")]
    IncompleteProxy(usize),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Worker command line; the first element is resolved on PATH.
    pub cmd: Vec<String>,
    /// Extra `KEY=VALUE` entries appended to the inherited environment.
    #[serde(default)]
    pub env: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub proxy: Vec<ProxyConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Signal that asks the upgrader for a new generation. Never relayed.
    #[serde(default = "default_upgrade_signal", deserialize_with = "deserialize_signal")]
    pub signal: Signal,
    /// How long a fresh worker may take to become healthy.
    #[serde(default = "default_upgrade_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Signal sent to the worker to ask for a graceful exit.
    #[serde(default = "default_shutdown_signal", deserialize_with = "deserialize_signal")]
    pub signal: Signal,
    /// Grace period before the worker gets SIGKILL.
    #[serde(default = "default_shutdown_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the supervisor listens on, e.g. `0.0.0.0:8080`.
    pub listen: String,
    /// Address of the worker the connections are relayed to.
    pub backend: String,
}

fn default_upgrade_signal() -> Signal {
    Signal::SIGHUP
}

fn default_upgrade_timeout() -> Duration {
    DEFAULT_UPGRADE_TIMEOUT
}

fn default_shutdown_signal() -> Signal {
    Signal::SIGTERM
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            signal: default_upgrade_signal(),
            timeout: default_upgrade_timeout(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signal: default_shutdown_signal(),
            timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Read, parse and validate the YAML configuration at `path`.
    pub fn load(path: &Path) -> Result<Config> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cmd.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        parse_env_entries(&self.env)?;
        self.healthcheck.validate()?;
        for (i, p) in self.proxy.iter().enumerate() {
            if p.listen.is_empty() || p.backend.is_empty() {
                return Err(ConfigError::IncompleteProxy(i));
            }
        }
        Ok(())
    }

    /// Build the worker launch description for this generation.
    pub fn worker_spec(&self, generation: Generation) -> Result<WorkerSpec, ConfigError> {
        let mut env = parse_env_entries(&self.env)?;
        env.push(generation.env_entry());
        Ok(WorkerSpec {
            command: self.cmd.clone(),
            env,
            working_dir: self.workdir.clone(),
        })
    }
}

/// Accepts `SIGHUP`, `HUP` and `hup`.
pub fn parse_signal(s: &str) -> Result<Signal, ConfigError> {
    let upper = s.trim().to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| ConfigError::InvalidSignal(s.to_string()))
}

pub(crate) fn deserialize_signal<'de, D>(deserializer: D) -> Result<Signal, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_signal(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration {s:?}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
cmd: ["/usr/bin/server", "--port", "8081"]
env: ["MODE=prod", "EMPTY="]
workdir: /srv
pidfile: /run/psflip.pid
quiet: true
upgrade:
  signal: USR2
  timeout: 30s
shutdown:
  signal: sigint
  timeout: 500ms
healthcheck:
  command:
    cmd: ["curl", "-sf", "http://localhost:8081/health"]
    after: 1s
    interval: 250ms
proxy:
  - listen: 0.0.0.0:8080
    backend: 127.0.0.1:8081
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert_eq!(cfg.cmd, vec!["/usr/bin/server", "--port", "8081"]);
        assert_eq!(cfg.workdir.as_deref(), Some(Path::new("/srv")));
        assert_eq!(cfg.pidfile.as_deref(), Some(Path::new("/run/psflip.pid")));
        assert!(cfg.quiet);
        assert_eq!(cfg.upgrade.signal, Signal::SIGUSR2);
        assert_eq!(cfg.upgrade.timeout, Duration::from_secs(30));
        assert_eq!(cfg.shutdown.signal, Signal::SIGINT);
        assert_eq!(cfg.shutdown.timeout, Duration::from_millis(500));
        let command = cfg.healthcheck.command.as_ref().unwrap();
        assert_eq!(command.after, Duration::from_secs(1));
        assert_eq!(command.interval, Duration::from_millis(250));
        assert_eq!(cfg.proxy.len(), 1);
        assert_eq!(cfg.proxy.first().unwrap().backend, "127.0.0.1:8081");
    }

    #[test]
    fn test_parse_minimal_config_defaults() {
        let cfg = Config::parse("cmd: [/bin/true]\n").unwrap();
        assert!(cfg.env.is_empty());
        assert!(!cfg.quiet);
        assert_eq!(cfg.upgrade.signal, Signal::SIGHUP);
        assert_eq!(cfg.upgrade.timeout, Duration::from_secs(60));
        assert_eq!(cfg.shutdown.signal, Signal::SIGTERM);
        assert_eq!(cfg.shutdown.timeout, Duration::from_secs(10));
        assert!(cfg.healthcheck.alive.is_none());
        assert!(cfg.proxy.is_empty());
    }

    #[test]
    fn test_empty_cmd_rejected() {
        let err = Config::parse("cmd: []\n").unwrap_err();
        assert!(err.to_string().contains("cmd must not be empty"), "{err}");
    }

    #[test]
    fn test_multiple_healthchecks_rejected() {
        let yaml = r#"
cmd: [/bin/true]
healthcheck:
  alive: { timeout: 1s }
  command: { cmd: [/bin/true] }
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("multiple healthchecks"), "{err}");
    }

    #[test]
    fn test_invalid_signal_rejected() {
        let err = Config::parse("cmd: [/bin/true]\nupgrade: { signal: NOPE }\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid signal"), "{err:#}");
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = Config::parse("cmd: [/bin/true]\nshutdown: { timeout: soon }\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid duration"), "{err:#}");
    }

    #[test]
    fn test_invalid_env_rejected() {
        let err = Config::parse("cmd: [/bin/true]\nenv: [NOEQUALS]\n").unwrap_err();
        assert!(err.to_string().contains("KEY=VALUE"), "{err}");
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::parse("cmd: [/bin/true]\nbogus: 1\n").is_err());
    }

    #[test]
    fn test_incomplete_proxy_rejected() {
        let yaml = "cmd: [/bin/true]\nproxy:\n  - { listen: '127.0.0.1:0', backend: '' }\n";
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("proxy entry 0"), "{err}");
    }

    #[test]
    fn test_parse_signal_forms() {
        assert_eq!(parse_signal("SIGHUP").unwrap(), Signal::SIGHUP);
        assert_eq!(parse_signal("hup").unwrap(), Signal::SIGHUP);
        assert_eq!(parse_signal("Term").unwrap(), Signal::SIGTERM);
        assert!(parse_signal("").is_err());
    }

    #[test]
    fn test_worker_spec_includes_generation() {
        let cfg = Config::parse("cmd: [/bin/sleep, '1']\nenv: [A=1]\n").unwrap();
        let spec = cfg.worker_spec(Generation::B).unwrap();
        assert_eq!(spec.command, vec!["/bin/sleep", "1"]);
        assert!(spec.env.contains(&("A".to_string(), "1".to_string())));
        assert!(spec.env.contains(&Generation::B.env_entry()));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "cmd: [/bin/true]\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.cmd, vec!["/bin/true"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(err.to_string().contains("reading"), "{err}");
    }
}
