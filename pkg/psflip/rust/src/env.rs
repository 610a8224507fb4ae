// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::ConfigError;
use std::fmt;

/// Environment variable carrying the blue/green parity between generations.
pub const GENERATION_ENV: &str = "PSFLIP_AB_FLAG";

/// Split `KEY=VALUE` entries on the first `=`. Values may be empty or contain `=`.
pub fn parse_env_entries(entries: &[String]) -> Result<Vec<(String, String)>, ConfigError> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ConfigError::InvalidEnv(entry.clone())),
        })
        .collect()
}

/// Parity of the current supervisor generation. Alternates on every upgrade
/// so consecutive workers can pick distinct ports or paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    A,
    B,
}

impl Generation {
    /// The first generation is `A`; a generation started from `A` is `B` and vice versa.
    pub fn from_inherited(value: Option<&str>) -> Self {
        match value {
            Some("a") => Generation::B,
            _ => Generation::A,
        }
    }

    pub fn current() -> Self {
        Self::from_inherited(std::env::var(GENERATION_ENV).ok().as_deref())
    }

    /// Resolve the current generation and export it to our own environment,
    /// so a supervisor re-executed from this process starts as the other one.
    ///
    /// # Safety
    ///
    /// No other thread may read or write the environment while this runs.
    pub unsafe fn adopt() -> Self {
        let generation = Self::current();
        // SAFETY: the caller guarantees exclusive access to the environment.
        unsafe { std::env::set_var(GENERATION_ENV, generation.as_str()) };
        generation
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Generation::A => "a",
            Generation::B => "b",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Generation::A => "blue",
            Generation::B => "green",
        }
    }

    pub fn env_entry(self) -> (String, String) {
        (GENERATION_ENV.to_string(), self.as_str().to_string())
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.color())
    }
}
