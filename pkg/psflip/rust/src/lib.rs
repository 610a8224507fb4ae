// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod config;
pub mod env;
pub mod healthcheck;
pub mod pidfile;
pub mod pidwatch;
pub mod process;
pub mod proxy;
pub mod relay;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod upgrader;

pub use config::Config;
pub use healthcheck::{Healthcheck, HealthcheckConfig, HealthcheckError};
pub use process::{Worker, WorkerSpec, exit_code};
pub use proxy::{ProxyError, TcpProxy};
pub use shutdown::{Termination, terminate};
pub use state::SupervisorState;
pub use supervisor::{Supervisor, SupervisorOptions};
pub use upgrader::{StandaloneUpgrader, Upgrader};
