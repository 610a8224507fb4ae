// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Worker is being launched.
    Starting,
    /// Worker is alive, waiting for the healthcheck, deadline or an early exit.
    HealthChecking,
    /// Healthcheck passed. Entered at most once.
    Ready,
    /// Worker is being terminated.
    ShuttingDown,
    /// Terminal. Carries the final exit code.
    Exited(i32),
}

impl SupervisorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SupervisorState::Exited(_))
    }

    /// Forward-only: every state is visited at most once, and `Ready` may only
    /// be skipped on the way from `HealthChecking` to `ShuttingDown`.
    pub(crate) fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Starting, HealthChecking)
                | (HealthChecking, Ready)
                | (HealthChecking, ShuttingDown)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Exited(_))
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::HealthChecking => write!(f, "health-checking"),
            SupervisorState::Ready => write!(f, "ready"),
            SupervisorState::ShuttingDown => write!(f, "shutting-down"),
            SupervisorState::Exited(code) => write!(f, "exited({code})"),
        }
    }
}
