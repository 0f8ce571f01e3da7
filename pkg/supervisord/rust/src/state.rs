// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Never started, or stopped on request.
    Stopped,
    /// Spawned, `startsecs` not yet elapsed.
    Starting,
    Running,
    /// Exited while starting; waiting to retry.
    Backoff,
    /// Stop signal sent, waiting for the exit.
    Stopping,
    /// Exited from Running.
    Exited,
    /// Gave up after `startretries`.
    Fatal,
    Unknown,
}

impl ProcessState {
    /// Numeric state code reported over RPC.
    pub fn code(self) -> i32 {
        match self {
            ProcessState::Stopped => 0,
            ProcessState::Starting => 10,
            ProcessState::Running => 20,
            ProcessState::Backoff => 30,
            ProcessState::Stopping => 40,
            ProcessState::Exited => 100,
            ProcessState::Fatal => 200,
            ProcessState::Unknown => 1000,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ProcessState::Stopped,
            10 => ProcessState::Starting,
            20 => ProcessState::Running,
            30 => ProcessState::Backoff,
            40 => ProcessState::Stopping,
            100 => ProcessState::Exited,
            200 => ProcessState::Fatal,
            _ => ProcessState::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Stopped => "STOPPED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Backoff => "BACKOFF",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Exited => "EXITED",
            ProcessState::Fatal => "FATAL",
            ProcessState::Unknown => "UNKNOWN",
        }
    }

    pub fn is_running(self) -> bool {
        self == ProcessState::Running
    }

    /// A child process exists in this state.
    pub fn has_child(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    /// A start request is still being worked on.
    pub fn is_starting(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Backoff)
    }

    pub(crate) fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Exited, Starting)
                | (Fatal, Starting)
                | (Backoff, Starting)
                | (Starting, Running)
                | (Starting, Backoff)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Running, Exited)
                | (Backoff, Fatal)
                | (Backoff, Stopped)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_names() {
        assert_eq!(ProcessState::Running.code(), 20);
        assert_eq!(ProcessState::Fatal.code(), 200);
        assert_eq!(ProcessState::Backoff.to_string(), "BACKOFF");
        assert_eq!(ProcessState::from_code(40), ProcessState::Stopping);
        assert_eq!(ProcessState::from_code(7), ProcessState::Unknown);
    }

    #[test]
    fn test_transitions() {
        use ProcessState::*;
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Backoff));
        assert!(Backoff.can_transition_to(Fatal));
        assert!(Running.can_transition_to(Exited));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Exited.can_transition_to(Starting));

        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Fatal.can_transition_to(Running));
        assert!(!Unknown.can_transition_to(Starting));
    }

    #[test]
    fn test_predicates() {
        assert!(ProcessState::Stopping.has_child());
        assert!(!ProcessState::Backoff.has_child());
        assert!(ProcessState::Backoff.is_starting());
        assert!(!ProcessState::Running.is_starting());
        assert!(ProcessState::Running.is_running());
    }
}
