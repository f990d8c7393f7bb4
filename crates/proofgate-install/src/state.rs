//! Installation state shared between the installer task and request handlers.

use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

/// Number of log entries reported by the status endpoint.
pub const STATUS_LOG_TAIL: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Installing,
    Installed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Installed | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent copy of the state at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSnapshot {
    pub installed: bool,
    pub installing: bool,
    pub phase: Phase,
    pub log: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    log: Vec<String>,
}

/// Phase and log behind one lock, so a reader never sees `installed` without
/// the log entries that led to it.
///
/// Transitions: `Idle -> Installing` once, then exactly one of
/// `Installing -> Installed` or `Installing -> Failed`. The log only grows.
#[derive(Debug)]
pub struct InstallState {
    inner: RwLock<Inner>,
}

impl Default for InstallState {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                phase: Phase::Idle,
                log: Vec::new(),
            }),
        }
    }

    /// Check-and-set `Idle -> Installing`. Returns false if an installation
    /// already started in this process, whatever its outcome.
    pub fn try_begin(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.phase != Phase::Idle {
            return false;
        }
        inner.phase = Phase::Installing;
        true
    }

    pub fn append(&self, entry: impl Into<String>) {
        self.inner.write().log.push(entry.into());
    }

    /// Publishes success. Ignored unless currently installing.
    pub fn mark_installed(&self, entry: impl Into<String>) -> bool {
        self.finish(Phase::Installed, entry.into())
    }

    /// Publishes failure. Ignored unless currently installing.
    pub fn mark_failed(&self, entry: impl Into<String>) -> bool {
        self.finish(Phase::Failed, entry.into())
    }

    fn finish(&self, terminal: Phase, entry: String) -> bool {
        let mut inner = self.inner.write();
        if inner.phase != Phase::Installing {
            return false;
        }
        inner.log.push(entry);
        inner.phase = terminal;
        true
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    pub fn is_installed(&self) -> bool {
        self.phase() == Phase::Installed
    }

    /// Snapshot with the last `tail` log entries.
    pub fn snapshot(&self, tail: usize) -> InstallSnapshot {
        let inner = self.inner.read();
        let start = inner.log.len().saturating_sub(tail);
        InstallSnapshot {
            installed: inner.phase == Phase::Installed,
            installing: inner.phase == Phase::Installing,
            phase: inner.phase,
            log: inner.log[start..].to_vec(),
        }
    }

    pub fn log_len(&self) -> usize {
        self.inner.read().log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_empty() {
        let state = InstallState::new();
        let snap = state.snapshot(STATUS_LOG_TAIL);
        assert!(!snap.installed);
        assert!(!snap.installing);
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.log.is_empty());
    }

    #[test]
    fn begin_is_guarded() {
        let state = InstallState::new();
        assert!(state.try_begin());
        assert!(!state.try_begin());
        assert!(state.mark_failed("download failed"));
        assert!(!state.try_begin());
        assert_eq!(state.phase(), Phase::Failed);
    }

    #[test]
    fn terminal_states_are_final() {
        let state = InstallState::new();
        assert!(!state.mark_installed("too early"));
        assert!(state.try_begin());
        assert!(state.mark_installed("tamarin-prover 1.10.0"));
        assert!(!state.mark_failed("late failure"));
        let snap = state.snapshot(10);
        assert!(snap.installed);
        assert!(!snap.installing);
        assert_eq!(snap.log, vec!["tamarin-prover 1.10.0".to_string()]);
    }

    #[test]
    fn failure_clears_both_flags() {
        let state = InstallState::new();
        state.try_begin();
        state.mark_failed("boom");
        let snap = state.snapshot(STATUS_LOG_TAIL);
        assert!(!snap.installed);
        assert!(!snap.installing);
        assert_eq!(snap.phase, Phase::Failed);
    }

    #[test]
    fn snapshot_returns_tail() {
        let state = InstallState::new();
        for i in 0..8 {
            state.append(format!("step {i}"));
        }
        let snap = state.snapshot(STATUS_LOG_TAIL);
        assert_eq!(snap.log.len(), 5);
        assert_eq!(snap.log.first().map(String::as_str), Some("step 3"));
        assert_eq!(snap.log.last().map(String::as_str), Some("step 7"));
        assert_eq!(state.log_len(), 8);
    }

    #[test]
    fn snapshot_serializes_status_shape() {
        let state = InstallState::new();
        state.try_begin();
        state.append("Downloading");
        let json = serde_json::to_value(state.snapshot(STATUS_LOG_TAIL)).unwrap();
        assert_eq!(json["installing"], true);
        assert_eq!(json["installed"], false);
        assert_eq!(json["phase"], "installing");
        assert_eq!(json["log"][0], "Downloading");
    }
}
