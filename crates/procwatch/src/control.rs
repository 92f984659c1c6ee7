use std::io;
use std::process::Command;

use log::{info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal as NixSignal, kill};
use nix::unistd::Pid as NixPid;

/// Result of the secondary, privileged termination attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    Succeeded,
    Failed(String),
    Unavailable,
}

/// Privileged termination fallback, invoked only after the graceful signal
/// was rejected with EPERM. Pluggable so tests can script every outcome.
pub trait EscalationProvider {
    fn name(&self) -> &'static str;
    fn terminate(&self, pid: u32) -> EscalationOutcome;
}

/// Non-interactive sudo. `Unavailable` when the binary is missing; a
/// password prompt or a refusal shows up as `Failed`.
pub struct SudoEscalation;

impl EscalationProvider for SudoEscalation {
    fn name(&self) -> &'static str {
        "sudo"
    }

    fn terminate(&self, pid: u32) -> EscalationOutcome {
        let status = Command::new("sudo")
            .arg("-n")
            .arg("kill")
            .arg(pid.to_string())
            .status();

        match status {
            Err(err) if err.kind() == io::ErrorKind::NotFound => EscalationOutcome::Unavailable,
            Err(err) => EscalationOutcome::Failed(err.to_string()),
            Ok(status) if status.success() => EscalationOutcome::Succeeded,
            Ok(status) => EscalationOutcome::Failed(format!("sudo exited with {status}")),
        }
    }
}

/// No escalation mechanism configured.
pub struct NoEscalation;

impl EscalationProvider for NoEscalation {
    fn name(&self) -> &'static str {
        "none"
    }

    fn terminate(&self, _pid: u32) -> EscalationOutcome {
        EscalationOutcome::Unavailable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process existed and accepted the graceful signal.
    Terminated { name: String },
    /// Already gone. Benign.
    NotFound,
    /// EPERM on the graceful signal; carries the escalation attempt's
    /// result, which must be reported distinctly.
    Denied { escalation: EscalationOutcome },
    /// Never attempted.
    Refused { reason: String },
}

impl TerminationOutcome {
    /// Status-line message for the user. Each outcome reads differently;
    /// the three escalation results are never merged.
    pub fn describe(&self, pid: u32) -> String {
        match self {
            TerminationOutcome::Terminated { name } => {
                format!("terminated {name} (pid {pid})")
            }
            TerminationOutcome::NotFound => format!("pid {pid} is already gone"),
            TerminationOutcome::Denied { escalation } => match escalation {
                EscalationOutcome::Succeeded => {
                    format!("pid {pid}: permission denied, killed via escalation")
                }
                EscalationOutcome::Failed(reason) => {
                    format!("pid {pid}: permission denied, escalation failed: {reason}")
                }
                EscalationOutcome::Unavailable => {
                    format!("pid {pid}: permission denied, no escalation mechanism")
                }
            },
            TerminationOutcome::Refused { reason } => format!("pid {pid}: {reason}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TerminationOutcome::Denied {
                escalation: EscalationOutcome::Failed(_) | EscalationOutcome::Unavailable
            } | TerminationOutcome::Refused { .. }
        )
    }
}

/// Issues termination requests: graceful SIGTERM first, then the
/// escalation provider on EPERM. Callers re-trigger a refresh on every
/// outcome so the table catches up immediately.
pub struct ProcessController {
    escalation: Box<dyn EscalationProvider>,
}

impl ProcessController {
    pub fn new(escalation: Box<dyn EscalationProvider>) -> Self {
        Self { escalation }
    }

    pub fn terminate(&self, pid: u32, name: &str) -> TerminationOutcome {
        if pid == 1 {
            return TerminationOutcome::Refused {
                reason: "refusing to signal pid 1".to_string(),
            };
        }
        if pid == std::process::id() {
            return TerminationOutcome::Refused {
                reason: "refusing to signal procwatch itself".to_string(),
            };
        }

        let outcome = match kill(NixPid::from_raw(pid as i32), NixSignal::SIGTERM) {
            Ok(()) => TerminationOutcome::Terminated {
                name: name.to_string(),
            },
            Err(Errno::ESRCH) => TerminationOutcome::NotFound,
            Err(Errno::EPERM) => {
                info!(
                    "SIGTERM to {pid} denied, trying {} escalation",
                    self.escalation.name()
                );
                TerminationOutcome::Denied {
                    escalation: self.escalation.terminate(pid),
                }
            }
            Err(err) => TerminationOutcome::Refused {
                reason: format!("kill failed: {err}"),
            },
        };

        if outcome.is_error() {
            warn!("terminate {pid} ({name}): {}", outcome.describe(pid));
        } else {
            info!("terminate {pid} ({name}): {}", outcome.describe(pid));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedEscalation(EscalationOutcome);

    impl EscalationProvider for ScriptedEscalation {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn terminate(&self, _pid: u32) -> EscalationOutcome {
            self.0.clone()
        }
    }

    #[test]
    fn absent_pid_reports_not_found() {
        let controller = ProcessController::new(Box::new(NoEscalation));
        // Far above any realistic pid_max.
        let outcome = controller.terminate(999_999_999, "ghost");
        assert_eq!(outcome, TerminationOutcome::NotFound);
        assert!(!outcome.is_error());
    }

    #[test]
    fn refuses_pid_one_and_self() {
        let controller = ProcessController::new(Box::new(NoEscalation));
        assert!(matches!(
            controller.terminate(1, "init"),
            TerminationOutcome::Refused { .. }
        ));
        assert!(matches!(
            controller.terminate(std::process::id(), "procwatch"),
            TerminationOutcome::Refused { .. }
        ));
    }

    #[test]
    fn escalation_outcomes_read_distinctly() {
        let denied = |escalation| TerminationOutcome::Denied { escalation };

        let ok = denied(EscalationOutcome::Succeeded).describe(42);
        let failed = denied(EscalationOutcome::Failed("sudo exited with 1".into())).describe(42);
        let missing = denied(EscalationOutcome::Unavailable).describe(42);

        assert_ne!(ok, failed);
        assert_ne!(ok, missing);
        assert_ne!(failed, missing);
        assert!(ok.contains("killed via escalation"));
        assert!(failed.contains("escalation failed"));
        assert!(missing.contains("no escalation mechanism"));
    }

    #[test]
    fn only_failed_and_unavailable_escalations_are_errors() {
        let denied = |escalation| TerminationOutcome::Denied { escalation };
        assert!(!denied(EscalationOutcome::Succeeded).is_error());
        assert!(denied(EscalationOutcome::Failed("no".into())).is_error());
        assert!(denied(EscalationOutcome::Unavailable).is_error());
        assert!(
            !TerminationOutcome::Terminated {
                name: "x".into()
            }
            .is_error()
        );
        assert!(!TerminationOutcome::NotFound.is_error());
    }

    #[test]
    fn scripted_provider_is_consulted_on_denial_path() {
        // The provider itself is exercised directly; the EPERM branch in
        // terminate() cannot be produced safely in a test environment.
        let provider = ScriptedEscalation(EscalationOutcome::Succeeded);
        assert_eq!(provider.terminate(123), EscalationOutcome::Succeeded);

        let provider = ScriptedEscalation(EscalationOutcome::Unavailable);
        assert_eq!(provider.terminate(123), EscalationOutcome::Unavailable);
    }
}
