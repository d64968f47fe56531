use multimail_core::error::EngineError;
use multimail_core::types::{LogEntry, Recipient, RunState};
use serde::Serialize;
use tracing::info;

/// Describes a single valid run-state transition.
#[derive(Debug, Clone, Serialize)]
pub struct RunTransition {
    pub from: RunState,
    pub to: RunState,
    pub trigger: &'static str,
}

static TRANSITIONS: [RunTransition; 11] = [
    // Idle ->
    RunTransition {
        from: RunState::Idle,
        to: RunState::Sending,
        trigger: "start",
    },
    // Sending ->
    RunTransition {
        from: RunState::Sending,
        to: RunState::Paused,
        trigger: "pause",
    },
    RunTransition {
        from: RunState::Sending,
        to: RunState::Idle,
        trigger: "stop",
    },
    RunTransition {
        from: RunState::Sending,
        to: RunState::Completed,
        trigger: "exhausted",
    },
    // Paused ->
    RunTransition {
        from: RunState::Paused,
        to: RunState::Sending,
        trigger: "resume",
    },
    RunTransition {
        from: RunState::Paused,
        to: RunState::Idle,
        trigger: "stop",
    },
    // Completed ->
    RunTransition {
        from: RunState::Completed,
        to: RunState::Sending,
        trigger: "start",
    },
    RunTransition {
        from: RunState::Completed,
        to: RunState::Idle,
        trigger: "import",
    },
    // Idle -> Idle on import keeps the run reset explicit.
    RunTransition {
        from: RunState::Idle,
        to: RunState::Idle,
        trigger: "import",
    },
    // Error is never entered by the engine, but is not a dead end.
    RunTransition {
        from: RunState::Error(String::new()),
        to: RunState::Idle,
        trigger: "import",
    },
    RunTransition {
        from: RunState::Error(String::new()),
        to: RunState::Sending,
        trigger: "start",
    },
];

/// Guards the campaign run state by enforcing the finite set of valid
/// transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStateMachine;

impl RunStateMachine {
    /// Returns `true` if `trigger` may move the run from `from` to `to`.
    /// `Error` states match regardless of their message.
    pub fn can_transition(from: &RunState, to: &RunState, trigger: &str) -> bool {
        TRANSITIONS.iter().any(|t| {
            same_kind(&t.from, from) && same_kind(&t.to, to) && t.trigger == trigger
        })
    }
}

fn same_kind(a: &RunState, b: &RunState) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Externally visible campaign state. The engine is the only writer; readers
/// get consistent copies through the engine's watch channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignSnapshot {
    pub state: RunState,
    /// Recipients decided so far in the current run.
    pub progress: usize,
    pub recipients: Vec<Recipient>,
    /// Append-only activity log.
    pub log: Vec<LogEntry>,
}

impl CampaignSnapshot {
    /// Move to `to` via `trigger`, or fail leaving the state untouched.
    pub fn transition(&mut self, to: RunState, trigger: &'static str) -> Result<(), EngineError> {
        if RunStateMachine::can_transition(&self.state, &to, trigger) {
            self.state = to;
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.state.clone(),
                operation: trigger,
            })
        }
    }

    /// Append an activity log entry, mirrored to tracing.
    pub fn push_log(&mut self, message: impl Into<String>) {
        let entry = LogEntry::now(message);
        info!(state = %self.state, progress = self.progress, "{}", entry.message);
        self.log.push(entry);
    }

    pub fn total(&self) -> usize {
        self.recipients.len()
    }

    pub fn sent_count(&self) -> usize {
        self.recipients.iter().filter(|r| r.status.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.recipients
            .iter()
            .filter(|r| r.status.is_decided() && !r.status.is_sent())
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.recipients
            .iter()
            .filter(|r| !r.status.is_decided())
            .count()
    }

    /// Log entries appended after the first `seen`.
    pub fn log_since(&self, seen: usize) -> &[LogEntry] {
        self.log.get(seen..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multimail_core::types::DeliveryStatus;

    #[test]
    fn test_valid_transitions() {
        let mut snapshot = CampaignSnapshot::default();
        assert_eq!(snapshot.state, RunState::Idle);

        snapshot.transition(RunState::Sending, "start").unwrap();
        snapshot.transition(RunState::Paused, "pause").unwrap();
        snapshot.transition(RunState::Sending, "resume").unwrap();
        snapshot.transition(RunState::Completed, "exhausted").unwrap();
        snapshot.transition(RunState::Sending, "start").unwrap();
        snapshot.transition(RunState::Idle, "stop").unwrap();
        assert_eq!(snapshot.state, RunState::Idle);
    }

    #[test]
    fn test_invalid_transitions_leave_state() {
        let mut snapshot = CampaignSnapshot::default();

        let err = snapshot.transition(RunState::Paused, "pause").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: RunState::Idle,
                operation: "pause"
            }
        ));
        assert!(snapshot.transition(RunState::Idle, "stop").is_err());
        assert!(snapshot.transition(RunState::Completed, "exhausted").is_err());
        assert_eq!(snapshot.state, RunState::Idle);

        snapshot.transition(RunState::Sending, "start").unwrap();
        assert!(snapshot.transition(RunState::Sending, "resume").is_err());
        assert!(snapshot.transition(RunState::Idle, "import").is_err());

        snapshot.transition(RunState::Paused, "pause").unwrap();
        assert!(snapshot.transition(RunState::Completed, "exhausted").is_err());
        assert_eq!(snapshot.state, RunState::Paused);
    }

    #[test]
    fn test_error_state_matches_any_message() {
        assert!(RunStateMachine::can_transition(
            &RunState::Error("boom".to_string()),
            &RunState::Idle,
            "import"
        ));
        assert!(!RunStateMachine::can_transition(
            &RunState::Sending,
            &RunState::Error("boom".to_string()),
            "exhausted"
        ));
    }

    #[test]
    fn test_counts_and_log() {
        let mut snapshot = CampaignSnapshot {
            recipients: vec![
                Recipient::new("A", "a@example.com"),
                Recipient::new("B", "b@example.com"),
                Recipient::new("C", "c@example.com"),
            ],
            ..Default::default()
        };
        snapshot.recipients[0].status = DeliveryStatus::Sent;
        snapshot.recipients[1].status = DeliveryStatus::Failed("bounced".to_string());

        assert_eq!(snapshot.total(), 3);
        assert_eq!(snapshot.sent_count(), 1);
        assert_eq!(snapshot.failed_count(), 1);
        assert_eq!(snapshot.pending_count(), 1);

        snapshot.push_log("one");
        snapshot.push_log("two");
        assert_eq!(snapshot.log_since(1).len(), 1);
        assert_eq!(snapshot.log_since(1)[0].message, "two");
        assert!(snapshot.log_since(5).is_empty());
    }
}
