use crate::sync::queue::{Priority, Task};
use std::fmt;

/// Notifications published by the sync engine.
///
/// Delivery is fire-and-forget over a broadcast channel; slow subscribers
/// may observe a lag and skip events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    Stopped,
    FetchEnqueued { height: u64, priority: Priority },
    FetchStarted { height: u64 },
    FetchCompleted { height: u64, success: bool },
    PruneCompleted { height: u64, success: bool },
    MissingDetected { count: usize },
    ExcessiveDetected { count: usize },
    UpToDate,
    /// A height failed more often than the retry cap allows
    RetryExhausted { height: u64 },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Started => "start",
            SyncEvent::Stopped => "stop",
            SyncEvent::FetchEnqueued { .. } => "fetch-enqueued",
            SyncEvent::FetchStarted { .. } => "fetch-started",
            SyncEvent::FetchCompleted { .. } => "fetch-completed",
            SyncEvent::PruneCompleted { .. } => "prune-completed",
            SyncEvent::MissingDetected { .. } => "missing-detected",
            SyncEvent::ExcessiveDetected { .. } => "excessive-detected",
            SyncEvent::UpToDate => "up-to-date",
            SyncEvent::RetryExhausted { .. } => "retry-exhausted",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::FetchEnqueued { height, priority } => {
                write!(f, "{} height={} priority={}", self.name(), height, priority)
            }
            SyncEvent::FetchStarted { height } | SyncEvent::RetryExhausted { height } => {
                write!(f, "{} height={}", self.name(), height)
            }
            SyncEvent::FetchCompleted { height, success }
            | SyncEvent::PruneCompleted { height, success } => {
                write!(f, "{} height={} success={}", self.name(), height, success)
            }
            SyncEvent::MissingDetected { count } | SyncEvent::ExcessiveDetected { count } => {
                write!(f, "{} count={}", self.name(), count)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of executing one queued task, whatever its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: Task,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_payload() {
        let event = SyncEvent::FetchCompleted {
            height: 12,
            success: false,
        };
        assert_eq!(event.to_string(), "fetch-completed height=12 success=false");
        assert_eq!(SyncEvent::UpToDate.to_string(), "up-to-date");
        assert_eq!(
            SyncEvent::MissingDetected { count: 3 }.to_string(),
            "missing-detected count=3"
        );
    }
}
