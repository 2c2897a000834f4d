//! Append-only journal records for external observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClosedPosition, Position, SessionPhase, Signal};

/// Something worth recording about the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEvent {
    SignalEmitted {
        signal: Signal,
    },
    SignalRejected {
        symbol: String,
        reason: String,
    },
    PositionOpened {
        position: Position,
    },
    StopRatcheted {
        symbol: String,
        from: f64,
        to: f64,
    },
    PositionClosed {
        closed: ClosedPosition,
    },
    PhaseChanged {
        phase: SessionPhase,
        detail: String,
    },
}

/// Timestamped journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub timestamp: DateTime<Utc>,
    pub event: JournalEvent,
}

impl JournalRecord {
    pub fn now(event: JournalEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.event {
            JournalEvent::SignalEmitted { .. } => "signal_emitted",
            JournalEvent::SignalRejected { .. } => "signal_rejected",
            JournalEvent::PositionOpened { .. } => "position_opened",
            JournalEvent::StopRatcheted { .. } => "stop_ratcheted",
            JournalEvent::PositionClosed { .. } => "position_closed",
            JournalEvent::PhaseChanged { .. } => "phase_changed",
        }
    }
}
