//! Event vocabulary for run-control state changes

use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionContext, StateChangeReason};

/// Tag used to key handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Suspended,
    Resumed,
    SteppingTimedOut,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Suspended, EventKind::Resumed, EventKind::SteppingTimedOut];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suspended => write!(f, "Suspended"),
            Self::Resumed => write!(f, "Resumed"),
            Self::SteppingTimedOut => write!(f, "SteppingTimedOut"),
        }
    }
}

/// A state change observed on a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunControlEvent {
    /// The context stopped
    Suspended {
        context: ExecutionContext,
        reason: StateChangeReason,
    },
    /// The context started running
    Resumed {
        context: ExecutionContext,
        reason: StateChangeReason,
    },
    /// A step has been in flight longer than the stepping timeout
    SteppingTimedOut { context: ExecutionContext },
}

impl RunControlEvent {
    pub fn suspended(context: ExecutionContext, reason: StateChangeReason) -> Self {
        Self::Suspended { context, reason }
    }

    pub fn resumed(context: ExecutionContext, reason: StateChangeReason) -> Self {
        Self::Resumed { context, reason }
    }

    pub fn stepping_timed_out(context: ExecutionContext) -> Self {
        Self::SteppingTimedOut { context }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Suspended { .. } => EventKind::Suspended,
            Self::Resumed { .. } => EventKind::Resumed,
            Self::SteppingTimedOut { .. } => EventKind::SteppingTimedOut,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        match self {
            Self::Suspended { context, .. } | Self::Resumed { context, .. } | Self::SteppingTimedOut { context } => {
                context
            }
        }
    }

    /// Reason carried by Suspended/Resumed, None for timeouts
    pub fn reason(&self) -> Option<StateChangeReason> {
        match self {
            Self::Suspended { reason, .. } | Self::Resumed { reason, .. } => Some(*reason),
            Self::SteppingTimedOut { .. } => None,
        }
    }
}
