//! Step kinds, queued step requests and state-change reasons

use serde::{Deserialize, Serialize};

/// Kind of source or instruction level step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Step over calls
    Over,
    /// Step into calls
    Into,
    /// Run until the current frame returns
    Return,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Over => write!(f, "over"),
            Self::Into => write!(f, "into"),
            Self::Return => write!(f, "return"),
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "over" => Ok(Self::Over),
            "into" => Ok(Self::Into),
            "return" => Ok(Self::Return),
            _ => Err(format!("Unknown step type: {}", s)),
        }
    }
}

/// A step waiting in a per-context queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    pub step_type: StepType,
    pub instruction: bool,
}

impl StepRequest {
    pub fn source(step_type: StepType) -> Self {
        Self {
            step_type,
            instruction: false,
        }
    }

    pub fn instruction(step_type: StepType) -> Self {
        Self {
            step_type,
            instruction: true,
        }
    }
}

/// Why a context was suspended or resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StateChangeReason {
    #[default]
    Unknown,
    UserRequest,
    Step,
    Breakpoint,
    Exception,
    /// The change was caused by the enclosing container
    Container,
    Watchpoint,
    Signal,
    SharedLib,
    Error,
    EventBreakpoint,
    Evaluation,
}

impl std::fmt::Display for StateChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::UserRequest => "user-request",
            Self::Step => "step",
            Self::Breakpoint => "breakpoint",
            Self::Exception => "exception",
            Self::Container => "container",
            Self::Watchpoint => "watchpoint",
            Self::Signal => "signal",
            Self::SharedLib => "shared-lib",
            Self::Error => "error",
            Self::EventBreakpoint => "event-breakpoint",
            Self::Evaluation => "evaluation",
        };
        write!(f, "{}", name)
    }
}
