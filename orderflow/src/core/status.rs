//! Stage state and task status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a stage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Work on the stage is outstanding.
    #[default]
    Pending,
    /// The stage is done.
    Completed,
}

impl StageState {
    /// Maps a completion flag to a state.
    #[must_use]
    pub fn from_completed(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }

    /// Returns true for [`StageState::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// The status of a production task.
///
/// Status ids are the ones shop-floor clients send: `1` new, `2` in progress,
/// `3` done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    New,
    /// Someone is working on it.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// All statuses in id order.
    pub const ALL: [Self; 3] = [Self::New, Self::InProgress, Self::Done];

    /// Returns the numeric status id.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::New => 1,
            Self::InProgress => 2,
            Self::Done => 3,
        }
    }

    /// Looks a status up by its numeric id.
    #[must_use]
    pub const fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::New),
            2 => Some(Self::InProgress),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Done => "Done",
        }
    }

    /// Returns true if no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}
