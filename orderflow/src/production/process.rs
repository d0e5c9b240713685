//! Technological process strings.
//!
//! A component's process is the sequence of shop-floor areas it passes
//! through, written as area ids joined by dashes: `"1-3-2"`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::core::AreaId;
use crate::errors::WorkflowError;

static PROCESS_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\d+(-\d+)*$"));

/// An ordered sequence of areas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TechProcess {
    areas: Vec<AreaId>,
}

impl TechProcess {
    /// Creates a process from an area sequence.
    #[must_use]
    pub fn new(areas: Vec<AreaId>) -> Self {
        Self { areas }
    }

    /// Parses `"<area>-<area>-..."`. Blank input is the empty process.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidArgument`] for anything else.
    pub fn parse(input: &str) -> Result<Self, WorkflowError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }

        let pattern = PROCESS_PATTERN
            .as_ref()
            .map_err(|e| WorkflowError::Config(e.to_string()))?;
        if !pattern.is_match(input) {
            return Err(WorkflowError::invalid_argument(format!(
                "malformed technological process '{input}'"
            )));
        }

        let areas = input
            .split('-')
            .map(|part| {
                part.parse::<u32>().map(AreaId).map_err(|_| {
                    WorkflowError::invalid_argument(format!("area id '{part}' is out of range"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { areas })
    }

    /// Returns the areas in order.
    #[must_use]
    pub fn areas(&self) -> &[AreaId] {
        &self.areas
    }

    /// Returns true for the empty process.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

impl FromStr for TechProcess {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TechProcess {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TechProcess> for String {
    fn from(value: TechProcess) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TechProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.areas.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("-"))
    }
}
