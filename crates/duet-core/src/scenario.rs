//! Scenario files: the pre-authored lines the two identities exchange.
//!
//! A scenario file is JSON with one entry per day:
//!
//! ```json
//! { "scenarios": [ { "day": 1, "chatting_in_day": 3, "chatting_in_session": 5,
//!                    "messages": ["Hi! How are you?", "Great, thanks!"] } ] }
//! ```
//!
//! Only one day is ever played per run. [`ScenarioSet::script`] picks it and
//! flattens it into a [`Script`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One day of scripted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayScenario {
    /// Day number within the scenario.
    pub day: u32,

    /// Planned number of chat sessions during the day.
    pub chatting_in_day: u32,

    /// Planned number of exchanges per session.
    pub chatting_in_session: u32,

    /// Lines in the order they are spoken.
    pub messages: Vec<String>,
}

/// The full contents of a scenario file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub scenarios: Vec<DayScenario>,
}

/// Which day of a [`ScenarioSet`] to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaySelection {
    /// The first entry in the file, whatever its day number.
    #[default]
    First,
    /// The first entry whose `day` field matches.
    Day(u32),
}

impl From<Option<u32>> for DaySelection {
    fn from(day: Option<u32>) -> Self {
        day.map_or(Self::First, Self::Day)
    }
}

/// The ordered lines of a single day, ready to be handed out by a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    /// Day number the lines came from, `None` when the scenario set was empty.
    pub day: Option<u32>,
    lines: Vec<String>,
}

impl Script {
    pub fn new(day: Option<u32>, lines: Vec<String>) -> Self {
        Self { day, lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl ScenarioSet {
    /// Parses a scenario set from JSON text.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Flattens the selected day into a [`Script`].
    ///
    /// An empty scenario set with [`DaySelection::First`] yields an empty
    /// script rather than an error: the conversation simply ends on the first turn.
    pub fn script(&self, selection: DaySelection) -> Result<Script, ScenarioError> {
        let entry = match selection {
            DaySelection::First => self.scenarios.first(),
            DaySelection::Day(day) => Some(
                self.scenarios
                    .iter()
                    .find(|s| s.day == day)
                    .ok_or(ScenarioError::DayNotFound(day))?,
            ),
        };

        Ok(match entry {
            Some(day) => Script::new(Some(day.day), day.messages.clone()),
            None => Script::default(),
        })
    }

    /// Checks the set for content that will likely produce a broken conversation.
    pub fn validate(&self) -> Vec<ScenarioWarning> {
        let mut warnings = Vec::new();

        if self.scenarios.is_empty() {
            warnings.push(ScenarioWarning::NoScenarios);
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.day) {
                warnings.push(ScenarioWarning::DuplicateDay { day: scenario.day });
            }

            if scenario.messages.is_empty() {
                warnings.push(ScenarioWarning::EmptyDay { day: scenario.day });
            }

            for (index, line) in scenario.messages.iter().enumerate() {
                if line.trim().is_empty() {
                    warnings.push(ScenarioWarning::BlankLine {
                        day: scenario.day,
                        index,
                    });
                }
            }
        }

        warnings
    }
}

/// Loads and validates the shape of a scenario file.
///
/// Relative paths are resolved against the current directory before the
/// existence check, so error messages always carry the absolute path.
pub async fn load_scenarios(path: impl AsRef<Path>) -> Result<ScenarioSet, ScenarioError> {
    let path = std::path::absolute(path.as_ref())?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ScenarioError::NotFound(path));
    }

    debug!(path = %path.display(), "Loading scenarios from file");
    let content = tokio::fs::read_to_string(&path).await?;
    let set = ScenarioSet::from_json(&content).map_err(|source| ScenarioError::Parse {
        path: path.clone(),
        source,
    })?;

    debug!(
        days = set.scenarios.len(),
        lines = set.scenarios.iter().map(|s| s.messages.len()).sum::<usize>(),
        "Scenarios loaded"
    );
    Ok(set)
}

/// Advisory findings from [`ScenarioSet::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioWarning {
    /// The file contains no days at all.
    NoScenarios,
    /// A day has no lines.
    EmptyDay { day: u32 },
    /// Two entries share a day number; only the first is reachable by number.
    DuplicateDay { day: u32 },
    /// A line is empty or whitespace only.
    BlankLine { day: u32, index: usize },
}

impl fmt::Display for ScenarioWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioWarning::NoScenarios => {
                write!(f, "Warning [scenarios]: file contains no days")
            }
            ScenarioWarning::EmptyDay { day } => {
                write!(f, "Warning [day {}]: no messages", day)
            }
            ScenarioWarning::DuplicateDay { day } => {
                write!(f, "Warning [day {}]: day number appears more than once", day)
            }
            ScenarioWarning::BlankLine { day, index } => {
                write!(f, "Warning [day {}]: message #{} is blank", day, index + 1)
            }
        }
    }
}

/// Scenario loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scenario file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Day {0} not present in scenario file")]
    DayNotFound(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_days() -> ScenarioSet {
        ScenarioSet {
            scenarios: vec![
                DayScenario {
                    day: 1,
                    chatting_in_day: 3,
                    chatting_in_session: 5,
                    messages: vec!["Hi! How are you?".into(), "Great, thanks!".into()],
                },
                DayScenario {
                    day: 2,
                    chatting_in_day: 2,
                    chatting_in_session: 3,
                    messages: vec!["Good morning!".into()],
                },
            ],
        }
    }

    #[test]
    fn test_first_selection_takes_first_entry() {
        let script = two_days().script(DaySelection::First).unwrap();
        assert_eq!(script.day, Some(1));
        assert_eq!(script.lines(), ["Hi! How are you?", "Great, thanks!"]);
    }

    #[test]
    fn test_first_selection_ignores_day_number() {
        let mut set = two_days();
        set.scenarios.swap(0, 1);
        let script = set.script(DaySelection::First).unwrap();
        assert_eq!(script.day, Some(2));
        assert_eq!(script.len(), 1);
    }

    #[test]
    fn test_day_selection_by_number() {
        let script = two_days().script(DaySelection::Day(2)).unwrap();
        assert_eq!(script.lines(), ["Good morning!"]);
    }

    #[test]
    fn test_missing_day_is_error() {
        let err = two_days().script(DaySelection::Day(9)).unwrap_err();
        assert!(matches!(err, ScenarioError::DayNotFound(9)));
    }

    #[test]
    fn test_empty_set_yields_empty_script() {
        let script = ScenarioSet::default().script(DaySelection::First).unwrap();
        assert!(script.is_empty());
        assert_eq!(script.day, None);
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let json = r#"{"scenarios": [{"day": "invalid", "chatting_in_day": 3,
            "chatting_in_session": 5, "messages": []}]}"#;
        assert!(ScenarioSet::from_json(json).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let json = r#"{"scenarios": [{"day": 1, "messages": ["x"]}]}"#;
        assert!(ScenarioSet::from_json(json).is_err());
    }

    #[test]
    fn test_validate_clean_set() {
        assert!(two_days().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut set = two_days();
        set.scenarios[1].day = 1;
        set.scenarios[1].messages = vec![];
        set.scenarios[0].messages.push("   ".into());

        let warnings = set.validate();
        assert!(warnings.contains(&ScenarioWarning::DuplicateDay { day: 1 }));
        assert!(warnings.contains(&ScenarioWarning::EmptyDay { day: 1 }));
        assert!(warnings.contains(&ScenarioWarning::BlankLine { day: 1, index: 2 }));
        assert_eq!(
            ScenarioWarning::BlankLine { day: 1, index: 2 }.to_string(),
            "Warning [day 1]: message #3 is blank"
        );
    }

    #[test]
    fn test_validate_empty_set() {
        assert_eq!(
            ScenarioSet::default().validate(),
            vec![ScenarioWarning::NoScenarios]
        );
    }
}
