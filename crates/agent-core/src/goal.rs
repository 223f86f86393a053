//! Goals
//!
//! Immutable objectives rendered into the agent's system prompt.

use serde::{Deserialize, Serialize};

/// A named objective for an agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub description: String,
}

impl Goal {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Markdown section for this goal
    pub fn render(&self) -> String {
        format!("## {}\n{}", self.name, self.description.trim())
    }
}

/// Render a list of goals as a system prompt
pub fn render_goals(goals: &[Goal]) -> String {
    goals
        .iter()
        .map(Goal::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}
