//! Replayable cleaning scripts.
//!
//! A [`Script`] is the JSON form of a cleaning session: per-dataset steps
//! (transforms mixed with column/row drops and restores), an optional
//! combine, and transforms applied to the combined table.
//!
//! # Example
//!
//! ```json
//! {
//!   "steps": [
//!     {"op": "drop_columns", "names": ["notes"]},
//!     {"op": "transform", "transform": {"type": "deduplicate"}}
//!   ],
//!   "combine": {"mode": "merge", "key": "id"},
//!   "after_combine": [{"type": "filter", "column": "region", "contains": "EU"}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::aggregate::Aggregate;
use super::operations::Transform;
use crate::combine::CombineMode;
use crate::error::{TableError, TableResult};
use crate::history::EditHistory;
use crate::table::{Cell, CellType, Table};

/// One edit applied to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Transform { transform: Transform },
    DropColumns { names: Vec<String> },
    RestoreColumns { names: Vec<String> },
    DropRows { keys: Vec<Cell> },
    RestoreRows { keys: Vec<Cell> },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Transform { transform } => transform.name(),
            Step::DropColumns { .. } => "drop_columns",
            Step::RestoreColumns { .. } => "restore_columns",
            Step::DropRows { .. } => "drop_rows",
            Step::RestoreRows { .. } => "restore_rows",
        }
    }

    /// Apply the step to a dataset's table and history.
    ///
    /// Transforms never touch the history; drop/restore steps only change it
    /// when they succeed.
    pub fn apply(&self, table: &Table, history: &mut EditHistory) -> TableResult<Table> {
        match self {
            Step::Transform { transform } => transform.apply(table),
            Step::DropColumns { names } => history.drop_columns(table, names),
            Step::RestoreColumns { names } => history.restore_columns(table, names),
            Step::DropRows { keys } => history.drop_rows(table, keys),
            Step::RestoreRows { keys } => history.restore_rows(table, keys),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = |keys: &[Cell]| {
            keys.iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Step::Transform { transform } => write!(f, "{transform}"),
            Step::DropColumns { names } => write!(f, "drop columns [{}]", names.join(", ")),
            Step::RestoreColumns { names } => write!(f, "restore columns [{}]", names.join(", ")),
            Step::DropRows { keys: k } => write!(f, "drop rows [{}]", keys(k)),
            Step::RestoreRows { keys: k } => write!(f, "restore rows [{}]", keys(k)),
        }
    }
}

/// A full headless cleaning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Steps applied to every loaded dataset, in order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// How to combine the datasets afterwards, if at all
    #[serde(default)]
    pub combine: Option<CombineMode>,

    /// Transforms applied to the combined table
    #[serde(default)]
    pub after_combine: Vec<Transform>,
}

impl Script {
    /// Parse a script from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Apply every step in order to one dataset.
    ///
    /// Runs on copies: the first failing step aborts with its position and
    /// error, and `history` is left as it was.
    pub fn run_steps(
        &self,
        table: &Table,
        history: &mut EditHistory,
    ) -> Result<Table, (usize, TableError)> {
        let mut working = table.clone();
        let mut scratch = history.clone();
        for (i, step) in self.steps.iter().enumerate() {
            working = step.apply(&working, &mut scratch).map_err(|e| (i, e))?;
        }
        *history = scratch;
        Ok(working)
    }
}

/// Example script touching every kind of step.
pub fn example_script() -> Script {
    Script {
        steps: vec![
            Step::DropColumns {
                names: vec!["notes".to_string()],
            },
            Step::Transform {
                transform: Transform::Deduplicate,
            },
            Step::Transform {
                transform: Transform::Convert {
                    column: "amount".to_string(),
                    to: CellType::Float,
                },
            },
            Step::Transform {
                transform: Transform::Formula {
                    formula: "total = amount * quantity".to_string(),
                },
            },
            Step::DropRows {
                keys: vec![Cell::Int(0)],
            },
            Step::RestoreRows {
                keys: vec![Cell::Int(0)],
            },
        ],
        combine: Some(CombineMode::Concatenate),
        after_combine: vec![
            Transform::Sort {
                column: "total".to_string(),
                ascending: false,
            },
            Transform::GroupAggregate {
                column: "region".to_string(),
                func: Aggregate::Sum,
            },
        ],
    }
}
