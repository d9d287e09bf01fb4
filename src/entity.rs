//! Game entity definitions
//!
//! Plain data carried in event payloads. Game logic lives in the
//! application that registers handlers; nothing here mutates entities.

use serde::{Deserialize, Serialize};

/// A player-controlled cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: i64,
    pub name: String,
    pub alive: bool,
    pub size: i64,
    pub kills: i64,
    /// Cells eaten by this cell
    #[serde(default)]
    pub meals: Vec<Cell>,
    /// Position as `[x, y]`
    pub pos: Vec<i64>,
}

/// A food pellet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    /// Position as `[x, y]`
    pub pos: Vec<i64>,
    pub value: i64,
}

impl Cell {
    /// Create a fresh, living cell at the given position
    pub fn spawn(id: i64, name: impl Into<String>, pos: Vec<i64>) -> Self {
        Self {
            id,
            name: name.into(),
            alive: true,
            size: 1,
            kills: 0,
            meals: Vec::new(),
            pos,
        }
    }
}
