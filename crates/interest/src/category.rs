//! The fixed set of scoring categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Location,
    Value,
    Politics,
    Activity,
    Time,
    Routes,
    Assets,
    War,
    Ship,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Location,
        Category::Value,
        Category::Politics,
        Category::Activity,
        Category::Time,
        Category::Routes,
        Category::Assets,
        Category::War,
        Category::Ship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Location => "location",
            Category::Value => "value",
            Category::Politics => "politics",
            Category::Activity => "activity",
            Category::Time => "time",
            Category::Routes => "routes",
            Category::Assets => "assets",
            Category::War => "war",
            Category::Ship => "ship",
        }
    }

    /// All category names, for "did you mean" suggestions.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Category::as_str).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}
