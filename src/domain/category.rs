use serde::{Deserialize, Serialize};

/// The three asset classes picked every iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Model file, changes slowest
    Checkpoint,
    /// Character lora, zero or one per pick
    Character,
    /// Etc lora, zero or more per pick
    Etc,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Checkpoint, Category::Character, Category::Etc];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Checkpoint => "checkpoint",
            Category::Character => "character",
            Category::Etc => "etc",
        }
    }

    /// Whether strategies for this category may return more than one pick.
    pub fn is_multi_pick(&self) -> bool {
        matches!(self, Category::Etc)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checkpoint" => Ok(Category::Checkpoint),
            "character" | "char" => Ok(Category::Character),
            "etc" | "lora" => Ok(Category::Etc),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}
