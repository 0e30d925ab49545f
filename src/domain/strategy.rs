use serde::{Deserialize, Serialize};

use super::Category;

/// How a category turns its candidate set into picks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Weighted by summed metadata `weight`
    Weight,
    /// Uniform, weights ignored
    Random,
    /// Inverse usage count, clamped
    Db,
    /// Anti-repetition pool
    Cycle,
    /// No character this round
    Wildcard,
    /// No character this round
    Skip,
    /// Nested group document
    #[serde(alias = "weightYml", alias = "WeightYml")]
    WeightYml,
}

impl Strategy {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Weight => "weight",
            Strategy::Random => "random",
            Strategy::Db => "db",
            Strategy::Cycle => "cycle",
            Strategy::Wildcard => "wildcard",
            Strategy::Skip => "skip",
            Strategy::WeightYml => "weightyml",
        }
    }

    /// Check whether the strategy is valid for a category.
    pub fn supports(&self, category: Category) -> bool {
        match self {
            Strategy::Weight | Strategy::Random | Strategy::Db | Strategy::Cycle => true,
            Strategy::Wildcard | Strategy::Skip => category == Category::Character,
            Strategy::WeightYml => category == Category::Etc,
        }
    }

    /// Strategies that always produce an empty selection.
    pub fn is_empty_pick(&self) -> bool {
        matches!(self, Strategy::Wildcard | Strategy::Skip)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
