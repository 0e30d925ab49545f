use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use super::Strategy;

/// A selected identifier resolved to its catalog path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pick {
    pub id: String,
    pub path: PathBuf,
}

/// The current output of a category, replaced wholesale on every re-selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    /// Strategy that produced this selection
    pub strategy: Option<Strategy>,
    /// Picks in draw order, unique by id
    pub picks: Vec<Pick>,
}

impl Selection {
    /// Build a selection from drawn ids, dropping ids with no path and repeated ids.
    pub fn resolve<I, F>(strategy: Strategy, ids: I, mut path_of: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> Option<PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut picks = Vec::new();
        for id in ids {
            if seen.contains(&id) {
                continue;
            }
            match path_of(&id) {
                Some(path) => {
                    seen.insert(id.clone());
                    picks.push(Pick { id, path });
                }
                None => log::debug!("Dropping '{}': no catalog path", id),
            }
        }
        Self {
            strategy: Some(strategy),
            picks,
        }
    }

    /// An intentionally empty selection (wildcard/skip).
    pub fn empty(strategy: Strategy) -> Self {
        Self {
            strategy: Some(strategy),
            picks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.picks.iter().map(|p| p.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_drops_unknown_and_duplicates() {
        let ids = vec!["a".to_string(), "missing".to_string(), "a".to_string(), "b".to_string()];
        let selection = Selection::resolve(Strategy::Random, ids, |id| match id {
            "a" => Some(PathBuf::from("/m/a.safetensors")),
            "b" => Some(PathBuf::from("/m/b.safetensors")),
            _ => None,
        });

        assert_eq!(selection.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(selection.strategy, Some(Strategy::Random));
    }

    #[test]
    fn test_empty_selection() {
        let selection = Selection::empty(Strategy::Wildcard);
        assert!(selection.is_empty());
        assert_eq!(selection.strategy, Some(Strategy::Wildcard));
    }
}
