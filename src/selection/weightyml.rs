//! Nested group selection for the `weightyml` strategy.
//!
//! A group document maps group name -> group, each group holding a
//! dictionary of series:
//!
//! ```yaml
//! style:
//!   per: true
//!   perMax: [1, 2]
//!   weight: true
//!   weightMax: 1
//!   total: true
//!   totalMax: 2
//!   dic:
//!     neon:
//!       per: 0.3
//!       weight: 5
//!       loras: {glow: 3, neonline: 1}
//!       excludeGroups: [lighting]
//!     pastel:
//!       weight: 2
//!       ymls: [soft]
//!       excludeDic: [neon]
//! ```
//!
//! Groups run in document order. Inside a group the stages are fixed:
//! per -> weight -> union -> total cap -> one lora per surviving series.

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use super::sampling;
use crate::config::NumberOrRange;
use crate::domain::Category;
use crate::error::{GenloopError, Result};
use crate::metadata::MetadataStore;

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value))
}

/// Deserialize a mapping keeping its key order. Null values become defaults.
fn ordered<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let mapping = Option::<serde_yaml::Mapping>::deserialize(deserializer)?.unwrap_or_default();
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = key
                .as_str()
                .ok_or_else(|| D::Error::custom(format!("series name must be a string, got {:?}", key)))?
                .to_string();
            let item = if value.is_null() {
                T::default()
            } else {
                serde_yaml::from_value(value).map_err(D::Error::custom)?
            };
            Ok((name, item))
        })
        .collect()
}

/// One selectable series inside a group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Series {
    /// Inclusion probability for the per stage
    #[serde(deserialize_with = "lenient_number")]
    pub per: Option<f64>,
    /// Relative weight for the weight stage
    #[serde(deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
    /// Explicit lora -> weight map
    pub loras: BTreeMap<String, Value>,
    /// Eligible lora metadata buckets
    pub ymls: Vec<String>,
    #[serde(rename = "excludeGroups")]
    pub exclude_groups: Vec<String>,
    #[serde(rename = "excludeDic")]
    pub exclude_dic: Vec<String>,
}

impl Series {
    /// Explicit lora weights; malformed values take `default`.
    pub fn lora_weights(&self, default: f64) -> BTreeMap<String, f64> {
        self.loras
            .iter()
            .map(|(id, w)| (id.clone(), number(w).unwrap_or(default)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeightGroup {
    pub per: bool,
    #[serde(rename = "perMax")]
    pub per_max: Option<NumberOrRange>,
    pub weight: bool,
    #[serde(rename = "weightMax")]
    pub weight_max: Option<NumberOrRange>,
    pub total: bool,
    #[serde(rename = "totalMax")]
    pub total_max: Option<NumberOrRange>,
    #[serde(deserialize_with = "ordered")]
    pub dic: Vec<(String, Series)>,
}

/// Parsed group document, groups in file order.
#[derive(Debug, Clone, Default)]
pub struct GroupDocument {
    pub groups: Vec<(String, WeightGroup)>,
}

impl GroupDocument {
    /// Parse a named metadata document. Malformed groups are skipped with a warning.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Mapping(mapping) = value else {
            return Err(GenloopError::Config("group document must be a mapping".to_string()));
        };

        let mut groups = Vec::new();
        for (key, body) in mapping {
            let Some(name) = key.as_str() else {
                log::warn!("Skipping group with non-string name {:?}", key);
                continue;
            };
            match serde_yaml::from_value::<WeightGroup>(body.clone()) {
                Ok(group) => groups.push((name.to_string(), group)),
                Err(e) => log::warn!("Skipping malformed group '{}': {}", name, e),
            }
        }
        Ok(Self { groups })
    }
}

#[derive(Debug, Clone, Default)]
struct Exclusions {
    groups: HashSet<String>,
    series: HashSet<String>,
}

impl Exclusions {
    fn absorb(&mut self, series: &Series) {
        self.groups.extend(series.exclude_groups.iter().cloned());
        self.series.extend(series.exclude_dic.iter().cloned());
    }

    fn blocks(&self, name: &str) -> bool {
        self.series.contains(name)
    }
}

type Chosen<'g> = Vec<(&'g str, &'g Series)>;

fn resolve_cap<R: Rng + ?Sized>(cap: Option<&NumberOrRange>, rng: &mut R) -> Result<Option<usize>> {
    cap.map(|c| c.resolve_count(rng)).transpose()
}

fn per_stage<'g, R: Rng + ?Sized>(group: &'g WeightGroup, exclusions: &mut Exclusions, rng: &mut R) -> Result<Chosen<'g>> {
    let mut chosen = Vec::new();
    if !group.per {
        return Ok(chosen);
    }
    let cap = resolve_cap(group.per_max.as_ref(), rng)?.unwrap_or(usize::MAX);

    for (name, series) in &group.dic {
        if chosen.len() >= cap {
            break;
        }
        let Some(per) = series.per else { continue };
        if exclusions.blocks(name) {
            continue;
        }
        if rng.random::<f64>() < per {
            exclusions.absorb(series);
            chosen.push((name.as_str(), series));
        }
    }
    Ok(chosen)
}

fn weight_stage<'g, R: Rng + ?Sized>(group: &'g WeightGroup, exclusions: &mut Exclusions, rng: &mut R) -> Result<Chosen<'g>> {
    let mut chosen = Vec::new();
    if !group.weight {
        return Ok(chosen);
    }
    let cap = resolve_cap(group.weight_max.as_ref(), rng)?.unwrap_or(1);

    let mut pool: Vec<(&str, &Series, f64)> = group
        .dic
        .iter()
        .filter_map(|(name, series)| series.weight.map(|w| (name.as_str(), series, w)))
        .collect();

    while chosen.len() < cap {
        pool.retain(|(name, _, _)| !exclusions.blocks(name));
        let weights: Vec<f64> = pool.iter().map(|(_, _, w)| *w).collect();
        let Some(idx) = sampling::weighted_index(rng, &weights) else {
            break;
        };
        let (name, series, _) = pool.swap_remove(idx);
        exclusions.absorb(series);
        chosen.push((name, series));
    }
    Ok(chosen)
}

fn union<'g>(first: Chosen<'g>, second: Chosen<'g>) -> Chosen<'g> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|(name, _)| seen.insert(*name))
        .collect()
}

/// Series surviving every stage of one group.
fn select_series<'g, R: Rng + ?Sized>(group: &'g WeightGroup, exclusions: &Exclusions, rng: &mut R) -> Result<Chosen<'g>> {
    let mut provisional = exclusions.clone();
    let per = per_stage(group, &mut provisional, rng)?;
    let weighted = weight_stage(group, &mut provisional, rng)?;
    let merged = union(per, weighted);

    if !group.total {
        return Ok(merged);
    }
    match resolve_cap(group.total_max.as_ref(), rng)? {
        Some(cap) if merged.len() > cap => Ok(sampling::uniform_sample(rng, merged, cap)),
        _ => Ok(merged),
    }
}

/// Resolves a group document to lora identifiers for one type.
pub struct WeightYmlResolver<'a> {
    metadata: &'a MetadataStore,
    type_key: &'a str,
    default_weight: f64,
}

impl<'a> WeightYmlResolver<'a> {
    pub fn new(metadata: &'a MetadataStore, type_key: &'a str, default_weight: f64) -> Self {
        Self {
            metadata,
            type_key,
            default_weight,
        }
    }

    /// One lora per surviving series, across all groups in order.
    pub fn resolve<R: Rng + ?Sized>(&self, document: &GroupDocument, rng: &mut R) -> Result<Vec<String>> {
        let mut exclusions = Exclusions::default();
        let mut picks = Vec::new();

        for (name, group) in &document.groups {
            if exclusions.groups.contains(name) {
                log::debug!("Group '{}' excluded", name);
                continue;
            }
            let survivors = select_series(group, &exclusions, rng)?;
            log::debug!(
                "Group '{}' -> {:?}",
                name,
                survivors.iter().map(|(s, _)| *s).collect::<Vec<_>>()
            );

            for (series_name, series) in survivors {
                exclusions.absorb(series);
                match self.pick_lora(series, rng) {
                    Some(id) => picks.push(id),
                    None => log::warn!("Series '{}' in group '{}' has no lora to pick", series_name, name),
                }
            }
        }
        Ok(picks)
    }

    /// Explicit `loras`, then `ymls` buckets, then every lora of the type.
    fn pick_lora<R: Rng + ?Sized>(&self, series: &Series, rng: &mut R) -> Option<String> {
        if let Some(id) = sampling::weighted_choice(rng, &series.lora_weights(self.default_weight)) {
            return Some(id);
        }
        if !series.ymls.is_empty() {
            let weights = self
                .metadata
                .bucket_weights(self.type_key, &series.ymls, self.default_weight);
            if let Some(id) = sampling::weighted_choice(rng, &weights) {
                return Some(id);
            }
        }
        let all = self
            .metadata
            .summed_weights(Category::Etc, self.type_key, self.default_weight, |_| true);
        sampling::weighted_choice(rng, &all)
    }
}
