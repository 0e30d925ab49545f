//! Metadata store: YAML property bags per identifier, grouped into buckets.
//!
//! Each type has checkpoint buckets, lora buckets (one per metadata file)
//! and named singleton documents such as the WeightYml group document.

mod load;

use std::collections::{BTreeMap, HashMap};

use serde_yaml::Value;

use crate::domain::Category;

pub use load::load;

/// Property bag of one identifier inside one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    props: Value,
}

impl Entry {
    pub fn new(props: Value) -> Self {
        Self { props }
    }

    /// Entry with only a `weight` property.
    pub fn weighted(weight: f64) -> Self {
        let mut map = serde_yaml::Mapping::new();
        map.insert(Value::from("weight"), Value::from(weight));
        Self { props: Value::Mapping(map) }
    }

    /// The `weight` property, if it is a finite non-negative number or numeric string.
    pub fn weight(&self) -> Option<f64> {
        let raw = self.props.get("weight")?;
        let weight = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        (weight.is_finite() && weight >= 0.0).then_some(weight)
    }

    pub fn props(&self) -> &Value {
        &self.props
    }
}

/// Identifier -> entry, for one metadata file.
pub type Bucket = BTreeMap<String, Entry>;

/// Metadata of one type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMetadata {
    checkpoint: BTreeMap<String, Bucket>,
    lora: BTreeMap<String, Bucket>,
    named: BTreeMap<String, Value>,
}

/// All metadata, keyed by lower-cased type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    types: HashMap<String, TypeMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn type_mut(&mut self, type_key: &str) -> &mut TypeMetadata {
        self.types.entry(type_key.to_lowercase()).or_default()
    }

    fn type_ref(&self, type_key: &str) -> Option<&TypeMetadata> {
        self.types.get(&type_key.to_lowercase())
    }

    pub fn insert_entry(&mut self, category: Category, type_key: &str, bucket: &str, id: impl Into<String>, entry: Entry) {
        let meta = self.type_mut(type_key);
        let buckets = match category {
            Category::Checkpoint => &mut meta.checkpoint,
            Category::Character | Category::Etc => &mut meta.lora,
        };
        buckets.entry(bucket.to_string()).or_default().insert(id.into(), entry);
    }

    pub fn insert_named(&mut self, type_key: &str, name: impl Into<String>, document: Value) {
        self.type_mut(type_key).named.insert(name.into(), document);
    }

    /// Bucket documents for a category. Character and etc share the lora buckets.
    pub fn documents(&self, category: Category, type_key: &str) -> Option<&BTreeMap<String, Bucket>> {
        let meta = self.type_ref(type_key)?;
        Some(match category {
            Category::Checkpoint => &meta.checkpoint,
            Category::Character | Category::Etc => &meta.lora,
        })
    }

    /// A named singleton document.
    pub fn named(&self, type_key: &str, name: &str) -> Option<&Value> {
        self.type_ref(type_key)?.named.get(name)
    }

    /// True when any bucket of the category defines `id`.
    pub fn contains(&self, category: Category, type_key: &str, id: &str) -> bool {
        self.documents(category, type_key)
            .is_some_and(|docs| docs.values().any(|bucket| bucket.contains_key(id)))
    }

    /// Summed weight per identifier across every bucket of the category.
    ///
    /// An identifier in several buckets accumulates each bucket's weight,
    /// with `default` standing in for a missing or malformed value.
    pub fn summed_weights<F>(&self, category: Category, type_key: &str, default: f64, keep: F) -> BTreeMap<String, f64>
    where
        F: Fn(&str) -> bool,
    {
        let mut weights = BTreeMap::new();
        if let Some(docs) = self.documents(category, type_key) {
            for bucket in docs.values() {
                accumulate(&mut weights, bucket, default, &keep);
            }
        }
        weights
    }

    /// Summed lora weights restricted to the named buckets.
    pub fn bucket_weights(&self, type_key: &str, buckets: &[String], default: f64) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        if let Some(docs) = self.documents(Category::Etc, type_key) {
            for name in buckets {
                match docs.get(name) {
                    Some(bucket) => accumulate(&mut weights, bucket, default, &|_: &str| true),
                    None => log::debug!("Lora bucket '{}' not found for type '{}'", name, type_key),
                }
            }
        }
        weights
    }

    /// Number of buckets and entries per type, for reporting.
    pub fn summary(&self, type_key: &str) -> Option<(usize, usize, usize)> {
        let meta = self.type_ref(type_key)?;
        let count = |b: &BTreeMap<String, Bucket>| b.values().map(BTreeMap::len).sum::<usize>();
        Some((count(&meta.checkpoint), count(&meta.lora), meta.named.len()))
    }
}

fn accumulate(weights: &mut BTreeMap<String, f64>, bucket: &Bucket, default: f64, keep: &dyn Fn(&str) -> bool) {
    for (id, entry) in bucket {
        if keep(id) {
            *weights.entry(id.clone()).or_insert(0.0) += entry.weight().unwrap_or(default);
        }
    }
}
